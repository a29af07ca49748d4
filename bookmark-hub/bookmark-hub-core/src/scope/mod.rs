//! Reference-counted security-scope bookkeeping.
//!
//! One live [`AccessScope`] per target identity, shared by every handle
//! resolved to that target concurrently. The table mutex covers the
//! bookkeeping only; OS grant and revoke calls run outside it. An
//! in-flight grant parks later acquirers on a watch channel so the same
//! target never receives two OS grants.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{oneshot, watch};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::codec::{DecodedTarget, TargetIdentity};
use crate::platform::{Authorization, ScopedAuthorizer};

#[cfg(test)]
mod tests;

#[derive(Debug, Error)]
pub enum AcquireError {
    /// The OS refused to grant access. Timeouts land here too; from
    /// the caller's side both mean access was not obtained.
    #[error("access denied: {0}")]
    AccessDenied(String),
    /// The target no longer exists where the identifier points.
    #[error("stale target: {0}")]
    StaleTarget(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReleaseError {
    /// The scope, or this handle's reference to it, was already
    /// released. Non-fatal; counts are untouched.
    #[error("scope already released")]
    AlreadyReleased,
}

/// One live OS grant for one target.
#[derive(Debug)]
pub struct AccessScope {
    id: Uuid,
    target: DecodedTarget,
    authorization: Authorization,
}

impl AccessScope {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn target(&self) -> &DecodedTarget {
        &self.target
    }

    pub(crate) fn authorization(&self) -> &Authorization {
        &self.authorization
    }
}

enum Slot {
    /// Grant call in flight; later acquirers wait for it to settle.
    Pending(watch::Receiver<()>),
    Live { scope: Arc<AccessScope>, refs: u32 },
}

enum Step {
    Wait(watch::Receiver<()>),
    Grant(watch::Sender<()>),
}

struct Inner {
    authorizer: Arc<dyn ScopedAuthorizer>,
    table: Mutex<HashMap<TargetIdentity, Slot>>,
}

impl Inner {
    async fn release_scope(&self, scope: &Arc<AccessScope>) -> Result<(), ReleaseError> {
        let revoke = {
            let mut table = self.table.lock();
            let drained = match table.get_mut(&scope.target.identity) {
                Some(Slot::Live { scope: live, refs }) if Arc::ptr_eq(live, scope) => {
                    *refs -= 1;
                    if *refs > 0 {
                        debug!(scope = %scope.id, refs = *refs, "dropped one scope reference");
                    }
                    *refs == 0
                }
                _ => return Err(ReleaseError::AlreadyReleased),
            };
            if drained {
                table.remove(&scope.target.identity);
            }
            drained
        };
        if revoke {
            // the scope is already out of the table, so the revoke can
            // only ever fire once for it
            if let Err(err) = self.authorizer.revoke(&scope.target).await {
                warn!(scope = %scope.id, error = %err, "revoke call failed after final release");
            } else {
                debug!(scope = %scope.id, target = %scope.target.identity, "revoked access scope");
            }
        }
        Ok(())
    }
}

/// Delivers a spawned grant back to its caller. Covers the last
/// cancellation window: if the caller's future is dropped after the
/// grant landed in the channel but before it was received, the drop
/// drains the stranded scope and releases it. A caller that was gone
/// before the send is handled by the grant task's failed-send path;
/// the channel guarantees exactly one of the two runs per scope.
struct GrantTicket {
    rx: oneshot::Receiver<Result<Arc<AccessScope>, AcquireError>>,
    inner: Arc<Inner>,
    consumed: bool,
}

impl GrantTicket {
    async fn wait(mut self) -> Result<Arc<AccessScope>, AcquireError> {
        let result = (&mut self.rx)
            .await
            .map_err(|_| AcquireError::AccessDenied("authorization task failed".to_string()));
        // the channel is drained or dead either way
        self.consumed = true;
        result?
    }
}

impl Drop for GrantTicket {
    fn drop(&mut self) {
        if self.consumed {
            return;
        }
        // refuse any still-in-flight send, then drain a scope that
        // already landed
        self.rx.close();
        if let Ok(Ok(scope)) = self.rx.try_recv() {
            debug!(scope = %scope.id, "caller dropped a delivered grant; releasing it");
            let inner = self.inner.clone();
            // no runtime here means the whole process is tearing down
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    let _ = inner.release_scope(&scope).await;
                });
            }
        }
    }
}

/// Process-wide owner of the live-scope table. Cheap to clone.
#[derive(Clone)]
pub struct ScopeManager {
    inner: Arc<Inner>,
}

impl ScopeManager {
    pub fn new(authorizer: Arc<dyn ScopedAuthorizer>) -> Self {
        Self {
            inner: Arc::new(Inner {
                authorizer,
                table: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Number of live scopes, for diagnostics and tests.
    pub fn live_scopes(&self) -> usize {
        self.inner
            .table
            .lock()
            .values()
            .filter(|slot| matches!(slot, Slot::Live { .. }))
            .count()
    }

    /// Share the live scope for `target`, or issue one OS grant for it.
    ///
    /// Lookup and increment happen as one step under the table lock, so
    /// two concurrent acquires of the same target can never both
    /// observe "not found" and both call the OS.
    pub async fn acquire(&self, target: &DecodedTarget) -> Result<Arc<AccessScope>, AcquireError> {
        loop {
            let step = {
                let mut table = self.inner.table.lock();
                match table.entry(target.identity.clone()) {
                    Entry::Occupied(mut occupied) => match occupied.get_mut() {
                        Slot::Live { scope, refs } => {
                            *refs += 1;
                            debug!(scope = %scope.id, refs = *refs, "shared existing access scope");
                            return Ok(scope.clone());
                        }
                        Slot::Pending(done) => Step::Wait(done.clone()),
                    },
                    Entry::Vacant(vacant) => {
                        let (tx, rx) = watch::channel(());
                        vacant.insert(Slot::Pending(rx));
                        Step::Grant(tx)
                    }
                }
            };
            match step {
                Step::Wait(mut done) => {
                    // settles when the in-flight grant lands or errors
                    let _ = done.changed().await;
                }
                Step::Grant(done) => return self.grant(target.clone(), done).await,
            }
        }
    }

    pub async fn release(&self, scope: &Arc<AccessScope>) -> Result<(), ReleaseError> {
        self.inner.release_scope(scope).await
    }

    /// Run the OS grant on its own task. A caller cancelled after the
    /// grant succeeds must still leave the scope registered, then
    /// released back to zero; an orphaned OS grant is never acceptable.
    async fn grant(
        &self,
        target: DecodedTarget,
        done: watch::Sender<()>,
    ) -> Result<Arc<AccessScope>, AcquireError> {
        let (result_tx, result_rx) = oneshot::channel();
        let ticket = GrantTicket {
            rx: result_rx,
            inner: self.inner.clone(),
            consumed: false,
        };
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let result = match inner.authorizer.authorize(&target).await {
                Ok(authorization) => {
                    let scope = Arc::new(AccessScope {
                        id: Uuid::new_v4(),
                        target: target.clone(),
                        authorization,
                    });
                    inner.table.lock().insert(
                        target.identity.clone(),
                        Slot::Live {
                            scope: scope.clone(),
                            refs: 1,
                        },
                    );
                    debug!(scope = %scope.id, target = %target.identity, "granted access scope");
                    Ok(scope)
                }
                Err(err) => {
                    inner.table.lock().remove(&target.identity);
                    Err(err)
                }
            };
            // wake everyone parked behind the pending slot
            let _ = done.send(());
            match result {
                Ok(scope) => {
                    if let Err(Ok(scope)) = result_tx.send(Ok(scope)) {
                        // the caller went away mid-flight; net the
                        // registered grant straight back to zero
                        debug!(scope = %scope.id, "caller cancelled; releasing fresh scope");
                        let _ = inner.release_scope(&scope).await;
                    }
                }
                Err(err) => {
                    let _ = result_tx.send(Err(err));
                }
            }
        });
        ticket.wait().await
    }
}
