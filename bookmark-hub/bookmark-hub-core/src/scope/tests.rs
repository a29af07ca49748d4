use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use super::*;
use crate::codec::PlatformTag;
use crate::handle::{CapabilitySet, TargetKind};

#[derive(Default)]
struct MockAuthorizer {
    grants: AtomicUsize,
    revokes: AtomicUsize,
    grant_delay: Duration,
    deny: bool,
    stale: bool,
}

#[async_trait]
impl ScopedAuthorizer for MockAuthorizer {
    fn supported_tags(&self) -> &[PlatformTag] {
        &[PlatformTag::PathString]
    }

    async fn authorize(&self, _target: &DecodedTarget) -> Result<Authorization, AcquireError> {
        if !self.grant_delay.is_zero() {
            sleep(self.grant_delay).await;
        }
        if self.stale {
            return Err(AcquireError::StaleTarget("target is gone".to_string()));
        }
        if self.deny {
            return Err(AcquireError::AccessDenied("prompt dismissed".to_string()));
        }
        self.grants.fetch_add(1, Ordering::SeqCst);
        Ok(Authorization {
            name: "notes".to_string(),
            path: None,
            kind: TargetKind::File,
            capabilities: CapabilitySet {
                bookmarkable: true,
                deletable: true,
                movable: true,
                enumerable: false,
            },
        })
    }

    async fn revoke(&self, _target: &DecodedTarget) -> anyhow::Result<()> {
        self.revokes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn target(path: &str) -> DecodedTarget {
    DecodedTarget {
        tag: PlatformTag::PathString,
        identity: TargetIdentity::Path(PathBuf::from(path)),
    }
}

#[tokio::test]
async fn repeated_acquires_share_one_grant() {
    let auth = Arc::new(MockAuthorizer::default());
    let manager = ScopeManager::new(auth.clone());

    let a = manager.acquire(&target("/docs/notes.txt")).await.unwrap();
    let b = manager.acquire(&target("/docs/notes.txt")).await.unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(auth.grants.load(Ordering::SeqCst), 1);
    assert_eq!(manager.live_scopes(), 1);

    manager.release(&a).await.unwrap();
    assert_eq!(auth.revokes.load(Ordering::SeqCst), 0);
    manager.release(&b).await.unwrap();
    assert_eq!(auth.revokes.load(Ordering::SeqCst), 1);
    assert_eq!(manager.live_scopes(), 0);
}

#[tokio::test]
async fn release_is_idempotent_and_count_never_goes_negative() {
    let auth = Arc::new(MockAuthorizer::default());
    let manager = ScopeManager::new(auth.clone());

    let scope = manager.acquire(&target("/docs/notes.txt")).await.unwrap();
    manager.release(&scope).await.unwrap();
    assert_eq!(
        manager.release(&scope).await.unwrap_err(),
        ReleaseError::AlreadyReleased
    );
    assert_eq!(
        manager.release(&scope).await.unwrap_err(),
        ReleaseError::AlreadyReleased
    );
    assert_eq!(auth.revokes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn concurrent_acquires_issue_one_os_grant() {
    let auth = Arc::new(MockAuthorizer {
        grant_delay: Duration::from_millis(20),
        ..Default::default()
    });
    let manager = ScopeManager::new(auth.clone());

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.acquire(&target("/docs/shared.txt")).await })
        })
        .collect();
    let scopes: Vec<_> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert_eq!(auth.grants.load(Ordering::SeqCst), 1);
    assert_eq!(manager.live_scopes(), 1);
    for scope in &scopes {
        assert!(Arc::ptr_eq(scope, &scopes[0]));
    }

    for (i, scope) in scopes.iter().enumerate() {
        manager.release(scope).await.unwrap();
        let expected = if i == scopes.len() - 1 { 1 } else { 0 };
        assert_eq!(auth.revokes.load(Ordering::SeqCst), expected);
    }
}

#[tokio::test]
async fn distinct_targets_get_distinct_scopes() {
    let auth = Arc::new(MockAuthorizer::default());
    let manager = ScopeManager::new(auth.clone());

    let a = manager.acquire(&target("/docs/a.txt")).await.unwrap();
    let b = manager.acquire(&target("/docs/b.txt")).await.unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(auth.grants.load(Ordering::SeqCst), 2);
    assert_eq!(manager.live_scopes(), 2);
}

#[tokio::test]
async fn denial_and_staleness_propagate() {
    let denied = ScopeManager::new(Arc::new(MockAuthorizer {
        deny: true,
        ..Default::default()
    }));
    assert!(matches!(
        denied.acquire(&target("/docs/a.txt")).await.unwrap_err(),
        AcquireError::AccessDenied(_)
    ));
    assert_eq!(denied.live_scopes(), 0);

    let stale = ScopeManager::new(Arc::new(MockAuthorizer {
        stale: true,
        ..Default::default()
    }));
    assert!(matches!(
        stale.acquire(&target("/docs/a.txt")).await.unwrap_err(),
        AcquireError::StaleTarget(_)
    ));
    assert_eq!(stale.live_scopes(), 0);
}

#[tokio::test]
async fn failed_grant_wakes_concurrent_waiters() {
    let auth = Arc::new(MockAuthorizer {
        stale: true,
        grant_delay: Duration::from_millis(20),
        ..Default::default()
    });
    let manager = ScopeManager::new(auth);

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.acquire(&target("/docs/gone.txt")).await })
        })
        .collect();
    for joined in futures::future::join_all(tasks).await {
        assert!(matches!(
            joined.unwrap().unwrap_err(),
            AcquireError::StaleTarget(_)
        ));
    }
    assert_eq!(manager.live_scopes(), 0);
}

#[tokio::test]
async fn grant_delivered_to_a_dropped_caller_is_released() {
    let auth = Arc::new(MockAuthorizer {
        grant_delay: Duration::from_millis(20),
        ..Default::default()
    });
    let manager = ScopeManager::new(auth.clone());

    // poll once so the grant task starts, then let it finish and hand
    // the scope into the channel while the caller is still parked
    let slow_target = target("/docs/slow.txt");
    let mut fut = Box::pin(manager.acquire(&slow_target));
    assert!(futures::poll!(fut.as_mut()).is_pending());
    sleep(Duration::from_millis(100)).await;
    assert_eq!(auth.grants.load(Ordering::SeqCst), 1);

    // dropping the caller now must not strand the registered scope
    drop(fut);
    sleep(Duration::from_millis(50)).await;
    assert_eq!(auth.revokes.load(Ordering::SeqCst), 1);
    assert_eq!(manager.live_scopes(), 0);
}

#[tokio::test]
async fn cancelled_acquire_never_leaks_a_grant() {
    let auth = Arc::new(MockAuthorizer {
        grant_delay: Duration::from_millis(50),
        ..Default::default()
    });
    let manager = ScopeManager::new(auth.clone());

    let task = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.acquire(&target("/docs/slow.txt")).await })
    };
    sleep(Duration::from_millis(10)).await;
    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());

    // the grant still completes on its own task, registers, and is
    // immediately released back to zero
    sleep(Duration::from_millis(150)).await;
    assert_eq!(auth.grants.load(Ordering::SeqCst), 1);
    assert_eq!(auth.revokes.load(Ordering::SeqCst), 1);
    assert_eq!(manager.live_scopes(), 0);
}
