//! Orchestrates the codec and the scope manager.
//!
//! Each identifier moves through two transitions: Unresolved (an id and
//! nothing else) to Resolved (a live handle over an active scope) to
//! Released (the id remains a value but grants nothing). Staleness is
//! terminal for the call; recovery takes a fresh user grant.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::codec::{BookmarkCodec, BookmarkId, DecodeError, DecodedTarget};
use crate::handle::StorageHandle;
use crate::platform::ScopedAuthorizer;
use crate::scope::{AcquireError, ReleaseError, ScopeManager};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("access denied: {0}")]
    AccessDenied(String),
    /// The bookmarked target moved, was renamed, or was deleted since
    /// the bookmark was made. The only recovery is a fresh user grant;
    /// nothing here retries.
    #[error("bookmark invalidated: {0}")]
    BookmarkInvalidated(String),
}

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("target is not bookmarkable")]
    NotBookmarkable,
    #[error("handle already released")]
    AlreadyReleased,
}

pub struct BookmarkResolver {
    codec: BookmarkCodec,
    scopes: ScopeManager,
}

impl BookmarkResolver {
    pub fn new(authorizer: Arc<dyn ScopedAuthorizer>) -> Self {
        let codec = BookmarkCodec::new(authorizer.supported_tags());
        Self {
            codec,
            scopes: ScopeManager::new(authorizer),
        }
    }

    pub fn codec(&self) -> &BookmarkCodec {
        &self.codec
    }

    pub fn scopes(&self) -> &ScopeManager {
        &self.scopes
    }

    /// Unresolved to Resolved: decode, re-authorize, build the handle.
    pub async fn resolve(&self, id: &BookmarkId) -> Result<StorageHandle, ResolveError> {
        let decoded = self.codec.decode(id)?;
        self.resolve_target(decoded).await
    }

    /// Same acquisition path for a fresh picker selection that has no
    /// identifier yet.
    pub async fn resolve_target(
        &self,
        target: DecodedTarget,
    ) -> Result<StorageHandle, ResolveError> {
        let scope = self.scopes.acquire(&target).await.map_err(|err| match err {
            AcquireError::StaleTarget(msg) => ResolveError::BookmarkInvalidated(msg),
            AcquireError::AccessDenied(msg) => ResolveError::AccessDenied(msg),
        })?;
        debug!(scope = %scope.id(), name = %scope.authorization().name, "resolved storage handle");
        Ok(StorageHandle::new(scope))
    }

    /// Read-only projection of a live handle into a persistable id.
    /// Leaves the scope's reference count alone.
    pub fn save(&self, handle: &StorageHandle) -> Result<BookmarkId, SaveError> {
        if handle.is_released() {
            return Err(SaveError::AlreadyReleased);
        }
        self.codec
            .encode(&handle.scope().target().identity, &handle.capabilities())
            .map_err(|_| SaveError::NotBookmarkable)
    }

    /// Resolved to Released. Idempotent per handle: a second call
    /// reports [`ReleaseError::AlreadyReleased`] and leaves the count
    /// untouched.
    pub async fn release(&self, handle: &StorageHandle) -> Result<(), ReleaseError> {
        if !handle.mark_released() {
            return Err(ReleaseError::AlreadyReleased);
        }
        self.scopes.release(handle.scope()).await
    }
}
