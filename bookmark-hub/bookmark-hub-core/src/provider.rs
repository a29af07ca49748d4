//! The façade applications call. Adds no state of its own; the file
//! picker that produces the initial selection and the storage that
//! persists the identifier string are the application's concern.

use std::sync::Arc;

use crate::codec::{BookmarkId, DecodedTarget};
use crate::handle::{CapabilitySet, StorageHandle};
use crate::platform::ScopedAuthorizer;
use crate::resolver::{BookmarkResolver, ResolveError};
use crate::scope::ReleaseError;

pub struct StorageProvider {
    resolver: BookmarkResolver,
}

impl StorageProvider {
    pub fn new(authorizer: Arc<dyn ScopedAuthorizer>) -> Self {
        Self {
            resolver: BookmarkResolver::new(authorizer),
        }
    }

    pub fn resolver(&self) -> &BookmarkResolver {
        &self.resolver
    }

    /// None when the handle is not bookmarkable or already released.
    pub fn save_bookmark(&self, handle: &StorageHandle) -> Option<BookmarkId> {
        self.resolver.save(handle).ok()
    }

    pub async fn resolve(&self, id: &BookmarkId) -> Result<StorageHandle, ResolveError> {
        self.resolver.resolve(id).await
    }

    /// Turn a fresh picker selection into a live handle.
    pub async fn open_selection(
        &self,
        target: DecodedTarget,
    ) -> Result<StorageHandle, ResolveError> {
        self.resolver.resolve_target(target).await
    }

    pub async fn release(&self, handle: &StorageHandle) -> Result<(), ReleaseError> {
        self.resolver.release(handle).await
    }

    pub fn capabilities(&self, handle: &StorageHandle) -> CapabilitySet {
        handle.capabilities()
    }
}
