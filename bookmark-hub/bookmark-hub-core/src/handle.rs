use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::scope::AccessScope;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetKind {
    File,
    Folder,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::File => "file",
            TargetKind::Folder => "folder",
        }
    }
}

/// Facts about a resolved target, fixed at resolution time. A
/// capability change requires a fresh resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    pub bookmarkable: bool,
    pub deletable: bool,
    pub movable: bool,
    pub enumerable: bool,
}

impl CapabilitySet {
    pub fn none() -> Self {
        Self {
            bookmarkable: false,
            deletable: false,
            movable: false,
            enumerable: false,
        }
    }
}

/// A live, resolved file or folder.
///
/// Immutable once constructed. Holds a shared reference to its access
/// scope but never exposes it; the only way out is release through the
/// resolver, which keeps the reference count honest. Each handle owns
/// exactly one reference, guarded by its own released flag so a
/// double-release cannot consume another handle's reference.
#[derive(Debug)]
pub struct StorageHandle {
    name: String,
    path: Option<PathBuf>,
    kind: TargetKind,
    capabilities: CapabilitySet,
    scope: Arc<AccessScope>,
    released: AtomicBool,
}

impl StorageHandle {
    pub(crate) fn new(scope: Arc<AccessScope>) -> Self {
        let auth = scope.authorization();
        Self {
            name: auth.name.clone(),
            path: auth.path.clone(),
            kind: auth.kind,
            capabilities: auth.capabilities,
            scope,
            released: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Best-effort local path; absent on platforms with no filesystem
    /// path concept.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn kind(&self) -> TargetKind {
        self.kind
    }

    pub fn is_folder(&self) -> bool {
        self.kind == TargetKind::Folder
    }

    pub fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    pub(crate) fn scope(&self) -> &Arc<AccessScope> {
        &self.scope
    }

    /// Consume this handle's single scope reference. True only the
    /// first time.
    pub(crate) fn mark_released(&self) -> bool {
        !self.released.swap(true, Ordering::AcqRel)
    }
}
