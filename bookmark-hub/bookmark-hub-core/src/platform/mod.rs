//! The OS authorization port.
//!
//! The core depends only on this interface; each platform supplies one
//! adapter. The native path adapter lives here; content-reference and
//! security-scoped-blob adapters are vendor bindings supplied by the
//! embedding application.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::codec::{DecodedTarget, PlatformTag};
use crate::handle::{CapabilitySet, TargetKind};
use crate::scope::AcquireError;

pub mod native;

/// Metadata captured when the OS grants access to a target.
#[derive(Clone, Debug)]
pub struct Authorization {
    pub name: String,
    pub path: Option<PathBuf>,
    pub kind: TargetKind,
    pub capabilities: CapabilitySet,
}

/// One OS binding for granting and revoking scoped access.
#[async_trait]
pub trait ScopedAuthorizer: Send + Sync {
    /// Identifier encodings this runtime can re-authorize.
    fn supported_tags(&self) -> &[PlatformTag];

    /// Ask the OS to grant elevated access to the target. May block on
    /// I/O or a security prompt; timeouts surface as
    /// [`AcquireError::AccessDenied`].
    async fn authorize(&self, target: &DecodedTarget) -> Result<Authorization, AcquireError>;

    /// Revoke a previously granted scope. Called at most once per grant.
    async fn revoke(&self, target: &DecodedTarget) -> anyhow::Result<()>;
}
