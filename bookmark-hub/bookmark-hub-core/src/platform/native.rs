//! Path-string adapter for platforms with a single rooted filesystem
//! tree and stable absolute paths.

use async_trait::async_trait;
use tracing::debug;

use crate::codec::{DecodedTarget, PlatformTag, TargetIdentity};
use crate::handle::{CapabilitySet, TargetKind};
use crate::platform::{Authorization, ScopedAuthorizer};
use crate::scope::AcquireError;

const SUPPORTED: &[PlatformTag] = &[PlatformTag::PathString];

/// Plain filesystems have no security-scope call to make; authorization
/// is a liveness and permission probe, and revocation is a no-op.
#[derive(Debug, Default)]
pub struct NativeFsAuthorizer;

impl NativeFsAuthorizer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ScopedAuthorizer for NativeFsAuthorizer {
    fn supported_tags(&self) -> &[PlatformTag] {
        SUPPORTED
    }

    async fn authorize(&self, target: &DecodedTarget) -> Result<Authorization, AcquireError> {
        let TargetIdentity::Path(path) = &target.identity else {
            return Err(AcquireError::AccessDenied(format!(
                "native filesystem authorizer cannot grant {} targets",
                target.tag
            )));
        };
        let meta = tokio::fs::metadata(path).await.map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => {
                AcquireError::StaleTarget(format!("{} no longer exists", path.display()))
            }
            std::io::ErrorKind::PermissionDenied => {
                AcquireError::AccessDenied(format!("{}: {}", path.display(), err))
            }
            // exists-but-unreachable is treated the same as moved
            _ => AcquireError::StaleTarget(format!("{} is unreachable: {}", path.display(), err)),
        })?;
        let kind = if meta.is_dir() {
            TargetKind::Folder
        } else {
            TargetKind::File
        };
        let writable = !meta.permissions().readonly();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        debug!(path = %path.display(), kind = kind.as_str(), "granted native filesystem scope");
        Ok(Authorization {
            name,
            path: Some(path.clone()),
            kind,
            capabilities: CapabilitySet {
                bookmarkable: true,
                deletable: writable,
                movable: writable,
                enumerable: meta.is_dir(),
            },
        })
    }

    async fn revoke(&self, target: &DecodedTarget) -> anyhow::Result<()> {
        debug!(target = %target.identity, "released native filesystem scope");
        Ok(())
    }
}
