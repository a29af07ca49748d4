//! Platform-tagged bookmark identifiers.
//!
//! Encoding rules are mutually exclusive per platform. The tag is
//! inspected before any payload parsing, so an identifier produced on
//! a foreign platform fails closed instead of yielding a wrong path.

use std::fmt;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::handle::CapabilitySet;


/// Which encoding rule produced a bookmark identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlatformTag {
    PathString,
    ContentReference,
    SecurityScopedBlob,
}

impl PlatformTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformTag::PathString => "path-string",
            PlatformTag::ContentReference => "content-reference",
            PlatformTag::SecurityScopedBlob => "security-scoped-blob",
        }
    }
}

impl fmt::Display for PlatformTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque, persistable identifier for one bookmarked file or folder.
///
/// The payload may embed absolute paths; treat it as sensitive. The
/// tag travels with the payload so decoding never has to guess a
/// format from content alone.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkId {
    tag: PlatformTag,
    payload: Vec<u8>,
}

impl BookmarkId {
    pub fn new(tag: PlatformTag, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            tag,
            payload: payload.into(),
        }
    }

    pub fn tag(&self) -> PlatformTag {
        self.tag
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Text rendering in the per-tag wire format: a raw absolute path,
    /// a `content://` URI, or base64 for the opaque blob tag.
    pub fn to_wire_string(&self) -> String {
        match self.tag {
            PlatformTag::PathString | PlatformTag::ContentReference => {
                String::from_utf8_lossy(&self.payload).into_owned()
            }
            PlatformTag::SecurityScopedBlob => BASE64.encode(&self.payload),
        }
    }

    /// Rebuild an identifier from a persisted wire string and the tag
    /// it was stored alongside.
    pub fn from_tagged(tag: PlatformTag, wire: &str) -> Result<Self, DecodeError> {
        match tag {
            PlatformTag::SecurityScopedBlob => BASE64
                .decode(wire)
                .map(|payload| Self::new(tag, payload))
                .map_err(|_| DecodeError::MalformedId("blob payload is not valid base64".into())),
            _ => Ok(Self::new(tag, wire.as_bytes())),
        }
    }
}

/// The identity of one underlying storage target, as recovered from an
/// identifier. Keys the live-scope table.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TargetIdentity {
    Path(PathBuf),
    Content { authority: String, locator: String },
    Blob(Vec<u8>),
}

impl fmt::Display for TargetIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetIdentity::Path(path) => write!(f, "{}", path.display()),
            TargetIdentity::Content { authority, locator } => {
                write!(f, "content://{authority}/{locator}")
            }
            TargetIdentity::Blob(bytes) => write!(f, "security-scoped blob ({} bytes)", bytes.len()),
        }
    }
}

/// Enough information to attempt an OS-level re-authorization. Decode
/// produces this without any I/O; whether the target still exists is
/// resolution's problem.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedTarget {
    pub tag: PlatformTag,
    pub identity: TargetIdentity,
}

#[derive(Debug, Error)]
pub enum EncodeError {
    /// The target's capability set disallows bookmarking, or the
    /// target cannot be represented in its platform's wire format.
    #[error("target is not bookmarkable")]
    NotBookmarkable,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed bookmark id: {0}")]
    MalformedId(String),
    /// The tag names an encoding this runtime does not implement.
    #[error("bookmark id tagged {0} is not supported on this platform")]
    WrongPlatform(PlatformTag),
}

/// Encodes resolved targets into tagged identifiers and back.
///
/// Constructed with the set of tags the runtime's authorizer can
/// re-authorize; anything else fails with [`DecodeError::WrongPlatform`].
pub struct BookmarkCodec {
    supported: Vec<PlatformTag>,
}

impl BookmarkCodec {
    pub fn new(supported: &[PlatformTag]) -> Self {
        Self {
            supported: supported.to_vec(),
        }
    }

    pub fn supports(&self, tag: PlatformTag) -> bool {
        self.supported.contains(&tag)
    }

    pub fn encode(
        &self,
        identity: &TargetIdentity,
        capabilities: &CapabilitySet,
    ) -> Result<BookmarkId, EncodeError> {
        if !capabilities.bookmarkable {
            return Err(EncodeError::NotBookmarkable);
        }
        let id = match identity {
            TargetIdentity::Path(path) => {
                // the wire format is the raw path; a path that is not
                // valid utf-8 would come back as a different path, so
                // refuse it rather than mangle it
                let raw = path.to_str().ok_or(EncodeError::NotBookmarkable)?;
                BookmarkId::new(PlatformTag::PathString, raw.as_bytes().to_vec())
            }
            TargetIdentity::Content { authority, locator } => BookmarkId::new(
                PlatformTag::ContentReference,
                format!("content://{authority}/{locator}").into_bytes(),
            ),
            TargetIdentity::Blob(bytes) => {
                BookmarkId::new(PlatformTag::SecurityScopedBlob, bytes.clone())
            }
        };
        Ok(id)
    }

    pub fn decode(&self, id: &BookmarkId) -> Result<DecodedTarget, DecodeError> {
        if !self.supports(id.tag()) {
            return Err(DecodeError::WrongPlatform(id.tag()));
        }
        let identity = match id.tag() {
            PlatformTag::PathString => {
                let raw = std::str::from_utf8(id.payload()).map_err(|_| {
                    DecodeError::MalformedId("path payload is not valid utf-8".into())
                })?;
                if !Path::new(raw).is_absolute() {
                    return Err(DecodeError::MalformedId(
                        "path payload must be an absolute path".into(),
                    ));
                }
                TargetIdentity::Path(PathBuf::from(raw))
            }
            PlatformTag::ContentReference => {
                let raw = std::str::from_utf8(id.payload()).map_err(|_| {
                    DecodeError::MalformedId("content reference is not valid utf-8".into())
                })?;
                let rest = raw.strip_prefix("content://").ok_or_else(|| {
                    DecodeError::MalformedId("content reference missing content:// scheme".into())
                })?;
                let (authority, locator) = rest.split_once('/').ok_or_else(|| {
                    DecodeError::MalformedId("content reference missing locator segment".into())
                })?;
                if authority.is_empty() || locator.is_empty() {
                    return Err(DecodeError::MalformedId(
                        "content reference authority and locator must be non-empty".into(),
                    ));
                }
                TargetIdentity::Content {
                    authority: authority.to_string(),
                    // everything past the authority is opaque to us and
                    // handed to the OS verbatim
                    locator: locator.to_string(),
                }
            }
            PlatformTag::SecurityScopedBlob => {
                if id.payload().is_empty() {
                    return Err(DecodeError::MalformedId("empty blob payload".into()));
                }
                TargetIdentity::Blob(id.payload().to_vec())
            }
        };
        Ok(DecodedTarget {
            tag: id.tag(),
            identity,
        })
    }
}
