//! Bucket classes and key-to-bucket routing.
//!
//! Keys minted by [`crate::keys`] already carry their [`ObjectKey`] variant.
//! Raw strings handed back by callers (downloads, deletes, previews) are
//! classified by [`route`], which recognizes only the canonical key shapes:
//!
//! - `avatars/{userId}/{file}` -> default
//! - `resources/{resourceType}/{file}` -> default
//! - `{experimentId}/{resource|experiment}/...` -> resource
//! - `{studentId}/{experimentId}/{taskId}/...` -> submission
//!
//! Anything else is rejected instead of falling back to a default bucket.

use std::fmt;

use crate::error::{StorageError, StorageResult};
use crate::keys::ObjectKey;
use crate::path::validate_key;

pub const AVATAR_ROOT: &str = "avatars";
pub const GENERIC_ROOT: &str = "resources";

/// Logical storage class; each one lives in its own physical bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BucketKind {
    /// Generic resources and user avatars.
    Default,
    /// Experiment and task material, including extracted archives.
    Resource,
    /// Student task submissions.
    Submission,
}

impl BucketKind {
    pub const ALL: [BucketKind; 3] = [
        BucketKind::Default,
        BucketKind::Resource,
        BucketKind::Submission,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BucketKind::Default => "default",
            BucketKind::Resource => "resource",
            BucketKind::Submission => "submission",
        }
    }
}

impl fmt::Display for BucketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Physical bucket names, one per [`BucketKind`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BucketNames {
    pub default: String,
    pub resource: String,
    pub submission: String,
}

impl Default for BucketNames {
    fn default() -> Self {
        Self {
            default: BucketKind::Default.as_str().to_string(),
            resource: BucketKind::Resource.as_str().to_string(),
            submission: BucketKind::Submission.as_str().to_string(),
        }
    }
}

impl BucketNames {
    pub fn name(&self, kind: BucketKind) -> &str {
        match kind {
            BucketKind::Default => &self.default,
            BucketKind::Resource => &self.resource,
            BucketKind::Submission => &self.submission,
        }
    }
}

/// Classify a raw key string into its typed variant.
///
/// Validates the key first, so every read path gets traversal checks for free.
pub fn route(raw: &str) -> StorageResult<ObjectKey> {
    validate_key(raw)?;

    let segments: Vec<&str> = raw.split('/').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(StorageError::invalid_path(raw, "empty path segment"));
    }

    let n = segments.len();
    let key = raw.to_string();
    if n >= 3 && segments[0] == AVATAR_ROOT {
        return Ok(ObjectKey::Avatar(key));
    }
    if n >= 3 && segments[0] == GENERIC_ROOT {
        return Ok(ObjectKey::Generic(key));
    }
    if n >= 3 && matches!(segments[1], "resource" | "experiment") {
        return Ok(ObjectKey::Resource(key));
    }
    if n >= 4 {
        return Ok(ObjectKey::Submission(key));
    }

    Err(StorageError::invalid_path(raw, "unrecognized key shape"))
}

/// Convenience wrapper: the bucket class a raw key belongs to.
pub fn bucket_for(raw: &str) -> StorageResult<BucketKind> {
    route(raw).map(|k| k.bucket())
}
