//! Object key generation.
//!
//! Each upload flow has its own key shape; see the module docs of
//! [`crate::bucket`] for how shapes map to buckets. Keys are never reused:
//! single-file flows embed a UUIDv4 and submissions embed a second-resolution
//! timestamp (`yyyyMMdd-HHmmss`, UTC).

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::bucket::{BucketKind, AVATAR_ROOT, GENERIC_ROOT};
use crate::error::{StorageError, StorageResult};
use crate::path::{normalize_relative_path, validate_key, validate_segment};

const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// A validated object key tagged with the storage class it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ObjectKey {
    Avatar(String),
    Resource(String),
    Submission(String),
    Generic(String),
}

impl ObjectKey {
    pub fn bucket(&self) -> BucketKind {
        match self {
            ObjectKey::Avatar(_) | ObjectKey::Generic(_) => BucketKind::Default,
            ObjectKey::Resource(_) => BucketKind::Resource,
            ObjectKey::Submission(_) => BucketKind::Submission,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ObjectKey::Avatar(k)
            | ObjectKey::Resource(k)
            | ObjectKey::Submission(k)
            | ObjectKey::Generic(k) => k,
        }
    }

    pub fn into_string(self) -> String {
        match self {
            ObjectKey::Avatar(k)
            | ObjectKey::Resource(k)
            | ObjectKey::Submission(k)
            | ObjectKey::Generic(k) => k,
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Second path segment of an experiment resource key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// Learning material.
    Resource,
    /// Code and script material.
    Experiment,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Resource => "resource",
            ResourceKind::Experiment => "experiment",
        }
    }
}

impl FromStr for ResourceKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "resource" => Ok(ResourceKind::Resource),
            "experiment" => Ok(ResourceKind::Experiment),
            other => Err(StorageError::InvalidInput(format!(
                "resource type must be `resource` or `experiment`, got `{}`",
                other
            ))),
        }
    }
}

pub fn timestamp(now: DateTime<Utc>) -> String {
    now.format(TIMESTAMP_FORMAT).to_string()
}

/// Final path component of a client-supplied file name.
pub fn file_name(raw: &str) -> StorageResult<&str> {
    let name = raw.rsplit(&['/', '\\'][..]).next().unwrap_or(raw).trim();
    if name.is_empty() || name == "." || name == ".." {
        return Err(StorageError::InvalidInput(format!(
            "`{}` has no usable file name",
            raw
        )));
    }
    Ok(name)
}

/// Extension including the leading dot, or empty.
fn extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(0) | None => "",
        Some(idx) => &name[idx..],
    }
}

/// First segment of resource and submission keys must not shadow the
/// reserved default-bucket roots.
fn ensure_not_root(name: &'static str, value: &str) -> StorageResult<()> {
    if value == AVATAR_ROOT || value == GENERIC_ROOT {
        return Err(StorageError::InvalidInput(format!(
            "{} `{}` is reserved",
            name, value
        )));
    }
    Ok(())
}

fn checked(key: String) -> StorageResult<String> {
    validate_key(&key)?;
    Ok(key)
}

/// `avatars/{userId}/{timestamp}_{uuid}{ext}`
pub fn avatar_key(user_id: &str, filename: &str, now: DateTime<Utc>) -> StorageResult<ObjectKey> {
    validate_segment("user id", user_id)?;
    let ext = extension(file_name(filename)?);
    let key = format!(
        "{}/{}/{}_{}{}",
        AVATAR_ROOT,
        user_id,
        timestamp(now),
        Uuid::new_v4(),
        ext
    );
    Ok(ObjectKey::Avatar(checked(key)?))
}

/// `{experimentId}/{resource|experiment}/{uuid}_{filename}`
pub fn experiment_resource_key(
    experiment_id: &str,
    kind: ResourceKind,
    filename: &str,
) -> StorageResult<ObjectKey> {
    validate_segment("experiment id", experiment_id)?;
    ensure_not_root("experiment id", experiment_id)?;
    let key = format!(
        "{}/{}/{}_{}",
        experiment_id,
        kind.as_str(),
        Uuid::new_v4(),
        file_name(filename)?
    );
    Ok(ObjectKey::Resource(checked(key)?))
}

fn submission_prefix(student_id: &str, experiment_id: &str, task_id: &str) -> StorageResult<String> {
    validate_segment("student id", student_id)?;
    validate_segment("experiment id", experiment_id)?;
    validate_segment("task id", task_id)?;
    ensure_not_root("student id", student_id)?;
    if matches!(experiment_id, "resource" | "experiment") {
        return Err(StorageError::InvalidInput(format!(
            "experiment id `{}` is reserved",
            experiment_id
        )));
    }
    Ok(format!("{}/{}/{}/", student_id, experiment_id, task_id))
}

/// `{studentId}/{experimentId}/{taskId}/{timestamp}-{filename}`
pub fn submission_key(
    student_id: &str,
    experiment_id: &str,
    task_id: &str,
    filename: &str,
    now: DateTime<Utc>,
) -> StorageResult<ObjectKey> {
    let prefix = submission_prefix(student_id, experiment_id, task_id)?;
    let key = format!("{}{}-{}", prefix, timestamp(now), file_name(filename)?);
    Ok(ObjectKey::Submission(checked(key)?))
}

/// Shared timestamp directory for one multi-file code submission.
#[derive(Debug, Clone)]
pub struct CodeSubmissionDir {
    prefix: String,
}

impl CodeSubmissionDir {
    pub fn new(
        student_id: &str,
        experiment_id: &str,
        task_id: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<Self> {
        let prefix = submission_prefix(student_id, experiment_id, task_id)?;
        Ok(Self {
            prefix: format!("{}{}/", prefix, timestamp(now)),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// `{studentId}/{experimentId}/{taskId}/{timestamp}/{relativePath}`
    ///
    /// The client's relative path is kept, so `src/Main.java` and
    /// `test/Main.java` land on different keys.
    pub fn key_for(&self, filename: &str) -> StorageResult<ObjectKey> {
        let relative = normalize_relative_path(filename.trim())?.ok_or_else(|| {
            StorageError::InvalidInput(format!("`{}` has no usable file name", filename))
        })?;
        let key = format!("{}{}", self.prefix, relative);
        Ok(ObjectKey::Submission(checked(key)?))
    }
}

/// Base path for the entries of one extracted archive:
/// `{experimentId}/experiment/[{taskId}/]`.
#[derive(Debug, Clone)]
pub struct ArchiveBase {
    prefix: String,
}

impl ArchiveBase {
    pub fn new(experiment_id: &str, task_id: Option<&str>) -> StorageResult<Self> {
        validate_segment("experiment id", experiment_id)?;
        ensure_not_root("experiment id", experiment_id)?;
        let mut prefix = format!("{}/{}/", experiment_id, ResourceKind::Experiment.as_str());
        if let Some(task_id) = task_id {
            validate_segment("task id", task_id)?;
            prefix.push_str(task_id);
            prefix.push('/');
        }
        Ok(Self { prefix })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Key for an entry at `relative_path` inside the archive.
    pub fn entry_key(&self, relative_path: &str) -> StorageResult<ObjectKey> {
        let key = format!("{}{}", self.prefix, relative_path);
        Ok(ObjectKey::Resource(checked(key)?))
    }

    /// Key for the unmodified source archive: `{base}original/{uuid}_{filename}`.
    pub fn original_key(&self, filename: &str) -> StorageResult<ObjectKey> {
        let key = format!(
            "{}original/{}_{}",
            self.prefix,
            Uuid::new_v4(),
            file_name(filename)?
        );
        Ok(ObjectKey::Resource(checked(key)?))
    }
}

/// `resources/{resourceType}/{uuid}_{filename}`
pub fn generic_key(resource_type: &str, filename: &str) -> StorageResult<ObjectKey> {
    validate_segment("resource type", resource_type)?;
    let key = format!(
        "{}/{}/{}_{}",
        GENERIC_ROOT,
        resource_type,
        Uuid::new_v4(),
        file_name(filename)?
    );
    Ok(ObjectKey::Generic(checked(key)?))
}
