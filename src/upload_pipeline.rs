//! Upload flows: key generation, validation, bucket selection and storage.
//!
//! Every flow returns the stored key string; that key is the only handle the
//! caller keeps. Read and delete helpers take the same raw key back, route it
//! to its bucket, and validate it before touching the store.

use bytes::Bytes;
use chrono::Utc;
use serde::Deserialize;
use std::collections::HashSet;
use std::io;

use crate::archive::{self, ArchiveEntry, ArchiveLimits};
use crate::bucket::route;
use crate::config::Config;
use crate::error::{StorageError, StorageResult};
use crate::keys::{self, ArchiveBase, CodeSubmissionDir, ObjectKey, ResourceKind};
use crate::mime;
use crate::s3::{ObjectInfo, ObjectStore};

/// What to do with already-stored entries when an archive upload fails midway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RollbackPolicy {
    /// Leave them; the caller decides whether to clean up by prefix.
    KeepPartial,
    /// Remove every entry stored by the failed call.
    #[default]
    DeleteUploaded,
}

/// One file of a multi-file code submission. Entries without a name or
/// content are skipped.
#[derive(Debug, Clone, Deserialize)]
pub struct CodeFile {
    pub filename: Option<String>,
    pub content: Option<String>,
}

impl CodeFile {
    pub fn new(filename: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            filename: Some(filename.into()),
            content: Some(content.into()),
        }
    }
}

#[derive(Clone)]
pub struct UploadPipeline {
    store: ObjectStore,
    limits: ArchiveLimits,
    rollback: RollbackPolicy,
}

/// Declared type, unless it is missing or the generic octet-stream.
fn content_type_or_guess(declared: Option<&str>, filename: &str) -> String {
    match declared.map(str::trim) {
        Some(ct) if !ct.is_empty() && ct != mime::OCTET_STREAM => ct.to_string(),
        _ => mime::guess(filename).to_string(),
    }
}

impl UploadPipeline {
    pub fn new(store: ObjectStore, limits: ArchiveLimits, rollback: RollbackPolicy) -> Self {
        Self {
            store,
            limits,
            rollback,
        }
    }

    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let store = ObjectStore::from_config(cfg)?;
        Ok(Self::new(store, cfg.archive_limits, cfg.archive_rollback))
    }

    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    async fn store_object(
        &self,
        key: ObjectKey,
        data: Bytes,
        content_type: &str,
    ) -> StorageResult<String> {
        let size = data.len();
        self.store.put(&key, data, content_type).await?;
        tracing::info!(
            bucket = %key.bucket(),
            key = %key,
            size,
            content_type,
            "upload stored"
        );
        Ok(key.into_string())
    }

    /// `resources/{resourceType}/{uuid}_{filename}` in the default bucket.
    pub async fn upload_generic(
        &self,
        data: Bytes,
        content_type: Option<&str>,
        resource_type: &str,
        filename: &str,
    ) -> StorageResult<String> {
        let key = keys::generic_key(resource_type, filename)?;
        let ct = content_type_or_guess(content_type, filename);
        self.store_object(key, data, &ct).await
    }

    /// `avatars/{userId}/{timestamp}_{uuid}{ext}` in the default bucket.
    pub async fn upload_avatar(
        &self,
        user_id: &str,
        data: Bytes,
        content_type: Option<&str>,
        filename: &str,
    ) -> StorageResult<String> {
        let key = keys::avatar_key(user_id, filename, Utc::now())?;
        let ct = content_type_or_guess(content_type, filename);
        self.store_object(key, data, &ct).await
    }

    /// `{experimentId}/{resource|experiment}/{uuid}_{filename}` in the resource bucket.
    pub async fn upload_experiment_resource(
        &self,
        experiment_id: &str,
        kind: ResourceKind,
        data: Bytes,
        filename: &str,
    ) -> StorageResult<String> {
        let key = keys::experiment_resource_key(experiment_id, kind, filename)?;
        self.store_object(key, data, mime::guess(filename)).await
    }

    /// `{studentId}/{experimentId}/{taskId}/{timestamp}-{filename}` in the submission bucket.
    pub async fn upload_submission(
        &self,
        student_id: &str,
        experiment_id: &str,
        task_id: &str,
        data: Bytes,
        filename: &str,
    ) -> StorageResult<String> {
        let key = keys::submission_key(student_id, experiment_id, task_id, filename, Utc::now())?;
        self.store_object(key, data, mime::guess(filename)).await
    }

    /// Store each file under one shared timestamp directory.
    ///
    /// Files keep their relative path below that directory. Files with a
    /// missing name or content, or an unusable name, are logged and skipped.
    /// Two files resolving to the same key reject the whole request before
    /// anything is stored. The first failed upload aborts the rest; files
    /// stored before it stay in place.
    pub async fn upload_code_submission(
        &self,
        student_id: &str,
        experiment_id: &str,
        task_id: &str,
        files: &[CodeFile],
    ) -> StorageResult<Vec<String>> {
        let dir = CodeSubmissionDir::new(student_id, experiment_id, task_id, Utc::now())?;

        let mut planned: Vec<(ObjectKey, &str, &str)> = Vec::with_capacity(files.len());
        let mut seen: HashSet<String> = HashSet::new();
        for (idx, file) in files.iter().enumerate() {
            let (Some(name), Some(content)) = (file.filename.as_deref(), file.content.as_deref())
            else {
                tracing::warn!(index = idx, "code submission entry missing name or content; skipping");
                continue;
            };
            let key = match dir.key_for(name) {
                Ok(key) => key,
                Err(err) => {
                    tracing::warn!(index = idx, filename = %name, "skipping code submission entry: {}", err);
                    continue;
                }
            };
            if !seen.insert(key.as_str().to_string()) {
                return Err(StorageError::InvalidInput(format!(
                    "file `{}` appears more than once in the submission",
                    name
                )));
            }
            planned.push((key, name, content));
        }

        let mut stored = Vec::with_capacity(planned.len());
        for (key, name, content) in planned {
            let ct = mime::guess_text(name);
            let data = Bytes::copy_from_slice(content.as_bytes());
            stored.push(self.store_object(key, data, &ct).await?);
        }

        tracing::info!(
            prefix = %dir.prefix(),
            stored = stored.len(),
            skipped = files.len() - stored.len(),
            "code submission stored"
        );
        Ok(stored)
    }

    /// Expand an archive into `{experimentId}/experiment/[{taskId}/]` and keep
    /// the original under `original/`.
    ///
    /// Returns the entry keys in archive order followed by the original's key.
    /// If a later step fails after some entries were stored, the error is a
    /// [`StorageError::PartialExtractionFailure`] and the configured
    /// [`RollbackPolicy`] decides whether those entries are removed. Entries
    /// that replaced an object already stored under the same key (say, by an
    /// earlier extraction into the same base) are never removed by rollback;
    /// they are reported as `replaced` instead.
    pub async fn upload_and_extract_archive(
        &self,
        experiment_id: &str,
        task_id: Option<&str>,
        data: Bytes,
        filename: &str,
        content_type: Option<&str>,
    ) -> StorageResult<Vec<String>> {
        let base = ArchiveBase::new(experiment_id, task_id)?;
        let original_key = base.original_key(filename)?;
        let (mut entries, worker) = archive::spawn_extract(data.clone(), filename, self.limits)?;

        let mut uploaded: Vec<ObjectKey> = Vec::new();
        let mut replaced: HashSet<ObjectKey> = HashSet::new();
        let mut failure: Option<StorageError> = None;
        while let Some(entry) = entries.recv().await {
            match self.store_entry(&base, entry).await {
                Ok((key, existed)) => {
                    if existed {
                        replaced.insert(key.clone());
                    }
                    uploaded.push(key);
                }
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }
        // Unblocks the decoder if we stopped early.
        drop(entries);

        let decoded = match worker.await {
            Ok(res) => res,
            Err(join_err) => Err(io::Error::new(io::ErrorKind::Other, join_err).into()),
        };

        let result = match (failure, decoded) {
            (Some(err), _) | (None, Err(err)) => Err(err),
            (None, Ok(summary)) => {
                let ct = content_type_or_guess(content_type, filename);
                match self.store.put(&original_key, data, &ct).await {
                    Ok(()) => {
                        uploaded.push(original_key);
                        Ok(summary)
                    }
                    Err(err) => Err(err),
                }
            }
        };

        match result {
            Ok(summary) => {
                tracing::info!(
                    base = %base.prefix(),
                    entries = summary.entries,
                    bytes = summary.bytes,
                    "archive extracted"
                );
                Ok(uploaded.into_iter().map(ObjectKey::into_string).collect())
            }
            Err(err) if uploaded.is_empty() => Err(err),
            Err(err) => Err(self.fail_extraction(uploaded, replaced, err).await),
        }
    }

    /// Store one entry; the flag tells whether the key was already taken.
    async fn store_entry(
        &self,
        base: &ArchiveBase,
        entry: ArchiveEntry,
    ) -> StorageResult<(ObjectKey, bool)> {
        let key = base.entry_key(&entry.path)?;
        let existed = match self.rollback {
            RollbackPolicy::DeleteUploaded => self.store.exists(&key).await?,
            RollbackPolicy::KeepPartial => false,
        };
        self.store
            .put(&key, Bytes::from(entry.data), entry.content_type)
            .await?;
        tracing::debug!(key = %key, existed, "archive entry stored");
        Ok((key, existed))
    }

    async fn fail_extraction(
        &self,
        uploaded: Vec<ObjectKey>,
        replaced: HashSet<ObjectKey>,
        source: StorageError,
    ) -> StorageError {
        let rolled_back = match self.rollback {
            RollbackPolicy::KeepPartial => false,
            RollbackPolicy::DeleteUploaded => {
                let mut clean = true;
                for key in uploaded.iter().filter(|k| !replaced.contains(*k)) {
                    if let Err(err) = self.store.remove(key).await {
                        tracing::warn!(key = %key, "rollback delete failed: {}", err);
                        clean = false;
                    }
                }
                clean
            }
        };
        tracing::warn!(
            uploaded = uploaded.len(),
            replaced = replaced.len(),
            rolled_back,
            "archive extraction failed: {}",
            source
        );
        let mut replaced: Vec<String> = replaced.into_iter().map(ObjectKey::into_string).collect();
        replaced.sort();
        StorageError::PartialExtractionFailure {
            uploaded: uploaded.into_iter().map(ObjectKey::into_string).collect(),
            replaced,
            rolled_back,
            source: Box::new(source),
        }
    }

    pub async fn download(&self, key: &str) -> StorageResult<Bytes> {
        self.store.get(&route(key)?).await
    }

    pub async fn stat(&self, key: &str) -> StorageResult<ObjectInfo> {
        self.store.stat(&route(key)?).await
    }

    pub async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.store.exists(&route(key)?).await
    }

    pub fn preview_url(&self, key: &str) -> StorageResult<String> {
        self.store.direct_url(&route(key)?)
    }

    pub async fn delete(&self, key: &str) -> StorageResult<()> {
        let key = route(key)?;
        self.store.remove(&key).await?;
        tracing::info!(bucket = %key.bucket(), key = %key, "object deleted");
        Ok(())
    }
}
