//! Object storage gateway over the three storage buckets.
//!
//! Objects live in one of three physical buckets, picked by the
//! [`ObjectKey`] variant:
//!   default:    `avatars/...`, `resources/...`
//!   resource:   `{experimentId}/{resource|experiment}/...`
//!   submission: `{studentId}/{experimentId}/{taskId}/...`
//!
//! Two backends are supported: any S3-compatible store (MinIO, R2, AWS), and
//! a local directory tree `{root}/{bucket}/{key}` used for development and
//! tests.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use s3::bucket_ops::BucketConfiguration;
use s3::creds::Credentials;
use s3::region::Region;
use s3::Bucket;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::bucket::{BucketKind, BucketNames};
use crate::config::Config;
use crate::error::{StorageError, StorageResult};
use crate::keys::ObjectKey;
use crate::mime;
use crate::path::validate_key;

/// Metadata returned by [`ObjectStore::stat`].
#[derive(Debug, Clone, Serialize)]
pub struct ObjectInfo {
    pub key: String,
    pub bucket: String,
    pub size: u64,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

/// One rust-s3 handle per bucket class.
#[derive(Clone)]
struct S3Buckets {
    default: Box<Bucket>,
    resource: Box<Bucket>,
    submission: Box<Bucket>,
}

impl S3Buckets {
    fn get(&self, kind: BucketKind) -> &Bucket {
        match kind {
            BucketKind::Default => &self.default,
            BucketKind::Resource => &self.resource,
            BucketKind::Submission => &self.submission,
        }
    }
}

#[derive(Clone)]
enum Backend {
    S3 {
        buckets: S3Buckets,
        region: Region,
        credentials: Credentials,
        path_style: bool,
    },
    Local {
        root: PathBuf,
    },
}

/// Object storage backend for every upload flow.
#[derive(Clone)]
pub struct ObjectStore {
    backend: Backend,
    names: BucketNames,
    public_url: String,
}

fn is_success(code: u16) -> bool {
    (200..300).contains(&code)
}

fn unavailable(op: &str, bucket: &str, key: &str, code: u16) -> StorageError {
    StorageError::StorageUnavailable(format!(
        "{} {}/{} returned http {}",
        op, bucket, key, code
    ))
}

impl ObjectStore {
    /// Build an ObjectStore from environment config.
    ///
    /// An empty `STORAGE_ENDPOINT` selects the local directory backend.
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let names = cfg.bucket_names.clone();

        let Some(endpoint) = cfg.storage_endpoint_url() else {
            let root = PathBuf::from(&cfg.local_store_dir);
            let public_url = cfg
                .storage_public_url
                .clone()
                .unwrap_or_else(|| format!("file://{}", root.display()));
            return Ok(Self::local(root, names, public_url));
        };

        let region = Region::Custom {
            region: cfg.storage_region.clone(),
            endpoint: endpoint.clone(),
        };

        let credentials = if let (Some(ref access_key), Some(ref secret_key)) =
            (&cfg.storage_access_key, &cfg.storage_secret_key)
        {
            Credentials::new(Some(access_key), Some(secret_key), None, None, None)?
        } else {
            // Try to load from environment / instance metadata
            Credentials::default()?
        };

        // MinIO and most self-hosted stores only speak path-style addressing.
        let path_style = cfg.storage_path_style;
        let open = |name: &str| -> anyhow::Result<Box<Bucket>> {
            let bucket = Bucket::new(name, region.clone(), credentials.clone())?;
            Ok(if path_style {
                bucket.with_path_style()
            } else {
                bucket
            })
        };
        let buckets = S3Buckets {
            default: open(&names.default)?,
            resource: open(&names.resource)?,
            submission: open(&names.submission)?,
        };

        Ok(Self {
            backend: Backend::S3 {
                buckets,
                region,
                credentials,
                path_style,
            },
            names,
            public_url: cfg.storage_public_url.clone().unwrap_or(endpoint),
        })
    }

    /// Local directory backend rooted at `root`.
    pub fn local(root: impl Into<PathBuf>, names: BucketNames, public_url: impl Into<String>) -> Self {
        Self {
            backend: Backend::Local { root: root.into() },
            names,
            public_url: public_url.into(),
        }
    }

    pub fn bucket_names(&self) -> &BucketNames {
        &self.names
    }

    pub fn bucket_name(&self, kind: BucketKind) -> &str {
        self.names.name(kind)
    }

    pub fn is_local(&self) -> bool {
        matches!(self.backend, Backend::Local { .. })
    }

    fn local_path(root: &Path, bucket: &str, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        if key.split('/').any(|s| s == ".." || s == ".") {
            return Err(StorageError::invalid_path(key, "relative path segment"));
        }
        Ok(root.join(bucket).join(key))
    }

    /// Create any of the three buckets that does not exist yet.
    ///
    /// Runs before every write, for all buckets, so no separate provisioning
    /// step is needed.
    pub async fn ensure_buckets(&self) -> StorageResult<()> {
        match &self.backend {
            Backend::S3 {
                buckets,
                region,
                credentials,
                path_style,
            } => {
                for kind in BucketKind::ALL {
                    let bucket = buckets.get(kind);
                    if bucket.exists().await? {
                        continue;
                    }
                    let name = bucket.name();
                    let config = BucketConfiguration::default();
                    let resp = if *path_style {
                        Bucket::create_with_path_style(
                            &name,
                            region.clone(),
                            credentials.clone(),
                            config,
                        )
                        .await?
                    } else {
                        Bucket::create(&name, region.clone(), credentials.clone(), config).await?
                    };
                    if !resp.success() {
                        return Err(StorageError::StorageUnavailable(format!(
                            "creating bucket `{}` returned http {}: {}",
                            name, resp.response_code, resp.response_text
                        )));
                    }
                    tracing::info!(bucket = %name, "created bucket");
                }
                Ok(())
            }
            Backend::Local { root } => {
                for kind in BucketKind::ALL {
                    tokio::fs::create_dir_all(root.join(self.names.name(kind))).await?;
                }
                Ok(())
            }
        }
    }

    /// Store `data` under `key`. Unconditional: an existing object is replaced.
    pub async fn put(&self, key: &ObjectKey, data: Bytes, content_type: &str) -> StorageResult<()> {
        let kind = key.bucket();
        let key = key.as_str();
        validate_key(key)?;
        self.ensure_buckets().await?;

        let bucket_name = self.names.name(kind);
        match &self.backend {
            Backend::S3 { buckets, .. } => {
                let bucket = buckets.get(kind);
                let resp = bucket
                    .put_object_with_content_type(key, &data, content_type)
                    .await?;
                if !is_success(resp.status_code()) {
                    return Err(unavailable("put", bucket_name, key, resp.status_code()));
                }
            }
            Backend::Local { root } => {
                let full_path = Self::local_path(root, bucket_name, key)?;
                let parent = full_path.parent().map(Path::to_path_buf).ok_or_else(|| {
                    io::Error::new(ErrorKind::Other, "object path missing parent directory")
                })?;
                tokio::fs::create_dir_all(&parent).await?;
                let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
                if let Err(err) = tokio::fs::write(&tmp_path, &data).await {
                    let _ = tokio::fs::remove_file(&tmp_path).await;
                    return Err(err.into());
                }
                if let Err(err) = tokio::fs::rename(&tmp_path, &full_path).await {
                    let _ = tokio::fs::remove_file(&tmp_path).await;
                    return Err(err.into());
                }
            }
        }

        tracing::debug!(bucket = %bucket_name, key = %key, bytes = data.len(), "stored object");
        Ok(())
    }

    /// Fetch the full contents of `key`.
    pub async fn get(&self, key: &ObjectKey) -> StorageResult<Bytes> {
        let kind = key.bucket();
        let key = key.as_str();
        validate_key(key)?;

        let bucket_name = self.names.name(kind);
        let not_found = || StorageError::NotFound {
            bucket: bucket_name.to_string(),
            key: key.to_string(),
        };
        match &self.backend {
            Backend::S3 { buckets, .. } => {
                let bucket = buckets.get(kind);
                let resp = bucket.get_object(key).await?;
                match resp.status_code() {
                    code if is_success(code) => Ok(Bytes::from(resp.to_vec())),
                    404 => Err(not_found()),
                    code => Err(unavailable("get", bucket_name, key, code)),
                }
            }
            Backend::Local { root } => {
                let full_path = Self::local_path(root, bucket_name, key)?;
                match tokio::fs::read(&full_path).await {
                    Ok(bytes) => Ok(Bytes::from(bytes)),
                    Err(err) if err.kind() == ErrorKind::NotFound => Err(not_found()),
                    Err(err) => Err(err.into()),
                }
            }
        }
    }

    /// Remove `key`. Removing a missing object is not an error.
    pub async fn remove(&self, key: &ObjectKey) -> StorageResult<()> {
        self.remove_in(key.bucket(), key.as_str()).await
    }

    /// Remove a raw key from an explicit bucket (used by prefix cleanup,
    /// where listed keys need not follow the canonical shapes).
    pub(crate) async fn remove_in(&self, kind: BucketKind, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        let bucket_name = self.names.name(kind);
        match &self.backend {
            Backend::S3 { buckets, .. } => {
                let bucket = buckets.get(kind);
                let resp = bucket.delete_object(key).await?;
                let code = resp.status_code();
                if !is_success(code) && code != 404 {
                    return Err(unavailable("delete", bucket_name, key, code));
                }
            }
            Backend::Local { root } => {
                let full_path = Self::local_path(root, bucket_name, key)?;
                match tokio::fs::remove_file(&full_path).await {
                    Ok(_) => {}
                    Err(err) if err.kind() == ErrorKind::NotFound => {
                        tracing::debug!("file {} already missing", full_path.display());
                    }
                    Err(err) => return Err(err.into()),
                }
                if let Some(parent) = full_path.parent() {
                    prune_empty_dirs(parent, &root.join(bucket_name)).await;
                }
            }
        }
        tracing::debug!(bucket = %bucket_name, key = %key, "removed object");
        Ok(())
    }

    /// Every key in `kind` starting with `prefix`, recursively, sorted.
    pub async fn list(&self, kind: BucketKind, prefix: &str) -> StorageResult<Vec<String>> {
        if !prefix.is_empty() {
            validate_key(prefix)?;
        }
        let bucket_name = self.names.name(kind);
        match &self.backend {
            Backend::S3 { buckets, .. } => {
                let bucket = buckets.get(kind);
                let pages = bucket.list(prefix.to_string(), None).await?;
                let mut keys: Vec<String> = pages
                    .into_iter()
                    .flat_map(|page| page.contents)
                    .map(|obj| obj.key)
                    .collect();
                keys.sort();
                Ok(keys)
            }
            Backend::Local { root } => {
                let bucket_root = root.join(bucket_name);
                let prefix = prefix.to_string();
                tokio::task::spawn_blocking(move || list_local_blocking(&bucket_root, &prefix))
                    .await
                    .map_err(|e| io::Error::new(ErrorKind::Other, e))?
            }
        }
    }

    /// Size and content metadata for `key`.
    pub async fn stat(&self, key: &ObjectKey) -> StorageResult<ObjectInfo> {
        let kind = key.bucket();
        let key = key.as_str();
        validate_key(key)?;

        let bucket_name = self.names.name(kind);
        let not_found = || StorageError::NotFound {
            bucket: bucket_name.to_string(),
            key: key.to_string(),
        };
        match &self.backend {
            Backend::S3 { buckets, .. } => {
                let bucket = buckets.get(kind);
                let (head, code) = bucket.head_object(key).await?;
                match code {
                    code if is_success(code) => Ok(ObjectInfo {
                        key: key.to_string(),
                        bucket: bucket_name.to_string(),
                        size: head.content_length.unwrap_or(0).max(0) as u64,
                        content_type: head.content_type,
                        etag: head.e_tag.map(|e| e.trim_matches('"').to_string()),
                        last_modified: head.last_modified,
                    }),
                    404 => Err(not_found()),
                    code => Err(unavailable("head", bucket_name, key, code)),
                }
            }
            Backend::Local { root } => {
                let full_path = Self::local_path(root, bucket_name, key)?;
                let meta = match tokio::fs::metadata(&full_path).await {
                    Ok(meta) if meta.is_file() => meta,
                    Ok(_) => return Err(not_found()),
                    Err(err) if err.kind() == ErrorKind::NotFound => return Err(not_found()),
                    Err(err) => return Err(err.into()),
                };
                let data = tokio::fs::read(&full_path).await?;
                let last_modified = meta
                    .modified()
                    .ok()
                    .map(|m| DateTime::<Utc>::from(m).to_rfc3339());
                Ok(ObjectInfo {
                    key: key.to_string(),
                    bucket: bucket_name.to_string(),
                    size: meta.len(),
                    content_type: Some(mime::guess(key).to_string()),
                    etag: Some(hex::encode(Sha256::digest(&data))),
                    last_modified,
                })
            }
        }
    }

    pub async fn exists(&self, key: &ObjectKey) -> StorageResult<bool> {
        match self.stat(key).await {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Plain, unsigned link: `{public_url}/{bucket}/{key}`.
    pub fn direct_url(&self, key: &ObjectKey) -> StorageResult<String> {
        validate_key(key.as_str())?;
        Ok(format!(
            "{}/{}/{}",
            self.public_url.trim_end_matches('/'),
            self.names.name(key.bucket()),
            key.as_str()
        ))
    }
}

/// Walk a local bucket directory and collect keys under `prefix`.
fn list_local_blocking(bucket_root: &Path, prefix: &str) -> StorageResult<Vec<String>> {
    fn recurse_dir(dir: &Path, rel: &str, prefix: &str, out: &mut Vec<String>) -> io::Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let key = if rel.is_empty() {
                name.clone()
            } else {
                format!("{}/{}", rel, name)
            };
            let meta = entry.metadata()?;
            if meta.is_dir() {
                // Only descend where the prefix can still match.
                let dir_key = format!("{}/", key);
                if dir_key.starts_with(prefix) || prefix.starts_with(&dir_key) {
                    recurse_dir(&entry.path(), &key, prefix, out)?;
                }
            } else if meta.is_file() && !name.starts_with(".tmp-") && key.starts_with(prefix) {
                out.push(key);
            }
        }
        Ok(())
    }

    let mut keys = Vec::new();
    if !bucket_root.exists() {
        return Ok(keys);
    }
    recurse_dir(bucket_root, "", prefix, &mut keys)?;
    keys.sort();
    Ok(keys)
}

/// Remove empty directories from `start` up to (not including) `stop`.
async fn prune_empty_dirs(start: &Path, stop: &Path) {
    let mut current = start.to_path_buf();
    while current.starts_with(stop) && current != stop {
        match tokio::fs::remove_dir(&current).await {
            Ok(_) => match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => break,
            },
            Err(err) if err.kind() == ErrorKind::NotFound => break,
            Err(_) => break,
        }
    }
}
