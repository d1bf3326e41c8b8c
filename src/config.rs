use std::env;

use crate::archive::ArchiveLimits;
use crate::bucket::BucketNames;
use crate::upload_pipeline::RollbackPolicy;

#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub max_body_bytes: usize,
    // S3-compatible object storage
    pub storage_endpoint: Option<String>, // MinIO / R2 / etc. Empty => local store
    pub storage_region: String,
    pub storage_access_key: Option<String>,
    pub storage_secret_key: Option<String>,
    pub storage_use_tls: bool,
    pub storage_path_style: bool,
    /// Base for direct object links. Defaults to the endpoint (or `file://` root).
    pub storage_public_url: Option<String>,
    pub bucket_names: BucketNames,
    // Local object storage fallback (used when STORAGE_ENDPOINT is empty)
    pub local_store_dir: String,
    // Archive extraction
    pub archive_limits: ArchiveLimits,
    pub archive_rollback: RollbackPolicy,
    // CORS
    pub cors_allow_origins: Vec<String>,
    /// Explicitly opt-in to permissive CORS (for development only).
    pub cors_permissive_dev: bool,
}

fn parse_bool_env(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "y" | "on" => true,
            "0" | "false" | "no" | "n" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
    pub fn from_env() -> Self {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = parse_env("PORT", 3002u16);
        let max_body_bytes = parse_env("MAX_BODY_BYTES", 64 * 1024 * 1024usize);

        let storage_endpoint = non_empty_env("STORAGE_ENDPOINT");
        let storage_region =
            env::var("STORAGE_REGION").unwrap_or_else(|_| "us-east-1".to_string());
        let storage_access_key = non_empty_env("STORAGE_ACCESS_KEY");
        let storage_secret_key = non_empty_env("STORAGE_SECRET_KEY");
        let storage_use_tls = parse_bool_env("STORAGE_USE_TLS", false);
        let storage_path_style = parse_bool_env("STORAGE_PATH_STYLE", true);
        let storage_public_url = non_empty_env("STORAGE_PUBLIC_URL");

        let defaults = BucketNames::default();
        let bucket_names = BucketNames {
            default: non_empty_env("STORAGE_DEFAULT_BUCKET").unwrap_or(defaults.default),
            resource: non_empty_env("STORAGE_RESOURCE_BUCKET").unwrap_or(defaults.resource),
            submission: non_empty_env("STORAGE_SUBMISSION_BUCKET")
                .unwrap_or(defaults.submission),
        };

        let local_store_dir =
            env::var("LOCAL_STORE_DIR").unwrap_or_else(|_| "./data/object_store".to_string());

        let limits = ArchiveLimits::default();
        let archive_limits = ArchiveLimits {
            max_entries: parse_env("ARCHIVE_MAX_ENTRIES", limits.max_entries).max(1),
            max_total_bytes: parse_env("ARCHIVE_MAX_TOTAL_BYTES", limits.max_total_bytes).max(1),
            max_entry_bytes: parse_env("ARCHIVE_MAX_ENTRY_BYTES", limits.max_entry_bytes).max(1),
        };
        // Partial extractions are cleaned up unless explicitly disabled.
        let archive_rollback = if parse_bool_env("ARCHIVE_ROLLBACK_ON_ERROR", true) {
            RollbackPolicy::DeleteUploaded
        } else {
            RollbackPolicy::KeepPartial
        };

        // Comma-separated list of allowed origins.
        let cors_allow_origins = env::var("CORS_ALLOW_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        let cors_permissive_dev = parse_bool_env("CORS_PERMISSIVE_DEV", false);

        Self {
            host,
            port,
            max_body_bytes,
            storage_endpoint,
            storage_region,
            storage_access_key,
            storage_secret_key,
            storage_use_tls,
            storage_path_style,
            storage_public_url,
            bucket_names,
            local_store_dir,
            archive_limits,
            archive_rollback,
            cors_allow_origins,
            cors_permissive_dev,
        }
    }

    /// Endpoint with a scheme, or `None` for the local store.
    ///
    /// A bare `host:port` gets `https://` or `http://` depending on
    /// `STORAGE_USE_TLS`.
    pub fn storage_endpoint_url(&self) -> Option<String> {
        let endpoint = self.storage_endpoint.as_deref()?.trim_end_matches('/');
        if endpoint.contains("://") {
            Some(endpoint.to_string())
        } else if self.storage_use_tls {
            Some(format!("https://{}", endpoint))
        } else {
            Some(format!("http://{}", endpoint))
        }
    }
}
