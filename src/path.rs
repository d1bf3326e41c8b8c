//! Object key validation.
//!
//! Every key that reaches the object store passes through [`validate_key`],
//! whether it was minted by the key generator or handed back by a caller.

use crate::error::{StorageError, StorageResult};

/// Reject empty, traversal-bearing, or absolute keys.
///
/// Rules are checked in order: blank, `../` / `..\` anywhere, then a leading
/// `/` or `\`. Nothing else is restricted, so unicode file names pass through
/// untouched.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.trim().is_empty() {
        return Err(StorageError::invalid_path(key, "key is empty"));
    }
    if key.contains("../") || key.contains("..\\") {
        return Err(StorageError::invalid_path(key, "path traversal"));
    }
    if key.starts_with('/') || key.starts_with('\\') {
        return Err(StorageError::invalid_path(key, "absolute path"));
    }
    Ok(())
}

/// Same rules as [`validate_key`], applied to a bulk-delete prefix.
///
/// A prefix must also end at a segment boundary so `s1/e1/t1/` never
/// matches `s1/e1/t10/...`.
pub fn validate_prefix(prefix: &str) -> StorageResult<()> {
    validate_key(prefix)?;
    if !prefix.ends_with('/') {
        return Err(StorageError::invalid_path(
            prefix,
            "prefix must end with `/`",
        ));
    }
    Ok(())
}

/// Normalize a client- or archive-supplied relative path: `\` becomes `/`
/// and leading `./` is dropped. The result must be a traversal-free relative
/// path with no empty, `.` or `..` segments.
///
/// `Ok(None)` means the path names a directory (empty or trailing `/`).
pub fn normalize_relative_path(raw: &str) -> StorageResult<Option<String>> {
    let replaced = raw.replace('\\', "/");
    let mut path = replaced.as_str();
    while let Some(rest) = path.strip_prefix("./") {
        path = rest;
    }
    if path.is_empty() || path == "." || path.ends_with('/') {
        return Ok(None);
    }
    validate_key(path)?;
    if path.split('/').any(|s| s.is_empty() || s == "." || s == "..") {
        return Err(StorageError::invalid_path(raw, "invalid relative path"));
    }
    Ok(Some(path.to_string()))
}

/// Check that a business coordinate can be used as exactly one key segment.
pub(crate) fn validate_segment(name: &'static str, value: &str) -> StorageResult<()> {
    let v = value.trim();
    if v.is_empty() {
        return Err(StorageError::InvalidInput(format!("{} is empty", name)));
    }
    if v != value || v == "." || v == ".." || v.contains('/') || v.contains('\\') {
        return Err(StorageError::InvalidInput(format!(
            "{} `{}` is not a single path segment",
            name, value
        )));
    }
    Ok(())
}
