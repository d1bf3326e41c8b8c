//! Archive decoding for auto-extracted uploads.
//!
//! Supported: `.zip`, `.tar`, `.tar.gz` / `.tgz`, and single-file `.gz`.
//! Decoding is synchronous and runs on the blocking pool; entries are pushed
//! one at a time over a bounded channel so the async uploader only ever holds
//! a single decompressed entry.
//!
//! Directory entries are skipped. Entry paths are normalized (`\` to `/`,
//! leading `./` removed) and must be relative, traversal-free paths. Within
//! one archive a path may appear once and may not be both a file and a
//! directory.

use bytes::Bytes;
use flate2::read::GzDecoder;
use std::collections::HashSet;
use std::io::{self, Cursor, Read};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{StorageError, StorageResult};
use crate::keys::file_name;
use crate::mime;
use crate::path::normalize_relative_path;

const ENTRY_CHANNEL_DEPTH: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    Tar,
    TarGz,
    Gzip,
}

impl ArchiveFormat {
    /// Pick a decoder from the file name suffix (case-insensitive).
    pub fn detect(filename: &str) -> StorageResult<Self> {
        let lower = filename.trim().to_ascii_lowercase();
        if lower.ends_with(".zip") {
            Ok(ArchiveFormat::Zip)
        } else if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Ok(ArchiveFormat::TarGz)
        } else if lower.ends_with(".tar") {
            Ok(ArchiveFormat::Tar)
        } else if lower.ends_with(".gz") {
            Ok(ArchiveFormat::Gzip)
        } else {
            Err(StorageError::UnsupportedFormat(filename.to_string()))
        }
    }
}

/// Caps enforced while decoding; exceeding any of them fails with
/// [`StorageError::ArchiveTooLarge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveLimits {
    pub max_entries: usize,
    pub max_total_bytes: u64,
    pub max_entry_bytes: u64,
}

impl Default for ArchiveLimits {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            max_total_bytes: 1024 * 1024 * 1024,
            max_entry_bytes: 256 * 1024 * 1024,
        }
    }
}

/// One decoded file from an archive.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    /// Path relative to the archive root, `/`-separated.
    pub path: String,
    pub content_type: &'static str,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub entries: usize,
    pub bytes: u64,
}

/// Entry paths admitted so far. A directory tree cannot hold both `a` and
/// `a/b`, and a repeated path would hand back the same key twice, so both
/// are rejected.
#[derive(Default)]
struct SeenPaths {
    files: HashSet<String>,
    dirs: HashSet<String>,
}

impl SeenPaths {
    fn admit(&mut self, path: &str) -> StorageResult<()> {
        if self.files.contains(path) {
            return Err(StorageError::invalid_path(path, "duplicate archive entry"));
        }
        if self.dirs.contains(path) {
            return Err(StorageError::invalid_path(
                path,
                "archive entry is also used as a directory",
            ));
        }
        let parents: Vec<&str> = path.match_indices('/').map(|(i, _)| &path[..i]).collect();
        if parents.iter().any(|p| self.files.contains(*p)) {
            return Err(StorageError::invalid_path(
                path,
                "archive entry is nested under a file entry",
            ));
        }
        self.dirs.extend(parents.into_iter().map(str::to_string));
        self.files.insert(path.to_string());
        Ok(())
    }
}

/// Running totals checked against [`ArchiveLimits`].
struct Budget {
    limits: ArchiveLimits,
    summary: ExtractSummary,
    seen: SeenPaths,
}

impl Budget {
    fn new(limits: ArchiveLimits) -> Self {
        Self {
            limits,
            summary: ExtractSummary::default(),
            seen: SeenPaths::default(),
        }
    }

    fn admit_entry(&mut self, path: &str) -> StorageResult<()> {
        if self.summary.entries >= self.limits.max_entries {
            return Err(StorageError::ArchiveTooLarge(format!(
                "more than {} entries (at `{}`)",
                self.limits.max_entries, path
            )));
        }
        self.seen.admit(path)?;
        self.summary.entries += 1;
        Ok(())
    }

    /// Read one entry, never pulling more than the remaining budget plus one byte.
    fn read<R: Read>(&mut self, reader: R, path: &str) -> StorageResult<Vec<u8>> {
        let remaining_total = self.limits.max_total_bytes.saturating_sub(self.summary.bytes);
        let cap = self.limits.max_entry_bytes.min(remaining_total);

        let mut data = Vec::new();
        reader
            .take(cap.saturating_add(1))
            .read_to_end(&mut data)
            .map_err(|e| corrupt(path, e))?;

        let len = data.len() as u64;
        if len > cap {
            let reason = if cap == self.limits.max_entry_bytes {
                format!(
                    "entry `{}` exceeds {} bytes",
                    path, self.limits.max_entry_bytes
                )
            } else {
                format!(
                    "total decompressed size exceeds {} bytes",
                    self.limits.max_total_bytes
                )
            };
            return Err(StorageError::ArchiveTooLarge(reason));
        }
        self.summary.bytes += len;
        Ok(data)
    }
}

fn corrupt(context: &str, err: impl std::fmt::Display) -> StorageError {
    StorageError::CorruptArchive(format!("{}: {}", context, err))
}

/// Decode `data` and hand every file entry to `sink`, in archive order.
pub fn extract_with<F>(
    data: &[u8],
    format: ArchiveFormat,
    filename: &str,
    limits: ArchiveLimits,
    mut sink: F,
) -> StorageResult<ExtractSummary>
where
    F: FnMut(ArchiveEntry) -> StorageResult<()>,
{
    let mut budget = Budget::new(limits);
    match format {
        ArchiveFormat::Zip => extract_zip(data, &mut budget, &mut sink)?,
        ArchiveFormat::Tar => extract_tar(data, &mut budget, &mut sink)?,
        ArchiveFormat::TarGz => extract_tar(GzDecoder::new(data), &mut budget, &mut sink)?,
        ArchiveFormat::Gzip => {
            let name = file_name(filename)?;
            let stripped = if name.to_ascii_lowercase().ends_with(".gz") {
                &name[..name.len() - 3]
            } else {
                name
            };
            let path = normalize_relative_path(stripped)?
                .ok_or_else(|| StorageError::invalid_path(stripped, "invalid gzip entry name"))?;
            budget.admit_entry(&path)?;
            let bytes = budget.read(GzDecoder::new(data), &path)?;
            sink(ArchiveEntry {
                content_type: mime::guess(&path),
                path,
                data: bytes,
            })?;
        }
    }
    Ok(budget.summary)
}

fn extract_zip<F>(data: &[u8], budget: &mut Budget, sink: &mut F) -> StorageResult<()>
where
    F: FnMut(ArchiveEntry) -> StorageResult<()>,
{
    let mut archive =
        zip::ZipArchive::new(Cursor::new(data)).map_err(|e| corrupt("zip", e))?;

    // Declared sizes come from the central directory and are cheap to read;
    // reject obvious bombs before anything is inflated.
    let mut declared_files = 0usize;
    let mut declared_bytes = 0u64;
    for i in 0..archive.len() {
        let file = archive.by_index_raw(i).map_err(|e| corrupt("zip", e))?;
        if file.is_dir() {
            continue;
        }
        declared_files += 1;
        declared_bytes = declared_bytes.saturating_add(file.size());
    }
    if declared_files > budget.limits.max_entries {
        return Err(StorageError::ArchiveTooLarge(format!(
            "{} entries declared, limit is {}",
            declared_files, budget.limits.max_entries
        )));
    }
    if declared_bytes > budget.limits.max_total_bytes {
        return Err(StorageError::ArchiveTooLarge(format!(
            "{} bytes declared, limit is {}",
            declared_bytes, budget.limits.max_total_bytes
        )));
    }

    for i in 0..archive.len() {
        let entry = {
            let mut file = archive.by_index(i).map_err(|e| corrupt("zip", e))?;
            if file.is_dir() {
                continue;
            }
            let Some(path) = normalize_relative_path(file.name())? else {
                continue;
            };
            budget.admit_entry(&path)?;
            let bytes = budget.read(&mut file, &path)?;
            ArchiveEntry {
                content_type: mime::guess(&path),
                path,
                data: bytes,
            }
        };
        sink(entry)?;
    }
    Ok(())
}

fn extract_tar<R, F>(reader: R, budget: &mut Budget, sink: &mut F) -> StorageResult<()>
where
    R: Read,
    F: FnMut(ArchiveEntry) -> StorageResult<()>,
{
    let mut archive = tar::Archive::new(reader);
    for entry in archive.entries().map_err(|e| corrupt("tar", e))? {
        let mut entry = entry.map_err(|e| corrupt("tar", e))?;
        // Directories, links and special files are never stored.
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let raw = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        let Some(path) = normalize_relative_path(&raw)? else {
            continue;
        };
        budget.admit_entry(&path)?;
        let bytes = budget.read(&mut entry, &path)?;
        sink(ArchiveEntry {
            content_type: mime::guess(&path),
            path,
            data: bytes,
        })?;
    }
    Ok(())
}

/// Decode everything into memory. Convenient for small archives and tests;
/// uploads go through [`spawn_extract`] instead.
pub fn extract_all(
    data: &[u8],
    filename: &str,
    limits: ArchiveLimits,
) -> StorageResult<Vec<ArchiveEntry>> {
    let format = ArchiveFormat::detect(filename)?;
    let mut entries = Vec::new();
    extract_with(data, format, filename, limits, |entry| {
        entries.push(entry);
        Ok(())
    })?;
    Ok(entries)
}

/// Start decoding on the blocking pool.
///
/// The format is checked up front so unsupported archives fail before any
/// work is scheduled. Entries arrive on the returned receiver; the join handle
/// yields the final summary or the first decode error. Dropping the receiver
/// stops the worker at its next entry.
pub fn spawn_extract(
    data: Bytes,
    filename: &str,
    limits: ArchiveLimits,
) -> StorageResult<(
    mpsc::Receiver<ArchiveEntry>,
    JoinHandle<StorageResult<ExtractSummary>>,
)> {
    let format = ArchiveFormat::detect(filename)?;
    let filename = filename.to_string();
    let (tx, rx) = mpsc::channel(ENTRY_CHANNEL_DEPTH);

    let handle = tokio::task::spawn_blocking(move || {
        extract_with(&data, format, &filename, limits, |entry| {
            tx.blocking_send(entry).map_err(|_| {
                StorageError::Io(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "archive entry receiver dropped",
                ))
            })
        })
    });

    Ok((rx, handle))
}
