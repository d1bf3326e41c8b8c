#![allow(dead_code)]

use experiment_storage::archive::ArchiveLimits;
use experiment_storage::bucket::BucketNames;
use experiment_storage::s3::ObjectStore;
use experiment_storage::upload_pipeline::{RollbackPolicy, UploadPipeline};
use flate2::{write::GzEncoder, Compression};
use std::io::{Cursor, Write};
use tempfile::TempDir;

pub const PUBLIC_URL: &str = "http://files.test";

pub fn local_store(dir: &TempDir) -> ObjectStore {
    ObjectStore::local(dir.path(), BucketNames::default(), PUBLIC_URL)
}

pub fn local_pipeline() -> (TempDir, UploadPipeline) {
    pipeline_with(ArchiveLimits::default(), RollbackPolicy::DeleteUploaded)
}

pub fn pipeline_with(limits: ArchiveLimits, rollback: RollbackPolicy) -> (TempDir, UploadPipeline) {
    let dir = tempfile::tempdir().unwrap();
    let store = local_store(&dir);
    (dir, UploadPipeline::new(store, limits, rollback))
}

pub enum ZipItem<'a> {
    File(&'a str, &'a [u8]),
    Dir(&'a str),
}

pub fn zip_bytes(items: &[ZipItem<'_>]) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    {
        let mut zw = zip::ZipWriter::new(&mut buf);
        let opts = zip::write::SimpleFileOptions::default();
        for item in items {
            match item {
                ZipItem::File(name, data) => {
                    zw.start_file(*name, opts).unwrap();
                    zw.write_all(data).unwrap();
                }
                ZipItem::Dir(name) => {
                    zw.add_directory(*name, opts).unwrap();
                }
            }
        }
        zw.finish().unwrap();
    }
    buf.into_inner()
}

pub enum TarItem<'a> {
    File(&'a str, &'a [u8]),
    Dir(&'a str),
}

pub fn tar_bytes(items: &[TarItem<'_>]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for item in items {
        let mut header = tar::Header::new_gnu();
        match item {
            TarItem::File(name, data) => {
                header.set_entry_type(tar::EntryType::Regular);
                header.set_mode(0o644);
                header.set_size(data.len() as u64);
                builder.append_data(&mut header, name, *data).unwrap();
            }
            TarItem::Dir(name) => {
                header.set_entry_type(tar::EntryType::Directory);
                header.set_mode(0o755);
                header.set_size(0);
                builder
                    .append_data(&mut header, name, std::io::empty())
                    .unwrap();
            }
        }
    }
    builder.into_inner().unwrap()
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut enc = GzEncoder::new(&mut out, Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap();
    out
}

/// Deterministic pseudo-random bytes.
pub fn noise(len: usize) -> Vec<u8> {
    let mut state: u64 = 0x9e37_79b9_7f4a_7c15;
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (state >> 33) as u8
        })
        .collect()
}
