mod common;

use common::{gzip, noise, tar_bytes, zip_bytes, TarItem, ZipItem};
use experiment_storage::archive::{extract_all, spawn_extract, ArchiveFormat, ArchiveLimits};
use experiment_storage::error::StorageError;

fn paths(entries: &[experiment_storage::archive::ArchiveEntry]) -> Vec<&str> {
    entries.iter().map(|e| e.path.as_str()).collect()
}

#[test]
fn detects_formats_by_suffix() {
    assert_eq!(ArchiveFormat::detect("a.zip").unwrap(), ArchiveFormat::Zip);
    assert_eq!(ArchiveFormat::detect("A.ZIP").unwrap(), ArchiveFormat::Zip);
    assert_eq!(ArchiveFormat::detect("a.tar").unwrap(), ArchiveFormat::Tar);
    assert_eq!(ArchiveFormat::detect("a.tar.gz").unwrap(), ArchiveFormat::TarGz);
    assert_eq!(ArchiveFormat::detect("a.tgz").unwrap(), ArchiveFormat::TarGz);
    assert_eq!(ArchiveFormat::detect("log.gz").unwrap(), ArchiveFormat::Gzip);

    for name in ["a.rar", "a.7z", "zip", "a.zip.bak"] {
        assert!(matches!(
            ArchiveFormat::detect(name),
            Err(StorageError::UnsupportedFormat(_))
        ));
    }
}

#[test]
fn zip_skips_directories_and_keeps_order() {
    let data = zip_bytes(&[
        ZipItem::File("a.txt", b"alpha"),
        ZipItem::Dir("dir/"),
        ZipItem::File("dir/b.txt", b"bravo"),
        ZipItem::Dir("dir/empty/"),
    ]);

    let entries = extract_all(&data, "bundle.zip", ArchiveLimits::default()).unwrap();
    assert_eq!(paths(&entries), vec!["a.txt", "dir/b.txt"]);
    assert_eq!(entries[0].data, b"alpha");
    assert_eq!(entries[1].data, b"bravo");
    assert!(entries[0].content_type.starts_with("text/plain"));
}

#[test]
fn zip_entry_names_are_normalized() {
    let data = zip_bytes(&[
        ZipItem::File("./src/main.c", b"int main;"),
        ZipItem::File("lib\\util.c", b"void f;"),
    ]);

    let entries = extract_all(&data, "code.zip", ArchiveLimits::default()).unwrap();
    assert_eq!(paths(&entries), vec!["src/main.c", "lib/util.c"]);
}

#[test]
fn zip_traversal_entries_are_rejected() {
    let data = zip_bytes(&[
        ZipItem::File("ok.txt", b"fine"),
        ZipItem::File("../evil.txt", b"nope"),
    ]);

    let err = extract_all(&data, "evil.zip", ArchiveLimits::default()).unwrap_err();
    assert!(matches!(err, StorageError::InvalidPath { .. }), "{:?}", err);
}

#[test]
fn tar_and_tar_gz_yield_the_same_entries() {
    let tar = tar_bytes(&[
        TarItem::File("readme.md", b"# hi"),
        TarItem::Dir("src/"),
        TarItem::File("src/lib.rs", b"pub fn f() {}"),
    ]);

    let plain = extract_all(&tar, "code.tar", ArchiveLimits::default()).unwrap();
    assert_eq!(paths(&plain), vec!["readme.md", "src/lib.rs"]);

    let packed = gzip(&tar);
    for name in ["code.tar.gz", "code.tgz"] {
        let entries = extract_all(&packed, name, ArchiveLimits::default()).unwrap();
        assert_eq!(paths(&entries), vec!["readme.md", "src/lib.rs"]);
        assert_eq!(entries[1].data, b"pub fn f() {}");
    }
}

#[test]
fn single_gzip_is_named_after_the_archive() {
    let body = noise(4096);
    let entries = extract_all(&gzip(&body), "uploads/trace.log.gz", ArchiveLimits::default())
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].path, "trace.log");
    assert_eq!(entries[0].data, body);
}

#[test]
fn garbage_is_a_corrupt_archive() {
    let err = extract_all(b"definitely not a zip", "x.zip", ArchiveLimits::default())
        .unwrap_err();
    assert!(matches!(err, StorageError::CorruptArchive(_)), "{:?}", err);

    let err = extract_all(b"not gzip either", "x.gz", ArchiveLimits::default()).unwrap_err();
    assert!(matches!(err, StorageError::CorruptArchive(_)), "{:?}", err);
}

#[test]
fn entry_count_limit() {
    let tar = tar_bytes(&[
        TarItem::File("a", b"1"),
        TarItem::File("b", b"2"),
        TarItem::File("c", b"3"),
    ]);
    let limits = ArchiveLimits {
        max_entries: 2,
        ..ArchiveLimits::default()
    };
    let err = extract_all(&tar, "x.tar", limits).unwrap_err();
    assert!(matches!(err, StorageError::ArchiveTooLarge(_)), "{:?}", err);

    let ok = ArchiveLimits {
        max_entries: 3,
        ..ArchiveLimits::default()
    };
    assert_eq!(extract_all(&tar, "x.tar", ok).unwrap().len(), 3);
}

#[test]
fn total_size_limit_applies_to_decompressed_bytes() {
    // Compresses to a few hundred bytes but inflates past the cap.
    let zeros = vec![0u8; 64 * 1024];
    let packed = gzip(&tar_bytes(&[TarItem::File("zeros.bin", &zeros)]));
    assert!(packed.len() < 4096);

    let limits = ArchiveLimits {
        max_total_bytes: 32 * 1024,
        ..ArchiveLimits::default()
    };
    let err = extract_all(&packed, "bomb.tar.gz", limits).unwrap_err();
    assert!(matches!(err, StorageError::ArchiveTooLarge(_)), "{:?}", err);
}

#[test]
fn per_entry_limit() {
    let tar = tar_bytes(&[
        TarItem::File("small.txt", b"tiny"),
        TarItem::File("big.bin", &[7u8; 100]),
    ]);
    let limits = ArchiveLimits {
        max_entry_bytes: 16,
        ..ArchiveLimits::default()
    };
    let err = extract_all(&tar, "x.tar", limits).unwrap_err();
    assert!(matches!(err, StorageError::ArchiveTooLarge(_)), "{:?}", err);
}

#[test]
fn zip_declared_sizes_are_checked_before_inflating() {
    let data = zip_bytes(&[
        ZipItem::File("a.bin", &[0u8; 2000]),
        ZipItem::File("b.bin", &[0u8; 2000]),
    ]);
    let limits = ArchiveLimits {
        max_total_bytes: 3000,
        ..ArchiveLimits::default()
    };

    let mut seen = 0;
    let err = experiment_storage::archive::extract_with(
        &data,
        ArchiveFormat::Zip,
        "a.zip",
        limits,
        |_| {
            seen += 1;
            Ok(())
        },
    )
    .unwrap_err();
    assert!(matches!(err, StorageError::ArchiveTooLarge(_)), "{:?}", err);
    assert_eq!(seen, 0);
}

#[tokio::test]
async fn spawned_extraction_streams_entries() {
    let data = zip_bytes(&[
        ZipItem::File("one.txt", b"1"),
        ZipItem::File("two.txt", b"22"),
        ZipItem::File("three.txt", b"333"),
    ]);

    let (mut rx, worker) =
        spawn_extract(data.into(), "n.zip", ArchiveLimits::default()).unwrap();
    let mut names = Vec::new();
    while let Some(entry) = rx.recv().await {
        names.push(entry.path);
    }
    let summary = worker.await.unwrap().unwrap();

    assert_eq!(names, vec!["one.txt", "two.txt", "three.txt"]);
    assert_eq!(summary.entries, 3);
    assert_eq!(summary.bytes, 6);
}

#[tokio::test]
async fn dropping_the_receiver_stops_the_worker() {
    let files: Vec<String> = (0..20).map(|i| format!("f{}.txt", i)).collect();
    let items: Vec<ZipItem<'_>> = files
        .iter()
        .map(|f| ZipItem::File(f.as_str(), b"x"))
        .collect();
    let data = zip_bytes(&items);

    let (mut rx, worker) =
        spawn_extract(data.into(), "many.zip", ArchiveLimits::default()).unwrap();
    assert!(rx.recv().await.is_some());
    drop(rx);

    let err = worker.await.unwrap().unwrap_err();
    assert!(matches!(err, StorageError::Io(_)), "{:?}", err);
}

#[test]
fn unsupported_format_fails_before_spawning() {
    let err = spawn_extract(bytes::Bytes::from_static(b"Rar!"), "x.rar", ArchiveLimits::default())
        .unwrap_err();
    assert!(matches!(err, StorageError::UnsupportedFormat(_)));
}

#[test]
fn file_and_directory_with_the_same_path_clash() {
    for items in [
        [TarItem::File("a", b"file"), TarItem::File("a/b", b"nested")],
        [TarItem::File("a/b", b"nested"), TarItem::File("a", b"file")],
        [TarItem::File("x.txt", b"1"), TarItem::File("./x.txt", b"2")],
    ] {
        let tar = tar_bytes(&items);
        let err = extract_all(&tar, "clash.tar", ArchiveLimits::default()).unwrap_err();
        assert!(matches!(err, StorageError::InvalidPath { .. }), "{:?}", err);
    }

    let tar = tar_bytes(&[
        TarItem::File("ab", b"1"),
        TarItem::File("a/b", b"2"),
        TarItem::File("a/c", b"3"),
    ]);
    assert_eq!(
        extract_all(&tar, "ok.tar", ArchiveLimits::default()).unwrap().len(),
        3
    );
}
