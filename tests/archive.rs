// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 seektar contributors
//
// End-to-end checks: archives produced here must be accepted byte-for-byte
// by a standard tar reader, and every ranged read must agree with the
// corresponding slice of the full stream.

use std::io::{Cursor, Read, Write};
use std::path::Path;
use std::sync::Arc;

use tar::{Archive, EntryType};
use tokio::io::AsyncReadExt;

use seektar::layout::ArchiveEntry;
use seektar::sources::MemorySource;
use seektar::sources::local::LocalFileSource;
use seektar::tarball::SeekableTarball;

const MTIME: u64 = 1_700_000_000;

fn mem_entry(name: &str, data: &[u8]) -> ArchiveEntry {
    ArchiveEntry {
        name: name.to_string(),
        size: data.len() as u64,
        mtime: MTIME,
        source: Arc::new(MemorySource::new(data.to_vec())),
    }
}

async fn read_full(tarball: &SeekableTarball) -> Vec<u8> {
    let mut out = Vec::new();
    tarball
        .reader()
        .into_async_read()
        .read_to_end(&mut out)
        .await
        .unwrap();
    out
}

#[tokio::test]
async fn standard_reader_accepts_the_archive() {
    let tarball = SeekableTarball::new(vec![
        mem_entry("docs/readme.md", b"hello tar"),
        mem_entry("docs/img/logo.png", &[7u8; 600]),
        mem_entry("top.txt", b""),
    ]);
    let bytes = read_full(&tarball).await;
    assert_eq!(bytes.len() as u64, tarball.size());

    let mut archive = Archive::new(Cursor::new(bytes));
    let mut names = Vec::new();

    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        let name = entry.path().unwrap().to_str().unwrap().to_string();
        let header = entry.header();

        assert_eq!(header.mtime().unwrap(), MTIME, "{name}");
        match header.entry_type() {
            EntryType::Directory => {
                assert!(name.ends_with('/'), "{name}");
                assert_eq!(header.mode().unwrap(), 0o755);
            }
            EntryType::Regular => {
                assert_eq!(header.mode().unwrap(), 0o644);
                let mut data = Vec::new();
                entry.read_to_end(&mut data).unwrap();
                match name.as_str() {
                    "docs/readme.md" => assert_eq!(data, b"hello tar"),
                    "docs/img/logo.png" => assert_eq!(data, vec![7u8; 600]),
                    "top.txt" => assert!(data.is_empty()),
                    other => panic!("unexpected entry {other}"),
                }
            }
            other => panic!("unexpected entry type {other:?}"),
        }
        names.push(name);
    }

    // sorted order with parents synthesized ahead of their children
    assert_eq!(
        names,
        [
            "docs/",
            "docs/img/",
            "docs/img/logo.png",
            "docs/readme.md",
            "top.txt",
        ]
    );
}

#[tokio::test]
async fn local_files_round_trip_through_the_archive() {
    let dir = tempfile::tempdir().unwrap();
    let payloads: &[(&str, Vec<u8>)] = &[
        ("notes.txt", b"some notes".to_vec()),
        ("big.bin", (0u16..2000).map(|v| (v % 251) as u8).collect()),
        ("empty.dat", Vec::new()),
    ];

    let mut entries = Vec::new();
    for (name, data) in payloads {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(data).unwrap();

        let source = LocalFileSource::new(path).await.unwrap();
        entries.push(ArchiveEntry {
            name: format!("dump/{name}"),
            size: source.len(),
            mtime: MTIME,
            source: Arc::new(source),
        });
    }

    let tarball = SeekableTarball::new(entries);
    let bytes = read_full(&tarball).await;

    let mut archive = Archive::new(Cursor::new(bytes));
    let mut seen = 0;
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        if entry.header().entry_type() != EntryType::Regular {
            continue;
        }
        let name = entry.path().unwrap().to_str().unwrap().to_string();
        let mut data = Vec::new();
        entry.read_to_end(&mut data).unwrap();

        let stem = Path::new(&name).file_name().unwrap().to_str().unwrap();
        let expected = &payloads.iter().find(|(n, _)| *n == stem).unwrap().1;
        assert_eq!(&data, expected, "{name}");
        seen += 1;
    }
    assert_eq!(seen, payloads.len());
}

#[tokio::test]
async fn ranged_reads_agree_with_the_full_stream() {
    let tarball = SeekableTarball::new(vec![
        mem_entry("x.txt", &[b'x'; 10]),
        mem_entry("y.txt", &[b'y'; 600]),
    ]);
    assert_eq!(tarball.size(), 3584);
    let full = read_full(&tarball).await;

    for directive in [
        "bytes=0-511",
        "bytes=1000-1100",
        "bytes=512-",
        "bytes=-1024",
        "bytes=3583-",
        "bytes=0-0",
    ] {
        let range = tarball.range_reader(Some(directive)).unwrap();
        let (start, end) = (range.start() as usize, range.end() as usize);
        let mut out = Vec::new();
        range
            .into_async_read()
            .read_to_end(&mut out)
            .await
            .unwrap();
        assert_eq!(out, &full[start..end], "directive {directive}");
    }
}

#[tokio::test]
async fn resumed_download_reassembles_the_archive() {
    let tarball = SeekableTarball::new(vec![
        mem_entry("a/one.bin", &[1u8; 700]),
        mem_entry("a/two.bin", &[2u8; 50]),
    ]);
    let full = read_full(&tarball).await;

    // fetch in three uneven parts, as a client resuming twice would
    let size = tarball.size();
    let cuts = [0, 777, 2000, size];
    let mut glued = Vec::new();
    for pair in cuts.windows(2) {
        let directive = format!("bytes={}-{}", pair[0], pair[1] - 1);
        let range = tarball.range_reader(Some(directive.as_str())).unwrap();
        range
            .into_async_read()
            .read_to_end(&mut glued)
            .await
            .unwrap();
    }
    assert_eq!(glued, full);

    // and the reassembled bytes still parse
    let mut archive = Archive::new(Cursor::new(glued));
    let names: Vec<String> = archive
        .entries()
        .unwrap()
        .map(|e| e.unwrap().path().unwrap().to_str().unwrap().to_string())
        .collect();
    assert_eq!(names, ["a/", "a/one.bin", "a/two.bin"]);
}

#[tokio::test]
async fn unsatisfiable_directive_is_a_clean_error() {
    let tarball = SeekableTarball::new(vec![mem_entry("x.txt", b"x")]);
    let err = tarball.range_reader(Some("bytes=500-100")).unwrap_err();
    assert_eq!((err.start, err.end), (500, 100));
}
