// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 seektar contributors

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};

use seektar::layout::{ArchiveEntry, BlockKind};
#[cfg(feature = "remote")]
use seektar::sources::http::HttpSource;
use seektar::sources::local::LocalFileSource;
use seektar::tarball::SeekableTarball;
use seektar::utils::{format_elapsed_time, format_size};

const COPY_BUFFER_SIZE: usize = 128 * 1024;

#[derive(Parser)]
#[command(
    version,
    about = "Stream files, directories and remote objects as a seekable tar archive"
)]
#[command(next_line_help = true)]
struct Args {
    #[arg(
        required = true,
        help = if cfg!(feature = "remote") {
            "Files or directories to pack; http(s) URLs are fetched with range requests"
        } else {
            "Files or directories to pack"
        }
    )]
    inputs: Vec<String>,

    #[arg(
        short = 'o',
        long,
        default_value = "-",
        help = "Output file; '-' writes the archive to stdout"
    )]
    out: PathBuf,

    #[arg(
        short = 'r',
        long,
        value_name = "DIRECTIVE",
        help = "Emit only a byte range of the archive, e.g. \"bytes=0-1023\" or \"bytes=-512\"",
        long_help = "Emit only a byte range of the archive:\n  \
                     bytes=0-1023   the first KiB\n  \
                     bytes=1024-    everything from offset 1024\n  \
                     bytes=-512     the trailing 512 bytes\n  \
                     Useful for resuming an interrupted transfer of a generated archive."
    )]
    range: Option<String>,

    #[arg(
        short = 'l',
        long,
        conflicts_with = "range",
        help = "Print the planned layout as JSON and exit without reading any file data"
    )]
    list: bool,

    #[arg(
        short = 'U',
        long,
        help = if cfg!(feature = "remote") {
            "Custom User-Agent string for HTTP requests (only used with URL inputs)"
        } else {
            "Custom User-Agent string for HTTP requests [requires remote feature]"
        },
        hide = cfg!(not(feature = "remote"))
    )]
    user_agent: Option<String>,

    #[arg(
        short = 'q',
        long,
        help = "Suppress all non-essential output (errors will still be shown)"
    )]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let is_stdout = args.out.to_string_lossy() == "-";
    let start_time = Instant::now();

    let entries = collect_entries(&args.inputs, args.user_agent.as_deref()).await?;
    if entries.is_empty() {
        bail!("nothing to pack");
    }

    let tarball = SeekableTarball::new(entries);

    if args.list {
        print_layout(&tarball)?;
        return Ok(());
    }

    let reader = tarball.range_reader(args.range.as_deref())?;

    if !args.quiet {
        eprintln!(
            "- Archive size: {} ({} bytes)",
            format_size(tarball.size()),
            tarball.size()
        );
        if args.range.is_some() {
            eprintln!(
                "- Emitting bytes {}-{} of {}",
                reader.start(),
                reader.end().saturating_sub(1),
                tarball.size()
            );
        }
    }

    let total = reader.len();
    let progress = if args.quiet || is_stdout {
        None
    } else {
        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/white}] {bytes}/{total_bytes} {msg}")
                .unwrap()
                .progress_chars("▰▱△"),
        );
        Some(pb)
    };

    let mut source = reader.into_async_read();
    let written = if is_stdout {
        let mut out = tokio::io::stdout();
        let n = copy_with_progress(&mut source, &mut out, progress.as_ref()).await?;
        out.flush().await?;
        n
    } else {
        let mut out = BufWriter::new(
            File::create(&args.out)
                .await
                .with_context(|| format!("cannot create {}", args.out.display()))?,
        );
        let n = copy_with_progress(&mut source, &mut out, progress.as_ref()).await?;
        out.flush().await?;
        n
    };

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    if written != total {
        bail!("short archive stream: wrote {} of {} bytes", written, total);
    }

    if !args.quiet {
        eprintln!(
            "- Wrote {} in {}",
            format_size(written),
            format_elapsed_time(start_time.elapsed())
        );
    }

    Ok(())
}

async fn collect_entries(inputs: &[String], user_agent: Option<&str>) -> Result<Vec<ArchiveEntry>> {
    let _ = user_agent;
    let mut entries = Vec::new();

    for input in inputs {
        if input.starts_with("http://") || input.starts_with("https://") {
            #[cfg(feature = "remote")]
            {
                entries.push(remote_entry(input, user_agent).await?);
                continue;
            }
            #[cfg(not(feature = "remote"))]
            bail!("{input}: URL inputs require the remote feature");
        }

        let path = PathBuf::from(input);
        let meta = tokio::fs::metadata(&path)
            .await
            .with_context(|| format!("cannot read {}", path.display()))?;

        if meta.is_dir() {
            collect_dir(&path, &mut entries).await?;
        } else {
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| anyhow!("unusable file name: {}", path.display()))?
                .to_string();
            entries.push(local_entry(path.clone(), name, meta.len(), unix_mtime(&meta)).await?);
        }
    }

    // colliding names would plan an archive with duplicate members
    let mut seen = HashSet::new();
    for entry in &entries {
        if !seen.insert(entry.name.as_str()) {
            bail!("duplicate entry name: {}", entry.name);
        }
    }

    Ok(entries)
}

async fn collect_dir(root: &Path, entries: &mut Vec<ArchiveEntry>) -> Result<()> {
    let base = root
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_owned)
        .unwrap_or_default();

    for item in walkdir::WalkDir::new(root).follow_links(false) {
        let item = item?;
        if !item.file_type().is_file() {
            continue;
        }

        let rel = item
            .path()
            .strip_prefix(root)
            .expect("walkdir stays under its root")
            .to_str()
            .ok_or_else(|| anyhow!("non-UTF-8 path: {}", item.path().display()))?
            .replace(std::path::MAIN_SEPARATOR, "/");
        let name = if base.is_empty() {
            rel
        } else {
            format!("{base}/{rel}")
        };

        let meta = item.metadata()?;
        entries.push(local_entry(item.path().to_path_buf(), name, meta.len(), unix_mtime(&meta)).await?);
    }

    Ok(())
}

async fn local_entry(path: PathBuf, name: String, size: u64, mtime: u64) -> Result<ArchiveEntry> {
    let source = LocalFileSource::new(path).await?;
    Ok(ArchiveEntry {
        name,
        size,
        mtime,
        source: Arc::new(source),
    })
}

#[cfg(feature = "remote")]
async fn remote_entry(input: &str, user_agent: Option<&str>) -> Result<ArchiveEntry> {
    let name = url::Url::parse(input)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut s| s.next_back().map(str::to_owned))
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "download".to_string());

    let source = HttpSource::new(input.to_string(), user_agent).await?;
    let size = source.content_length();

    let mtime = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    Ok(ArchiveEntry {
        name,
        size,
        mtime,
        source: Arc::new(source),
    })
}

fn unix_mtime(meta: &std::fs::Metadata) -> u64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[derive(Serialize)]
struct LayoutReport<'a> {
    size: u64,
    size_readable: String,
    entry_count: usize,
    block_count: usize,
    entries: Vec<EntryReport<'a>>,
    blocks: Vec<BlockReport<'a>>,
}

#[derive(Serialize)]
struct EntryReport<'a> {
    name: &'a str,
    size: u64,
    mtime: u64,
}

#[derive(Serialize)]
struct BlockReport<'a> {
    offset: u64,
    length: u64,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    entry: Option<&'a str>,
}

fn print_layout(tarball: &SeekableTarball) -> Result<()> {
    let layout = tarball.layout();
    let entries = tarball.entries();

    let report = LayoutReport {
        size: layout.size,
        size_readable: format_size(layout.size),
        entry_count: entries.len(),
        block_count: layout.blocks.len(),
        entries: entries
            .iter()
            .map(|e| EntryReport {
                name: &e.name,
                size: e.size,
                mtime: e.mtime,
            })
            .collect(),
        blocks: layout
            .blocks
            .iter()
            .enumerate()
            .map(|(i, b)| BlockReport {
                offset: b.offset,
                length: layout.block_end(i) - b.offset,
                kind: match &b.kind {
                    BlockKind::Header(_) => "header",
                    BlockKind::Payload { .. } => "payload",
                    BlockKind::EndOfArchive => "end-of-archive",
                },
                entry: match &b.kind {
                    BlockKind::Payload { entry } => Some(entries[*entry].name.as_str()),
                    _ => None,
                },
            })
            .collect(),
    };

    let stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(stdout, &report)?;
    println!();
    Ok(())
}

async fn copy_with_progress<R, W>(
    reader: &mut R,
    writer: &mut W,
    progress: Option<&ProgressBar>,
) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await?;
        total += n as u64;
        if let Some(pb) = progress {
            pb.set_position(total);
        }
    }

    Ok(total)
}
