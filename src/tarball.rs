// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 seektar contributors

use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures::Stream;
use futures::stream;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::io::StreamReader;

use crate::layout::{ArchiveEntry, ArchiveLayout, BlockCursor, BlockKind};
use crate::range::{RangeUnsatisfiable, resolve};
use crate::sources::SourceChunk;
use crate::window::WindowedReader;

const CHUNK_SIZE: usize = 64 * 1024;

/// an archive planned once and readable many times, whole or by byte range
///
/// cloning is cheap; concurrent readers share the same immutable layout and
/// entry table, each with its own cursor
#[derive(Clone)]
pub struct SeekableTarball {
    inner: Arc<Inner>,
}

struct Inner {
    layout: ArchiveLayout,
    entries: Vec<ArchiveEntry>,
}

impl SeekableTarball {
    pub fn new(entries: Vec<ArchiveEntry>) -> Self {
        let layout = ArchiveLayout::plan(&entries);
        Self {
            inner: Arc::new(Inner { layout, entries }),
        }
    }

    /// total archive length, for Content-Length and range validation
    pub fn size(&self) -> u64 {
        self.inner.layout.size
    }

    pub fn layout(&self) -> &ArchiveLayout {
        &self.inner.layout
    }

    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.inner.entries
    }

    /// open a reader over the whole archive
    pub fn reader(&self) -> TarballRange {
        self.slice_reader(0, self.size())
    }

    /// open a reader for an optional `bytes=a-b` directive
    ///
    /// the protocol layer maps the returned interval onto 200/206 and
    /// Content-Range, and an unsatisfiable directive onto 416
    pub fn range_reader(&self, directive: Option<&str>) -> Result<TarballRange, RangeUnsatisfiable> {
        let (start, end) = resolve(self.size(), directive)?;
        Ok(self.slice_reader(start, end))
    }

    /// open a reader over an already-resolved interval; the caller must
    /// keep `start <= end <= size()`
    pub fn slice_reader(&self, start: u64, end: u64) -> TarballRange {
        let cursor = self.inner.layout.locate(start);
        let state = DriveState {
            inner: Arc::clone(&self.inner),
            cursor,
            end,
            current: None,
        };
        TarballRange {
            start,
            end,
            stream: Box::pin(stream::try_unfold(state, drive)),
        }
    }
}

/// one open read over a byte interval of the archive
///
/// a stream of chunks totalling exactly `end - start` bytes; a failing
/// payload read surfaces as an `Err` item and ends the stream, because a
/// silently truncated tar is indistinguishable from a valid short one.
/// dropping the range cancels any in-flight payload read.
pub struct TarballRange {
    start: u64,
    end: u64,
    stream: Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>,
}

impl fmt::Debug for TarballRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TarballRange")
            .field("start", &self.start)
            .field("end", &self.end)
            .finish_non_exhaustive()
    }
}

impl TarballRange {
    /// first byte offset covered, inclusive
    pub fn start(&self) -> u64 {
        self.start
    }

    /// end of the covered interval, exclusive
    pub fn end(&self) -> u64 {
        self.end
    }

    /// number of bytes this range will emit
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// adapt to AsyncRead for copy-style consumers
    pub fn into_async_read(self) -> impl AsyncRead + Send + Unpin {
        StreamReader::new(self.stream)
    }
}

impl Stream for TarballRange {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().stream.as_mut().poll_next(cx)
    }
}

struct DriveState {
    inner: Arc<Inner>,
    cursor: BlockCursor,
    end: u64,
    current: Option<Pin<Box<dyn AsyncRead + Send>>>,
}

/// produce the next chunk for the interval, pulling block after block
async fn drive(mut state: DriveState) -> io::Result<Option<(Bytes, DriveState)>> {
    loop {
        // drain the active block reader before looking at the next block
        if let Some(reader) = state.current.as_mut() {
            let mut buf = BytesMut::with_capacity(CHUNK_SIZE);
            let n = reader.read_buf(&mut buf).await?;
            if n > 0 {
                return Ok(Some((buf.freeze(), state)));
            }
            state.current = None;
            state.cursor = state.cursor.advance();
            continue;
        }

        let Some(read) = state.inner.layout.next_read(&state.cursor, state.end) else {
            return Ok(None);
        };
        if read.len == 0 {
            state.cursor = state.cursor.advance();
            continue;
        }

        match &state.inner.layout.blocks[read.block].kind {
            BlockKind::Header(block) => {
                let lo = read.skip as usize;
                let hi = lo + read.len as usize;
                let chunk = Bytes::copy_from_slice(&block[lo..hi]);
                state.cursor = state.cursor.advance();
                return Ok(Some((chunk, state)));
            }
            BlockKind::EndOfArchive => {
                let chunk = Bytes::from(vec![0u8; read.len as usize]);
                state.cursor = state.cursor.advance();
                return Ok(Some((chunk, state)));
            }
            BlockKind::Payload { entry } => {
                let entry = &state.inner.entries[*entry];
                let chunk = entry
                    .source
                    .read_range(read.skip, read.len)
                    .await
                    .map_err(io::Error::other)?;
                let reader: Pin<Box<dyn AsyncRead + Send>> = match chunk {
                    SourceChunk::Bytes(bytes) => {
                        // already the requested window; pad or cut to length
                        Box::pin(WindowedReader::new(io::Cursor::new(bytes), 0, read.len))
                    }
                    SourceChunk::Stream { reader, offset, .. } => {
                        // the store may have started earlier than asked
                        let lead = read.skip as i64 - offset as i64;
                        Box::pin(WindowedReader::new(reader, lead, read.len))
                    }
                };
                state.current = Some(reader);
            }
        }
    }
}
