use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use anyhow::Result;
use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, BufReader, ReadBuf};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::{EntrySource, SourceChunk};

/// file-backed source
///
/// every read opens its own handle so concurrent range requests never
/// contend on a shared seek position; a semaphore keeps the number of open
/// handles bounded
pub struct LocalFileSource {
    path: PathBuf,
    len: u64,
    semaphore: Arc<Semaphore>,
}

impl LocalFileSource {
    pub async fn new(path: PathBuf) -> Result<Self> {
        let len = File::open(&path).await?.metadata().await?.len();
        let max_concurrent_reads = num_cpus::get() * 2;
        Ok(Self {
            path,
            len,
            semaphore: Arc::new(Semaphore::new(max_concurrent_reads)),
        })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

#[async_trait]
impl EntrySource for LocalFileSource {
    async fn read_range(&self, offset: u64, length: u64) -> Result<SourceChunk> {
        let permit = self.semaphore.clone().acquire_owned().await?;
        let mut file = File::open(&self.path).await?;

        // clamp to the bytes the file actually has; the consumer pads the rest
        let start = offset.min(self.len);
        let avail = (self.len - start).min(length);
        file.seek(io::SeekFrom::Start(start)).await?;

        let reader = PermitReader {
            inner: BufReader::new(file).take(avail),
            _permit: permit,
        };

        Ok(SourceChunk::Stream {
            reader: Box::pin(reader),
            offset: start,
            length: avail,
        })
    }
}

/// holds the concurrency permit for as long as the read is alive
struct PermitReader<R> {
    inner: R,
    _permit: OwnedSemaphorePermit,
}

impl<R: AsyncRead + Unpin> AsyncRead for PermitReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}
