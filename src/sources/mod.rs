// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 seektar contributors
//
// This module is the only interface toward the storage that actually holds
// entry bytes; everything else in the crate is agnostic to where they live.

use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncRead;

#[cfg(feature = "remote")]
pub mod http;
pub mod local;

/// abstract byte source behind one archive entry
///
/// implementations answer absolute `(offset, length)` windows over the blob.
/// a window overrunning the blob is clamped, and a streaming result may
/// start earlier or run longer than asked when the store rounds to its own
/// granularity; the reported window must say what is actually covered.
#[async_trait]
pub trait EntrySource: Send + Sync {
    async fn read_range(&self, offset: u64, length: u64) -> Result<SourceChunk>;
}

/// result of one `read_range` call
pub enum SourceChunk {
    /// in-memory bytes for the requested window; may fall short when the
    /// window overlaps the padding past the blob's end
    Bytes(Bytes),
    /// lazy bytes annotated with the absolute window they cover
    Stream {
        reader: Pin<Box<dyn AsyncRead + Send>>,
        offset: u64,
        length: u64,
    },
}

#[async_trait]
impl<T: EntrySource> EntrySource for Arc<T> {
    async fn read_range(&self, offset: u64, length: u64) -> Result<SourceChunk> {
        (**self).read_range(offset, length).await
    }
}

/// Bytes-backed source for small blobs and tests
pub struct MemorySource {
    data: Bytes,
}

impl MemorySource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[async_trait]
impl EntrySource for MemorySource {
    async fn read_range(&self, offset: u64, length: u64) -> Result<SourceChunk> {
        let start = offset.min(self.len()) as usize;
        let end = offset.saturating_add(length).min(self.len()) as usize;
        Ok(SourceChunk::Bytes(self.data.slice(start..end)))
    }
}
