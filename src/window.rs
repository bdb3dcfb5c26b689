// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 seektar contributors

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};

const ZEROES: [u8; 512] = [0u8; 512];

/// adapts a byte source to an exact `(offset, length)` window
///
/// the output is always exactly `length` bytes: a negative offset becomes
/// that many leading zeros (they count toward the total), a positive offset
/// discards source bytes before any output, a source that runs short is
/// padded with zeros and a source that runs long is cut off. this is what
/// lets heterogeneous sources, which may answer with more or fewer bytes
/// than asked, compose into a fixed archive layout. dropping the adapter
/// drops the source, so cancellation propagates.
pub struct WindowedReader<R> {
    inner: R,
    lead_zeros: u64,
    skip: u64,
    remaining: u64,
    exhausted: bool,
}

impl<R: AsyncRead + Unpin> WindowedReader<R> {
    pub fn new(inner: R, offset: i64, length: u64) -> Self {
        let (lead_zeros, skip) = if offset < 0 {
            (offset.unsigned_abs(), 0)
        } else {
            (0, offset as u64)
        };
        Self {
            inner,
            lead_zeros,
            skip,
            remaining: length,
            exhausted: false,
        }
    }

    fn pad(&mut self, buf: &mut ReadBuf<'_>) {
        let n = self
            .remaining
            .min(buf.remaining() as u64)
            .min(ZEROES.len() as u64) as usize;
        buf.put_slice(&ZEROES[..n]);
        self.remaining -= n as u64;
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for WindowedReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let me = &mut *self;

        if me.remaining == 0 || buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        // zeros owed by a negative offset come first
        if me.lead_zeros > 0 {
            let n = me
                .lead_zeros
                .min(me.remaining)
                .min(buf.remaining() as u64)
                .min(ZEROES.len() as u64) as usize;
            buf.put_slice(&ZEROES[..n]);
            me.lead_zeros -= n as u64;
            me.remaining -= n as u64;
            return Poll::Ready(Ok(()));
        }

        // discard skipped source bytes without emitting them
        while me.skip > 0 && !me.exhausted {
            let mut scratch = [0u8; 4096];
            let take = me.skip.min(scratch.len() as u64) as usize;
            let mut scratch_buf = ReadBuf::new(&mut scratch[..take]);
            match Pin::new(&mut me.inner).poll_read(cx, &mut scratch_buf) {
                Poll::Ready(Ok(())) => {
                    let filled = scratch_buf.filled().len();
                    if filled == 0 {
                        me.exhausted = true;
                    } else {
                        me.skip -= filled as u64;
                    }
                }
                other => return other,
            }
        }

        if me.exhausted {
            me.pad(buf);
            return Poll::Ready(Ok(()));
        }

        // emit from the source, clipped to what is still owed
        let max_read = me.remaining.min(buf.remaining() as u64) as usize;
        let mut limited = buf.take(max_read);
        match Pin::new(&mut me.inner).poll_read(cx, &mut limited) {
            Poll::Ready(Ok(())) => {
                let filled = limited.filled().len();
                if filled == 0 {
                    me.exhausted = true;
                    me.pad(buf);
                } else {
                    me.remaining -= filled as u64;
                    // the sub-buffer wrote these bytes into buf's memory
                    unsafe { buf.assume_init(filled) };
                    buf.advance(filled);
                }
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tokio::io::AsyncReadExt;

    async fn collect<R: AsyncRead + Unpin>(mut reader: R) -> Vec<u8> {
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn exact_interior_slice() {
        let w = WindowedReader::new(&b"hello world"[..], 6, 5);
        assert_eq!(collect(w).await, b"world");
    }

    #[tokio::test]
    async fn truncates_a_long_source() {
        let w = WindowedReader::new(&b"hello world"[..], 0, 4);
        assert_eq!(collect(w).await, b"hell");
    }

    #[tokio::test]
    async fn pads_a_short_source_with_zeros() {
        let w = WindowedReader::new(&b"hello"[..], 0, 8);
        assert_eq!(collect(w).await, b"hello\0\0\0");
    }

    #[tokio::test]
    async fn negative_offset_prepends_zeros() {
        let w = WindowedReader::new(&b"hello"[..], -3, 8);
        assert_eq!(collect(w).await, b"\0\0\0hello");
    }

    #[tokio::test]
    async fn window_entirely_past_the_source_is_all_zeros() {
        let w = WindowedReader::new(&b"hi"[..], 10, 4);
        assert_eq!(collect(w).await, vec![0u8; 4]);
    }

    #[tokio::test]
    async fn zero_length_window_is_empty() {
        let w = WindowedReader::new(&b"hello"[..], 2, 0);
        assert_eq!(collect(w).await, b"");
    }

    #[tokio::test]
    async fn skip_spans_chunk_boundaries() {
        // source delivered in small chunks so the skip cannot be satisfied
        // by a single read
        let chunks: Vec<Result<Bytes, std::io::Error>> = (0u8..8)
            .map(|i| Ok(Bytes::from(vec![i; 3])))
            .collect();
        let source = tokio_util::io::StreamReader::new(futures::stream::iter(chunks));
        let w = WindowedReader::new(source, 7, 6);
        // bytes 7..13 of 000111222333444555666777
        assert_eq!(collect(w).await, &[2, 2, 3, 3, 3, 4]);
    }

    #[tokio::test]
    async fn pads_after_chunked_source_runs_dry() {
        let chunks: Vec<Result<Bytes, std::io::Error>> =
            vec![Ok(Bytes::from_static(b"abc")), Ok(Bytes::from_static(b"de"))];
        let source = tokio_util::io::StreamReader::new(futures::stream::iter(chunks));
        let w = WindowedReader::new(source, 4, 4);
        assert_eq!(collect(w).await, b"e\0\0\0");
    }
}
