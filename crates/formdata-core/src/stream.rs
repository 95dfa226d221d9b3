//! Byte stream plumbing shared by the encoder and the decoder.
//!
//! The transport hands the codec a pull-based [`Stream`] of byte chunks. The
//! codec never performs socket I/O itself; it only polls what it was given.

use asupersync::stream::Stream;
use std::future::poll_fn;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Boxed source of body bytes.
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Vec<u8>>> + Send>>;

/// Box any byte stream into a [`ByteStream`].
pub fn boxed<S>(stream: S) -> ByteStream
where
    S: Stream<Item = io::Result<Vec<u8>>> + Send + 'static,
{
    Box::pin(stream)
}

/// Await the next item of an unpinned stream.
pub async fn next_item<S>(stream: &mut S) -> Option<S::Item>
where
    S: Stream + Unpin,
{
    poll_fn(|cx| Pin::new(&mut *stream).poll_next(cx)).await
}

/// Default chunk size for [`ChunkedBytes`].
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;

/// Stream over an in-memory buffer, yielded in fixed-size chunks.
#[derive(Debug, Clone)]
pub struct ChunkedBytes {
    data: Vec<u8>,
    position: usize,
    chunk_size: usize,
}

impl ChunkedBytes {
    /// Create a stream yielding `data` in chunks of `chunk_size` bytes.
    #[must_use]
    pub fn new(data: impl Into<Vec<u8>>, chunk_size: usize) -> Self {
        Self {
            data: data.into(),
            position: 0,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Create a stream using [`DEFAULT_CHUNK_SIZE`].
    #[must_use]
    pub fn with_default_chunk_size(data: impl Into<Vec<u8>>) -> Self {
        Self::new(data, DEFAULT_CHUNK_SIZE)
    }

    /// Bytes not yet yielded.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }
}

impl Stream for ChunkedBytes {
    type Item = io::Result<Vec<u8>>;

    fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.position >= self.data.len() {
            return Poll::Ready(None);
        }
        let end = self
            .position
            .saturating_add(self.chunk_size)
            .min(self.data.len());
        let chunk = self.data[self.position..end].to_vec();
        self.position = end;
        Poll::Ready(Some(Ok(chunk)))
    }
}
