//! Byte stream sources feeding the ingestion loop.
//!
//! A source is lazy, finite and non-restartable: each call yields the next
//! chunk of raw bytes, `Ok(None)` once the stream has ended, or the read error.

use std::collections::VecDeque;
use std::io::{self, Read};

/// Produces raw PCM byte chunks for one streaming session.
pub trait ChunkSource {
    /// Next chunk, or `Ok(None)` at end of stream.
    fn next_chunk(&mut self) -> io::Result<Option<Vec<u8>>>;
}

impl<S: ChunkSource + ?Sized> ChunkSource for Box<S> {
    fn next_chunk(&mut self) -> io::Result<Option<Vec<u8>>> {
        (**self).next_chunk()
    }
}

/// Adapts any blocking [`Read`] (file, pipe, socket) into a chunk source.
pub struct ReaderSource<R> {
    inner: R,
    read_bytes: usize,
}

impl<R: Read> ReaderSource<R> {
    /// `read_bytes` is the maximum chunk size; clamped to at least one byte.
    pub fn new(inner: R, read_bytes: usize) -> Self {
        Self {
            inner,
            read_bytes: read_bytes.max(1),
        }
    }
}

impl<R: Read> ChunkSource for ReaderSource<R> {
    fn next_chunk(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut buf = vec![0u8; self.read_bytes];
        loop {
            match self.inner.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(n) => {
                    buf.truncate(n);
                    return Ok(Some(buf));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

/// In-memory source replaying a fixed list of reads, optionally failing at the end.
///
/// Useful for feeding pre-split payloads (tests, replays of captured streams).
#[derive(Debug, Default)]
pub struct ScriptedSource {
    chunks: VecDeque<Vec<u8>>,
    fail_with: Option<io::ErrorKind>,
}

impl ScriptedSource {
    pub fn new<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Vec<u8>>,
    {
        Self {
            chunks: chunks.into_iter().map(Into::into).collect(),
            fail_with: None,
        }
    }

    /// Fail with `kind` once all scripted chunks have been delivered.
    pub fn failing_with(mut self, kind: io::ErrorKind) -> Self {
        self.fail_with = Some(kind);
        self
    }
}

impl ChunkSource for ScriptedSource {
    fn next_chunk(&mut self) -> io::Result<Option<Vec<u8>>> {
        if let Some(chunk) = self.chunks.pop_front() {
            return Ok(Some(chunk));
        }
        match self.fail_with.take() {
            Some(kind) => Err(io::Error::new(kind, "scripted read failure")),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reader_source_splits_by_read_size() {
        let mut src = ReaderSource::new(Cursor::new(vec![1u8, 2, 3, 4, 5]), 2);
        assert_eq!(src.next_chunk().unwrap(), Some(vec![1, 2]));
        assert_eq!(src.next_chunk().unwrap(), Some(vec![3, 4]));
        assert_eq!(src.next_chunk().unwrap(), Some(vec![5]));
        assert_eq!(src.next_chunk().unwrap(), None);
    }

    #[test]
    fn reader_source_clamps_zero_read_size() {
        let mut src = ReaderSource::new(Cursor::new(vec![9u8]), 0);
        assert_eq!(src.next_chunk().unwrap(), Some(vec![9]));
    }

    #[test]
    fn scripted_source_fails_after_chunks() {
        let mut src = ScriptedSource::new([vec![1u8]]).failing_with(io::ErrorKind::ConnectionReset);
        assert_eq!(src.next_chunk().unwrap(), Some(vec![1]));
        let err = src.next_chunk().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
        assert_eq!(src.next_chunk().unwrap(), None);
    }
}
