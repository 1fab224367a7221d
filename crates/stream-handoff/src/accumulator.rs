//! Retains every decoded chunk so the complete stream can be handed to the
//! buffered engine once ingestion ends.

use std::sync::Arc;

use anyhow::{Result, bail};

use crate::decode::{SampleChunk, duration_secs};

/// The whole session's audio as one contiguous sample sequence.
#[derive(Clone, Debug, PartialEq)]
pub struct AccumulatedBuffer {
    pub samples: Arc<[f32]>,
    pub sample_rate: u32,
    /// Total duration in seconds.
    pub duration: f64,
}

impl AccumulatedBuffer {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[derive(Debug)]
pub struct BufferAccumulator {
    sample_rate: u32,
    chunks: Vec<SampleChunk>,
    total_samples: usize,
    finalized: bool,
}

impl BufferAccumulator {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            chunks: Vec::new(),
            total_samples: 0,
            finalized: false,
        }
    }

    /// Append `chunk` in arrival order.
    pub fn push(&mut self, chunk: SampleChunk) {
        if self.finalized {
            tracing::warn!(samples = chunk.len(), "chunk pushed after finalize; dropped");
            return;
        }
        self.total_samples += chunk.len();
        self.chunks.push(chunk);
    }

    /// Concatenate every pushed chunk. Succeeds once per session.
    pub fn finalize(&mut self) -> Result<AccumulatedBuffer> {
        if self.finalized {
            bail!("accumulated buffer already finalized");
        }
        self.finalized = true;

        let mut samples = Vec::with_capacity(self.total_samples);
        for chunk in self.chunks.drain(..) {
            samples.extend_from_slice(chunk.samples());
        }
        let duration = duration_secs(samples.len(), self.sample_rate);
        Ok(AccumulatedBuffer {
            samples: samples.into(),
            sample_rate: self.sample_rate,
            duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finalize_concatenates_in_order() {
        let mut acc = BufferAccumulator::new(4);
        acc.push(SampleChunk::new(vec![1.0, 2.0], 4));
        acc.push(SampleChunk::new(vec![3.0], 4));
        acc.push(SampleChunk::new(vec![4.0, 5.0, 6.0], 4));

        let buf = acc.finalize().unwrap();
        assert_eq!(&*buf.samples, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(buf.sample_rate, 4);
        assert_eq!(buf.duration, 1.5);
    }

    #[test]
    fn finalize_runs_once() {
        let mut acc = BufferAccumulator::new(24_000);
        acc.finalize().unwrap();
        assert!(acc.finalize().is_err());
    }

    #[test]
    fn push_after_finalize_is_dropped() {
        let mut acc = BufferAccumulator::new(24_000);
        acc.finalize().unwrap();
        acc.push(SampleChunk::new(vec![1.0], 24_000));
        assert!(acc.chunks.is_empty());
        assert_eq!(acc.total_samples, 0);
    }

    #[test]
    fn empty_stream_has_zero_duration() {
        let mut acc = BufferAccumulator::new(24_000);
        let buf = acc.finalize().unwrap();
        assert!(buf.is_empty());
        assert_eq!(buf.duration, 0.0);
    }
}
