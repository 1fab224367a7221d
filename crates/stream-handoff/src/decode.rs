//! Raw PCM byte stream decode stage.
//!
//! Incoming bytes are little-endian `f32` mono samples. Network reads rarely
//! land on sample boundaries, so up to three trailing bytes are held back and
//! prepended to the next read.

use std::sync::Arc;

/// Bytes per encoded sample (`f32`).
pub const BYTES_PER_SAMPLE: usize = 4;

/// An immutable run of decoded mono `f32` samples.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleChunk {
    samples: Arc<[f32]>,
    sample_rate: u32,
}

impl SampleChunk {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Shared handle to the sample storage (no copy).
    pub fn shared_samples(&self) -> Arc<[f32]> {
        self.samples.clone()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Duration in seconds (`len / sample_rate`).
    pub fn duration(&self) -> f64 {
        duration_secs(self.samples.len(), self.sample_rate)
    }
}

/// Seconds covered by `samples` at `sample_rate`; zero for a zero rate.
pub fn duration_secs(samples: usize, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }
    samples as f64 / f64::from(sample_rate)
}

/// Turns arbitrarily split byte reads into aligned sample chunks.
#[derive(Debug)]
pub struct ByteStreamDecoder {
    sample_rate: u32,
    leftover: Vec<u8>,
    bytes_in: u64,
}

impl ByteStreamDecoder {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            leftover: Vec::with_capacity(BYTES_PER_SAMPLE),
            bytes_in: 0,
        }
    }

    /// Decode `incoming` together with any bytes held back from the previous call.
    ///
    /// Returns an empty chunk when fewer than four bytes are available in total.
    pub fn decode(&mut self, incoming: &[u8]) -> SampleChunk {
        self.bytes_in += incoming.len() as u64;

        let mut data = std::mem::take(&mut self.leftover);
        data.extend_from_slice(incoming);

        let frames = data.chunks_exact(BYTES_PER_SAMPLE);
        self.leftover = frames.remainder().to_vec();
        let samples: Vec<f32> = frames
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        SampleChunk::new(samples, self.sample_rate)
    }

    /// Bytes currently held back (0..=3).
    pub fn leftover_len(&self) -> usize {
        self.leftover.len()
    }

    /// Total bytes fed into [`decode`](Self::decode).
    pub fn bytes_in(&self) -> u64 {
        self.bytes_in
    }
}
