//! Container encoding of the accumulated samples.
//!
//! The buffered engine plays a self-contained resource; [`WavEncoder`] wraps the
//! samples in a 32-bit float WAV so the buffered engine hears exactly what the
//! streaming engine played.

use std::io::Cursor;
use std::sync::Arc;

use anyhow::{Context, Result};

/// Turns raw samples into a playable container.
pub trait ContainerEncoder {
    /// Encode mono `samples` at `sample_rate` into container bytes.
    fn encode(&self, samples: &[f32], sample_rate: u32) -> Result<Vec<u8>>;

    /// Container label (also used as the probe hint, e.g. `"wav"`).
    fn container(&self) -> &'static str;
}

/// Opaque handle to an encoded resource for the buffered engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceLocator {
    bytes: Arc<[u8]>,
    container: &'static str,
}

impl ResourceLocator {
    pub fn new(bytes: Vec<u8>, container: &'static str) -> Self {
        Self {
            bytes: bytes.into(),
            container,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn container(&self) -> &'static str {
        self.container
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Mono IEEE-float WAV encoder backed by `hound`.
#[derive(Clone, Copy, Debug, Default)]
pub struct WavEncoder;

impl ContainerEncoder for WavEncoder {
    fn encode(&self, samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };

        let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 4));
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).context("wav header")?;
            for &s in samples {
                writer.write_sample(s).context("wav sample")?;
            }
            writer.finalize().context("wav finalize")?;
        }
        Ok(cursor.into_inner())
    }

    fn container(&self) -> &'static str {
        "wav"
    }
}
