//! Buffered engine: decodes the encoded resource with Symphonia and plays it
//! from a seekable cursor on a cpal stream.

use std::io::Cursor;
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow, bail};
use crossbeam_channel::Sender;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::{
    codecs::DecoderOptions, formats::FormatOptions, io::MediaSourceStream, meta::MetadataOptions,
    probe::Hint,
};

use crate::decode::duration_secs;
use crate::encoder::ResourceLocator;
use crate::engine::{BufferedOutput, EngineEvent};
use crate::output::{build_output_stream, device};

/// Samples recovered from an encoded resource (first channel only).
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedResource {
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

/// Probe and fully decode `resource` into mono `f32` samples.
pub fn decode_resource(resource: &ResourceLocator) -> Result<DecodedResource> {
    let source = Cursor::new(resource.bytes().to_vec());
    let mss = MediaSourceStream::new(Box::new(source), Default::default());

    let mut hint = Hint::new();
    hint.with_extension(resource.container());

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| anyhow!("No default audio track"))?;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| anyhow!("Unknown sample rate"))?;
    let channels = track
        .codec_params
        .channels
        .ok_or_else(|| anyhow!("Unknown channels"))?
        .count()
        .max(1);
    let codec_params = track.codec_params.clone();

    let mut decoder =
        symphonia::default::get_codecs().make(&codec_params, &DecoderOptions::default())?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(_) => break, // EOF
        };

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(_) => continue,
        };

        let mut sample_buf = SampleBuffer::<f32>::new(decoded.frames() as u64, *decoded.spec());
        sample_buf.copy_interleaved_ref(decoded);
        samples.extend(sample_buf.samples().iter().step_by(channels).copied());
    }

    Ok(DecodedResource {
        sample_rate,
        samples,
    })
}

#[derive(Default)]
struct BufferedState {
    samples: Arc<[f32]>,
    pos: usize,
    playing: bool,
    events: Option<Sender<EngineEvent>>,
}

pub struct CpalBufferedOutput {
    state: Arc<Mutex<BufferedState>>,
    sample_rate: u32,
    _stream: cpal::Stream,
}

impl CpalBufferedOutput {
    /// Open `device` at exactly `sample_rate`. Nothing plays until a resource is loaded.
    pub fn open(device: &cpal::Device, sample_rate: u32) -> Result<Self> {
        use cpal::traits::StreamTrait;

        let supported = device::pick_output_config(device, sample_rate)?;
        let config = supported.config();
        tracing::info!(
            device = %device::device_name(device),
            rate_hz = sample_rate,
            channels = config.channels,
            "buffered output opened"
        );

        let state = Arc::new(Mutex::new(BufferedState::default()));
        let render_state = state.clone();
        let stream = build_output_stream(
            device,
            &config,
            supported.sample_format(),
            move |out: &mut [f32]| render_cursor(&render_state, out),
            |err| tracing::warn!("buffered output error: {err}"),
        )?;
        stream.play()?;

        Ok(Self {
            state,
            sample_rate,
            _stream: stream,
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BufferedState>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("buffered output state poisoned"))
    }
}

/// Copy from the cursor while playing; emits `BufferedEnded` once at the end.
fn render_cursor(state: &Mutex<BufferedState>, out: &mut [f32]) {
    let Ok(mut st) = state.lock() else {
        out.fill(0.0);
        return;
    };
    if !st.playing {
        out.fill(0.0);
        return;
    }

    let available = st.samples.len().saturating_sub(st.pos);
    let n = available.min(out.len());
    let start = st.pos;
    out[..n].copy_from_slice(&st.samples[start..start + n]);
    out[n..].fill(0.0);
    st.pos += n;

    if st.pos >= st.samples.len() {
        st.playing = false;
        if let Some(tx) = &st.events {
            let _ = tx.send(EngineEvent::BufferedEnded);
        }
    }
}

impl BufferedOutput for CpalBufferedOutput {
    fn attach(&mut self, events: Sender<EngineEvent>) {
        if let Ok(mut st) = self.state.lock() {
            st.events = Some(events);
        }
    }

    fn detach(&mut self) {
        if let Ok(mut st) = self.state.lock() {
            st.events = None;
        }
    }

    fn load(&mut self, resource: &ResourceLocator) -> Result<()> {
        let decoded = decode_resource(resource)?;
        if decoded.sample_rate != self.sample_rate {
            bail!(
                "resource rate {} Hz does not match device rate {} Hz",
                decoded.sample_rate,
                self.sample_rate
            );
        }

        let mut st = self.lock()?;
        tracing::debug!(samples = decoded.samples.len(), "buffered resource primed");
        st.samples = decoded.samples.into();
        st.pos = 0;
        st.playing = false;
        if let Some(tx) = &st.events {
            let _ = tx.send(EngineEvent::BufferedReady);
        }
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        let mut st = self.lock()?;
        if st.samples.is_empty() {
            bail!("no resource loaded");
        }
        st.playing = true;
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.lock()?.playing = false;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let mut st = self.lock()?;
        st.playing = false;
        st.pos = 0;
        st.samples = Arc::from(Vec::new());
        Ok(())
    }

    fn seek(&mut self, time: f64) -> Result<()> {
        if !time.is_finite() {
            bail!("invalid seek position {time}");
        }
        let mut st = self.lock()?;
        let frame = (time.max(0.0) * f64::from(self.sample_rate)).round() as usize;
        st.pos = frame.min(st.samples.len());
        Ok(())
    }

    fn current_time(&self) -> Result<f64> {
        let st = self.lock()?;
        Ok(duration_secs(st.pos, self.sample_rate))
    }
}
