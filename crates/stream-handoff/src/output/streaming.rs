//! Low-latency engine: plays scheduled chunks back-to-back on a cpal stream.
//!
//! The device clock counts frames actually rendered, so it stalls during
//! underruns and while suspended. Chunks are rendered in scheduling order;
//! the scheduler's contiguous start times make that the same as honouring
//! each start time.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use crossbeam_channel::Sender;

use crate::decode::{SampleChunk, duration_secs};
use crate::engine::{ChunkHandle, EngineEvent, StreamingOutput};
use crate::output::{build_output_stream, device};

struct QueuedChunk {
    handle: ChunkHandle,
    samples: Arc<[f32]>,
    pos: usize,
}

#[derive(Default)]
struct StreamingState {
    queue: VecDeque<QueuedChunk>,
    rendered_frames: u64,
    suspended: bool,
    events: Option<Sender<EngineEvent>>,
}

pub struct CpalStreamingOutput {
    state: Arc<Mutex<StreamingState>>,
    sample_rate: u32,
    next_handle: u64,
    _stream: cpal::Stream,
}

impl CpalStreamingOutput {
    /// Open `device` at exactly `sample_rate` and start its (initially silent) stream.
    pub fn open(device: &cpal::Device, sample_rate: u32) -> Result<Self> {
        use cpal::traits::StreamTrait;

        let supported = device::pick_output_config(device, sample_rate)?;
        let config = supported.config();
        tracing::info!(
            device = %device::device_name(device),
            rate_hz = sample_rate,
            channels = config.channels,
            format = ?supported.sample_format(),
            "streaming output opened"
        );

        let state = Arc::new(Mutex::new(StreamingState::default()));
        let render_state = state.clone();
        let error_state = state.clone();
        let stream = build_output_stream(
            device,
            &config,
            supported.sample_format(),
            move |out: &mut [f32]| render_queue(&render_state, out),
            move |err| {
                tracing::warn!("streaming output error: {err}");
                if let Ok(st) = error_state.lock() {
                    if let Some(tx) = &st.events {
                        let _ = tx.send(EngineEvent::DeviceSuspended);
                    }
                }
            },
        )?;
        stream.play()?;

        Ok(Self {
            state,
            sample_rate,
            next_handle: 0,
            _stream: stream,
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, StreamingState>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("streaming output state poisoned"))
    }
}

/// Fill `out` from the chunk queue; silence when suspended or starved.
fn render_queue(state: &Mutex<StreamingState>, out: &mut [f32]) {
    let Ok(mut st) = state.lock() else {
        out.fill(0.0);
        return;
    };
    if st.suspended {
        out.fill(0.0);
        return;
    }

    let mut filled = 0usize;
    while filled < out.len() {
        let Some(front) = st.queue.front_mut() else {
            break;
        };
        let n = (front.samples.len() - front.pos).min(out.len() - filled);
        out[filled..filled + n].copy_from_slice(&front.samples[front.pos..front.pos + n]);
        front.pos += n;
        filled += n;
        if front.pos >= front.samples.len() {
            let handle = front.handle;
            st.queue.pop_front();
            if let Some(tx) = &st.events {
                let _ = tx.send(EngineEvent::ChunkFinished(handle));
            }
        }
    }
    out[filled..].fill(0.0);
    st.rendered_frames += filled as u64;
}

impl StreamingOutput for CpalStreamingOutput {
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

    fn schedule(&mut self, chunk: &SampleChunk, start_time: f64) -> Result<ChunkHandle> {
        if chunk.sample_rate() != self.sample_rate {
            return Err(anyhow!(
                "chunk rate {} Hz does not match device rate {} Hz",
                chunk.sample_rate(),
                self.sample_rate
            ));
        }
        self.next_handle += 1;
        let handle = ChunkHandle(self.next_handle);
        let mut st = self.lock()?;
        st.queue.push_back(QueuedChunk {
            handle,
            samples: chunk.shared_samples(),
            pos: 0,
        });
        tracing::trace!(handle = handle.0, start_s = start_time, queued = st.queue.len(), "chunk queued");
        Ok(handle)
    }

    fn stop(&mut self, handle: ChunkHandle) -> Result<()> {
        let mut st = self.lock()?;
        st.queue.retain(|c| c.handle != handle);
        Ok(())
    }

    fn current_time(&self) -> Result<f64> {
        let st = self.lock()?;
        Ok(duration_secs(st.rendered_frames as usize, self.sample_rate))
    }

    fn suspend(&mut self) -> Result<()> {
        self.lock()?.suspended = true;
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        self.lock()?.suspended = false;
        Ok(())
    }
}
