//! Gapless scheduling of decoded chunks on a virtual clock.
//!
//! Start times are derived purely from cumulative chunk durations, never from
//! arrival time, so irregular network delivery cannot open gaps or overlaps.
//! All times handed out by the scheduler are relative to the session anchor
//! (the device clock when the session began).

use anyhow::Result;

use crate::decode::SampleChunk;
use crate::engine::{ChunkHandle, StreamingOutput};

/// Owns the low-latency engine and the handles of every chunk it is playing.
pub struct PlaybackScheduler<O> {
    output: O,
    anchor: f64,
    next_start_time: f64,
    starts: Vec<f64>,
    active: Vec<ChunkHandle>,
    user_paused: bool,
    device_suspended: bool,
}

impl<O: StreamingOutput> PlaybackScheduler<O> {
    pub fn new(output: O) -> Self {
        Self {
            output,
            anchor: 0.0,
            next_start_time: 0.0,
            starts: Vec::new(),
            active: Vec::new(),
            user_paused: false,
            device_suspended: false,
        }
    }

    /// Start a fresh timeline anchored at the device clock's current value.
    ///
    /// Stops anything still playing from a previous timeline.
    pub fn begin(&mut self) -> Result<()> {
        self.stop();
        self.starts.clear();
        self.next_start_time = 0.0;
        if self.user_paused {
            self.user_paused = false;
            self.output.resume()?;
        }
        self.anchor = self.output.current_time()?;
        Ok(())
    }

    /// Schedule `chunk` right after the previous one.
    ///
    /// The timeline advances by the chunk's duration even when the device
    /// rejects it, keeping the virtual clock aligned with the accumulated audio.
    pub fn schedule(&mut self, chunk: &SampleChunk) -> Result<ChunkHandle> {
        let start = self.next_start_time;
        self.next_start_time += chunk.duration();
        self.starts.push(start);

        let handle = self.output.schedule(chunk, self.anchor + start)?;
        self.active.push(handle);
        tracing::debug!(
            handle = handle.0,
            start_s = start,
            duration_s = chunk.duration(),
            "chunk scheduled"
        );
        Ok(handle)
    }

    /// Halt and release every recorded handle. Safe to call repeatedly.
    pub fn stop(&mut self) {
        for handle in self.active.drain(..) {
            if let Err(e) = self.output.stop(handle) {
                tracing::debug!(handle = handle.0, "stop failed (ignored): {e:#}");
            }
        }
    }

    /// Suspend the device clock; the timeline and handles are kept.
    pub fn pause(&mut self) -> Result<()> {
        if self.user_paused {
            return Ok(());
        }
        self.output.suspend()?;
        self.user_paused = true;
        Ok(())
    }

    /// Resume the device clock after [`pause`](Self::pause) or a platform suspension.
    pub fn resume(&mut self) -> Result<()> {
        if !self.user_paused && !self.device_suspended {
            return Ok(());
        }
        self.output.resume()?;
        self.user_paused = false;
        self.device_suspended = false;
        Ok(())
    }

    /// Elapsed time on the virtual clock, clamped to what has been scheduled.
    pub fn current_time(&self) -> Result<f64> {
        let now = self.output.current_time()?;
        Ok((now - self.anchor).clamp(0.0, self.next_start_time))
    }

    /// Record a natural finish. Unknown handles (already stopped) are ignored.
    ///
    /// Returns `true` when the handle was active.
    pub fn chunk_finished(&mut self, handle: ChunkHandle) -> bool {
        let before = self.active.len();
        self.active.retain(|h| *h != handle);
        before != self.active.len()
    }

    /// Track a platform suspension. Returns `true` if the observable flag changed.
    ///
    /// Suspensions caused by [`pause`](Self::pause) are not reported.
    pub fn set_device_suspended(&mut self, suspended: bool) -> bool {
        let flag = suspended && !self.user_paused;
        let changed = flag != self.device_suspended;
        self.device_suspended = flag;
        changed
    }

    /// Resume after a user interaction if the platform suspended the device.
    pub fn resume_after_interaction(&mut self) -> Result<bool> {
        if !self.device_suspended || self.user_paused {
            return Ok(false);
        }
        self.output.resume()?;
        self.device_suspended = false;
        Ok(true)
    }

    pub fn is_device_suspended(&self) -> bool {
        self.device_suspended
    }

    /// `true` once every scheduled chunk has finished or been stopped.
    pub fn is_drained(&self) -> bool {
        self.active.is_empty()
    }

    /// Session-relative start time of each scheduled chunk, in order.
    pub fn start_times(&self) -> &[f64] {
        &self.starts
    }

    /// Total scheduled duration (the next chunk's start time).
    pub fn scheduled_duration(&self) -> f64 {
        self.next_start_time
    }

    pub fn output_mut(&mut self) -> &mut O {
        &mut self.output
    }

}
