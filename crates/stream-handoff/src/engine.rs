//! Playback engine seams.
//!
//! The core drives two independently clocked engines:
//! - a low-latency [`StreamingOutput`] that plays chunks at scheduled times
//! - a seekable [`BufferedOutput`] that plays the fully encoded resource
//!
//! Engines report back through [`EngineEvent`]s sent on the channel handed to
//! `attach`. That registration happens once per player and is undone by `detach`.

use anyhow::Result;
use crossbeam_channel::Sender;

use crate::decode::SampleChunk;
use crate::encoder::ResourceLocator;

/// Opaque id of one chunk scheduled on a [`StreamingOutput`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkHandle(pub u64);

/// Notifications emitted by the engines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineEvent {
    /// A scheduled chunk finished playing naturally.
    ChunkFinished(ChunkHandle),
    /// The low-latency device was suspended by the platform.
    DeviceSuspended,
    /// The low-latency device is running again.
    DeviceRunning,
    /// The buffered engine primed its resource and can start playback.
    BufferedReady,
    /// The buffered engine reached the end of its resource.
    BufferedEnded,
}

/// Low-latency output device.
pub trait StreamingOutput {
    fn attach(&mut self, events: Sender<EngineEvent>);

    fn detach(&mut self);

    /// Play `chunk` starting at `start_time` on the device clock.
    fn schedule(&mut self, chunk: &SampleChunk, start_time: f64) -> Result<ChunkHandle>;

    /// Halt and release `handle`. Handles that already finished are a no-op.
    fn stop(&mut self, handle: ChunkHandle) -> Result<()>;

    /// Device clock in seconds.
    fn current_time(&self) -> Result<f64>;

    fn suspend(&mut self) -> Result<()>;

    fn resume(&mut self) -> Result<()>;
}

/// Seekable output device playing an encoded resource.
pub trait BufferedOutput {
    fn attach(&mut self, events: Sender<EngineEvent>);

    fn detach(&mut self);

    /// Start loading `resource`; [`EngineEvent::BufferedReady`] follows once primed.
    fn load(&mut self, resource: &ResourceLocator) -> Result<()>;

    fn play(&mut self) -> Result<()>;

    fn pause(&mut self) -> Result<()>;

    /// Stop playback and release the loaded resource.
    fn stop(&mut self) -> Result<()>;

    fn seek(&mut self, time: f64) -> Result<()>;

    fn current_time(&self) -> Result<f64>;
}
