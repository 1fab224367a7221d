//! Low-latency PCM streaming with a handoff to a seekable buffered engine.
//!
//! Raw little-endian `f32` mono bytes are decoded and scheduled back-to-back on
//! a streaming engine as they arrive. When the stream ends the samples are
//! encoded into a WAV resource, loaded into a buffered engine, and playback
//! moves there at the current position so it can be paused and rewound.

pub mod accumulator;
pub mod config;
pub mod decode;
pub mod encoder;
pub mod engine;
pub mod listener;
pub mod output;
pub mod player;
pub mod scheduler;
pub mod source;
pub mod status;
pub mod tracker;
pub mod transition;

pub use config::HandoffConfig;
pub use encoder::{ContainerEncoder, ResourceLocator, WavEncoder};
pub use engine::{BufferedOutput, ChunkHandle, EngineEvent, StreamingOutput};
pub use listener::{NoopListener, PlayerListener};
pub use player::{CancelHandle, Player};
pub use source::{ChunkSource, ReaderSource};
pub use status::PlayerSnapshot;
pub use transition::{TransitionFault, TransitionState};
