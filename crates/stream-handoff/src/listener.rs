//! Caller-facing notifications.

use crate::encoder::ResourceLocator;
use crate::transition::TransitionFault;

/// Fixed set of notifications a player emits. Every method defaults to a no-op.
///
/// Listeners are invoked synchronously from the thread driving the player.
pub trait PlayerListener {
    fn play_state_changed(&mut self, _playing: bool) {}

    /// The stream ended and its full encoding is available.
    fn audio_ready(&mut self, _resource: &ResourceLocator, _duration: f64) {}

    /// Playback reached the end of the session's audio.
    fn ended(&mut self) {}

    /// Playback authority moved to the buffered engine at `position`.
    fn transitioned(&mut self, _position: f64) {}

    fn transition_fault(&mut self, _fault: &TransitionFault) {}

    fn device_suspended_changed(&mut self, _suspended: bool) {}

    /// The low-latency device refused chunk `index`; the timeline skipped over it.
    fn chunk_rejected(&mut self, _index: usize, _reason: &str) {}

    fn time_update(&mut self, _time: f64) {}
}

/// Listener that ignores every notification.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopListener;

impl PlayerListener for NoopListener {}
