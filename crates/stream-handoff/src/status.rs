use serde::Serialize;

use crate::transition::TransitionState;

/// Point-in-time view of a player, suitable for logs or JSON output.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PlayerSnapshot {
    /// Session counter; `0` before the first stream.
    pub session: u64,
    pub state: TransitionState,
    pub playing: bool,
    /// Last published position in seconds.
    pub current_time: f64,
    /// Known duration in seconds (grows while streaming).
    pub duration: f64,
    pub stream_complete: bool,
    pub device_suspended: bool,
    /// Text of the handoff fault, when the handoff completed inconsistently.
    pub transition_fault: Option<String>,
}
