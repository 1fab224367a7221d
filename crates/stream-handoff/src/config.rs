use std::time::Duration;

/// Tuning parameters shared by the decoder, scheduler and transition stages.
#[derive(Clone, Debug)]
pub struct HandoffConfig {
    /// Sample rate of the incoming PCM stream and the low-latency device, in Hz.
    pub sample_rate: u32,
    /// When `false` the session never leaves [`TransitionState::Streaming`].
    ///
    /// [`TransitionState::Streaming`]: crate::transition::TransitionState::Streaming
    pub enable_transition: bool,
    /// Cadence of the position tracker while playing.
    pub poll_interval: Duration,
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self {
            sample_rate: 24_000,
            enable_transition: true,
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl HandoffConfig {
    /// Override the sample rate, keeping the other defaults.
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Enable or disable the streaming → buffered handoff.
    pub fn with_transition(mut self, enabled: bool) -> Self {
        self.enable_transition = enabled;
        self
    }
}
