use std::path::PathBuf;
use std::time::Duration;

use stream_handoff::HandoffConfig;

use crate::cli::Args;

/// Everything `handoff play` needs besides the core player config.
#[derive(Clone, Debug)]
pub struct PlayConfig {
    pub input: PathBuf,
    pub device: Option<String>,
    pub read_bytes: usize,
    pub chunk_delay: Duration,
    pub json: bool,
    pub handoff: HandoffConfig,
}

impl PlayConfig {
    pub fn from_args(args: &Args, input: PathBuf) -> Self {
        Self {
            input,
            device: normalize_device_name(args.device.clone()),
            read_bytes: args.read_bytes.max(1),
            chunk_delay: Duration::from_millis(args.chunk_delay_ms),
            json: args.json,
            handoff: HandoffConfig::default()
                .with_sample_rate(args.sample_rate)
                .with_transition(!args.no_transition),
        }
    }

    /// `-` means the PCM arrives on stdin, which then can't carry commands.
    pub fn reads_stdin(&self) -> bool {
        self.input.as_os_str() == "-"
    }
}

fn normalize_device_name(device: Option<String>) -> Option<String> {
    device.and_then(|name| {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
