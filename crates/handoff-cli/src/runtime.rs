//! Handoff runtime helpers.
//!
//! Provides device enumeration, the paced PCM source, stdin control and the
//! blocking play loop.

use std::io::{self, BufRead};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender};
use stream_handoff::output::{CpalBufferedOutput, CpalStreamingOutput, device};
use stream_handoff::{
    BufferedOutput, CancelHandle, ChunkSource, Player, PlayerListener, ReaderSource,
    ResourceLocator, StreamingOutput, TransitionFault, WavEncoder,
};

use crate::config::PlayConfig;

const REWIND_SECONDS: f64 = 10.0;

/// List output devices and print them to stdout.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    device::list_devices(&host)
}

/// Interactive command read from stdin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    TogglePause,
    Rewind,
    Stop,
}

pub fn parse_control(line: &str) -> Option<Control> {
    match line.trim().to_ascii_lowercase().as_str() {
        "p" | "pause" => Some(Control::TogglePause),
        "r" | "rewind" => Some(Control::Rewind),
        "s" | "q" | "stop" | "quit" => Some(Control::Stop),
        _ => None,
    }
}

/// Source wrapper that sleeps before every read.
pub struct PacedSource<S> {
    inner: S,
    delay: Duration,
}

impl<S> PacedSource<S> {
    pub fn new(inner: S, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

impl<S: ChunkSource> ChunkSource for PacedSource<S> {
    fn next_chunk(&mut self) -> io::Result<Option<Vec<u8>>> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.inner.next_chunk()
    }
}

/// Logs player notifications and remembers when playback ended.
struct LogListener {
    ended: Arc<AtomicBool>,
}

impl PlayerListener for LogListener {
    fn play_state_changed(&mut self, playing: bool) {
        tracing::info!(playing, "play state");
    }

    fn audio_ready(&mut self, resource: &ResourceLocator, duration: f64) {
        tracing::info!(
            bytes = resource.len(),
            container = resource.container(),
            duration_s = duration,
            "full audio ready"
        );
    }

    fn ended(&mut self) {
        tracing::info!("playback ended");
        self.ended.store(true, Ordering::Relaxed);
    }

    fn transitioned(&mut self, position: f64) {
        tracing::info!(position_s = position, "handed off to buffered playback");
    }

    fn transition_fault(&mut self, fault: &TransitionFault) {
        tracing::warn!("handoff fault: {fault}");
    }

    fn device_suspended_changed(&mut self, suspended: bool) {
        if suspended {
            tracing::warn!("output device suspended; press enter to resume");
        } else {
            tracing::info!("output device running");
        }
    }

    fn chunk_rejected(&mut self, index: usize, reason: &str) {
        tracing::warn!(chunk = index, "chunk rejected by device: {reason}");
    }
}

/// Forward stdin lines as controls. `Stop` also cancels ingestion directly,
/// since the player can't look at the channel until the stream is read.
fn spawn_stdin_control(tx: Sender<Control>, cancel: CancelHandle) {
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            let Some(control) = parse_control(&line) else {
                tracing::debug!(line = %line.trim(), "ignoring unknown command");
                continue;
            };
            if control == Control::Stop {
                cancel.cancel();
            }
            if tx.send(control).is_err() {
                break;
            }
        }
    });
}

fn open_input(config: &PlayConfig) -> Result<Box<dyn io::Read + Send>> {
    if config.reads_stdin() {
        return Ok(Box::new(io::stdin()));
    }
    let file = std::fs::File::open(&config.input)
        .with_context(|| format!("open input {:?}", config.input))?;
    Ok(Box::new(file))
}

/// Stream the input through the player and block until playback ends or is stopped.
pub fn run_play(config: PlayConfig) -> Result<()> {
    let host = cpal::default_host();
    let output_device = device::pick_device(&host, config.device.as_deref())?;
    tracing::info!(device = %device::device_name(&output_device), "output device");

    let rate = config.handoff.sample_rate;
    let streaming = CpalStreamingOutput::open(&output_device, rate)
        .context("open streaming output")?;
    let buffered =
        CpalBufferedOutput::open(&output_device, rate).context("open buffered output")?;

    let ended = Arc::new(AtomicBool::new(false));
    let listener = LogListener {
        ended: ended.clone(),
    };
    let mut player = Player::new(
        config.handoff.clone(),
        streaming,
        buffered,
        WavEncoder,
        Box::new(listener),
    );
    player.init();

    let (control_tx, control_rx) = crossbeam_channel::unbounded();
    if config.reads_stdin() {
        tracing::info!("reading PCM from stdin; interactive control disabled");
    } else {
        tracing::info!("commands: p = pause/resume, r = rewind 10s, s = stop");
        spawn_stdin_control(control_tx, player.cancel_handle());
    }

    let source = PacedSource::new(
        ReaderSource::new(open_input(&config)?, config.read_bytes),
        config.chunk_delay,
    );
    let result = play_session(&mut player, source, &config, &control_rx, &ended);
    player.shutdown();
    result
}

/// Stream `source`, then keep the player running until playback ends or is stopped.
///
/// A failed read is returned only after the audio that did arrive has played out.
fn play_session<O, B, S>(
    player: &mut Player<O, B>,
    source: S,
    config: &PlayConfig,
    controls: &Receiver<Control>,
    ended: &AtomicBool,
) -> Result<()>
where
    O: StreamingOutput,
    B: BufferedOutput,
    S: ChunkSource,
{
    let streamed = player.start_streaming(source);
    if let Err(e) = &streamed {
        tracing::warn!("stream aborted; playing out received audio: {e:#}");
    }
    let driven = drive(player, config, controls, ended);
    streamed.and(driven)
}

fn drive<O, B>(
    player: &mut Player<O, B>,
    config: &PlayConfig,
    controls: &Receiver<Control>,
    ended: &AtomicBool,
) -> Result<()>
where
    O: StreamingOutput,
    B: BufferedOutput,
{
    let interval = config.handoff.poll_interval;
    let mut last_status = Instant::now();
    loop {
        for control in controls.try_iter() {
            if let Err(e) = player.notify_user_interaction() {
                tracing::warn!("resume after interaction failed: {e:#}");
            }
            match control {
                Control::TogglePause if player.is_playing() => player.pause()?,
                Control::TogglePause => player.play()?,
                Control::Rewind => player.rewind(REWIND_SECONDS)?,
                Control::Stop => {
                    player.stop();
                    tracing::info!("stopped");
                    return Ok(());
                }
            }
        }
        if ended.load(Ordering::Relaxed) {
            return Ok(());
        }

        player.poll_events(interval);

        if config.json && last_status.elapsed() >= interval {
            last_status = Instant::now();
            println!("{}", serde_json::to_string(&player.snapshot())?);
        }
    }
}
