use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "handoff", version)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// Sample rate of the incoming PCM stream in Hz (the device must support it)
    #[arg(long, default_value_t = 24_000)]
    pub sample_rate: u32,

    /// Stay on the low-latency engine for the whole session
    #[arg(long)]
    pub no_transition: bool,

    /// Bytes requested per read (deliberately not a multiple of 4 is fine)
    #[arg(long, default_value_t = 4096)]
    pub read_bytes: usize,

    /// Delay before each read, to simulate network arrival
    #[arg(long, default_value_t = 0)]
    pub chunk_delay_ms: u64,

    /// Print a JSON status line on every poll tick
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Stream raw little-endian f32 mono PCM from a file, or `-` for stdin
    Play {
        path: PathBuf,
    },
}
