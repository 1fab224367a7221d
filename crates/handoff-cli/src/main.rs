//! handoff: stream raw PCM to an output device with low latency, then hand
//! playback to a seekable buffered engine once the stream is complete.

mod cli;
mod config;
mod runtime;

use anyhow::{Result, bail};
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,stream_handoff=info,handoff=info")
        }))
        .init();

    if args.list_devices {
        return runtime::list_devices();
    }

    let _ = ctrlc::set_handler(move || {
        std::process::exit(130);
    });

    match &args.cmd {
        Some(cli::Command::Play { path }) => {
            let config = config::PlayConfig::from_args(&args, path.clone());
            runtime::run_play(config)
        }
        None => bail!("nothing to do; use `handoff play <PATH|->` or --list-devices"),
    }
}
