//! pocketplay: load, inspect and play tracks through the streaming engine.
//!
//! Interactive `play` reads transport commands from stdin; `render` runs the
//! same driver callback offline and writes raw PCM.

use anyhow::Result;
use clap::Parser;
use player_cli::cli::{Args, Command};
use player_cli::config::PlayerConfig;
use player_cli::runtime;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,stream_engine=info,player_cli=info")
        }))
        .with_writer(std::io::stderr)
        .init();

    let config = PlayerConfig::from_args(&args)?;
    tracing::debug!(?config, "resolved config");

    match &args.cmd {
        Command::ListDevices => runtime::list_devices(),
        Command::Probe { path } => runtime::probe(&config, path),
        Command::Info { path } => runtime::info(&config, path),
        Command::Play { path, seek, paused } => runtime::play(&config, path, *seek, *paused),
        Command::Render { path, out, seconds } => {
            runtime::render(&config, path, out, *seconds).map(|_| ())
        }
    }
}
