// SPDX-License-Identifier: MIT OR Apache-2.0
//! `MontagePro` preview - headless montage playback
//!
//! Loads a scenario file, plays its montage through a playback task on an
//! in-memory animator and prints every lifecycle and notify event the task
//! reports.
//!
//! ## Usage
//!
//! ```text
//! montage-pro-preview <scenario.ron> [--tick <seconds>] [--json]
//! ```
//!
//! Logs go to stderr; set `RUST_LOG` to change verbosity.

mod error;
mod preview;
mod scenario;
mod sim_host;

use clap::Parser;
use error::Result;
use scenario::Scenario;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "montage-pro-preview")]
#[command(about = "Play a montage scenario headlessly and print the task's events")]
#[command(version)]
struct Cli {
    /// Scenario file (RON)
    scenario: PathBuf,

    /// Simulation step in seconds
    #[arg(long, default_value = "0.016666668")]
    tick: f32,

    /// Print events as JSON lines
    #[arg(long)]
    json: bool,
}

fn run(cli: &Cli) -> Result<()> {
    let scenario = Scenario::load(&cli.scenario)?;
    let run = preview::run_scenario(&scenario, cli.tick)?;

    let stdout = std::io::stdout();
    run.write_to(&mut stdout.lock(), cli.json)?;

    tracing::info!(
        "Task {:?}: {} definition callbacks, {} notifies never delivered",
        run.final_state,
        run.callbacks.len(),
        run.pending
    );
    Ok(())
}

fn main() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("montage_pro_preview=info,montage_pro_task=info,montage_pro_notify=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    tracing::info!("Starting MontagePro preview v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(&cli) {
        tracing::error!("Preview failed: {e}");
        std::process::exit(1);
    }
}
