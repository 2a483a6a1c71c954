mod cli;
mod config;
mod pump;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::BufReader;
use tracing::info;

use event_scribe::{EventSink, LocalBus};

use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Parse CLI args.
    let cli = Cli::parse();

    // 2. Load config, then merge CLI overrides.
    let mut cfg = config::load(&cli.config)?;

    if let Some(ref destination) = cli.destination {
        cfg.destination = destination.clone();
    }
    if let Some(ref tag) = cli.tag {
        cfg.tag = tag.clone();
    }
    if let Some(ref level) = cli.log_level {
        cfg.logging.level = level.clone();
    }

    // 3. Init tracing-subscriber with JSON format. Diagnostics go to stderr.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.logging.level));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    info!(
        config_file = %cli.config.display(),
        destination = %cfg.destination.display(),
        tag = %cfg.tag,
        "scribe starting"
    );

    // 4. Start the sink on an in-process bus.
    let bus = Arc::new(LocalBus::new());
    let mut sink = EventSink::new(cfg.sink_options()).context("invalid sink configuration")?;
    sink.start(bus.clone())
        .await
        .context("failed to start event sink")?;

    // 5. Pump stdin until EOF or ctrl-c.
    let stdin = BufReader::new(tokio::io::stdin());

    let pumped = tokio::select! {
        r = pump::pump(stdin, &bus, &cfg.tag) => Some(r),
        _ = tokio::signal::ctrl_c() => {
            info!("received SIGINT (ctrl-c)");
            None
        }
    };

    // 6. Drain and close the event log, even if reading failed.
    sink.stop();
    let summary = sink
        .finished()
        .await
        .context("event log did not close cleanly")?;

    if let Some(r) = pumped {
        let stats = r.context("failed to read events from stdin")?;
        info!(emitted = stats.emitted, skipped = stats.skipped, "end of input");
    }

    info!(
        lines = summary.lines,
        bytes = summary.bytes,
        "scribe shutting down"
    );

    Ok(())
}
