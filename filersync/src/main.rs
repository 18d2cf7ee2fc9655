//! Replicates filer events read from stdin, one JSON encoded event per line:
//!
//! ```text
//! {"key": "/buckets/docs/a.txt", "event": {"new_entry": {"name": "a.txt", "chunks": [...]}}}
//! ```
//!
//! The sink is the first `[sink.<name>]` section with `enabled = true` in
//! `$CONFIG_PATH/replication.toml`.
use std::env;
use std::error::Error;

use filersync_core::config::{Configuration, ENV_CONFIG_PATH, FilerSourceConfig};
use filersync_core::replicator::Replicator;
use filersync_core::sinker::Sink;
use filersync_core::sinker::registry::SinkRegistry;
use filersync_core::source::FilerSource;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod setup_tracing;

const DEFAULT_CONFIG_PATH: &str = "config";

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    setup_tracing::register();

    if let Err(e) = run().await {
        error!("{e:?}");
        return Err(e);
    }
    info!("Exiting...");

    Ok(())
}

async fn run() -> Result<(), Box<dyn Error>> {
    let config_path = env::var(ENV_CONFIG_PATH).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
    let configuration = Configuration::load(&config_path)?;

    let registry = SinkRegistry::builtin()?.install()?;
    let kind = registry
        .enabled(&configuration)
        .ok_or_else(|| format!("no sink is enabled in {config_path}"))?;

    let source_config: FilerSourceConfig = configuration.section("source.filer").deserialize()?;
    let source = FilerSource::new(source_config)?;
    let sink = kind.initialize(
        &configuration.section("sink").section(kind.name()),
        source.clone(),
    )?;
    info!(
        sink = sink.name(),
        source_directory = source.directory(),
        sink_directory = sink.sink_to_directory(),
        "Replicating"
    );
    let replicator = Replicator::new(source.directory(), sink);

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    let stdin = BufReader::new(tokio::io::stdin());
    let replicated = replicator.replicate_events(stdin, &cancel).await?;
    info!(replicated, "Stopped replicating");

    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for interrupt");
        return;
    }
    info!("Received interrupt, shutting down");
    cancel.cancel();
}
