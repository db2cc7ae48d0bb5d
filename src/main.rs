use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use codenexta_quota::{create_store, Config, QuotaTracker};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;

fn main() -> Result<ExitCode> {
    let cli = cli::Cli::parse();
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "codenexta_quota=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    debug!(backend = ?config.store.backend, key = %config.quota.storage_key, "Loaded configuration");

    let store = create_store(&config.store)?;
    let tracker = QuotaTracker::with_system_clock(store, config.quota);

    cli::run(cli, &tracker)
}
