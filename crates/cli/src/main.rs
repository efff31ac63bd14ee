//! wurmloch: watch a drop directory and file everything that lands in it.

mod cli;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use wurmloch_engine::Watcher;
use wurmloch_rules::seed;

use crate::cli::CliArgs;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before the filter is read so WURMLOCH_LOG can live there.
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("WURMLOCH_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    let rules_path = config::resolve_rules_path(&args)?;
    // Logs on its own when it writes the examples.
    seed::ensure_rules_file(&rules_path)
        .with_context(|| format!("failed to create rules file: {}", rules_path.display()))?;

    let engine_config = config::engine_config(&args, rules_path);
    Watcher::new(engine_config)
        .run(shutdown_signal())
        .await
        .context("wormhole engine stopped with an error")?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to register SIGTERM handler");
                ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await;
    }

    info!("shutdown signal received");
}
