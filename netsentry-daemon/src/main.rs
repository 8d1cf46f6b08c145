//! Netsentry daemon -- main entry point.
//!
//! The daemon orchestrates the full on-device network-defense pipeline:
//! packet capture, event routing, the four attack detectors, the adaptive
//! baseline tracker, the threat registry, and the mitigation controller.
//!
//! # Usage
//!
//! ```text
//! netsentry-daemon --config /etc/netsentry/netsentry.toml
//! netsentry-daemon --validate    # validate config and exit
//! netsentry-daemon --log-level debug --log-format pretty
//! ```

mod cli;
mod health;
mod logging;
mod metrics_server;
mod modules;
mod orchestrator;
mod status;

use anyhow::Result;
use clap::Parser;

use crate::cli::DaemonCli;
use crate::orchestrator::Orchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    let mut config = if cli.config.exists() {
        netsentry_core::config::NetsentryConfig::from_file(&cli.config)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config from {}: {}", cli.config.display(), e))?
    } else {
        tracing::warn!(path = %cli.config.display(), "config file not found, using defaults");
        netsentry_core::config::NetsentryConfig::default()
    };
    config.apply_env_overrides();

    if let Some(ref level) = cli.log_level {
        config.general.log_level = level.clone();
    }
    if let Some(ref format) = cli.log_format {
        config.general.log_format = format.clone();
    }
    if let Some(ref pid_file) = cli.pid_file {
        config.general.pid_file = pid_file.clone();
    }

    if cli.validate {
        match config.validate() {
            Ok(()) => {
                let _guard = tracing_subscriber::fmt().with_env_filter("info").try_init();
                tracing::info!("configuration is valid");
                return Ok(());
            }
            Err(e) => {
                return Err(anyhow::anyhow!("configuration validation failed: {}", e));
            }
        }
    }

    logging::init_tracing(&config.general)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config_path = %cli.config.display(),
        "netsentry-daemon starting"
    );

    if config.metrics.enabled {
        metrics_server::install_metrics_recorder(&config.metrics)?;
    }

    let mut orchestrator = Orchestrator::build_from_config(config).await?;
    orchestrator.run().await?;

    tracing::info!("netsentry-daemon shut down cleanly");
    Ok(())
}
