//! `netsentry start` command handler.

use std::path::Path;

use tracing::info;

use netsentry_daemon::orchestrator::Orchestrator;

use crate::cli::StartArgs;
use crate::error::CliError;

/// Execute the `start` command: build the daemon's pipeline in this process
/// and run it until a shutdown signal arrives.
///
/// Unlike a production deployment (where `netsentry-daemon` runs as its own
/// supervised process), this launches the orchestrator in-process, making it
/// convenient for local development and manual testing.
pub async fn execute(args: StartArgs, config_path: &Path) -> Result<(), CliError> {
    let mut config = super::load_config(config_path).await?;

    if let Some(ref pid_file) = args.pid_file {
        config.general.pid_file = pid_file.clone();
    }

    info!(config = %config_path.display(), "starting netsentry in-process");

    let mut orchestrator = Orchestrator::build_from_config(config).await?;
    orchestrator.run().await?;

    Ok(())
}
