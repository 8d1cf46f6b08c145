//! Command handlers -- one module per subcommand.

pub mod blocks;
pub mod config;
pub mod start;
pub mod status;
pub mod threats;

use std::path::Path;

use netsentry_core::config::NetsentryConfig;

use crate::error::CliError;

/// Loads configuration the same way the daemon does: missing file falls
/// back to defaults with a warning rather than failing outright.
pub(crate) async fn load_config(config_path: &Path) -> Result<NetsentryConfig, CliError> {
    let mut config = if config_path.exists() {
        NetsentryConfig::from_file(config_path).await?
    } else {
        tracing::warn!(path = %config_path.display(), "config file not found, using defaults");
        NetsentryConfig::default()
    };
    config.apply_env_overrides();
    Ok(config)
}

/// Reads and parses one of the daemon's periodic status documents.
pub(crate) async fn read_status_document<T: serde::de::DeserializeOwned>(
    data_dir: &Path,
    file_name: &str,
) -> Result<T, CliError> {
    let path = data_dir.join(file_name);
    let bytes = tokio::fs::read(&path).await.map_err(|e| {
        CliError::StatusUnavailable(format!(
            "could not read {} ({}): is the daemon running?",
            path.display(),
            e
        ))
    })?;
    serde_json::from_slice(&bytes).map_err(CliError::JsonSerialize)
}
