//! CLI argument parsing using clap derive API.
//!
//! Purely declarative with no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// netsentry -- on-device network-defense agent for a router/AP.
///
/// Use `netsentry <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "netsentry", version, about, long_about = None)]
pub struct Cli {
    /// Path to the netsentry.toml configuration file.
    #[arg(short, long, default_value = "netsentry.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table / text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the netsentry daemon in-process (local/dev use).
    Start(StartArgs),

    /// Show the daemon's current system status.
    Status,

    /// List currently open threats.
    Threats,

    /// List currently active mitigation blocks.
    Blocks,

    /// Manage configuration.
    Config(ConfigArgs),
}

// ---- start ----

/// Start the netsentry daemon in this process.
#[derive(Args, Debug)]
pub struct StartArgs {
    /// Override PID file location.
    #[arg(long)]
    pub pid_file: Option<String>,
}

// ---- config ----

/// Manage netsentry configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
}
