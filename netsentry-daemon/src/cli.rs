//! CLI argument definitions for netsentry-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// On-device network-defense agent for a router/AP.
///
/// Ingests captured traffic, runs the ARP-spoofing, DDoS, scan, and
/// brute-force detectors, and reconciles open threats against the
/// packet-filter driver.
#[derive(Parser, Debug)]
#[command(name = "netsentry-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to netsentry.toml configuration file.
    #[arg(short, long, default_value = "/etc/netsentry/netsentry.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,

    /// Override PID file path (takes precedence over config file).
    #[arg(long)]
    pub pid_file: Option<String>,
}
