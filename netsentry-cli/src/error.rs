//! CLI-specific error types and exit code mapping.

use netsentry_core::error::NetsentryError;

/// CLI-specific error type.
///
/// Each variant carries enough context for a user-friendly message. The
/// `exit_code()` method maps errors to standard Unix exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// The daemon has not written a status document yet (not running, or
    /// just started and hasn't completed its first write cycle).
    #[error("status document unavailable: {0}")]
    StatusUnavailable(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from netsentry-core.
    #[error("{0}")]
    Core(#[from] NetsentryError),

    /// The in-process daemon failed to start or exited with an error.
    #[error("daemon error: {0}")]
    Daemon(#[from] anyhow::Error),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                     |
    /// |------|------------------------------|
    /// | 0    | Success                      |
    /// | 1    | General / command error     |
    /// | 2    | Configuration error         |
    /// | 3    | Status document unavailable |
    /// | 10   | IO error                    |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::StatusUnavailable(_) => 3,
            Self::Io(_) => 10,
            Self::JsonSerialize(_) | Self::Command(_) | Self::Core(_) | Self::Daemon(_) => 1,
        }
    }
}
