//! Error taxonomy, following the fatal-on-start / transient-I/O / event-loss
//! / detection-logic / mitigation-refusal categories of the error handling
//! design: each domain gets its own `thiserror` enum, folded into one
//! top-level error via `#[from]`.

/// Top-level crate error.
#[derive(Debug, thiserror::Error)]
pub enum NetsentryError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("detection error: {0}")]
    Detection(#[from] DetectionError),

    #[error("mitigation error: {0}")]
    Mitigation(#[from] MitigationError),

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration load/validate errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Packet source errors. `PrivilegeDenied` and `ChainCreationFailed` are
/// fatal-on-start; the rest are transient and logged at WARN by their
/// owning component.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("insufficient privilege to open raw capture on '{interface}'")]
    PrivilegeDenied { interface: String },

    #[error("capture backend unavailable on '{interface}': {reason}")]
    BackendUnavailable { interface: String, reason: String },

    #[error("raw socket would block: {0}")]
    WouldBlock(String),
}

/// Detector-internal errors (neighbor-table reads, sketch misuse).
#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("neighbor table read failed: {0}")]
    NeighborTableRead(String),

    #[error("default route read failed: {0}")]
    DefaultRouteRead(String),

    #[error("invalid sketch dimensions: width={width} depth={depth}")]
    InvalidSketchDimensions { width: usize, depth: usize },
}

/// Mitigation controller / packet-filter driver errors. A driver refusal
/// (whitelist hit, already blocked) is not modeled as an error — only
/// genuine driver command failures are.
#[derive(Debug, thiserror::Error)]
pub enum MitigationError {
    #[error("failed to ensure filter chain '{chain}': {reason}")]
    ChainCreationFailed { chain: String, reason: String },

    #[error("driver command failed (exit {exit_code}): {command}")]
    DriverCommandFailed { command: String, exit_code: i32 },

    #[error("no active block found for handle {0}")]
    UnknownHandle(String),
}

/// Frame / neighbor-table text parsing errors.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("frame too short for claimed protocol: {protocol} needs {min} bytes, got {got}")]
    FrameTooShort {
        protocol: String,
        min: usize,
        got: usize,
    },

    #[error("malformed neighbor table row: {0}")]
    MalformedRow(String),

    #[error("no default route found")]
    NoDefaultRoute,
}

/// Module lifecycle errors (start/stop misuse, channel failures).
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("module already running")]
    AlreadyRunning,

    #[error("module not running")]
    NotRunning,

    #[error("channel send failed: {0}")]
    ChannelSend(String),

    #[error("module init failed: {0}")]
    InitFailed(String),
}
