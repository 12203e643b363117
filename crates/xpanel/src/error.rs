//! CLI error types with miette diagnostics.
//!
//! Maps core and config errors into user-facing errors with help text
//! and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use xpanel_config::ConfigError;
use xpanel_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const CONFIG: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const HARDWARE: i32 = 5;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Simulator ────────────────────────────────────────────────────
    #[error("Could not reach the simulator at {url}")]
    #[diagnostic(
        code(xpanel::connection_failed),
        help(
            "Check that X-Plane is running and its web API is enabled.\n\
             URL: {url}"
        )
    )]
    ConnectionFailed {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("{kind} '{name}' not found in the simulator")]
    #[diagnostic(
        code(xpanel::not_found),
        help("Names are case sensitive; check the aircraft is loaded.")
    )]
    NotFound { kind: String, name: String },

    #[error("Simulator rejected the request (HTTP {status}): {message}")]
    #[diagnostic(code(xpanel::rejected))]
    Rejected { status: u16, message: String },

    #[error("Gave up reconnecting to the simulator")]
    #[diagnostic(
        code(xpanel::gave_up),
        help("Raise engine.reconnect_max_retries or leave it unset to retry forever.")
    )]
    GaveUp,

    // ── Hardware ─────────────────────────────────────────────────────
    #[error("No serial port configured")]
    #[diagnostic(
        code(xpanel::no_serial_port),
        help("Set hardware.serial_port in {path} or pass --port.")
    )]
    NoSerialPort { path: String },

    #[error("Hardware error: {message}")]
    #[diagnostic(
        code(xpanel::hardware),
        help("Check the cable and that the board runs MobiFlight-compatible firmware.")
    )]
    Hardware { message: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("No mapping table configured")]
    #[diagnostic(
        code(xpanel::no_mapping),
        help("Set hardware.mapping in {path} or pass the mapping file explicitly.")
    )]
    NoMapping { path: String },

    #[error(transparent)]
    #[diagnostic(code(xpanel::config))]
    Config(#[from] ConfigError),

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(xpanel::validation))]
    Validation { field: String, reason: String },

    // ── Internal ─────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::GaveUp => exit_code::CONNECTION,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::NoSerialPort { .. } | Self::Hardware { .. } => exit_code::HARDWARE,
            Self::NoMapping { .. } | Self::Config(_) => exit_code::CONFIG,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }

    /// Classify a core error, naming `url` for connection failures.
    pub fn from_core(err: CoreError, url: &str) -> Self {
        match err {
            CoreError::ConnectionLost { reason } => Self::ConnectionFailed {
                url: url.to_owned(),
                source: reason.into(),
            },
            other => other.into(),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionLost { reason } => Self::ConnectionFailed {
                url: "(simulator)".into(),
                source: reason.into(),
            },
            CoreError::ResolutionFailure { kind, name, .. } => Self::NotFound {
                kind: kind.into(),
                name,
            },
            CoreError::Rejected { status, message } => Self::Rejected { status, message },
            CoreError::MalformedSample { expected, got } => Self::Validation {
                field: "hardware.frame_bytes".into(),
                reason: format!("the board produces {got}-byte samples, mapping expects {expected}"),
            },
            CoreError::Hardware { .. } | CoreError::Protocol { .. } => Self::Hardware {
                message: err.to_string(),
            },
            CoreError::InvalidMapping { .. } | CoreError::Transform(_) => {
                Self::Config(ConfigError::Mapping(err))
            }
            CoreError::Internal(message) => Self::Internal(message),
        }
    }
}
