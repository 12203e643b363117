// ── Core error types ──
//
// Engine-level errors. None of these terminate the process: resolution
// failures and malformed samples drop a single event, connection losses
// tear down the simulator session and the supervisor starts over. The
// `From<xpanel_api::Error>` impl sorts transport failures into those
// buckets.

use thiserror::Error;

use crate::transform::TransformError;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Simulator errors ─────────────────────────────────────────────
    #[error("Simulator connection lost: {reason}")]
    ConnectionLost { reason: String },

    #[error("Cannot resolve {kind} '{name}': {reason}")]
    ResolutionFailure {
        kind: &'static str,
        name: String,
        reason: String,
    },

    #[error("Simulator rejected request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    // ── Hardware errors ──────────────────────────────────────────────
    #[error("Malformed hardware sample: expected {expected} bytes, got {got}")]
    MalformedSample { expected: usize, got: usize },

    #[error("Hardware I/O error on {device}: {reason}")]
    Hardware { device: String, reason: String },

    #[error("Hardware protocol error: {message}")]
    Protocol { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Invalid mapping: {message}")]
    InvalidMapping { message: String },

    #[error(transparent)]
    Transform(#[from] TransformError),

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// `true` when the error should end the current simulator session.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, Self::ConnectionLost { .. })
    }

    pub(crate) fn invalid_mapping(message: impl Into<String>) -> Self {
        Self::InvalidMapping {
            message: message.into(),
        }
    }

    pub(crate) fn hardware(device: &str, err: &impl std::fmt::Display) -> Self {
        Self::Hardware {
            device: device.to_owned(),
            reason: err.to_string(),
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<xpanel_api::Error> for CoreError {
    fn from(err: xpanel_api::Error) -> Self {
        if err.is_transient() {
            return CoreError::ConnectionLost {
                reason: err.to_string(),
            };
        }
        match err {
            xpanel_api::Error::NotFound { kind, name } => CoreError::ResolutionFailure {
                kind,
                name,
                reason: "no match".into(),
            },
            xpanel_api::Error::Api { status, message } => CoreError::Rejected { status, message },
            xpanel_api::Error::SubscriptionRejected { message } => CoreError::ConnectionLost {
                reason: format!("subscription rejected: {message}"),
            },
            xpanel_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
            other => CoreError::Internal(other.to_string()),
        }
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::Hardware {
            device: "io".into(),
            reason: err.to_string(),
        }
    }
}
