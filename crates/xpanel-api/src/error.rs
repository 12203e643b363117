use thiserror::Error;

/// Top-level error type for the `xpanel-api` crate.
///
/// Covers every failure mode of the simulator web API: HTTP transport,
/// non-success statuses, name lookups that come back empty, and the
/// websocket subscription channel. `xpanel-core` decides which of these
/// are session-fatal and which only drop a single write.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// HTTP client could not be constructed.
    #[error("HTTP client setup failed: {0}")]
    ClientSetup(String),

    // ── REST API ────────────────────────────────────────────────────
    /// The simulator answered with a non-200 status.
    #[error("Simulator API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// A name lookup succeeded at the HTTP level but matched nothing.
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// WebSocket closed unexpectedly.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    /// The simulator refused the dataref subscription.
    #[error("Subscription rejected: {message}")]
    SubscriptionRejected { message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if the simulator is unreachable or the stream broke,
    /// i.e. the session should be torn down and rebuilt.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::WebSocketConnect(_) | Self::WebSocketClosed { .. } => true,
            _ => false,
        }
    }

    /// Returns `true` if this is a lookup or write against a name/ID the
    /// simulator does not know.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Api { status, .. } => *status != 200,
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            _ => false,
        }
    }

    /// HTTP status attached to this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_covers_non_success_status() {
        let err = Error::Api {
            status: 404,
            message: "no such dataref".into(),
        };
        assert!(err.is_not_found());
        assert!(!err.is_transient());
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn websocket_failures_are_transient() {
        assert!(Error::WebSocketConnect("refused".into()).is_transient());
        assert!(
            Error::WebSocketClosed {
                code: 1006,
                reason: "abnormal".into()
            }
            .is_transient()
        );
        assert!(
            !Error::SubscriptionRejected {
                message: "bad id".into()
            }
            .is_transient()
        );
    }
}
