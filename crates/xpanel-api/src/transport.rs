// Shared transport configuration for building reqwest::Client instances.
//
// The simulator web API speaks plain JSON over local HTTP, so the only
// knobs are the request timeout and the user agent. Every request carries
// JSON `Accept` / `Content-Type` headers.

use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};

use crate::error::Error;

const USER_AGENT: &str = concat!("xpanel/", env!("CARGO_PKG_VERSION"));

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Upper bound for a single request. Writes happen on the hardware
    /// path, so this should stay short.
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            user_agent: USER_AGENT.to_owned(),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent.as_str())
            .default_headers(json_headers())
            .build()
            .map_err(|e| Error::ClientSetup(format!("failed to build HTTP client: {e}")))
    }

    /// Override the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

fn json_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_transport_is_short_timeout() {
        let config = TransportConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert!(config.user_agent.starts_with("xpanel/"));
    }

    #[test]
    fn builds_client_with_custom_timeout() {
        let config = TransportConfig::default().with_timeout(Duration::from_millis(250));
        assert_eq!(config.timeout, Duration::from_millis(250));
        assert!(config.build_client().is_ok());
    }
}
