// ── Runtime bridge configuration ──
//
// These types describe how to reach the simulator and how long the
// timed command activations last. The binary builds a `BridgeConfig`
// from the settings file and hands it in; core never reads files.

use std::time::Duration;

use url::Url;

/// Reconnect backoff for the simulator session supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum consecutive failed sessions before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

/// Durations used for command activations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandTiming {
    /// `command_short`, momentary commands and on/off pairs.
    pub short_press: Duration,
    /// `hold` behavior.
    pub hold: Duration,
}

impl Default for CommandTiming {
    fn default() -> Self {
        Self {
            short_press: Duration::from_millis(200),
            hold: Duration::from_secs(2),
        }
    }
}

/// Everything the bridge needs to talk to one simulator instance.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// REST API root, e.g. `http://localhost:8086/api/v2`.
    pub rest_url: Url,
    /// Websocket endpoint, e.g. `ws://localhost:8086/api/v2`.
    pub ws_url: Url,
    /// Per-request HTTP timeout.
    pub timeout: Duration,
    pub reconnect: ReconnectConfig,
    pub timing: CommandTiming,
}

impl BridgeConfig {
    pub fn new(rest_url: Url, ws_url: Url) -> Self {
        Self {
            rest_url,
            ws_url,
            timeout: Duration::from_secs(5),
            reconnect: ReconnectConfig::default(),
            timing: CommandTiming::default(),
        }
    }
}
