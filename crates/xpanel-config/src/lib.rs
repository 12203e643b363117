//! Settings and mapping tables for xpanel.
//!
//! Settings are layered with figment: built-in defaults, then the TOML
//! settings file, then `XPANEL_` environment variables (`__` separates
//! sections, e.g. `XPANEL_SIMULATOR__REST_URL`). Mapping tables live in
//! their own TOML files and are validated into a core
//! [`MappingTable`](xpanel_core::MappingTable) by [`mapping`].

pub mod mapping;

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use xpanel_core::{BridgeConfig, CommandTiming, CoreError, ReconnectConfig};

pub use mapping::{load_mapping, parse_mapping};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("settings file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("mapping file is not valid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Mapping(#[from] CoreError),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl ConfigError {
    pub(crate) fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// ── Settings structs ────────────────────────────────────────────────

/// Top-level settings file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub simulator: SimulatorSettings,

    #[serde(default)]
    pub engine: EngineSettings,

    #[serde(default)]
    pub hardware: HardwareSettings,
}

/// Where the simulator web API lives.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SimulatorSettings {
    #[serde(default = "default_rest_url")]
    pub rest_url: String,

    #[serde(default = "default_ws_url")]
    pub ws_url: String,

    /// Per-request HTTP timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        Self {
            rest_url: default_rest_url(),
            ws_url: default_ws_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_rest_url() -> String {
    "http://localhost:8086/api/v2".into()
}
fn default_ws_url() -> String {
    "ws://localhost:8086/api/v2".into()
}
fn default_timeout_secs() -> u64 {
    5
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EngineSettings {
    #[serde(default = "default_short_press")]
    pub short_press_secs: f64,

    #[serde(default = "default_hold")]
    pub hold_secs: f64,

    #[serde(default = "default_reconnect_initial")]
    pub reconnect_initial_secs: f64,

    #[serde(default = "default_reconnect_max")]
    pub reconnect_max_secs: f64,

    /// Consecutive failed sessions before giving up; unset retries forever.
    pub reconnect_max_retries: Option<u32>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            short_press_secs: default_short_press(),
            hold_secs: default_hold(),
            reconnect_initial_secs: default_reconnect_initial(),
            reconnect_max_secs: default_reconnect_max(),
            reconnect_max_retries: None,
        }
    }
}

fn default_short_press() -> f64 {
    0.2
}
fn default_hold() -> f64 {
    2.0
}
fn default_reconnect_initial() -> f64 {
    1.0
}
fn default_reconnect_max() -> f64 {
    30.0
}

/// The serial aux board and the mapping table that drives it.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HardwareSettings {
    /// Serial device, e.g. `/dev/ttyACM0` or `COM3`.
    pub serial_port: Option<String>,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Reject boards reporting a different serial number.
    pub serial_number: Option<String>,

    #[serde(default = "default_frame_bytes")]
    pub frame_bytes: usize,

    /// Mapping table file; relative paths are taken from the settings
    /// file's directory.
    pub mapping: Option<PathBuf>,

    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: f64,
}

impl Default for HardwareSettings {
    fn default() -> Self {
        Self {
            serial_port: None,
            baud_rate: default_baud_rate(),
            serial_number: None,
            frame_bytes: default_frame_bytes(),
            mapping: None,
            handshake_timeout_secs: default_handshake_timeout(),
        }
    }
}

fn default_baud_rate() -> u32 {
    115_200
}
fn default_frame_bytes() -> usize {
    4
}
fn default_handshake_timeout() -> f64 {
    4.0
}

// ── Settings file path ──────────────────────────────────────────────

/// Resolve the settings file path via platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "xpanel", "xpanel").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("xpanel");
    p
}

// ── Settings loading ────────────────────────────────────────────────

/// Load settings from `path` (or the platform path) plus environment.
///
/// An explicit path must exist; the platform file is optional.
pub fn load_settings(path: Option<&Path>) -> Result<Settings, ConfigError> {
    let path = match path {
        Some(p) if !p.exists() => {
            return Err(ConfigError::NotFound { path: p.to_path_buf() });
        }
        Some(p) => p.to_path_buf(),
        None => config_path(),
    };

    let figment = Figment::new()
        .merge(Serialized::defaults(Settings::default()))
        .merge(Toml::file(&path))
        .merge(Env::prefixed("XPANEL_").split("__"));

    let settings: Settings = figment.extract()?;
    Ok(settings)
}

impl Settings {
    /// Translate into the core bridge configuration.
    pub fn to_bridge_config(&self) -> Result<BridgeConfig, ConfigError> {
        let rest_url = parse_url("simulator.rest_url", &self.simulator.rest_url)?;
        let ws_url = parse_url("simulator.ws_url", &self.simulator.ws_url)?;

        let engine = &self.engine;
        let initial_delay = secs("engine.reconnect_initial_secs", engine.reconnect_initial_secs)?;
        let max_delay = secs("engine.reconnect_max_secs", engine.reconnect_max_secs)?;
        if max_delay < initial_delay {
            return Err(ConfigError::validation(
                "engine.reconnect_max_secs",
                "must not be smaller than reconnect_initial_secs",
            ));
        }

        let mut config = BridgeConfig::new(rest_url, ws_url);
        config.timeout = Duration::from_secs(self.simulator.timeout_secs);
        config.timing = CommandTiming {
            short_press: secs("engine.short_press_secs", engine.short_press_secs)?,
            hold: secs("engine.hold_secs", engine.hold_secs)?,
        };
        config.reconnect = ReconnectConfig {
            initial_delay,
            max_delay,
            max_retries: engine.reconnect_max_retries,
        };
        Ok(config)
    }

    /// Mapping file path, resolved against `base` when relative.
    pub fn mapping_path(&self, base: Option<&Path>) -> Option<PathBuf> {
        let mapping = self.hardware.mapping.as_ref()?;
        match base {
            Some(dir) if mapping.is_relative() => Some(dir.join(mapping)),
            _ => Some(mapping.clone()),
        }
    }

    pub fn handshake_timeout(&self) -> Result<Duration, ConfigError> {
        secs(
            "hardware.handshake_timeout_secs",
            self.hardware.handshake_timeout_secs,
        )
    }
}

fn parse_url(field: &str, value: &str) -> Result<Url, ConfigError> {
    value
        .parse()
        .map_err(|e| ConfigError::validation(field, format!("invalid URL '{value}': {e}")))
}

fn secs(field: &str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| ConfigError::validation(field, format!("expected a non-negative number of seconds, got {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_translate_to_bridge_config() {
        let config = Settings::default().to_bridge_config().unwrap();
        assert_eq!(config.rest_url.as_str(), "http://localhost:8086/api/v2");
        assert_eq!(config.timing, CommandTiming::default());
        assert_eq!(config.reconnect, ReconnectConfig::default());
    }

    #[test]
    fn negative_durations_are_rejected() {
        let mut settings = Settings::default();
        settings.engine.hold_secs = -1.0;
        let err = settings.to_bridge_config().unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "engine.hold_secs"));
    }

    #[test]
    fn relative_mapping_follows_settings_dir() {
        let mut settings = Settings::default();
        settings.hardware.mapping = Some(PathBuf::from("a107.toml"));
        assert_eq!(
            settings.mapping_path(Some(Path::new("/etc/xpanel"))),
            Some(PathBuf::from("/etc/xpanel/a107.toml"))
        );
        assert_eq!(settings.mapping_path(None), Some(PathBuf::from("a107.toml")));
    }
}
