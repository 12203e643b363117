//! Command handlers.

pub mod check;
pub mod config_cmd;
pub mod run;
pub mod sim;

use std::path::{Path, PathBuf};

use xpanel_config::Settings;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Settings file in effect: `--config` or the platform path.
pub fn settings_path(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(xpanel_config::config_path)
}

pub fn load_settings(global: &GlobalOpts) -> Result<Settings, CliError> {
    Ok(xpanel_config::load_settings(global.config.as_deref())?)
}

/// Mapping file from an explicit argument or the settings.
pub fn mapping_path(
    explicit: Option<&Path>,
    settings: &Settings,
    global: &GlobalOpts,
) -> Result<PathBuf, CliError> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    let path = settings_path(global);
    settings
        .mapping_path(path.parent())
        .ok_or_else(|| CliError::NoMapping {
            path: path.display().to_string(),
        })
}
