//! Config subcommand handlers.

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::commands::{load_settings, settings_path};
use crate::error::CliError;
use crate::output;

pub fn handle(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&settings_path(global).display().to_string(), global.quiet);
            Ok(())
        }
        ConfigCommand::Show => {
            let settings = load_settings(global)?;
            let text = toml::to_string_pretty(&settings).map_err(|e| CliError::Validation {
                field: "config".into(),
                reason: format!("failed to serialize settings: {e}"),
            })?;
            output::print_output(text.trim_end(), global.quiet);
            Ok(())
        }
    }
}
