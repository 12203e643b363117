//! One-shot simulator commands: `resolve`, `set`, `fire`.

use std::time::Duration;

use xpanel_api::{SimClient, TransportConfig};
use xpanel_core::{BridgeConfig, CoreError};

use crate::cli::{FireArgs, GlobalOpts, ResolveArgs, SetArgs};
use crate::commands::load_settings;
use crate::error::CliError;
use crate::output;

struct Session {
    client: SimClient,
    config: BridgeConfig,
}

impl Session {
    fn open(global: &GlobalOpts) -> Result<Self, CliError> {
        let config = load_settings(global)?.to_bridge_config()?;
        let transport = TransportConfig::default().with_timeout(config.timeout);
        let client = SimClient::new(config.rest_url.clone(), &transport)
            .map_err(|e| CliError::from(CoreError::from(e)))?;
        Ok(Self { client, config })
    }

    fn fail(&self, err: xpanel_api::Error) -> CliError {
        CliError::from_core(err.into(), self.config.rest_url.as_str())
    }
}

pub async fn resolve(args: &ResolveArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let session = Session::open(global)?;
    let id = if args.command {
        let id = session
            .client
            .lookup_command(&args.name)
            .await
            .map_err(|e| session.fail(e))?;
        id.to_string()
    } else {
        let id = session
            .client
            .lookup_dataref(&args.name)
            .await
            .map_err(|e| session.fail(e))?;
        id.to_string()
    };
    output::print_output(&id, global.quiet);
    Ok(())
}

pub async fn set(args: &SetArgs, global: &GlobalOpts) -> Result<(), CliError> {
    if !args.value.is_finite() {
        return Err(CliError::Validation {
            field: "value".into(),
            reason: format!("expected a finite number, got {}", args.value),
        });
    }
    let session = Session::open(global)?;
    let id = session
        .client
        .lookup_dataref(&args.dataref)
        .await
        .map_err(|e| session.fail(e))?;
    session
        .client
        .set_dataref(id, args.value, args.index)
        .await
        .map_err(|e| session.fail(e))?;
    tracing::info!(dataref = %args.dataref, %id, value = args.value, "dataref written");
    Ok(())
}

pub async fn fire(args: &FireArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let session = Session::open(global)?;
    let duration = match args.duration {
        Some(secs) => Duration::try_from_secs_f64(secs).map_err(|_| CliError::Validation {
            field: "duration".into(),
            reason: format!("expected a non-negative number of seconds, got {secs}"),
        })?,
        None => session.config.timing.short_press,
    };
    let id = session
        .client
        .lookup_command(&args.command)
        .await
        .map_err(|e| session.fail(e))?;
    session
        .client
        .activate_command(id, duration)
        .await
        .map_err(|e| session.fail(e))?;
    tracing::info!(command = %args.command, %id, ?duration, "command activated");
    Ok(())
}
