//! `xpanel run`: connect the aux board and bridge it to the simulator.

use tracing::{info, warn};

use xpanel_core::hardware::aux_board::{AuxBoard, open_serial};
use xpanel_core::{Bridge, ConnectionState};

use crate::cli::{GlobalOpts, RunArgs};
use crate::commands::{load_settings, mapping_path, settings_path};
use crate::error::CliError;

pub async fn handle(args: RunArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let settings = load_settings(global)?;
    let bridge_config = settings.to_bridge_config()?;

    let path = mapping_path(args.mapping.as_deref(), &settings, global)?;
    let table = xpanel_config::load_mapping(&path, settings.hardware.frame_bytes)?;
    info!(path = %path.display(), "mapping table loaded");

    let port = args
        .port
        .or_else(|| settings.hardware.serial_port.clone())
        .ok_or_else(|| CliError::NoSerialPort {
            path: settings_path(global).display().to_string(),
        })?;
    let stream = open_serial(&port, settings.hardware.baud_rate)?;
    let board = AuxBoard::connect(
        stream,
        settings.hardware.serial_number.as_deref(),
        settings.handshake_timeout()?,
    )
    .await?;

    let pins = table.input_pins();
    if pins.is_empty() && table.controls().next().is_some() {
        warn!("no control names a board pin, switch changes will be ignored");
    }
    let (input, output) = board.split(table.frame_bytes(), pins);

    let bridge = Bridge::new(bridge_config, table)?;
    bridge.start(input, output).await?;
    let mut state = bridge.connection_state();

    let result = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, shutting down");
                break Ok(());
            }
            () = bridge.stopped() => {
                break Err(CliError::Hardware {
                    message: format!("lost the aux board on {port}"),
                });
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let current = *state.borrow_and_update();
                match current {
                    ConnectionState::Subscribed => info!("simulator connected"),
                    ConnectionState::Connecting { attempt } if attempt > 0 => {
                        info!(attempt, "reconnecting to simulator");
                    }
                    ConnectionState::Failed => break Err(CliError::GaveUp),
                    _ => {}
                }
            }
        }
    };

    bridge.shutdown().await;
    result
}
