//! Auxiliary I/O board over a serial line (MobiFlight-compatible firmware).
//!
//! Messages are ASCII lines of comma-separated fields terminated by
//! `;\r\n`; the first field is the numeric command code. After the board
//! reports `ConfigActivated`, the handshake asks for its info (serial
//! number) and its configuration (the named pin list). From then on the
//! board reports input changes by pin name and takes pin and display
//! writes as one-shot commands with no acknowledgment.
//!
//! [`AuxBoard::split`] turns a connected board into an [`InputDevice`]
//! that assembles button changes into fixed-size bitmask samples and an
//! [`OutputDevice`] that drives output pins and LED display modules.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use strum::{Display, FromRepr};
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf,
    WriteHalf,
};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, trace, warn};

use super::{InputDevice, OutputDevice};
use crate::error::CoreError;

const TERMINATOR: &str = ";\r\n";
const DEVICE: &str = "aux board";
/// Longest line accepted from the board, terminator included.
const MAX_LINE_BYTES: u64 = 8192;

/// Button state value meaning "pressed".
const BUTTON_PRESSED: &str = "0";

// Pin list type codes.
const PIN_OUTPUT: u8 = 3;
const PIN_LED_MODULE: u8 = 4;

// ── Protocol ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, FromRepr)]
#[repr(u8)]
pub enum AuxCommand {
    SetModule = 1,
    SetPin = 2,
    Status = 5,
    ButtonChange = 7,
    GetInfo = 9,
    Info = 10,
    GetConfig = 12,
    ConfigActivated = 17,
    AnalogChange = 28,
    InputShifterChange = 29,
    DigInMuxChange = 30,
}

impl AuxCommand {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// One decoded line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuxMessage {
    pub command: AuxCommand,
    pub args: Vec<String>,
}

impl AuxMessage {
    /// Decode a received line. Lines without the terminator or with an
    /// unknown command code yield `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let body = line.strip_suffix(TERMINATOR)?;
        let mut fields = body.split(',');
        let code = fields.next()?.trim().parse::<u8>().ok()?;
        let command = AuxCommand::from_repr(code)?;
        Some(Self {
            command,
            args: fields.map(str::to_owned).collect(),
        })
    }

    fn arg(&self, i: usize) -> Option<&str> {
        self.args.get(i).map(String::as_str)
    }
}

/// Encode an outgoing command line.
pub fn encode(command: AuxCommand, args: &[&str]) -> String {
    let mut line = command.code().to_string();
    for arg in args {
        line.push(',');
        line.push_str(arg);
    }
    line.push(';');
    line
}

/// A configured device from the board's pin list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinEntry {
    pub kind: u8,
    pub pin: u16,
    pub name: String,
}

/// Parse a pin list such as `3.2.Output_Led2:1.3.Button_In3:`.
///
/// Each entry is `type.pin[.more].Name`; malformed entries are skipped.
pub fn parse_pin_list(list: &str) -> Vec<PinEntry> {
    list.split(':')
        .filter_map(|entry| {
            let parts: Vec<&str> = entry.split('.').collect();
            let [kind, pin, .., name] = parts.as_slice() else {
                return None;
            };
            Some(PinEntry {
                kind: kind.trim().parse().ok()?,
                pin: pin.trim().parse().ok()?,
                name: (*name).to_owned(),
            })
        })
        .collect()
}

/// What the board told us during the handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardInfo {
    pub serial: String,
    pub pins: Vec<PinEntry>,
}

impl BoardInfo {
    /// Pin number of a named output.
    pub fn output_pin(&self, name: &str) -> Option<u16> {
        self.pins
            .iter()
            .find(|p| p.kind == PIN_OUTPUT && p.name == name)
            .map(|p| p.pin)
    }

    /// Module index of a named LED display module.
    pub fn display_module(&self, name: &str) -> Option<usize> {
        self.pins
            .iter()
            .filter(|p| p.kind == PIN_LED_MODULE)
            .position(|p| p.name == name)
    }
}

// ── Connection ───────────────────────────────────────────────────────

/// Open a serial port for an aux board.
pub fn open_serial(port: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream, CoreError> {
    tokio_serial::new(port, baud_rate)
        .open_native_async()
        .map_err(|e| CoreError::hardware(port, &e))
}

/// A board that completed the handshake.
#[derive(Debug)]
pub struct AuxBoard<T> {
    reader: BufReader<ReadHalf<T>>,
    writer: WriteHalf<T>,
    info: BoardInfo,
}

impl<T> AuxBoard<T>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Run the handshake. Fails on timeout or when `expected_serial` is
    /// set and the board reports a different one.
    pub async fn connect(
        stream: T,
        expected_serial: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, CoreError> {
        let (read, writer) = tokio::io::split(stream);
        let mut board = Self {
            reader: BufReader::new(read),
            writer,
            info: BoardInfo::default(),
        };

        tokio::time::timeout(timeout, board.handshake())
            .await
            .map_err(|_| CoreError::Protocol {
                message: format!("handshake timed out after {}ms", timeout.as_millis()),
            })??;

        if let Some(expected) = expected_serial {
            if board.info.serial != expected {
                return Err(CoreError::Protocol {
                    message: format!(
                        "board serial {} does not match {expected}",
                        board.info.serial
                    ),
                });
            }
        }

        info!(
            serial = %board.info.serial,
            pins = board.info.pins.len(),
            "aux board ready"
        );
        Ok(board)
    }

    async fn handshake(&mut self) -> Result<(), CoreError> {
        self.wait_for(|m| m.command == AuxCommand::ConfigActivated && m.arg(0) == Some("OK"))
            .await?;
        debug!("aux board configuration active");

        send(&mut self.writer, &encode(AuxCommand::GetInfo, &[])).await?;
        let info = self
            .wait_for(|m| m.command == AuxCommand::Info && m.args.len() == 5)
            .await?;
        self.info.serial = info.arg(2).unwrap_or_default().to_owned();

        send(&mut self.writer, &encode(AuxCommand::GetConfig, &[])).await?;
        let config = self
            .wait_for(|m| m.command == AuxCommand::Info && m.args.len() == 1)
            .await?;
        self.info.pins = parse_pin_list(config.arg(0).unwrap_or_default());
        for pin in &self.info.pins {
            debug!(kind = pin.kind, pin = pin.pin, name = %pin.name, "aux board pin");
        }
        Ok(())
    }

    async fn wait_for(
        &mut self,
        mut wanted: impl FnMut(&AuxMessage) -> bool + Send,
    ) -> Result<AuxMessage, CoreError> {
        loop {
            let message = read_message(&mut self.reader).await?;
            if wanted(&message) {
                return Ok(message);
            }
            trace!(?message, "ignoring message during handshake");
        }
    }

    pub fn info(&self) -> &BoardInfo {
        &self.info
    }

    /// Split into input and output halves.
    ///
    /// `inputs` maps button names to bit positions in samples of
    /// `frame_len` bytes.
    pub fn split(self, frame_len: usize, inputs: HashMap<String, usize>) -> (AuxInput<T>, AuxOutput<T>) {
        let info = Arc::new(self.info);
        (
            AuxInput {
                reader: self.reader,
                frame: vec![0; frame_len],
                inputs,
            },
            AuxOutput {
                writer: self.writer,
                info,
            },
        )
    }
}

async fn read_message<R>(reader: &mut BufReader<R>) -> Result<AuxMessage, CoreError>
where
    R: AsyncRead + Unpin + Send,
{
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let n = (&mut *reader)
            .take(MAX_LINE_BYTES)
            .read_until(b'\n', &mut buf)
            .await
            .map_err(|e| CoreError::hardware(DEVICE, &e))?;
        if n == 0 {
            return Err(CoreError::Hardware {
                device: DEVICE.into(),
                reason: "serial stream closed".into(),
            });
        }
        if buf.last() != Some(&b'\n') && u64::try_from(n).unwrap_or(u64::MAX) >= MAX_LINE_BYTES {
            return Err(CoreError::Protocol {
                message: format!("line longer than {MAX_LINE_BYTES} bytes without a terminator"),
            });
        }
        let line = String::from_utf8_lossy(&buf);
        match AuxMessage::parse(&line) {
            Some(message) => return Ok(message),
            None => trace!(line = %line.trim_end(), "unparseable aux board line"),
        }
    }
}

async fn send<W>(writer: &mut W, line: &str) -> Result<(), CoreError>
where
    W: AsyncWrite + Unpin + Send,
{
    trace!(line, "aux board send");
    writer
        .write_all(line.as_bytes())
        .await
        .map_err(|e| CoreError::hardware(DEVICE, &e))?;
    writer
        .flush()
        .await
        .map_err(|e| CoreError::hardware(DEVICE, &e))
}

// ── Input half ───────────────────────────────────────────────────────

pub struct AuxInput<T> {
    reader: BufReader<ReadHalf<T>>,
    frame: Vec<u8>,
    inputs: HashMap<String, usize>,
}

impl<T> AuxInput<T> {
    /// Apply one button change; `true` if it touched a mapped bit.
    fn apply(&mut self, name: &str, state: &str) -> bool {
        let Some(&bit) = self.inputs.get(name) else {
            debug!(name, "change on unmapped board input");
            return false;
        };
        let Some(byte) = self.frame.get_mut(bit / 8) else {
            return false;
        };
        let mask = 1u8 << (bit % 8);
        if state == BUTTON_PRESSED {
            *byte |= mask;
        } else {
            *byte &= !mask;
        }
        true
    }
}

impl<T> InputDevice for AuxInput<T>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    fn frame_len(&self) -> usize {
        self.frame.len()
    }

    async fn read_frame(&mut self) -> Result<Vec<u8>, CoreError> {
        loop {
            let message = read_message(&mut self.reader).await?;
            match message.command {
                AuxCommand::ButtonChange => {
                    let (Some(name), Some(state)) = (message.arg(0), message.arg(1)) else {
                        continue;
                    };
                    let (name, state) = (name.to_owned(), state.to_owned());
                    if self.apply(&name, &state) {
                        return Ok(self.frame.clone());
                    }
                }
                AuxCommand::AnalogChange
                | AuxCommand::InputShifterChange
                | AuxCommand::DigInMuxChange => {
                    trace!(command = %message.command, args = ?message.args, "unhandled input change");
                }
                other => trace!(command = %other, "ignoring aux board message"),
            }
        }
    }
}

// ── Output half ──────────────────────────────────────────────────────

pub struct AuxOutput<T> {
    writer: WriteHalf<T>,
    info: Arc<BoardInfo>,
}

impl<T> OutputDevice for AuxOutput<T>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn set_led(&mut self, address: &str, brightness: u8) -> Result<(), CoreError> {
        let Some(pin) = self.info.output_pin(address) else {
            warn!(address, "pin not found on aux board");
            return Ok(());
        };
        let line = encode(
            AuxCommand::SetPin,
            &[&pin.to_string(), &brightness.to_string()],
        );
        send(&mut self.writer, &line).await
    }

    async fn set_display(&mut self, address: &str, value: i64, negative: bool) -> Result<(), CoreError> {
        let Some(module) = self.info.display_module(address) else {
            warn!(address, "display module not found on aux board");
            return Ok(());
        };
        let text = if negative {
            format!("-{value}")
        } else {
            value.to_string()
        };
        let line = encode(
            AuxCommand::SetModule,
            &[&module.to_string(), "0", &text, "0", "255"],
        );
        send(&mut self.writer, &line).await
    }
}

// ── Tests ────────────────────────────────────────────────────────────
