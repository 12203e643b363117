//! Clap derive structures for the `xpanel` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// xpanel -- drive X-Plane from a serial cockpit panel
#[derive(Debug, Parser)]
#[command(
    name = "xpanel",
    version,
    about = "Bridge a serial cockpit panel to X-Plane",
    long_about = "Binds panel switches to X-Plane datarefs and commands, and mirrors\n\
        simulator state back onto the panel's LEDs and displays, through the\n\
        simulator's built-in web API (REST + websocket).",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Settings file (defaults to the platform config path)
    #[arg(long, env = "XPANEL_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the bridge until interrupted
    Run(RunArgs),

    /// Validate a mapping table and print a summary
    Check(CheckArgs),

    /// Look up the simulator ID of a dataref or command
    Resolve(ResolveArgs),

    /// Write one value to a dataref
    Set(SetArgs),

    /// Activate one command
    Fire(FireArgs),

    /// Show or locate the settings file
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Serial port of the aux board (overrides hardware.serial_port)
    #[arg(long, short = 'p')]
    pub port: Option<String>,

    /// Mapping table file (overrides hardware.mapping)
    #[arg(long, short = 'm')]
    pub mapping: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Mapping table file (defaults to hardware.mapping)
    pub mapping: Option<PathBuf>,

    /// Sample size in bytes (overrides hardware.frame_bytes)
    #[arg(long)]
    pub frame_bytes: Option<usize>,
}

#[derive(Debug, Args)]
pub struct ResolveArgs {
    /// Dataref or command name
    pub name: String,

    /// Look up a command instead of a dataref
    #[arg(long)]
    pub command: bool,
}

#[derive(Debug, Args)]
pub struct SetArgs {
    /// Dataref name
    pub dataref: String,

    /// Value to write
    #[arg(allow_negative_numbers = true)]
    pub value: f64,

    /// Array slot to write
    #[arg(long)]
    pub index: Option<u32>,
}

#[derive(Debug, Args)]
pub struct FireArgs {
    /// Command name
    pub command: String,

    /// Activation time in seconds (defaults to engine.short_press_secs)
    #[arg(long, short = 'd')]
    pub duration: Option<f64>,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the settings file path
    Path,

    /// Print the effective settings (defaults, file and environment)
    Show,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Target shell
    pub shell: Shell,
}
