//! Terminal output: tables, status lines, color detection.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use tabled::{Table, Tabled, settings::Style};

use crate::cli::ColorMode;

/// Determine whether color output should be enabled.
pub fn should_color(mode: &ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

pub fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

/// A `label: message` line, the label colored by outcome.
pub fn status_line(ok: bool, message: &str, color: bool) -> String {
    let label = if ok { "OK" } else { "FAIL" };
    if !color {
        return format!("{label}: {message}");
    }
    if ok {
        format!("{} {message}", format!("{label}:").bright_green().bold())
    } else {
        format!("{} {message}", format!("{label}:").bright_red().bold())
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}
