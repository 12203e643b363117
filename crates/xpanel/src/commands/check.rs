//! `xpanel check`: validate a mapping table and summarize it.

use tabled::Tabled;

use xpanel_core::{Control, LedMode, MappingTable, Output, OutputKind};

use crate::cli::{CheckArgs, GlobalOpts};
use crate::commands::{load_settings, mapping_path};
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct ControlRow {
    #[tabled(rename = "Control")]
    label: String,
    #[tabled(rename = "Input")]
    input: usize,
    #[tabled(rename = "Pin")]
    pin: String,
    #[tabled(rename = "Behavior")]
    behavior: String,
    #[tabled(rename = "Target")]
    target: String,
}

impl From<&Control> for ControlRow {
    fn from(c: &Control) -> Self {
        Self {
            label: c.label.clone(),
            input: c.input,
            pin: c.pin.clone().unwrap_or_else(|| "-".into()),
            behavior: c.behavior.kind().to_string(),
            target: c
                .target
                .as_ref()
                .map_or_else(|| "-".into(), ToString::to_string),
        }
    }
}

#[derive(Tabled)]
struct OutputRow {
    #[tabled(rename = "Output")]
    label: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Dataref")]
    dataref: String,
    #[tabled(rename = "Transform")]
    transform: String,
}

impl From<&Output> for OutputRow {
    fn from(o: &Output) -> Self {
        let kind = match o.kind {
            OutputKind::Led(LedMode::Switch { on_level }) => format!("led (switch {on_level})"),
            OutputKind::Led(LedMode::Dim) => "led (dim)".into(),
            OutputKind::Display { decimals } => format!("display ({decimals} dp)"),
        };
        let dataref = match o.index {
            Some(i) => format!("{}[{i}]", o.dataref),
            None => o.dataref.clone(),
        };
        Self {
            label: o.label.clone(),
            address: o.address.clone(),
            kind,
            dataref,
            transform: o
                .transform
                .as_ref()
                .map_or_else(|| "-".into(), ToString::to_string),
        }
    }
}

pub fn handle(args: &CheckArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let settings = load_settings(global)?;
    let path = mapping_path(args.mapping.as_deref(), &settings, global)?;
    let frame_bytes = args.frame_bytes.unwrap_or(settings.hardware.frame_bytes);

    let table = xpanel_config::load_mapping(&path, frame_bytes)?;
    tracing::debug!(path = %path.display(), frame_bytes, "mapping table valid");

    output::print_output(&summary(&table), global.quiet);
    let message = format!(
        "{}: {} controls, {} outputs, {} combined groups, {} datarefs, {} commands",
        path.display(),
        table.controls().count(),
        table.output_count(),
        table.groups().len(),
        table.dataref_names().len(),
        table.command_names().len(),
    );
    output::print_output(
        &output::status_line(true, &message, output::should_color(&global.color)),
        global.quiet,
    );
    Ok(())
}

fn summary(table: &MappingTable) -> String {
    let mut sections = Vec::new();
    let controls: Vec<ControlRow> = table.controls().map(ControlRow::from).collect();
    if !controls.is_empty() {
        sections.push(output::render_table(&controls));
    }
    let outputs: Vec<OutputRow> = table.outputs().map(OutputRow::from).collect();
    if !outputs.is_empty() {
        sections.push(output::render_table(&outputs));
    }
    sections.join("\n")
}
