// ── Mapping table files ──
//
// Raw TOML entries, checked field by field and then handed to the core
// builder, which owns the cross-entry validation.

use std::path::Path;

use serde::Deserialize;

use xpanel_core::{
    Behavior, BehaviorKind, Control, LedMode, MappingTable, Output, OutputKind, Target, Transform,
    TruthTable,
};

use crate::ConfigError;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MappingFile {
    #[serde(default)]
    controls: Vec<ControlEntry>,
    #[serde(default)]
    outputs: Vec<OutputEntry>,
    #[serde(default)]
    combined: Vec<CombinedEntry>,
    #[serde(default)]
    backlights: Vec<BacklightEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ControlEntry {
    label: String,
    input: usize,
    pin: Option<String>,
    dataref: Option<String>,
    index: Option<u32>,
    command: Option<String>,
    press_command: Option<String>,
    release_command: Option<String>,
    #[serde(default = "default_behavior")]
    behavior: BehaviorKind,
    value: Option<f64>,
}

fn default_behavior() -> BehaviorKind {
    BehaviorKind::Momentary
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum OutputKindEntry {
    Led,
    Display,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum LedModeEntry {
    Switch,
    Dim,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct OutputEntry {
    label: String,
    address: String,
    kind: OutputKindEntry,
    mode: Option<LedModeEntry>,
    on_level: Option<u8>,
    dataref: String,
    index: Option<u32>,
    transform: Option<String>,
    decimals: Option<u8>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CombinedEntry {
    label: String,
    members: [String; 2],
    table: [TableCell; 4],
}

/// A truth table cell: a number, or the word `none` for "no write".
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum TableCell {
    Value(f64),
    Word(String),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BacklightEntry {
    address: String,
    level: u8,
}

// ── Loading ─────────────────────────────────────────────────────────

/// Read and validate a mapping file for samples of `frame_bytes` bytes.
pub fn load_mapping(path: &Path, frame_bytes: usize) -> Result<MappingTable, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_mapping(&text, frame_bytes)
}

/// Validate mapping TOML text.
pub fn parse_mapping(text: &str, frame_bytes: usize) -> Result<MappingTable, ConfigError> {
    let file: MappingFile = toml::from_str(text)?;
    let mut builder = MappingTable::builder(frame_bytes);

    for entry in file.controls {
        builder = builder.control(control(entry)?);
    }
    for entry in file.outputs {
        builder = builder.output(output(entry)?);
    }
    for entry in file.combined {
        let table = truth_table(&entry.label, &entry.table)?;
        let [first, second] = &entry.members;
        builder = builder.combined(entry.label.clone(), [first.as_str(), second.as_str()], table);
    }
    for entry in file.backlights {
        builder = builder.backlight(entry.address, entry.level);
    }

    Ok(builder.build()?)
}

fn control(entry: ControlEntry) -> Result<Control, ConfigError> {
    let field = |name: &str| format!("controls.{}.{name}", entry.label);

    let target = match (
        entry.dataref,
        entry.command,
        entry.press_command,
        entry.release_command,
    ) {
        (None, None, None, None) => None,
        (Some(name), None, None, None) => Some(Target::Dataref {
            name,
            index: entry.index,
        }),
        (None, Some(name), None, None) => Some(Target::Command { name }),
        (None, None, Some(press), Some(release)) => Some(Target::CommandPair { press, release }),
        (None, None, Some(_), None) | (None, None, None, Some(_)) => {
            return Err(ConfigError::validation(
                field("press_command"),
                "press_command and release_command go together",
            ));
        }
        _ => {
            return Err(ConfigError::validation(
                field("dataref"),
                "set exactly one of dataref, command or press_command/release_command",
            ));
        }
    };
    if entry.index.is_some() && !matches!(target, Some(Target::Dataref { .. })) {
        return Err(ConfigError::validation(
            field("index"),
            "an array index needs a dataref target",
        ));
    }

    let behavior = match entry.behavior {
        BehaviorKind::Momentary => Behavior::Momentary,
        BehaviorKind::Toggle => Behavior::Toggle,
        BehaviorKind::ToggleInverted => Behavior::ToggleInverted,
        BehaviorKind::Send => {
            let value = entry
                .value
                .ok_or_else(|| ConfigError::validation(field("value"), "behavior 'send' needs a value"))?;
            Behavior::Send(value)
        }
        BehaviorKind::Hold => Behavior::Hold,
        BehaviorKind::CommandShort => Behavior::CommandShort,
        BehaviorKind::CommandOnOff => Behavior::CommandOnOff,
        BehaviorKind::Combined => Behavior::Combined,
        BehaviorKind::None => Behavior::None,
    };

    Ok(Control {
        label: entry.label,
        input: entry.input,
        pin: entry.pin,
        target,
        behavior,
    })
}

fn output(entry: OutputEntry) -> Result<Output, ConfigError> {
    let field = |name: &str| format!("outputs.{}.{name}", entry.label);

    let kind = match entry.kind {
        OutputKindEntry::Led => {
            if entry.decimals.is_some() {
                return Err(ConfigError::validation(field("decimals"), "only displays take decimals"));
            }
            match (entry.mode.unwrap_or(LedModeEntry::Switch), entry.on_level) {
                (LedModeEntry::Switch, level) => OutputKind::Led(LedMode::Switch {
                    on_level: level.unwrap_or(u8::MAX),
                }),
                (LedModeEntry::Dim, None) => OutputKind::Led(LedMode::Dim),
                (LedModeEntry::Dim, Some(_)) => {
                    return Err(ConfigError::validation(
                        field("on_level"),
                        "on_level applies to switch mode only",
                    ));
                }
            }
        }
        OutputKindEntry::Display => {
            if entry.mode.is_some() || entry.on_level.is_some() {
                return Err(ConfigError::validation(field("mode"), "displays have no LED mode"));
            }
            OutputKind::Display {
                decimals: entry.decimals.unwrap_or(0),
            }
        }
    };

    let transform = match entry.transform.as_deref() {
        Some(text) => Some(Transform::parse(text).map_err(|e| {
            ConfigError::validation(field("transform"), e.to_string())
        })?),
        None => None,
    };

    Ok(Output {
        label: entry.label,
        address: entry.address,
        kind,
        dataref: entry.dataref,
        index: entry.index,
        transform,
    })
}

fn truth_table(label: &str, cells: &[TableCell; 4]) -> Result<TruthTable, ConfigError> {
    let mut table = [None; 4];
    for (slot, cell) in table.iter_mut().zip(cells) {
        *slot = match cell {
            TableCell::Value(v) => Some(*v),
            TableCell::Word(w) if w.eq_ignore_ascii_case("none") => None,
            TableCell::Word(w) => {
                return Err(ConfigError::validation(
                    format!("combined.{label}.table"),
                    format!("expected a number or \"none\", got \"{w}\""),
                ));
            }
        };
    }
    Ok(TruthTable(table))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const STROBE: &str = r#"
        [[controls]]
        label = "STROBE_ON"
        input = 0
        pin = "Button_In0"
        dataref = "ckpt/oh/strobeLight/anim"
        behavior = "combined"

        [[controls]]
        label = "STROBE_AUTO"
        input = 1
        dataref = "ckpt/oh/strobeLight/anim"
        behavior = "combined"

        [[combined]]
        label = "STROBE"
        members = ["STROBE_ON", "STROBE_AUTO"]
        table = ["none", 2, 1, 0]
    "#;

    #[test]
    fn parses_combined_groups() {
        let table = parse_mapping(STROBE, 1).unwrap();
        let group = &table.groups()[0];
        assert_eq!(group.members, [0, 1]);
        assert_eq!(group.table, TruthTable([None, Some(2.0), Some(1.0), Some(0.0)]));
        assert_eq!(table.input_pins().get("Button_In0"), Some(&0));
    }

    #[test]
    fn send_needs_a_value() {
        let text = r#"
            [[controls]]
            label = "FLAPS_1"
            input = 3
            dataref = "sim/flaps"
            behavior = "send"
        "#;
        let err = parse_mapping(text, 1).unwrap_err();
        assert!(err.to_string().contains("needs a value"), "{err}");
    }

    #[test]
    fn conflicting_targets_are_rejected() {
        let text = r#"
            [[controls]]
            label = "X"
            input = 0
            dataref = "a"
            command = "b"
        "#;
        assert!(matches!(
            parse_mapping(text, 1),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn bad_truth_table_word() {
        let text = STROBE.replace("\"none\"", "\"off\"");
        let err = parse_mapping(&text, 1).unwrap_err();
        assert!(err.to_string().contains("\"off\""), "{err}");
    }

    #[test]
    fn output_transforms_parse_at_load() {
        let text = r#"
            [[outputs]]
            label = "BAT_V"
            address = "Altitude"
            kind = "display"
            dataref = "sim/bat/volts"
            transform = "round($, 1)"
            decimals = 1

            [[outputs]]
            label = "BAD"
            address = "Led"
            kind = "led"
            dataref = "sim/x"
            transform = "$ / 0"
        "#;
        let err = parse_mapping(text, 1).unwrap_err();
        assert!(err.to_string().contains("outputs.BAD.transform"), "{err}");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let text = r#"
            [[backlights]]
            address = "Backlight"
            level = 80
            colour = "red"
        "#;
        assert!(matches!(parse_mapping(text, 1), Err(ConfigError::Parse(_))));
    }
}
