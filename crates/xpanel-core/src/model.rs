// ── Mapping table model ──
//
// Immutable, data-only description of one panel: which input bit maps to
// which simulator target under which behavior, which outputs follow which
// dataref, and which controls pair up as combined switches. Built once,
// validated, then shared by reference with every task.

use std::collections::{HashMap, HashSet};
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::error::CoreError;
use crate::transform::Transform;

// ── Behaviors ────────────────────────────────────────────────────────

/// Behavior name as written in mapping files.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BehaviorKind {
    Momentary,
    Toggle,
    ToggleInverted,
    Send,
    Hold,
    CommandShort,
    CommandOnOff,
    Combined,
    None,
}

/// How a control turns edges into simulator writes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Behavior {
    /// Press writes 1, release writes 0. Command targets fire on press.
    Momentary,
    /// Press writes the negation of the current value.
    Toggle,
    /// Toggle with the outgoing value negated once more.
    ToggleInverted,
    /// Press writes a fixed constant.
    Send(f64),
    /// Press activates a command for the long hold duration.
    Hold,
    /// Press activates a command for the short duration.
    CommandShort,
    /// Press fires the "on" command, release fires the "off" command.
    CommandOnOff,
    /// Edges feed a combined-switch group.
    Combined,
    None,
}

impl Behavior {
    pub fn kind(self) -> BehaviorKind {
        match self {
            Self::Momentary => BehaviorKind::Momentary,
            Self::Toggle => BehaviorKind::Toggle,
            Self::ToggleInverted => BehaviorKind::ToggleInverted,
            Self::Send(_) => BehaviorKind::Send,
            Self::Hold => BehaviorKind::Hold,
            Self::CommandShort => BehaviorKind::CommandShort,
            Self::CommandOnOff => BehaviorKind::CommandOnOff,
            Self::Combined => BehaviorKind::Combined,
            Self::None => BehaviorKind::None,
        }
    }
}

// ── Controls ─────────────────────────────────────────────────────────

/// Simulator side of a control.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    /// A dataref, optionally a single slot of an array dataref.
    Dataref { name: String, index: Option<u32> },
    Command { name: String },
    /// Paired start/stop commands.
    CommandPair { press: String, release: String },
}

impl Target {
    pub fn dataref(name: impl Into<String>) -> Self {
        Self::Dataref {
            name: name.into(),
            index: None,
        }
    }

    pub fn dataref_slot(name: impl Into<String>, index: u32) -> Self {
        Self::Dataref {
            name: name.into(),
            index: Some(index),
        }
    }

    pub fn command(name: impl Into<String>) -> Self {
        Self::Command { name: name.into() }
    }

    pub fn dataref_name(&self) -> Option<&str> {
        match self {
            Self::Dataref { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn command_names(&self) -> Vec<&str> {
        match self {
            Self::Dataref { .. } => Vec::new(),
            Self::Command { name } => vec![name],
            Self::CommandPair { press, release } => vec![press, release],
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dataref {
                name,
                index: Some(i),
            } => write!(f, "{name}[{i}]"),
            Self::Dataref { name, index: None } => write!(f, "{name}"),
            Self::Command { name } => write!(f, "cmd:{name}"),
            Self::CommandPair { press, release } => write!(f, "cmd:{press}/{release}"),
        }
    }
}

/// A physical input.
#[derive(Debug, Clone, PartialEq)]
pub struct Control {
    pub label: String,
    /// Bit position in the hardware sample.
    pub input: usize,
    /// Hardware input name, for boards that report inputs by name.
    pub pin: Option<String>,
    pub target: Option<Target>,
    pub behavior: Behavior,
}

// ── Outputs ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedMode {
    /// Any non-zero value lights the LED at `on_level`.
    Switch { on_level: u8 },
    /// The value is the brightness, clamped to 0..=255.
    Dim,
}

impl Default for LedMode {
    fn default() -> Self {
        Self::Switch { on_level: 255 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Led(LedMode),
    /// Numeric display showing `decimals` fractional digits.
    Display { decimals: u8 },
}

/// A hardware output following one dataref.
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub label: String,
    /// Hardware output name.
    pub address: String,
    pub kind: OutputKind,
    pub dataref: String,
    /// Array slot this output follows.
    pub index: Option<u32>,
    pub transform: Option<Transform>,
}

/// Idle-screen brightness for a backlight channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backlight {
    pub address: String,
    pub level: u8,
}

// ── Combined switches ────────────────────────────────────────────────

/// Value to write per combination of the two members' latched states,
/// indexed by `state0 + 2 * state1`. `None` means "no write".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TruthTable(pub [Option<f64>; 4]);

impl TruthTable {
    pub fn lookup(&self, first: bool, second: bool) -> Option<f64> {
        let index = usize::from(first) + 2 * usize::from(second);
        self.0.get(index).copied().flatten()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CombinedGroup {
    pub label: String,
    /// Control indices of the two members, in table order.
    pub members: [usize; 2],
    pub table: TruthTable,
}

// ── MappingTable ─────────────────────────────────────────────────────

/// Validated, read-only mapping for one panel.
#[derive(Debug, Clone)]
pub struct MappingTable {
    frame_bytes: usize,
    controls: IndexMap<String, Control>,
    outputs: IndexMap<String, Output>,
    groups: Vec<CombinedGroup>,
    backlights: Vec<Backlight>,
    /// control index → (group index, member position)
    membership: HashMap<usize, (usize, usize)>,
    /// input bit → control indices
    by_input: HashMap<usize, Vec<usize>>,
}

impl MappingTable {
    pub fn builder(frame_bytes: usize) -> MappingBuilder {
        MappingBuilder {
            frame_bytes,
            controls: Vec::new(),
            outputs: Vec::new(),
            groups: Vec::new(),
            backlights: Vec::new(),
        }
    }

    /// Bytes per hardware input sample.
    pub fn frame_bytes(&self) -> usize {
        self.frame_bytes
    }

    pub fn controls(&self) -> impl Iterator<Item = &Control> {
        self.controls.values()
    }

    pub fn control(&self, idx: usize) -> Option<&Control> {
        self.controls.get_index(idx).map(|(_, c)| c)
    }

    pub fn control_index(&self, label: &str) -> Option<usize> {
        self.controls.get_index_of(label)
    }

    /// Controls bound to an input bit.
    pub fn controls_at(&self, input: usize) -> &[usize] {
        self.by_input.get(&input).map_or(&[], Vec::as_slice)
    }

    pub fn outputs(&self) -> impl Iterator<Item = &Output> {
        self.outputs.values()
    }

    pub fn output(&self, idx: usize) -> Option<&Output> {
        self.outputs.get_index(idx).map(|(_, o)| o)
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    pub fn groups(&self) -> &[CombinedGroup] {
        &self.groups
    }

    pub fn group(&self, idx: usize) -> Option<&CombinedGroup> {
        self.groups.get(idx)
    }

    /// `(group index, member position)` for a combined control.
    pub fn membership(&self, control: usize) -> Option<(usize, usize)> {
        self.membership.get(&control).copied()
    }

    pub fn backlights(&self) -> &[Backlight] {
        &self.backlights
    }

    /// Every dataref name that needs an ID, in table order, deduplicated.
    pub fn dataref_names(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.outputs
            .values()
            .map(|o| o.dataref.as_str())
            .chain(
                self.controls
                    .values()
                    .filter_map(|c| c.target.as_ref().and_then(Target::dataref_name)),
            )
            .filter(|name| seen.insert(*name))
            .collect()
    }

    /// Every command name that needs an ID, in table order, deduplicated.
    pub fn command_names(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.controls
            .values()
            .filter_map(|c| c.target.as_ref())
            .flat_map(Target::command_names)
            .filter(|name| seen.insert(*name))
            .collect()
    }

    /// Datarefs read back by toggle controls; these are subscribed even
    /// when no output follows them.
    pub fn toggle_datarefs(&self) -> Vec<&str> {
        self.controls
            .values()
            .filter(|c| matches!(c.behavior, Behavior::Toggle | Behavior::ToggleInverted))
            .filter_map(|c| c.target.as_ref().and_then(Target::dataref_name))
            .collect()
    }

    /// Input pin name → bit position, for boards that report by name.
    pub fn input_pins(&self) -> HashMap<String, usize> {
        self.controls
            .values()
            .filter_map(|c| c.pin.clone().map(|pin| (pin, c.input)))
            .collect()
    }
}

// ── Builder ──────────────────────────────────────────────────────────

/// Highest array slot a mapping may address.
pub const MAX_ARRAY_INDEX: u32 = 4095;

fn check_index(owner: &str, index: Option<u32>) -> Result<(), CoreError> {
    match index {
        Some(i) if i > MAX_ARRAY_INDEX => Err(CoreError::invalid_mapping(format!(
            "'{owner}' addresses array slot {i}, the limit is {MAX_ARRAY_INDEX}"
        ))),
        _ => Ok(()),
    }
}

/// Collects mapping entries and validates them in [`build`](Self::build).
#[derive(Debug)]
pub struct MappingBuilder {
    frame_bytes: usize,
    controls: Vec<Control>,
    outputs: Vec<Output>,
    groups: Vec<(String, [String; 2], TruthTable)>,
    backlights: Vec<Backlight>,
}

impl MappingBuilder {
    pub fn control(mut self, control: Control) -> Self {
        self.controls.push(control);
        self
    }

    pub fn output(mut self, output: Output) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn combined(mut self, label: impl Into<String>, members: [&str; 2], table: TruthTable) -> Self {
        self.groups.push((
            label.into(),
            [members[0].to_owned(), members[1].to_owned()],
            table,
        ));
        self
    }

    pub fn backlight(mut self, address: impl Into<String>, level: u8) -> Self {
        self.backlights.push(Backlight {
            address: address.into(),
            level,
        });
        self
    }

    pub fn build(self) -> Result<MappingTable, CoreError> {
        if self.frame_bytes == 0 {
            return Err(CoreError::invalid_mapping("frame size must be at least one byte"));
        }
        let bits = self.frame_bytes * 8;

        let mut controls = IndexMap::with_capacity(self.controls.len());
        let mut by_input: HashMap<usize, Vec<usize>> = HashMap::new();
        for control in self.controls {
            validate_control(&control, bits)?;
            if controls.contains_key(&control.label) {
                return Err(CoreError::invalid_mapping(format!(
                    "duplicate control label '{}'",
                    control.label
                )));
            }
            by_input.entry(control.input).or_default().push(controls.len());
            controls.insert(control.label.clone(), control);
        }

        let mut outputs = IndexMap::with_capacity(self.outputs.len());
        for output in self.outputs {
            check_index(&output.label, output.index)?;
            if output.dataref.trim().is_empty() {
                return Err(CoreError::invalid_mapping(format!(
                    "output '{}' has no dataref",
                    output.label
                )));
            }
            let label = output.label.clone();
            if outputs.insert(label.clone(), output).is_some() {
                return Err(CoreError::invalid_mapping(format!(
                    "duplicate output label '{label}'"
                )));
            }
        }

        let mut groups = Vec::with_capacity(self.groups.len());
        let mut membership = HashMap::new();
        let mut group_labels = HashSet::new();
        for (label, names, table) in self.groups {
            if !group_labels.insert(label.clone()) {
                return Err(CoreError::invalid_mapping(format!(
                    "duplicate combined group '{label}'"
                )));
            }
            let members = resolve_members(&controls, &label, &names)?;
            for (position, &member) in members.iter().enumerate() {
                if membership.insert(member, (groups.len(), position)).is_some() {
                    return Err(CoreError::invalid_mapping(format!(
                        "control '{}' belongs to more than one combined group",
                        names[position]
                    )));
                }
            }
            groups.push(CombinedGroup {
                label,
                members,
                table,
            });
        }

        if let Some(orphan) = controls
            .values()
            .enumerate()
            .find(|(idx, c)| c.behavior == Behavior::Combined && !membership.contains_key(idx))
        {
            return Err(CoreError::invalid_mapping(format!(
                "control '{}' is combined but belongs to no group",
                orphan.1.label
            )));
        }

        Ok(MappingTable {
            frame_bytes: self.frame_bytes,
            controls,
            outputs,
            groups,
            backlights: self.backlights,
            membership,
            by_input,
        })
    }
}

fn validate_control(control: &Control, bits: usize) -> Result<(), CoreError> {
    let label = &control.label;
    if control.input >= bits {
        return Err(CoreError::invalid_mapping(format!(
            "control '{label}' uses input bit {} but samples only carry {bits} bits",
            control.input
        )));
    }

    let target = control.target.as_ref();
    if let Some(Target::Dataref { index, .. }) = target {
        check_index(label, *index)?;
    }
    let ok = match control.behavior {
        Behavior::None | Behavior::Momentary => true,
        Behavior::Toggle | Behavior::ToggleInverted => {
            matches!(target, Some(Target::Dataref { .. } | Target::Command { .. }))
        }
        Behavior::Send(_) | Behavior::Combined => matches!(target, Some(Target::Dataref { .. })),
        Behavior::Hold | Behavior::CommandShort => matches!(target, Some(Target::Command { .. })),
        Behavior::CommandOnOff => matches!(target, Some(Target::CommandPair { .. })),
    };
    if ok {
        Ok(())
    } else {
        Err(CoreError::invalid_mapping(format!(
            "control '{label}': behavior '{}' does not fit target {}",
            control.behavior.kind(),
            target.map_or_else(|| "<none>".to_owned(), ToString::to_string)
        )))
    }
}

fn resolve_members(
    controls: &IndexMap<String, Control>,
    group: &str,
    names: &[String; 2],
) -> Result<[usize; 2], CoreError> {
    if names[0] == names[1] {
        return Err(CoreError::invalid_mapping(format!(
            "combined group '{group}' lists '{}' twice",
            names[0]
        )));
    }
    let mut members = [0; 2];
    for (slot, name) in members.iter_mut().zip(names) {
        let Some((idx, _, control)) = controls.get_full(name) else {
            return Err(CoreError::invalid_mapping(format!(
                "combined group '{group}' references unknown control '{name}'"
            )));
        };
        if control.behavior != Behavior::Combined {
            return Err(CoreError::invalid_mapping(format!(
                "combined group '{group}': member '{name}' must use behavior 'combined'"
            )));
        }
        *slot = idx;
    }
    Ok(members)
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn control(label: &str, input: usize, target: Option<Target>, behavior: Behavior) -> Control {
        Control {
            label: label.into(),
            input,
            pin: None,
            target,
            behavior,
        }
    }

    #[test]
    fn truth_table_index_order() {
        let table = TruthTable([None, Some(2.0), Some(1.0), Some(0.0)]);
        assert_eq!(table.lookup(false, false), None);
        assert_eq!(table.lookup(true, false), Some(2.0));
        assert_eq!(table.lookup(false, true), Some(1.0));
        assert_eq!(table.lookup(true, true), Some(0.0));
    }

    #[test]
    fn builds_lookup_indices() {
        let table = MappingTable::builder(1)
            .control(control("A", 0, Some(Target::dataref("x/a")), Behavior::Toggle))
            .control(control("B", 3, Some(Target::command("x/b")), Behavior::CommandShort))
            .control(control("C", 3, None, Behavior::None))
            .build()
            .unwrap();

        assert_eq!(table.control_index("B"), Some(1));
        assert_eq!(table.controls_at(3), &[1, 2]);
        assert!(table.controls_at(7).is_empty());
        assert_eq!(table.dataref_names(), vec!["x/a"]);
        assert_eq!(table.command_names(), vec!["x/b"]);
        assert_eq!(table.toggle_datarefs(), vec!["x/a"]);
    }

    #[test]
    fn rejects_input_outside_frame() {
        let err = MappingTable::builder(1)
            .control(control("A", 8, None, Behavior::None))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("input bit 8"));
    }

    #[test]
    fn rejects_duplicate_labels() {
        let err = MappingTable::builder(1)
            .control(control("A", 0, None, Behavior::None))
            .control(control("A", 1, None, Behavior::None))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("duplicate control label 'A'"));
    }

    #[test]
    fn rejects_huge_array_slots() {
        let err = MappingTable::builder(1)
            .control(control(
                "A",
                0,
                Some(Target::dataref_slot("x/arr", u32::MAX)),
                Behavior::Toggle,
            ))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("array slot 4294967295"));

        let err = MappingTable::builder(1)
            .output(Output {
                label: "LED".into(),
                address: "led".into(),
                kind: OutputKind::Led(LedMode::default()),
                dataref: "x/arr".into(),
                index: Some(MAX_ARRAY_INDEX + 1),
                transform: None,
            })
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("'LED' addresses array slot"));

        assert!(
            MappingTable::builder(1)
                .control(control(
                    "B",
                    0,
                    Some(Target::dataref_slot("x/arr", MAX_ARRAY_INDEX)),
                    Behavior::Momentary,
                ))
                .build()
                .is_ok()
        );
    }

    #[test]
    fn rejects_behavior_target_mismatch() {
        let err = MappingTable::builder(1)
            .control(control("H", 0, Some(Target::dataref("x/h")), Behavior::Hold))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("behavior 'hold'"));
    }

    #[test]
    fn combined_groups_need_combined_members() {
        let result = MappingTable::builder(1)
            .control(control("S1", 0, Some(Target::dataref("x/s")), Behavior::Combined))
            .control(control("S2", 1, Some(Target::dataref("x/s")), Behavior::Toggle))
            .combined("STROBE", ["S1", "S2"], TruthTable([None; 4]))
            .build();
        assert!(result.is_err());

        let result = MappingTable::builder(1)
            .control(control("S1", 0, Some(Target::dataref("x/s")), Behavior::Combined))
            .build();
        assert!(result.unwrap_err().to_string().contains("belongs to no group"));
    }

    #[test]
    fn combined_membership() {
        let table = MappingTable::builder(1)
            .control(control("S1", 0, Some(Target::dataref("x/s")), Behavior::Combined))
            .control(control("S2", 1, Some(Target::dataref("x/s")), Behavior::Combined))
            .combined("STROBE", ["S1", "S2"], TruthTable([None, Some(2.0), Some(1.0), Some(0.0)]))
            .build()
            .unwrap();
        assert_eq!(table.membership(0), Some((0, 0)));
        assert_eq!(table.membership(1), Some((0, 1)));
        assert_eq!(table.group(0).unwrap().members, [0, 1]);
    }

    #[test]
    fn behavior_kind_names() {
        assert_eq!(BehaviorKind::ToggleInverted.to_string(), "toggle_inverted");
        assert_eq!(
            "command_on_off".parse::<BehaviorKind>().unwrap(),
            BehaviorKind::CommandOnOff
        );
    }
}
