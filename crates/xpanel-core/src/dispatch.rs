// ── Output dispatch ──
//
// Turns one edge on one control into at most one simulator write,
// according to the control's behavior. Targets are looked up in the
// session's identity cache only; a name without an ID drops the write
// with a warning and never blocks to resolve.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use tracing::{debug, warn};
use xpanel_api::{CommandId, DatarefId, PushValue};

use crate::combined::CombinedResolver;
use crate::config::CommandTiming;
use crate::edge::EdgeKind;
use crate::identity::IdentityCache;
use crate::model::{Behavior, MAX_ARRAY_INDEX, MappingTable, Target};

// ── WriteRequest ─────────────────────────────────────────────────────

/// One outbound simulator write, ready for the writer task.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteRequest {
    SetDataref {
        id: DatarefId,
        index: Option<u32>,
        value: f64,
    },
    ActivateCommand {
        id: CommandId,
        duration: Duration,
    },
}

impl fmt::Display for WriteRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetDataref {
                id,
                index: Some(i),
                value,
            } => write!(f, "set {id}[{i}] = {value}"),
            Self::SetDataref {
                id,
                index: None,
                value,
            } => write!(f, "set {id} = {value}"),
            Self::ActivateCommand { id, duration } => {
                write!(f, "activate {id} for {}ms", duration.as_millis())
            }
        }
    }
}

// ── SimValues ────────────────────────────────────────────────────────

/// Last known simulator value per dataref, as pushed (or as optimistically
/// written by a toggle). Read by toggle controls.
///
/// Inverted toggles also keep their own switch state per target, since
/// the value on the wire is the inverse of that state.
#[derive(Debug, Clone, Default)]
pub struct SimValues {
    values: HashMap<DatarefId, PushValue>,
    inverted: HashMap<(DatarefId, Option<u32>), f64>,
}

impl SimValues {
    pub fn get(&self, id: DatarefId, index: Option<u32>) -> Option<f64> {
        match (self.values.get(&id)?, index) {
            (PushValue::Scalar(v), _) => Some(*v),
            (PushValue::Array(items), Some(i)) => items.get(slot(i)).copied(),
            (PushValue::Array(items), None) => items.first().copied(),
        }
    }

    pub fn store(&mut self, id: DatarefId, value: PushValue) {
        self.values.insert(id, value);
    }

    /// Overwrite one value (or one array slot).
    pub fn set(&mut self, id: DatarefId, index: Option<u32>, value: f64) {
        let Some(i) = index else {
            self.values.insert(id, PushValue::Scalar(value));
            return;
        };
        if i > MAX_ARRAY_INDEX {
            warn!(%id, index = i, "array slot out of range, not cached");
            return;
        }
        let i = slot(i);
        let entry = self
            .values
            .entry(id)
            .or_insert_with(|| PushValue::Array(Vec::new()));
        if let PushValue::Scalar(_) = entry {
            *entry = PushValue::Array(Vec::new());
        }
        if let PushValue::Array(items) = entry {
            if items.len() <= i {
                items.resize(i + 1, 0.0);
            }
            items[i] = value;
        }
    }

    pub fn clear(&mut self) {
        self.values.clear();
        self.inverted.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn slot(index: u32) -> usize {
    usize::try_from(index).unwrap_or(usize::MAX)
}

fn negate(value: f64) -> f64 {
    if value == 0.0 { 1.0 } else { 0.0 }
}

// ── Dispatcher ───────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Dispatcher {
    timing: CommandTiming,
    combined: CombinedResolver,
}

impl Dispatcher {
    pub fn new(table: &MappingTable, timing: CommandTiming) -> Self {
        Self {
            timing,
            combined: CombinedResolver::new(table.groups().len()),
        }
    }

    pub fn combined(&self) -> &CombinedResolver {
        &self.combined
    }

    /// Decide the write for one edge on control `idx`.
    ///
    /// `identity` is `None` while no simulator session is up; combined
    /// latches still update then, but nothing is written.
    pub fn dispatch(
        &mut self,
        table: &MappingTable,
        idx: usize,
        edge: EdgeKind,
        identity: Option<&IdentityCache>,
        sim: &mut SimValues,
    ) -> Option<WriteRequest> {
        let control = table.control(idx)?;
        let label = control.label.as_str();
        debug!(control = label, %edge, behavior = %control.behavior.kind(), "dispatch");

        if control.behavior == Behavior::Combined {
            let (group_idx, member) = table.membership(idx)?;
            let group = table.group(group_idx)?;
            let value = self.combined.resolve(group_idx, group, member, edge)?;
            let first = table.control(group.members[0])?;
            let Some(Target::Dataref { name, index }) = &first.target else {
                return None;
            };
            return set(identity, &group.label, name, *index, value);
        }

        let Some(target) = &control.target else {
            debug!(control = label, "no simulator target");
            return None;
        };
        let press = edge == EdgeKind::Press;
        let short = self.timing.short_press;

        match (control.behavior, target) {
            (Behavior::None | Behavior::Combined, _) => None,

            (Behavior::Momentary, Target::Dataref { name, index }) => {
                set(identity, label, name, *index, if press { 1.0 } else { 0.0 })
            }
            (
                Behavior::Momentary | Behavior::Toggle | Behavior::ToggleInverted | Behavior::CommandShort,
                Target::Command { name },
            ) if press => fire(identity, label, name, short),
            (Behavior::Momentary | Behavior::CommandOnOff, Target::CommandPair { press: on, release: off }) => {
                fire(identity, label, if press { on } else { off }, short)
            }

            (Behavior::Toggle | Behavior::ToggleInverted, Target::Dataref { name, index }) if press => {
                let Some(id) = identity.and_then(|c| c.dataref(name)) else {
                    warn!(control = label, dataref = %name, "unresolved dataref, dropping write");
                    return None;
                };
                let inverted = control.behavior == Behavior::ToggleInverted;
                let tracked = if inverted {
                    sim.inverted.get(&(id, *index)).copied()
                } else {
                    None
                };
                let current = tracked.or_else(|| sim.get(id, *index)).unwrap_or_else(|| {
                    debug!(control = label, dataref = %name, "no value seen yet, toggling from 0");
                    0.0
                });
                let state = negate(current);
                let value = if inverted {
                    sim.inverted.insert((id, *index), state);
                    negate(state)
                } else {
                    state
                };
                sim.set(id, *index, value);
                Some(WriteRequest::SetDataref {
                    id,
                    index: *index,
                    value,
                })
            }

            (Behavior::Send(value), Target::Dataref { name, index }) if press => {
                set(identity, label, name, *index, value)
            }

            (Behavior::Hold, Target::Command { name }) if press => {
                fire(identity, label, name, self.timing.hold)
            }

            _ => None,
        }
    }
}

fn set(
    identity: Option<&IdentityCache>,
    label: &str,
    name: &str,
    index: Option<u32>,
    value: f64,
) -> Option<WriteRequest> {
    let Some(id) = identity.and_then(|c| c.dataref(name)) else {
        warn!(control = label, dataref = name, "unresolved dataref, dropping write");
        return None;
    };
    Some(WriteRequest::SetDataref { id, index, value })
}

fn fire(
    identity: Option<&IdentityCache>,
    label: &str,
    name: &str,
    duration: Duration,
) -> Option<WriteRequest> {
    let Some(id) = identity.and_then(|c| c.command(name)) else {
        warn!(control = label, command = name, "unresolved command, dropping activation");
        return None;
    };
    Some(WriteRequest::ActivateCommand { id, duration })
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::{Control, TruthTable};

    fn control(label: &str, input: usize, target: Target, behavior: Behavior) -> Control {
        Control {
            label: label.into(),
            input,
            pin: None,
            target: Some(target),
            behavior,
        }
    }

    fn table() -> MappingTable {
        MappingTable::builder(2)
            .control(control("APU_MASTER", 0, Target::dataref("x/apu"), Behavior::Toggle))
            .control(control("INV", 1, Target::dataref("x/inv"), Behavior::ToggleInverted))
            .control(control("MOM", 2, Target::dataref_slot("x/arr", 3), Behavior::Momentary))
            .control(control("HALF", 3, Target::dataref("x/knob"), Behavior::Send(0.5)))
            .control(control("HOLD", 4, Target::command("x/hold"), Behavior::Hold))
            .control(control("SHORT", 5, Target::command("x/short"), Behavior::CommandShort))
            .control(control(
                "PAIR",
                6,
                Target::CommandPair {
                    press: "x/on".into(),
                    release: "x/off".into(),
                },
                Behavior::CommandOnOff,
            ))
            .control(control("S_ON", 7, Target::dataref_slot("x/strobe", 1), Behavior::Combined))
            .control(control("S_AUTO", 8, Target::dataref("x/ignored"), Behavior::Combined))
            .control(control("GHOST", 9, Target::dataref("x/ghost"), Behavior::Momentary))
            .combined("STROBE", ["S_ON", "S_AUTO"], TruthTable([None, Some(2.0), Some(1.0), Some(0.0)]))
            .build()
            .unwrap()
    }

    fn identity(table: &MappingTable) -> IdentityCache {
        let datarefs = HashMap::from([
            ("x/apu".to_owned(), DatarefId(10)),
            ("x/inv".to_owned(), DatarefId(11)),
            ("x/arr".to_owned(), DatarefId(12)),
            ("x/knob".to_owned(), DatarefId(13)),
            ("x/strobe".to_owned(), DatarefId(14)),
        ]);
        let commands = HashMap::from([
            ("x/hold".to_owned(), CommandId(20)),
            ("x/short".to_owned(), CommandId(21)),
            ("x/on".to_owned(), CommandId(22)),
            ("x/off".to_owned(), CommandId(23)),
        ]);
        IdentityCache::from_ids(table, datarefs, commands)
    }

    struct Fixture {
        table: MappingTable,
        identity: IdentityCache,
        dispatcher: Dispatcher,
        sim: SimValues,
    }

    impl Fixture {
        fn new() -> Self {
            let table = table();
            let identity = identity(&table);
            let dispatcher = Dispatcher::new(&table, CommandTiming::default());
            Self {
                table,
                identity,
                dispatcher,
                sim: SimValues::default(),
            }
        }

        fn edge(&mut self, label: &str, edge: EdgeKind) -> Option<WriteRequest> {
            let idx = self.table.control_index(label).unwrap();
            self.dispatcher
                .dispatch(&self.table, idx, edge, Some(&self.identity), &mut self.sim)
        }
    }

    fn set(id: u64, index: Option<u32>, value: f64) -> Option<WriteRequest> {
        Some(WriteRequest::SetDataref {
            id: DatarefId(id),
            index,
            value,
        })
    }

    fn fire(id: u64, millis: u64) -> Option<WriteRequest> {
        Some(WriteRequest::ActivateCommand {
            id: CommandId(id),
            duration: Duration::from_millis(millis),
        })
    }

    #[test]
    fn toggle_negates_cached_value_and_remembers_it() {
        let mut fx = Fixture::new();
        fx.sim.store(DatarefId(10), PushValue::Scalar(0.0));

        assert_eq!(fx.edge("APU_MASTER", EdgeKind::Press), set(10, None, 1.0));
        assert_eq!(fx.edge("APU_MASTER", EdgeKind::Release), None);
        assert_eq!(fx.edge("APU_MASTER", EdgeKind::Press), set(10, None, 0.0));
    }

    #[test]
    fn toggle_without_cached_value_starts_from_zero() {
        let mut fx = Fixture::new();
        assert_eq!(fx.edge("APU_MASTER", EdgeKind::Press), set(10, None, 1.0));
    }

    #[test]
    fn toggle_inverted_alternates_the_inverse_of_its_state() {
        let mut fx = Fixture::new();
        fx.sim.store(DatarefId(11), PushValue::Scalar(1.0));

        assert_eq!(fx.edge("INV", EdgeKind::Press), set(11, None, 1.0));
        assert_eq!(fx.edge("INV", EdgeKind::Release), None);
        assert_eq!(fx.edge("INV", EdgeKind::Press), set(11, None, 0.0));
        assert_eq!(fx.edge("INV", EdgeKind::Press), set(11, None, 1.0));
    }

    #[test]
    fn toggle_inverted_keeps_alternating_when_pushes_echo_writes() {
        let mut fx = Fixture::new();
        fx.sim.store(DatarefId(11), PushValue::Scalar(0.0));

        let first = fx.edge("INV", EdgeKind::Press);
        assert_eq!(first, set(11, None, 0.0));
        fx.sim.store(DatarefId(11), PushValue::Scalar(0.0));

        let second = fx.edge("INV", EdgeKind::Press);
        assert_eq!(second, set(11, None, 1.0));
        fx.sim.store(DatarefId(11), PushValue::Scalar(1.0));

        assert_eq!(fx.edge("INV", EdgeKind::Press), set(11, None, 0.0));
    }

    #[test]
    fn momentary_writes_into_array_slot() {
        let mut fx = Fixture::new();
        assert_eq!(fx.edge("MOM", EdgeKind::Press), set(12, Some(3), 1.0));
        assert_eq!(fx.edge("MOM", EdgeKind::Release), set(12, Some(3), 0.0));
    }

    #[test]
    fn send_writes_constant_on_press_only() {
        let mut fx = Fixture::new();
        fx.sim.store(DatarefId(13), PushValue::Scalar(0.75));
        assert_eq!(fx.edge("HALF", EdgeKind::Press), set(13, None, 0.5));
        assert_eq!(fx.edge("HALF", EdgeKind::Release), None);
    }

    #[test]
    fn command_durations() {
        let mut fx = Fixture::new();
        assert_eq!(fx.edge("HOLD", EdgeKind::Press), fire(20, 2000));
        assert_eq!(fx.edge("HOLD", EdgeKind::Release), None);
        assert_eq!(fx.edge("SHORT", EdgeKind::Press), fire(21, 200));
        assert_eq!(fx.edge("SHORT", EdgeKind::Release), None);
    }

    #[test]
    fn command_on_off_pairs() {
        let mut fx = Fixture::new();
        assert_eq!(fx.edge("PAIR", EdgeKind::Press), fire(22, 200));
        assert_eq!(fx.edge("PAIR", EdgeKind::Release), fire(23, 200));
    }

    #[test]
    fn combined_writes_to_first_member_target() {
        let mut fx = Fixture::new();
        assert_eq!(fx.edge("S_ON", EdgeKind::Press), None);
        assert_eq!(fx.edge("S_AUTO", EdgeKind::Press), set(14, Some(1), 0.0));
        assert_eq!(fx.edge("S_ON", EdgeKind::Release), set(14, Some(1), 1.0));
        assert_eq!(fx.edge("S_AUTO", EdgeKind::Release), None);
    }

    #[test]
    fn unresolved_target_is_dropped() {
        let mut fx = Fixture::new();
        assert_eq!(fx.edge("GHOST", EdgeKind::Press), None);
    }

    #[test]
    fn no_session_drops_writes_but_latches_combined_state() {
        let mut fx = Fixture::new();
        let idx = fx.table.control_index("S_ON").unwrap();
        let out = fx
            .dispatcher
            .dispatch(&fx.table, idx, EdgeKind::Press, None, &mut fx.sim);
        assert_eq!(out, None);
        assert_eq!(fx.dispatcher.combined().state(0), Some([Some(true), None]));
    }

    #[test]
    fn sim_values_slots() {
        let mut sim = SimValues::default();
        sim.set(DatarefId(1), Some(2), 5.0);
        assert_eq!(sim.get(DatarefId(1), Some(2)), Some(5.0));
        assert_eq!(sim.get(DatarefId(1), Some(0)), Some(0.0));
        assert_eq!(sim.get(DatarefId(1), Some(9)), None);
        sim.store(DatarefId(2), PushValue::Scalar(3.0));
        assert_eq!(sim.get(DatarefId(2), Some(4)), Some(3.0));
        assert_eq!(sim.len(), 2);

        sim.set(DatarefId(3), Some(u32::MAX), 1.0);
        assert_eq!(sim.get(DatarefId(3), Some(u32::MAX)), None);
        assert_eq!(sim.len(), 2);
    }
}
