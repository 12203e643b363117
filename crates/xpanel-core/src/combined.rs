// ── Combined switches ──
//
// Two physical switches driving one simulator variable. Each member's
// latched state starts unknown and is set on every edge; nothing is
// written until both members have reported once. Latches survive
// simulator reconnects since they mirror hardware, not the simulator.

use tracing::debug;

use crate::edge::EdgeKind;
use crate::model::CombinedGroup;

#[derive(Debug, Clone, Default)]
pub struct CombinedResolver {
    latched: Vec<[Option<bool>; 2]>,
}

impl CombinedResolver {
    pub fn new(groups: usize) -> Self {
        Self {
            latched: vec![[None; 2]; groups],
        }
    }

    /// Latch `member`'s new state and return the value to write, if any.
    pub fn resolve(
        &mut self,
        group_idx: usize,
        group: &CombinedGroup,
        member: usize,
        edge: EdgeKind,
    ) -> Option<f64> {
        let state = self.latched.get_mut(group_idx)?;
        let slot = state.get_mut(member)?;
        *slot = Some(edge == EdgeKind::Press);

        let [Some(first), Some(second)] = *state else {
            debug!(group = %group.label, member, "combined group not fully observed yet");
            return None;
        };

        let value = group.table.lookup(first, second);
        if value.is_none() {
            debug!(group = %group.label, first, second, "no write for this combination");
        }
        value
    }

    /// Latched states of one group.
    pub fn state(&self, group_idx: usize) -> Option<[Option<bool>; 2]> {
        self.latched.get(group_idx).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TruthTable;

    fn strobe() -> CombinedGroup {
        CombinedGroup {
            label: "STROBE".into(),
            members: [0, 1],
            table: TruthTable([None, Some(2.0), Some(1.0), Some(0.0)]),
        }
    }

    #[test]
    fn writes_nothing_until_both_members_report() {
        let group = strobe();
        let mut resolver = CombinedResolver::new(1);

        assert_eq!(resolver.resolve(0, &group, 0, EdgeKind::Press), None);
        assert_eq!(resolver.state(0), Some([Some(true), None]));
        assert_eq!(resolver.resolve(0, &group, 1, EdgeKind::Press), Some(0.0));
    }

    #[test]
    fn follows_the_truth_table() {
        let group = strobe();
        let mut resolver = CombinedResolver::new(1);

        resolver.resolve(0, &group, 0, EdgeKind::Press);
        assert_eq!(resolver.resolve(0, &group, 1, EdgeKind::Release), Some(2.0));
        assert_eq!(resolver.resolve(0, &group, 0, EdgeKind::Release), None);
        assert_eq!(resolver.resolve(0, &group, 1, EdgeKind::Press), Some(1.0));
    }

    #[test]
    fn out_of_range_indices_are_ignored() {
        let group = strobe();
        let mut resolver = CombinedResolver::new(1);
        assert_eq!(resolver.resolve(4, &group, 0, EdgeKind::Press), None);
        assert_eq!(resolver.resolve(0, &group, 2, EdgeKind::Press), None);
        assert_eq!(resolver.state(0), Some([None, None]));
    }
}
