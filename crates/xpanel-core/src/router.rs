// ── Inbound state routing ──
//
// Pushed dataref values → hardware actuations. Each output keeps the
// last transformed value it actuated; an unchanged value produces no
// hardware write.

use std::collections::HashMap;

use tracing::{debug, trace};
use xpanel_api::{DatarefId, PushUpdate, PushValue};

use crate::dispatch::SimValues;
use crate::identity::{IdentityCache, Owners};
use crate::model::{LedMode, MappingTable, Output, OutputKind};
use crate::transform::Transform;

const MAX_BRIGHTNESS: f64 = 255.0;

// ── Actuation ────────────────────────────────────────────────────────

/// One hardware output write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actuation {
    Led { address: String, brightness: u8 },
    Display {
        address: String,
        value: i64,
        negative: bool,
    },
}

impl Actuation {
    /// Map a transformed value onto an output's hardware form.
    pub fn for_output(output: &Output, value: f64) -> Self {
        match output.kind {
            OutputKind::Led(mode) => Self::Led {
                address: output.address.clone(),
                brightness: led_level(mode, value),
            },
            OutputKind::Display { decimals } => {
                let scaled = (value * 10f64.powi(i32::from(decimals))).round();
                #[allow(clippy::cast_possible_truncation)]
                let magnitude = scaled.abs().min(i64::MAX as f64) as i64;
                Self::Display {
                    address: output.address.clone(),
                    value: magnitude,
                    negative: scaled < 0.0,
                }
            }
        }
    }

    pub fn address(&self) -> &str {
        match self {
            Self::Led { address, .. } | Self::Display { address, .. } => address,
        }
    }
}

fn led_level(mode: LedMode, value: f64) -> u8 {
    match mode {
        LedMode::Switch { on_level } => {
            if value == 0.0 || value.is_nan() {
                0
            } else {
                on_level
            }
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        LedMode::Dim => value.round().clamp(0.0, MAX_BRIGHTNESS) as u8,
    }
}

// ── InboundRouter ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct InboundRouter {
    /// Last actuated transformed value per output index.
    last: HashMap<usize, f64>,
}

impl InboundRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route one push. Raw values are stored in `sim` for toggles; changed
    /// output values come back as actuations, in push order.
    pub fn route(
        &mut self,
        table: &MappingTable,
        identity: &IdentityCache,
        sim: &mut SimValues,
        update: PushUpdate,
    ) -> Vec<Actuation> {
        let mut actuations = Vec::new();
        for (id, value) in update.values {
            if !identity.is_subscribed(id) {
                debug!(%id, "push for unknown dataref ID");
                continue;
            }
            if let Some(owners) = identity.owners(id) {
                self.route_one(table, id, owners, &value, &mut actuations);
            }
            sim.store(id, value);
        }
        actuations
    }

    fn route_one(
        &mut self,
        table: &MappingTable,
        id: DatarefId,
        owners: &Owners,
        value: &PushValue,
        out: &mut Vec<Actuation>,
    ) {
        match (owners, value) {
            (Owners::Single(idx), PushValue::Scalar(raw)) => self.actuate(table, *idx, *raw, out),
            (Owners::Single(idx), PushValue::Array(items)) => {
                debug!(%id, output = idx, len = items.len(), "array push for a scalar output, using slot 0");
                if let Some(&raw) = items.first() {
                    self.actuate(table, *idx, raw, out);
                }
            }
            (Owners::Many(list), PushValue::Array(items)) => {
                for (slot, &raw) in items.iter().enumerate() {
                    for &idx in list {
                        let matches = table
                            .output(idx)
                            .and_then(|o| o.index)
                            .is_some_and(|i| usize::try_from(i).is_ok_and(|i| i == slot));
                        if matches {
                            self.actuate(table, idx, raw, out);
                        }
                    }
                }
            }
            (Owners::Many(list), PushValue::Scalar(raw)) => {
                for &idx in list {
                    self.actuate(table, idx, *raw, out);
                }
            }
        }
    }

    fn actuate(&mut self, table: &MappingTable, idx: usize, raw: f64, out: &mut Vec<Actuation>) {
        let Some(output) = table.output(idx) else {
            return;
        };
        let value = Transform::apply_opt(output.transform.as_ref(), raw);
        if self
            .last
            .get(&idx)
            .is_some_and(|prev| prev.to_bits() == value.to_bits())
        {
            trace!(output = %output.label, value, "unchanged, skipping");
            return;
        }
        self.last.insert(idx, value);
        debug!(output = %output.label, raw, value, "actuate");
        out.push(Actuation::for_output(output, value));
    }

    /// Last actuated value of an output.
    pub fn cached(&self, idx: usize) -> Option<f64> {
        self.last.get(&idx).copied()
    }

    /// Forget everything, so the next push actuates every output again.
    pub fn clear(&mut self) {
        self.last.clear();
    }
}

// ── Tests ────────────────────────────────────────────────────────────
