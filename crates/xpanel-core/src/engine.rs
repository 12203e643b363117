// ── Binding engine actor ──
//
// Single owner of every piece of mutable engine state: the session's
// identity cache, the last simulator values, the per-output dedupe cache
// and the combined-switch latches. Other tasks talk to it only through
// `EngineEvent`s in and `WriteRequest`s / `Actuation`s out.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use xpanel_api::{DatarefId, PushUpdate};

use crate::config::CommandTiming;
use crate::dispatch::{Dispatcher, SimValues, WriteRequest};
use crate::edge::Edge;
use crate::identity::IdentityCache;
use crate::model::{MappingTable, OutputKind};
use crate::router::{Actuation, InboundRouter};

/// Messages into the engine.
#[derive(Debug)]
pub enum EngineEvent {
    /// Edges drained from one hardware sample.
    Edges(Vec<Edge>),
    /// One simulator push.
    Push(PushUpdate),
    /// A simulator session is subscribed with these IDs.
    SessionStarted(IdentityCache),
    /// The simulator session is gone.
    SessionEnded,
}

/// What one event produced.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct EngineOutput {
    pub writes: Vec<WriteRequest>,
    pub actuations: Vec<Actuation>,
}

pub struct BindingEngine {
    table: Arc<MappingTable>,
    identity: Option<IdentityCache>,
    sim: SimValues,
    router: InboundRouter,
    dispatcher: Dispatcher,
}

impl BindingEngine {
    pub fn new(table: Arc<MappingTable>, timing: CommandTiming) -> Self {
        let dispatcher = Dispatcher::new(&table, timing);
        Self {
            table,
            identity: None,
            sim: SimValues::default(),
            router: InboundRouter::new(),
            dispatcher,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.identity.is_some()
    }

    /// Last known simulator value of a dataref (slot).
    pub fn sim_value(&self, id: DatarefId, index: Option<u32>) -> Option<f64> {
        self.sim.get(id, index)
    }

    /// Last actuated value of the output labelled `label`.
    pub fn output_value(&self, label: &str) -> Option<f64> {
        let idx = self.table.outputs().position(|o| o.label == label)?;
        self.router.cached(idx)
    }

    /// Apply one event.
    pub fn handle(&mut self, event: EngineEvent) -> EngineOutput {
        let mut out = EngineOutput::default();
        match event {
            EngineEvent::Edges(edges) => {
                for edge in edges {
                    self.on_edge(edge, &mut out.writes);
                }
            }
            EngineEvent::Push(update) => {
                let Some(identity) = &self.identity else {
                    debug!(values = update.values.len(), "push outside a session, dropping");
                    return out;
                };
                out.actuations = self.router.route(&self.table, identity, &mut self.sim, update);
            }
            EngineEvent::SessionStarted(identity) => {
                info!(subscribed = identity.subscription().len(), "simulator session started");
                self.sim.clear();
                self.router.clear();
                self.identity = Some(identity);
            }
            EngineEvent::SessionEnded => {
                info!("simulator session ended, showing idle screen");
                self.identity = None;
                self.sim.clear();
                self.router.clear();
                out.actuations = self.idle_screen();
            }
        }
        out
    }

    fn on_edge(&mut self, edge: Edge, writes: &mut Vec<WriteRequest>) {
        let controls = self.table.controls_at(edge.input);
        if controls.is_empty() {
            trace!(input = edge.input, kind = %edge.kind, "edge on unmapped input");
            return;
        }
        for &idx in controls {
            if let Some(write) = self.dispatcher.dispatch(
                &self.table,
                idx,
                edge.kind,
                self.identity.as_ref(),
                &mut self.sim,
            ) {
                debug!(%write, "queue write");
                writes.push(write);
            }
        }
    }

    /// Every LED off, backlights at their idle level.
    pub fn idle_screen(&self) -> Vec<Actuation> {
        let mut seen = HashSet::new();
        let leds = self
            .table
            .outputs()
            .filter(|o| matches!(o.kind, OutputKind::Led(_)))
            .filter(|o| seen.insert(o.address.as_str()))
            .map(|o| Actuation::Led {
                address: o.address.clone(),
                brightness: 0,
            });
        let backlights = self.table.backlights().iter().map(|b| Actuation::Led {
            address: b.address.clone(),
            brightness: b.level,
        });
        leds.chain(backlights).collect()
    }

    /// Event loop: runs until `cancel` fires or every sender is gone.
    ///
    /// Never waits on the writer or the output task: when either channel
    /// is full the item is dropped, so a stalled simulator cannot hold up
    /// hardware polling.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<EngineEvent>,
        writes: mpsc::Sender<WriteRequest>,
        actuations: mpsc::Sender<Actuation>,
        cancel: CancellationToken,
    ) {
        for actuation in self.idle_screen() {
            if !forward(&actuations, actuation, "actuation") {
                return;
            }
        }

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                event = events.recv() => {
                    let Some(event) = event else { break };
                    let out = self.handle(event);
                    for write in out.writes {
                        forward(&writes, write, "write");
                    }
                    for actuation in out.actuations {
                        forward(&actuations, actuation, "actuation");
                    }
                }
            }
        }

        debug!("binding engine stopped");
    }
}

/// Queue without waiting. `false` once the receiving task is gone.
fn forward<T: fmt::Debug>(tx: &mpsc::Sender<T>, item: T, kind: &'static str) -> bool {
    match tx.try_send(item) {
        Ok(()) => true,
        Err(TrySendError::Full(item)) => {
            warn!(kind, ?item, "queue full, dropping");
            true
        }
        Err(TrySendError::Closed(_)) => {
            debug!(kind, "receiver gone, dropping");
            false
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use xpanel_api::PushValue;

    use super::*;
    use crate::edge::EdgeKind;
    use crate::model::{Behavior, Control, LedMode, Output, Target};

    fn table() -> Arc<MappingTable> {
        Arc::new(
            MappingTable::builder(1)
                .control(Control {
                    label: "APU_MASTER".into(),
                    input: 0,
                    pin: None,
                    target: Some(Target::dataref("x/apu")),
                    behavior: Behavior::Toggle,
                })
                .output(Output {
                    label: "APU_LED".into(),
                    address: "led_apu".into(),
                    kind: OutputKind::Led(LedMode::default()),
                    dataref: "x/apu".into(),
                    index: None,
                    transform: None,
                })
                .backlight("backlight", 80)
                .build()
                .unwrap(),
        )
    }

    fn identity(table: &MappingTable) -> IdentityCache {
        IdentityCache::from_ids(
            table,
            HashMap::from([("x/apu".to_owned(), DatarefId(5))]),
            HashMap::new(),
        )
    }

    #[test]
    fn idle_screen_on_session_end() {
        let table = table();
        let mut engine = BindingEngine::new(table.clone(), CommandTiming::default());
        engine.handle(EngineEvent::SessionStarted(identity(&table)));

        let out = engine.handle(EngineEvent::SessionEnded);
        assert_eq!(
            out.actuations,
            vec![
                Actuation::Led { address: "led_apu".into(), brightness: 0 },
                Actuation::Led { address: "backlight".into(), brightness: 80 },
            ]
        );
        assert!(!engine.is_connected());
    }

    #[test]
    fn edges_without_session_write_nothing() {
        let mut engine = BindingEngine::new(table(), CommandTiming::default());
        let out = engine.handle(EngineEvent::Edges(vec![Edge {
            input: 0,
            kind: EdgeKind::Press,
        }]));
        assert!(out.writes.is_empty());
    }

    #[test]
    fn reconnect_actuates_again() {
        let table = table();
        let mut engine = BindingEngine::new(table.clone(), CommandTiming::default());
        let push = || {
            EngineEvent::Push(PushUpdate {
                values: vec![(DatarefId(5), PushValue::Scalar(1.0))],
            })
        };

        engine.handle(EngineEvent::SessionStarted(identity(&table)));
        assert_eq!(engine.handle(push()).actuations.len(), 1);
        assert_eq!(engine.handle(push()).actuations.len(), 0);

        engine.handle(EngineEvent::SessionEnded);
        assert_eq!(engine.handle(push()).actuations.len(), 0);

        engine.handle(EngineEvent::SessionStarted(identity(&table)));
        assert_eq!(engine.handle(push()).actuations.len(), 1);
    }

    #[tokio::test]
    async fn run_loop_forwards_outputs() {
        let table = table();
        let engine = BindingEngine::new(table.clone(), CommandTiming::default());
        let (event_tx, event_rx) = mpsc::channel(8);
        let (write_tx, mut write_rx) = mpsc::channel(8);
        let (act_tx, mut act_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(engine.run(event_rx, write_tx, act_tx, cancel.clone()));

        // Startup idle screen.
        assert_eq!(act_rx.recv().await.unwrap().address(), "led_apu");
        assert_eq!(act_rx.recv().await.unwrap().address(), "backlight");

        event_tx
            .send(EngineEvent::SessionStarted(identity(&table)))
            .await
            .unwrap();
        event_tx
            .send(EngineEvent::Edges(vec![Edge {
                input: 0,
                kind: EdgeKind::Press,
            }]))
            .await
            .unwrap();

        assert_eq!(
            write_rx.recv().await.unwrap(),
            WriteRequest::SetDataref {
                id: DatarefId(5),
                index: None,
                value: 1.0
            }
        );

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn full_write_queue_does_not_stall_the_loop() {
        let table = table();
        let engine = BindingEngine::new(table.clone(), CommandTiming::default());
        let (event_tx, event_rx) = mpsc::channel(8);
        let (write_tx, mut write_rx) = mpsc::channel(1);
        let (act_tx, mut act_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(engine.run(event_rx, write_tx, act_tx, cancel.clone()));

        act_rx.recv().await.unwrap();
        act_rx.recv().await.unwrap();

        event_tx
            .send(EngineEvent::SessionStarted(identity(&table)))
            .await
            .unwrap();
        let press = Edge {
            input: 0,
            kind: EdgeKind::Press,
        };
        let release = Edge {
            input: 0,
            kind: EdgeKind::Release,
        };
        for _ in 0..3 {
            event_tx
                .send(EngineEvent::Edges(vec![press, release]))
                .await
                .unwrap();
        }
        event_tx
            .send(EngineEvent::Push(PushUpdate {
                values: vec![(DatarefId(5), PushValue::Scalar(1.0))],
            }))
            .await
            .unwrap();

        let actuation = tokio::time::timeout(Duration::from_secs(1), act_rx.recv())
            .await
            .expect("engine stalled behind the write queue")
            .unwrap();
        assert_eq!(
            actuation,
            Actuation::Led {
                address: "led_apu".into(),
                brightness: 255
            }
        );

        assert!(write_rx.recv().await.is_some());
        assert!(write_rx.try_recv().is_err());

        cancel.cancel();
        task.await.unwrap();
    }
}
