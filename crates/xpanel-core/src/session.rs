// ── Simulator session supervision ──
//
// Disconnected → Connecting (resolve every ID, subscribe) → Subscribed
// (push loop) → Disconnected, on any network error or closed stream.
// Every session starts resolution from scratch; there is no partial
// resubscribe. Between failed sessions the supervisor backs off
// exponentially.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;
use xpanel_api::DatarefSubscription;

use crate::config::ReconnectConfig;
use crate::engine::EngineEvent;
use crate::error::CoreError;
use crate::identity::IdentityCache;
use crate::model::MappingTable;
use crate::resolver::{EndpointResolver, SimulatorLink};

// ── ConnectionState ──────────────────────────────────────────────────

/// Simulator session state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    /// Resolving IDs and subscribing; `attempt` counts failed sessions in a row.
    Connecting { attempt: u32 },
    Subscribed,
    /// Gave up after the configured retry limit.
    Failed,
}

// ── SessionControl ───────────────────────────────────────────────────

/// Handle for declaring the current session lost from outside the push
/// loop, e.g. when a write hits a dead connection.
///
/// Every session gets a generation number. A loss reported against an
/// older generation is ignored, so a write that outlived its session
/// cannot tear down the one that replaced it.
#[derive(Clone)]
pub struct SessionControl {
    current: Arc<Mutex<SessionSlot>>,
}

struct SessionSlot {
    generation: u64,
    token: CancellationToken,
}

impl SessionControl {
    pub fn new(parent: &CancellationToken) -> Self {
        Self {
            current: Arc::new(Mutex::new(SessionSlot {
                generation: 0,
                token: parent.child_token(),
            })),
        }
    }

    /// Generation of the session running now.
    pub async fn generation(&self) -> u64 {
        self.current.lock().await.generation
    }

    /// Cancel session `generation` if it is still the running one; the
    /// supervisor then reconnects.
    pub async fn declare_lost(&self, generation: u64) {
        let slot = self.current.lock().await;
        if slot.generation != generation {
            debug!(
                generation,
                current = slot.generation,
                "loss reported for an earlier session, ignoring"
            );
            return;
        }
        if !slot.token.is_cancelled() {
            warn!(generation, "simulator session declared lost");
            slot.token.cancel();
        }
    }

    /// `true` once the current session has been cancelled.
    pub async fn is_lost(&self) -> bool {
        self.current.lock().await.token.is_cancelled()
    }

    /// Fresh child token for the next session.
    pub(crate) async fn begin(&self, parent: &CancellationToken) -> CancellationToken {
        let child = parent.child_token();
        let mut slot = self.current.lock().await;
        slot.generation += 1;
        slot.token = child.clone();
        child
    }
}

// ── SessionSupervisor ────────────────────────────────────────────────

pub struct SessionSupervisor<L> {
    link: Arc<L>,
    ws_url: Url,
    table: Arc<MappingTable>,
    reconnect: ReconnectConfig,
    events: mpsc::Sender<EngineEvent>,
    state: watch::Sender<ConnectionState>,
    control: SessionControl,
    req_id: u64,
    was_subscribed: bool,
}

impl<L: SimulatorLink> SessionSupervisor<L> {
    pub fn new(
        link: Arc<L>,
        ws_url: Url,
        table: Arc<MappingTable>,
        reconnect: ReconnectConfig,
        events: mpsc::Sender<EngineEvent>,
        state: watch::Sender<ConnectionState>,
        control: SessionControl,
    ) -> Self {
        Self {
            link,
            ws_url,
            table,
            reconnect,
            events,
            state,
            control,
            req_id: 0,
            was_subscribed: false,
        }
    }

    /// Main loop: connect → push loop → on error, backoff → reconnect.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut attempt: u32 = 0;

        loop {
            let _ = self.state.send(ConnectionState::Connecting { attempt });
            let session = self.control.begin(&cancel).await;

            self.was_subscribed = false;
            let result = self.run_session(&session).await;
            let _ = self.state.send(ConnectionState::Disconnected);
            if cancel.is_cancelled() || self.events.is_closed() {
                break;
            }
            if self.was_subscribed {
                attempt = 0;
            }

            match result {
                Ok(()) => {
                    info!("simulator session closed, reconnecting");
                    attempt = 0;
                }
                Err(e) => {
                    warn!(error = %e, attempt, "simulator session failed");

                    if let Some(max) = self.reconnect.max_retries {
                        if attempt >= max {
                            error!(max_retries = max, "simulator reconnection limit reached, giving up");
                            let _ = self.state.send(ConnectionState::Failed);
                            break;
                        }
                    }

                    let delay = calculate_backoff(attempt, &self.reconnect);
                    info!(
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        attempt,
                        "waiting before reconnect"
                    );

                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(delay) => {}
                    }

                    attempt = attempt.saturating_add(1);
                }
            }
        }

        debug!("session supervisor stopped");
    }

    /// One session. `Ok(())` only when the session was cancelled from
    /// the parent token; every other end is an error.
    async fn run_session(&mut self, session: &CancellationToken) -> Result<(), CoreError> {
        let mut resolver = EndpointResolver::new(self.link.as_ref());
        let identity = tokio::select! {
            biased;
            () = session.cancelled() => return Ok(()),
            identity = IdentityCache::build(&self.table, &mut resolver) => identity?,
        };

        let ids = identity.subscription();
        let req_id = self.req_id;
        self.req_id += 1;
        let mut subscription = tokio::select! {
            biased;
            () = session.cancelled() => return Ok(()),
            sub = DatarefSubscription::open(&self.ws_url, &ids, req_id) => sub?,
        };

        if self.events.send(EngineEvent::SessionStarted(identity)).await.is_err() {
            return Ok(());
        }
        let _ = self.state.send(ConnectionState::Subscribed);
        self.was_subscribed = true;

        let result = self.push_loop(&mut subscription, session).await;
        let _ = self.events.send(EngineEvent::SessionEnded).await;
        result
    }

    async fn push_loop(
        &self,
        subscription: &mut DatarefSubscription,
        session: &CancellationToken,
    ) -> Result<(), CoreError> {
        loop {
            tokio::select! {
                biased;
                () = session.cancelled() => {
                    return Err(CoreError::ConnectionLost {
                        reason: "session cancelled".into(),
                    });
                }
                update = subscription.next_update() => {
                    let Some(update) = update? else {
                        return Err(CoreError::ConnectionLost {
                            reason: "push stream closed".into(),
                        });
                    };
                    if update.is_empty() {
                        continue;
                    }
                    if self.events.send(EngineEvent::Push(update)).await.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) * (1 ± 25%)`
pub fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic "jitter" seeded from the attempt number.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

// ── Tests ────────────────────────────────────────────────────────────
