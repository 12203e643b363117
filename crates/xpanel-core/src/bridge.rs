// ── Bridge facade ──
//
// Wires one hardware panel to one simulator: the binding engine actor,
// the session supervisor, the simulator writer and the two hardware
// tasks, all under one cancellation token.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use xpanel_api::{SimClient, TransportConfig};

use crate::config::BridgeConfig;
use crate::engine::BindingEngine;
use crate::error::CoreError;
use crate::hardware::{self, InputDevice, OutputDevice};
use crate::model::MappingTable;
use crate::session::{ConnectionState, SessionControl, SessionSupervisor};
use crate::writer::run_writer;

const EVENT_CHANNEL_SIZE: usize = 256;
const WRITE_CHANNEL_SIZE: usize = 64;
const ACTUATION_CHANNEL_SIZE: usize = 256;

/// Cheaply cloneable handle to a running (or not yet started) bridge.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

struct BridgeInner {
    config: BridgeConfig,
    table: Arc<MappingTable>,
    client: Arc<SimClient>,
    connection_state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Bridge {
    /// Build the simulator client. Does not connect; call
    /// [`start()`](Self::start) to spawn the background tasks.
    pub fn new(config: BridgeConfig, table: MappingTable) -> Result<Self, CoreError> {
        let transport = TransportConfig::default().with_timeout(config.timeout);
        let client = SimClient::new(config.rest_url.clone(), &transport)?;
        let (connection_state, _) = watch::channel(ConnectionState::Disconnected);

        Ok(Self {
            inner: Arc::new(BridgeInner {
                config,
                table: Arc::new(table),
                client: Arc::new(client),
                connection_state,
                cancel: CancellationToken::new(),
                task_handles: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    pub fn table(&self) -> &Arc<MappingTable> {
        &self.inner.table
    }

    pub fn client(&self) -> &Arc<SimClient> {
        &self.inner.client
    }

    /// Subscribe to simulator session state changes.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection_state.subscribe()
    }

    /// Spawn every background task. A bridge starts once.
    pub async fn start<I, O>(&self, input: I, output: O) -> Result<(), CoreError>
    where
        I: InputDevice,
        O: OutputDevice,
    {
        let mut handles = self.inner.task_handles.lock().await;
        if !handles.is_empty() || self.inner.cancel.is_cancelled() {
            return Err(CoreError::Internal("bridge already started".into()));
        }
        if input.frame_len() != self.inner.table.frame_bytes() {
            return Err(CoreError::MalformedSample {
                expected: self.inner.table.frame_bytes(),
                got: input.frame_len(),
            });
        }

        let cancel = self.inner.cancel.clone();
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        let (write_tx, write_rx) = mpsc::channel(WRITE_CHANNEL_SIZE);
        let (act_tx, act_rx) = mpsc::channel(ACTUATION_CHANNEL_SIZE);
        let control = SessionControl::new(&cancel);

        let engine = BindingEngine::new(self.inner.table.clone(), self.inner.config.timing);
        handles.push(tokio::spawn(engine.run(
            event_rx,
            write_tx,
            act_tx,
            cancel.clone(),
        )));

        let supervisor = SessionSupervisor::new(
            self.inner.client.clone(),
            self.inner.config.ws_url.clone(),
            self.inner.table.clone(),
            self.inner.config.reconnect.clone(),
            event_tx.clone(),
            self.inner.connection_state.clone(),
            control.clone(),
        );
        handles.push(tokio::spawn(supervisor.run(cancel.clone())));

        handles.push(tokio::spawn(run_writer(
            self.inner.client.clone(),
            write_rx,
            control,
            cancel.clone(),
        )));

        let input_cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            if let Err(e) = hardware::run_input(input, event_tx, input_cancel.clone()).await {
                error!(error = %e, "hardware input failed, stopping bridge");
                input_cancel.cancel();
            }
        }));

        handles.push(tokio::spawn(hardware::run_output(output, act_rx, cancel)));

        info!(
            controls = self.inner.table.controls().count(),
            outputs = self.inner.table.output_count(),
            "bridge started"
        );
        Ok(())
    }

    /// Resolves once the bridge is stopping, either through
    /// [`shutdown()`](Self::shutdown) or because hardware input failed.
    pub async fn stopped(&self) {
        self.inner.cancel.cancelled().await;
    }

    /// Cancel every task and wait for them to finish.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }

        let _ = self
            .inner
            .connection_state
            .send(ConnectionState::Disconnected);
        debug!("bridge shut down");
    }
}
