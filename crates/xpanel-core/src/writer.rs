// ── Simulator writer ──
//
// Executes write requests one at a time, in the order the engine queued
// them. Nothing is retried: a rejected write is logged and dropped, a
// write that hits a dead connection also declares the session it was
// sent under lost so the push loop is torn down promptly.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::dispatch::WriteRequest;
use crate::resolver::SimulatorLink;
use crate::session::SessionControl;

pub async fn run_writer<L: SimulatorLink>(
    link: Arc<L>,
    mut requests: mpsc::Receiver<WriteRequest>,
    control: SessionControl,
    cancel: CancellationToken,
) {
    loop {
        let request = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            request = requests.recv() => match request {
                Some(r) => r,
                None => break,
            },
        };

        let generation = control.generation().await;
        let result = match &request {
            WriteRequest::SetDataref { id, index, value } => {
                link.set_dataref(*id, *value, *index).await
            }
            WriteRequest::ActivateCommand { id, duration } => {
                link.activate_command(*id, *duration).await
            }
        };

        match result {
            Ok(()) => debug!(%request, "write accepted"),
            Err(e) if e.is_transient() => {
                warn!(%request, error = %e, "write failed, simulator unreachable");
                control.declare_lost(generation).await;
            }
            Err(e) => warn!(%request, status = ?e.status(), error = %e, "write rejected"),
        }
    }

    debug!("simulator writer stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use xpanel_api::{CommandId, DatarefId};

    use super::*;

    #[derive(Default)]
    struct RecordingLink {
        calls: Mutex<Vec<String>>,
        fail_with_transport: bool,
    }

    impl SimulatorLink for RecordingLink {
        async fn lookup_dataref(&self, _name: &str) -> Result<DatarefId, xpanel_api::Error> {
            Ok(DatarefId(0))
        }

        async fn lookup_command(&self, _name: &str) -> Result<CommandId, xpanel_api::Error> {
            Ok(CommandId(0))
        }

        async fn set_dataref(
            &self,
            id: DatarefId,
            value: f64,
            index: Option<u32>,
        ) -> Result<(), xpanel_api::Error> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("set {id} {index:?} {value}"));
            if self.fail_with_transport {
                return Err(xpanel_api::Error::WebSocketConnect("refused".into()));
            }
            Ok(())
        }

        async fn activate_command(
            &self,
            id: CommandId,
            duration: Duration,
        ) -> Result<(), xpanel_api::Error> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("fire {id} {}", duration.as_millis()));
            Err(xpanel_api::Error::Api {
                status: 404,
                message: "unknown command".into(),
            })
        }
    }

    #[tokio::test]
    async fn writes_run_in_order_and_rejections_are_dropped() {
        let link = Arc::new(RecordingLink::default());
        let parent = CancellationToken::new();
        let control = SessionControl::new(&parent);
        let (tx, rx) = mpsc::channel(8);

        tx.send(WriteRequest::ActivateCommand {
            id: CommandId(4),
            duration: Duration::from_millis(200),
        })
        .await
        .unwrap();
        tx.send(WriteRequest::SetDataref {
            id: DatarefId(1),
            index: Some(2),
            value: 1.0,
        })
        .await
        .unwrap();
        drop(tx);

        run_writer(link.clone(), rx, control, parent.clone()).await;

        assert_eq!(
            *link.calls.lock().unwrap(),
            vec!["fire 4 200".to_owned(), "set 1 Some(2) 1".to_owned()]
        );
        assert!(!parent.is_cancelled());
    }

    #[tokio::test]
    async fn transport_failure_declares_session_lost() {
        let link = Arc::new(RecordingLink {
            fail_with_transport: true,
            ..RecordingLink::default()
        });
        let parent = CancellationToken::new();
        let control = SessionControl::new(&parent);
        let (tx, rx) = mpsc::channel(8);

        tx.send(WriteRequest::SetDataref {
            id: DatarefId(1),
            index: None,
            value: 0.0,
        })
        .await
        .unwrap();
        drop(tx);

        let probe = control.clone();
        run_writer(link, rx, control, parent.clone()).await;

        assert!(probe.is_lost().await);
        assert!(!parent.is_cancelled());
    }

    /// Reconnects while a write is in flight, then fails it.
    struct ReconnectingLink {
        control: SessionControl,
        parent: CancellationToken,
    }

    impl SimulatorLink for ReconnectingLink {
        async fn lookup_dataref(&self, _name: &str) -> Result<DatarefId, xpanel_api::Error> {
            Ok(DatarefId(0))
        }

        async fn lookup_command(&self, _name: &str) -> Result<CommandId, xpanel_api::Error> {
            Ok(CommandId(0))
        }

        async fn set_dataref(
            &self,
            _id: DatarefId,
            _value: f64,
            _index: Option<u32>,
        ) -> Result<(), xpanel_api::Error> {
            self.control.begin(&self.parent).await;
            Err(xpanel_api::Error::WebSocketConnect("timed out".into()))
        }

        async fn activate_command(
            &self,
            _id: CommandId,
            _duration: Duration,
        ) -> Result<(), xpanel_api::Error> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn late_failure_leaves_the_next_session_alone() {
        let parent = CancellationToken::new();
        let control = SessionControl::new(&parent);
        let link = Arc::new(ReconnectingLink {
            control: control.clone(),
            parent: parent.clone(),
        });
        let (tx, rx) = mpsc::channel(8);

        tx.send(WriteRequest::SetDataref {
            id: DatarefId(1),
            index: None,
            value: 1.0,
        })
        .await
        .unwrap();
        drop(tx);

        let before = control.generation().await;
        run_writer(link, rx, control.clone(), parent.clone()).await;

        assert_eq!(control.generation().await, before + 1);
        assert!(!control.is_lost().await);
    }
}
