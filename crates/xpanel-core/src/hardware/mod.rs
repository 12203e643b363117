// ── Hardware boundary ──
//
// Input devices produce fixed-size bitmask samples; output devices take
// LED brightness and numeric display writes by output name. The poll
// task owns the edge detector, the output task owns the output device.

pub mod aux_board;

use std::future::Future;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::edge::EdgeDetector;
use crate::engine::EngineEvent;
use crate::error::CoreError;
use crate::router::Actuation;

/// A source of hardware input samples.
pub trait InputDevice: Send + 'static {
    /// Expected sample size in bytes.
    fn frame_len(&self) -> usize;

    /// Wait for the next sample.
    fn read_frame(&mut self) -> impl Future<Output = Result<Vec<u8>, CoreError>> + Send;
}

/// A sink for LED and display writes.
pub trait OutputDevice: Send + 'static {
    fn set_led(
        &mut self,
        address: &str,
        brightness: u8,
    ) -> impl Future<Output = Result<(), CoreError>> + Send;

    fn set_display(
        &mut self,
        address: &str,
        value: i64,
        negative: bool,
    ) -> impl Future<Output = Result<(), CoreError>> + Send;
}

/// Read samples, diff them and forward drained edges to the engine.
///
/// Edge state lives for the whole task, across simulator sessions.
/// Malformed samples are skipped; a read error ends the task.
pub async fn run_input<D: InputDevice>(
    mut device: D,
    events: mpsc::Sender<EngineEvent>,
    cancel: CancellationToken,
) -> Result<(), CoreError> {
    let mut detector = EdgeDetector::new(device.frame_len());

    loop {
        let sample = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            sample = device.read_frame() => sample?,
        };

        if let Err(e) = detector.diff(&sample) {
            warn!(error = %e, "skipping hardware sample");
            continue;
        }
        let edges = detector.drain();
        if edges.is_empty() {
            continue;
        }
        debug!(count = edges.len(), "input edges");
        if events.send(EngineEvent::Edges(edges)).await.is_err() {
            break;
        }
    }

    debug!("input task stopped");
    Ok(())
}

/// Apply actuations to the output device, best effort.
pub async fn run_output<D: OutputDevice>(
    mut device: D,
    mut actuations: mpsc::Receiver<Actuation>,
    cancel: CancellationToken,
) {
    loop {
        let actuation = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = actuations.recv() => match next {
                Some(a) => a,
                None => break,
            },
        };

        let result = match &actuation {
            Actuation::Led {
                address,
                brightness,
            } => device.set_led(address, *brightness).await,
            Actuation::Display {
                address,
                value,
                negative,
            } => device.set_display(address, *value, *negative).await,
        };
        if let Err(e) = result {
            warn!(address = actuation.address(), error = %e, "hardware write failed");
        }
    }

    debug!("output task stopped");
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::edge::{Edge, EdgeKind};

    struct ScriptedInput {
        frames: VecDeque<Vec<u8>>,
    }

    impl InputDevice for ScriptedInput {
        fn frame_len(&self) -> usize {
            2
        }

        async fn read_frame(&mut self) -> Result<Vec<u8>, CoreError> {
            match self.frames.pop_front() {
                Some(frame) => Ok(frame),
                None => Err(CoreError::hardware("scripted", &"end of script")),
            }
        }
    }

    #[tokio::test]
    async fn malformed_frames_produce_no_events() {
        let device = ScriptedInput {
            frames: VecDeque::from([
                vec![0b1, 0],
                vec![0b0],
                vec![0b0, 0, 0],
                vec![0b0, 0],
            ]),
        };
        let (tx, mut rx) = mpsc::channel(8);

        let result = run_input(device, tx, CancellationToken::new()).await;
        assert!(result.is_err());

        let mut seen = Vec::new();
        while let Ok(EngineEvent::Edges(edges)) = rx.try_recv() {
            seen.extend(edges);
        }
        assert_eq!(
            seen,
            vec![
                Edge {
                    input: 0,
                    kind: EdgeKind::Press
                },
                Edge {
                    input: 0,
                    kind: EdgeKind::Release
                },
            ]
        );
    }
}
