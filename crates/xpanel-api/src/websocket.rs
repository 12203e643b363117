//! Dataref subscription over the simulator websocket.
//!
//! Opens the websocket, sends one `dataref_subscribe_values` request for
//! every resolved ID, waits for the acknowledgment, and then yields
//! decoded `dataref_update_values` pushes until the stream ends.
//!
//! There is no reconnect loop in here: a dropped stream ends
//! the whole simulator session, and the session supervisor in
//! `xpanel-core` starts over with fresh ID resolution.
//!
//! # Example
//!
//! ```rust,ignore
//! use xpanel_api::websocket::DatarefSubscription;
//!
//! let mut sub = DatarefSubscription::open(&ws_url, &ids, 0).await?;
//! while let Some(update) = sub.next_update().await? {
//!     println!("{update:?}");
//! }
//! ```

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::error::Error;
use crate::models::{Ack, DatarefId, PushUpdate, PushValue, ServerMessage, SubscribeRequest};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const UPDATE_MESSAGE: &str = "dataref_update_values";

// ── DatarefSubscription ──────────────────────────────────────────────

/// A live, acknowledged dataref subscription.
pub struct DatarefSubscription {
    // Held so the connection stays writable for pong replies.
    _write: SplitSink<WsStream, Message>,
    read: SplitStream<WsStream>,
}

impl DatarefSubscription {
    /// Connect, subscribe to `ids`, and wait for the acknowledgment.
    pub async fn open(ws_url: &Url, ids: &[DatarefId], req_id: u64) -> Result<Self, Error> {
        tracing::info!(url = %ws_url, count = ids.len(), "Connecting to simulator websocket");

        let (ws_stream, _response) = tokio_tungstenite::connect_async(ws_url.as_str())
            .await
            .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

        let (mut write, mut read) = ws_stream.split();

        let request = SubscribeRequest::datarefs(req_id, ids);
        let payload = serde_json::to_string(&request).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: String::new(),
        })?;
        write
            .send(Message::Text(payload.into()))
            .await
            .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

        let ack = read_ack(&mut read).await?;
        if !ack.success {
            return Err(Error::SubscriptionRejected {
                message: ack
                    .error_message
                    .unwrap_or_else(|| format!("req_id {req_id} not acknowledged")),
            });
        }

        tracing::info!(req_id = ?ack.req_id, "dataref subscription acknowledged");
        Ok(Self {
            _write: write,
            read,
        })
    }

    /// Read until the next dataref push.
    ///
    /// Returns `Ok(None)` when the server closes the stream cleanly.
    /// Cancel-safe: dropping the future loses no decoded update.
    pub async fn next_update(&mut self) -> Result<Option<PushUpdate>, Error> {
        loop {
            match self.read.next().await {
                Some(Ok(Message::Text(text))) => {
                    if let Some(update) = parse_update(&text) {
                        return Ok(Some(update));
                    }
                }
                Some(Ok(Message::Ping(_))) => {
                    // tungstenite handles pong replies automatically
                    tracing::trace!("WebSocket ping");
                }
                Some(Ok(Message::Close(frame))) => {
                    if let Some(ref cf) = frame {
                        tracing::info!(
                            code = %cf.code,
                            reason = %cf.reason,
                            "WebSocket close frame received"
                        );
                    } else {
                        tracing::info!("WebSocket close frame received (no payload)");
                    }
                    return Ok(None);
                }
                Some(Err(e)) => return Err(Error::WebSocketConnect(e.to_string())),
                None => {
                    tracing::info!("WebSocket stream ended");
                    return Ok(None);
                }
                Some(Ok(_)) => {
                    // Binary, Pong, Frame -- ignore
                }
            }
        }
    }
}

// ── Message parsing ──────────────────────────────────────────────────

async fn read_ack(read: &mut SplitStream<WsStream>) -> Result<Ack, Error> {
    loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => {
                return serde_json::from_str::<Ack>(&text).map_err(|e| Error::Deserialization {
                    message: e.to_string(),
                    body: text.to_string(),
                });
            }
            Some(Ok(Message::Close(frame))) => {
                let (code, reason) = frame.map_or((1005, String::new()), |cf| {
                    (u16::from(cf.code), cf.reason.to_string())
                });
                return Err(Error::WebSocketClosed { code, reason });
            }
            Some(Err(e)) => return Err(Error::WebSocketConnect(e.to_string())),
            None => {
                return Err(Error::WebSocketClosed {
                    code: 1006,
                    reason: "closed before acknowledgment".into(),
                });
            }
            Some(Ok(_)) => {}
        }
    }
}

/// Decode a text frame into a push update.
///
/// Non-update messages, unparseable JSON and non-numeric keys are
/// logged and skipped.
fn parse_update(text: &str) -> Option<PushUpdate> {
    let message: ServerMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            tracing::debug!(error = %e, "Failed to parse websocket message");
            return None;
        }
    };

    if message.kind != UPDATE_MESSAGE {
        tracing::debug!(kind = %message.kind, "ignoring websocket message");
        return None;
    }

    let mut values: Vec<(DatarefId, PushValue)> = message
        .data
        .iter()
        .filter_map(|(key, raw)| {
            let Ok(id) = key.parse::<u64>() else {
                tracing::debug!(key = %key, "non-numeric dataref key in push");
                return None;
            };
            let Some(value) = PushValue::from_json(raw) else {
                tracing::trace!(id, "non-numeric dataref value in push");
                return None;
            };
            Some((DatarefId(id), value))
        })
        .collect();
    values.sort_by_key(|(id, _)| *id);

    Some(PushUpdate { values })
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_scalar_and_array_update() {
        let raw = serde_json::json!({
            "type": "dataref_update_values",
            "data": {
                "42": 1,
                "7": [0, 1, 0, 1]
            }
        });

        let update = parse_update(&raw.to_string()).unwrap();
        assert_eq!(
            update.values,
            vec![
                (DatarefId(7), PushValue::Array(vec![0.0, 1.0, 0.0, 1.0])),
                (DatarefId(42), PushValue::Scalar(1.0)),
            ]
        );
    }

    #[test]
    fn parse_ignores_other_message_types() {
        let raw = serde_json::json!({ "type": "result", "req_id": 1, "success": true });
        assert!(parse_update(&raw.to_string()).is_none());
    }

    #[test]
    fn parse_skips_bad_keys_and_values() {
        let raw = serde_json::json!({
            "type": "dataref_update_values",
            "data": { "abc": 1, "5": "QUJD", "6": 2.5 }
        });

        let update = parse_update(&raw.to_string()).unwrap();
        assert_eq!(update.values, vec![(DatarefId(6), PushValue::Scalar(2.5))]);
    }

    #[test]
    fn parse_malformed_json() {
        // Should not panic, should just log and skip
        assert!(parse_update("not json at all").is_none());
    }
}
