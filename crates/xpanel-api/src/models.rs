// Wire models for the simulator web API (v2).
//
// REST lookups return `{ "data": [ { "id": N, ... } ] }`. Writes take
// `{ "data": value }` and command activations `{ "duration": secs }`.
// The websocket speaks `dataref_subscribe_values` requests and pushes
// `dataref_update_values` messages keyed by stringified numeric IDs.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

// ── Identifiers ─────────────────────────────────────────────────────

/// Session-scoped numeric ID the simulator assigns to a dataref.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatarefId(pub u64);

/// Session-scoped numeric ID the simulator assigns to a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(pub u64);

impl fmt::Display for DatarefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── REST payloads ───────────────────────────────────────────────────

/// `GET /datarefs?filter[name]=X` and `GET /commands?filter[name]=X`.
#[derive(Debug, Deserialize)]
pub struct LookupResponse {
    #[serde(default)]
    pub data: Vec<LookupEntry>,
}

#[derive(Debug, Deserialize)]
pub struct LookupEntry {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
}

/// A value written to a dataref.
///
/// Integral values serialize as JSON integers so int datarefs accept
/// them; everything else goes out as a float.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WriteValue(pub f64);

impl Serialize for WriteValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let v = self.0;
        if v.fract() == 0.0 && v.is_finite() && v.abs() < 9.0e15 {
            #[allow(clippy::cast_possible_truncation)]
            serializer.serialize_i64(v as i64)
        } else {
            serializer.serialize_f64(v)
        }
    }
}

/// `PATCH /datarefs/{id}/value`
#[derive(Debug, Serialize)]
pub struct SetValueRequest {
    pub data: WriteValue,
}

/// `POST /command/{id}/activate`
#[derive(Debug, Serialize)]
pub struct ActivateRequest {
    pub duration: f64,
}

// ── Websocket payloads ──────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct SubscribeRequest {
    pub req_id: u64,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub params: SubscribeParams,
}

#[derive(Debug, Serialize)]
pub struct SubscribeParams {
    pub datarefs: Vec<IdRef>,
}

#[derive(Debug, Serialize)]
pub struct IdRef {
    pub id: DatarefId,
}

impl SubscribeRequest {
    pub fn datarefs(req_id: u64, ids: &[DatarefId]) -> Self {
        Self {
            req_id,
            kind: "dataref_subscribe_values",
            params: SubscribeParams {
                datarefs: ids.iter().map(|&id| IdRef { id }).collect(),
            },
        }
    }
}

/// Acknowledgment for a websocket request.
#[derive(Debug, Deserialize)]
pub struct Ack {
    #[serde(default)]
    pub req_id: Option<u64>,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Raw server message as seen on the websocket.
#[derive(Debug, Deserialize)]
pub struct ServerMessage {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,
}

// ── Push updates ────────────────────────────────────────────────────

/// A pushed dataref value: plain scalar or array dataref.
#[derive(Debug, Clone, PartialEq)]
pub enum PushValue {
    Scalar(f64),
    Array(Vec<f64>),
}

impl PushValue {
    /// Interpret a raw JSON value. Strings (byte datarefs) and objects
    /// are not actuatable and yield `None`; non-numeric array elements
    /// become `0.0` so slot positions stay aligned.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => n.as_f64().map(Self::Scalar),
            serde_json::Value::Bool(b) => Some(Self::Scalar(if *b { 1.0 } else { 0.0 })),
            serde_json::Value::Array(items) => Some(Self::Array(
                items
                    .iter()
                    .map(|v| v.as_f64().unwrap_or(0.0))
                    .collect(),
            )),
            _ => None,
        }
    }
}

/// One `dataref_update_values` message, decoded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PushUpdate {
    pub values: Vec<(DatarefId, PushValue)>,
}

impl PushUpdate {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
