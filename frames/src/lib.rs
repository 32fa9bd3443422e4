//! Broadcast frame model and protobuf codec for realtime change channels.
//!
//! This crate owns the wire representation of one row-change notification
//! delivered on a push channel. Record payloads stay flexible
//! (`serde_json::Value`) so the subscriber decides which shapes it accepts,
//! while the envelope is encoded over protobuf for compact binary transport.

use prost::Message;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Largest integer magnitude an `f64` represents exactly (2^53).
const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;

/// Error returned by [`decode_broadcast`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The raw bytes could not be decoded as a protobuf `WireBroadcast`.
    #[error("failed to decode protobuf broadcast: {0}")]
    Decode(#[from] prost::DecodeError),
    /// The `operation` integer on the wire does not map to a known [`Operation`].
    #[error("invalid broadcast operation: {0}")]
    InvalidOperation(i32),
}

/// Row operation carried by a broadcast.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// A row was inserted; `record` holds the new row.
    Insert,
    /// A row was updated; `record` holds the new row, `old_record` may hold the prior one.
    Update,
    /// A row was deleted; `old_record` holds (at least the key of) the removed row.
    Delete,
}

impl Operation {
    /// Convert operation into wire enum integer value.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Insert => WireOperation::Insert as i32,
            Self::Update => WireOperation::Update as i32,
            Self::Delete => WireOperation::Delete as i32,
        }
    }

    fn from_i32(value: i32) -> Result<Self, CodecError> {
        match WireOperation::try_from(value) {
            Ok(WireOperation::Insert) => Ok(Self::Insert),
            Ok(WireOperation::Update) => Ok(Self::Update),
            Ok(WireOperation::Delete) => Ok(Self::Delete),
            Err(_) => Err(CodecError::InvalidOperation(value)),
        }
    }
}

/// A single change notification on a realtime channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Broadcast {
    /// Channel name the broadcast was published on, e.g. `"kanban-cards:<board>"`.
    pub channel: String,
    /// Row operation.
    pub operation: Operation,
    /// Source table of the changed row, e.g. `"kanban_cards"`.
    pub table: String,
    /// New row for inserts and updates.
    #[serde(default)]
    pub record: Option<Value>,
    /// Prior row for deletes (and optionally updates).
    #[serde(default)]
    pub old_record: Option<Value>,
    /// Milliseconds since the Unix epoch when the change was committed.
    #[serde(default)]
    pub ts: i64,
}

impl Broadcast {
    /// Build a broadcast with no records attached.
    #[must_use]
    pub fn new(channel: impl Into<String>, operation: Operation, table: impl Into<String>) -> Self {
        Self { channel: channel.into(), operation, table: table.into(), record: None, old_record: None, ts: 0 }
    }

    /// Attach the new row.
    #[must_use]
    pub fn with_record(mut self, record: Value) -> Self {
        self.record = Some(record);
        self
    }

    /// Attach the prior row.
    #[must_use]
    pub fn with_old_record(mut self, old_record: Value) -> Self {
        self.old_record = Some(old_record);
        self
    }

    /// Set the commit timestamp.
    #[must_use]
    pub fn with_ts(mut self, ts: i64) -> Self {
        self.ts = ts;
        self
    }
}

/// Encode a broadcast into protobuf bytes.
#[must_use]
pub fn encode_broadcast(broadcast: &Broadcast) -> Vec<u8> {
    let wire = broadcast_to_wire(broadcast);

    let mut out = Vec::with_capacity(wire.encoded_len());
    // Encoding into a growable Vec<u8> cannot hit `BufferTooSmall`, the only
    // error prost reports here.
    wire.encode(&mut out).unwrap_or_default();
    out
}

/// Decode protobuf bytes into a broadcast.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] for malformed bytes and
/// [`CodecError::InvalidOperation`] for out-of-range operation values.
pub fn decode_broadcast(bytes: &[u8]) -> Result<Broadcast, CodecError> {
    let wire = WireBroadcast::decode(bytes)?;
    wire_to_broadcast(wire)
}

fn broadcast_to_wire(broadcast: &Broadcast) -> WireBroadcast {
    WireBroadcast {
        channel: broadcast.channel.clone(),
        operation: broadcast.operation.as_i32(),
        table: broadcast.table.clone(),
        record: broadcast.record.as_ref().map(json_to_proto_value),
        old_record: broadcast.old_record.as_ref().map(json_to_proto_value),
        ts: broadcast.ts,
    }
}

fn wire_to_broadcast(wire: WireBroadcast) -> Result<Broadcast, CodecError> {
    Ok(Broadcast {
        channel: wire.channel,
        operation: Operation::from_i32(wire.operation)?,
        table: wire.table,
        record: wire.record.as_ref().map(proto_to_json_value),
        old_record: wire.old_record.as_ref().map(proto_to_json_value),
        ts: wire.ts,
    })
}

fn json_to_proto_value(value: &Value) -> prost_types::Value {
    let kind = match value {
        Value::Null => {
            prost_types::value::Kind::NullValue(prost_types::NullValue::NullValue as i32)
        }
        Value::Bool(v) => prost_types::value::Kind::BoolValue(*v),
        Value::Number(v) => prost_types::value::Kind::NumberValue(v.as_f64().unwrap_or(0.0)),
        Value::String(v) => prost_types::value::Kind::StringValue(v.clone()),
        Value::Array(v) => prost_types::value::Kind::ListValue(prost_types::ListValue {
            values: v.iter().map(json_to_proto_value).collect(),
        }),
        Value::Object(v) => prost_types::value::Kind::StructValue(prost_types::Struct {
            fields: v
                .iter()
                .map(|(k, v)| (k.clone(), json_to_proto_value(v)))
                .collect(),
        }),
    };

    prost_types::Value { kind: Some(kind) }
}

fn proto_to_json_value(value: &prost_types::Value) -> Value {
    let Some(kind) = &value.kind else {
        return Value::Null;
    };

    match kind {
        prost_types::value::Kind::NullValue(_) => Value::Null,
        prost_types::value::Kind::NumberValue(v) => number_to_json(*v),
        prost_types::value::Kind::StringValue(v) => Value::String(v.clone()),
        prost_types::value::Kind::BoolValue(v) => Value::Bool(*v),
        prost_types::value::Kind::StructValue(v) => Value::Object(
            v.fields
                .iter()
                .map(|(k, v)| (k.clone(), proto_to_json_value(v)))
                .collect(),
        ),
        prost_types::value::Kind::ListValue(v) => {
            Value::Array(v.values.iter().map(proto_to_json_value).collect())
        }
    }
}

/// Protobuf carries every number as a double. Integral values come back as
/// JSON integers so row fields like `position` deserialize into `i64`.
fn number_to_json(v: f64) -> Value {
    if v.is_finite() && v.fract() == 0.0 && v.abs() <= MAX_EXACT_INT {
        #[allow(clippy::cast_possible_truncation)]
        {
            return Value::from(v as i64);
        }
    }
    serde_json::Number::from_f64(v).map_or(Value::Null, Value::Number)
}

#[derive(Clone, PartialEq, Message)]
struct WireBroadcast {
    #[prost(string, tag = "1")]
    channel: String,
    #[prost(enumeration = "WireOperation", tag = "2")]
    operation: i32,
    #[prost(string, tag = "3")]
    table: String,
    #[prost(message, optional, tag = "4")]
    record: Option<prost_types::Value>,
    #[prost(message, optional, tag = "5")]
    old_record: Option<prost_types::Value>,
    #[prost(int64, tag = "6")]
    ts: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, prost::Enumeration)]
#[repr(i32)]
enum WireOperation {
    Insert = 0,
    Update = 1,
    Delete = 2,
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
