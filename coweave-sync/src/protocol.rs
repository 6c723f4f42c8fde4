//! Sync protocol messages.
//!
//! Peers exchange three kinds of messages, all scoped to one CoValue:
//! 1. `load` asks a peer for a value and tells it what we already have
//! 2. `known` states what the sender has (`header: false` means nothing)
//! 3. `content` carries the transactions the receiver is missing
//!
//! Content is applied through the same validation path as local writes, so
//! messages may arrive duplicated or out of order and replicas still
//! converge.

use coweave_core::NewContent;
use coweave_crdt::VectorClock;
use coweave_types::RawCoId;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::SyncResult;

/// Fields whose values are shortened when a message is traced.
const BULK_FIELDS: [&str; 3] = ["changes", "encryptedChanges", "transactions"];

/// Characters of a bulk field kept in a trace.
pub const TRACE_TRUNCATE: usize = 50;

/// A sync protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum SyncMessage {
    /// Request for a value, carrying the sender's known state.
    Load(KnownStateMessage),

    /// The sender's known state of a value.
    Known(KnownStateMessage),

    /// Transactions, and the header if the receiver lacks it.
    Content(NewContent),
}

/// What the sender has of one CoValue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnownStateMessage {
    pub id: RawCoId,
    /// Whether the sender has the header at all.
    pub header: bool,
    /// Transactions known per session.
    pub sessions: VectorClock,
}

impl KnownStateMessage {
    /// Known state of a value the sender has.
    pub fn has(id: RawCoId, sessions: VectorClock) -> Self {
        Self {
            id,
            header: true,
            sessions,
        }
    }

    /// Known state of a value the sender lacks entirely.
    pub fn missing(id: RawCoId) -> Self {
        Self {
            id,
            header: false,
            sessions: VectorClock::new(),
        }
    }
}

impl SyncMessage {
    /// The CoValue the message is about.
    pub fn id(&self) -> &RawCoId {
        match self {
            Self::Load(msg) | Self::Known(msg) => &msg.id,
            Self::Content(content) => &content.id,
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            Self::Load(_) => "load",
            Self::Known(_) => "known",
            Self::Content(_) => "content",
        }
    }

    /// Encodes the message for a byte-oriented transport.
    pub fn to_json(&self) -> SyncResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes a message received from a byte-oriented transport.
    pub fn from_json(raw: &str) -> SyncResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// JSON rendering for logs with bulk fields shortened to
    /// [`TRACE_TRUNCATE`] characters.
    pub fn trace_json(&self) -> JsonValue {
        let mut value = serde_json::to_value(self).unwrap_or(JsonValue::Null);
        truncate_bulk(&mut value);
        value
    }
}

fn truncate_bulk(value: &mut JsonValue) {
    match value {
        JsonValue::Object(map) => {
            for (key, field) in map.iter_mut() {
                if BULK_FIELDS.contains(&key.as_str()) {
                    let text = match field {
                        JsonValue::String(s) => s.clone(),
                        ref other => other.to_string(),
                    };
                    if text.chars().count() > TRACE_TRUNCATE {
                        let short: String = text.chars().take(TRACE_TRUNCATE).collect();
                        *field = JsonValue::String(format!("{short}..."));
                    }
                } else {
                    truncate_bulk(field);
                }
            }
        }
        JsonValue::Array(items) => items.iter_mut().for_each(truncate_bulk),
        _ => {}
    }
}
