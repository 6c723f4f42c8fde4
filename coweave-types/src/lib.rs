//! Core type definitions for coweave.
//!
//! This crate defines the small, dependency-free vocabulary shared by every
//! other crate in the workspace:
//! - CoValue, session, key and peer identifiers
//! - Transaction identifiers (session + index)
//! - Hybrid Logical Clock timestamps used as `madeAt`
//! - Canonical JSON encoding used for hashing and signing

mod ids;
mod timestamp;

use std::collections::BTreeMap;

pub use ids::{KeyId, PeerId, RawCoId, SessionId, TransactionId};
pub use timestamp::{HybridTimestamp, wall_clock_millis};

/// Arbitrary JSON payload stored in CoValue content and metadata.
pub type JsonValue = serde_json::Value;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid {kind} id: {value:?}")]
    InvalidId { kind: &'static str, value: String },
}

/// Encodes a value as canonical JSON bytes.
///
/// Object keys are emitted in sorted order at every depth, whatever the
/// struct field order or map implementation, so two replicas encoding the
/// same logical value produce identical bytes.
pub fn canonical_json<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
    let value = sort_keys(serde_json::to_value(value)?);
    Ok(serde_json::to_vec(&value)?)
}

fn sort_keys(value: JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => {
            let sorted: BTreeMap<String, JsonValue> =
                map.into_iter().map(|(k, v)| (k, sort_keys(v))).collect();
            JsonValue::Object(sorted.into_iter().collect())
        }
        JsonValue::Array(items) => JsonValue::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}
