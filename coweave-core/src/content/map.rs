use std::collections::BTreeMap;

use coweave_crdt::{LWWRegister, OpStamp};
use coweave_types::{HybridTimestamp, JsonValue, RawCoId};
use serde_json::Map;

use crate::transaction::Change;

/// Materialized key/value content. Each key is a last-writer-wins register
/// over the fold order.
#[derive(Debug, Clone, PartialEq)]
pub struct CoMap {
    id: RawCoId,
    entries: BTreeMap<String, LWWRegister<JsonValue>>,
}

impl CoMap {
    pub(crate) fn new(id: RawCoId) -> Self {
        Self {
            id,
            entries: BTreeMap::new(),
        }
    }

    /// Returns false for changes that do not apply to maps.
    pub(crate) fn apply(&mut self, stamp: OpStamp, change: &Change) -> bool {
        match change {
            Change::Set { key, value } => {
                self.entries
                    .entry(key.clone())
                    .or_default()
                    .set(stamp, value.clone());
                true
            }
            Change::Delete { key } => {
                self.entries.entry(key.clone()).or_default().delete(stamp);
                true
            }
            _ => false,
        }
    }

    pub fn id(&self) -> &RawCoId {
        &self.id
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.entries.get(key)?.value()
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key)?.as_str()
    }

    /// Value of `key` as of `time`.
    pub fn get_at_time(&self, key: &str, time: HybridTimestamp) -> Option<&JsonValue> {
        self.entries.get(key)?.value_at(time)
    }

    /// The winning write of `key` and its stamp.
    pub fn latest(&self, key: &str) -> Option<(&OpStamp, &JsonValue)> {
        let register = self.entries.get(key)?;
        Some((register.stamp()?, register.value()?))
    }

    pub fn history(&self, key: &str) -> impl Iterator<Item = (&OpStamp, Option<&JsonValue>)> {
        self.entries.get(key).into_iter().flat_map(|register| register.history())
    }

    /// Keys with a current (non-deleted) value.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries().map(|(k, _)| k)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &JsonValue)> {
        self.entries
            .iter()
            .filter_map(|(k, reg)| reg.value().map(|v| (k.as_str(), v)))
    }

    /// Every key ever written, deleted ones included.
    pub(crate) fn all_keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_json(&self) -> JsonValue {
        JsonValue::Object(
            self.entries()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect::<Map<String, JsonValue>>(),
        )
    }
}
