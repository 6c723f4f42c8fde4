use std::collections::BTreeMap;

use coweave_crdt::OpStamp;
use coweave_types::{HybridTimestamp, JsonValue, RawCoId, SessionId};
use serde_json::json;

use crate::transaction::Change;

#[derive(Debug, Clone, PartialEq)]
pub struct StreamItem {
    pub made_at: HybridTimestamp,
    pub value: JsonValue,
}

/// Materialized append-only content, one sequence per session.
#[derive(Debug, Clone, PartialEq)]
pub struct CoStream {
    id: RawCoId,
    items: BTreeMap<SessionId, Vec<StreamItem>>,
}

impl CoStream {
    pub(crate) fn new(id: RawCoId) -> Self {
        Self {
            id,
            items: BTreeMap::new(),
        }
    }

    pub(crate) fn apply(&mut self, stamp: OpStamp, change: &Change) -> bool {
        let Change::Push { item } = change else {
            return false;
        };
        self.items
            .entry(stamp.op.tx.session)
            .or_default()
            .push(StreamItem {
                made_at: stamp.made_at,
                value: item.clone(),
            });
        true
    }

    pub fn id(&self) -> &RawCoId {
        &self.id
    }

    pub fn sessions(&self) -> impl Iterator<Item = &SessionId> {
        self.items.keys()
    }

    pub fn items(&self, session: &SessionId) -> &[StreamItem] {
        self.items.get(session).map_or(&[], Vec::as_slice)
    }

    pub fn last_item(&self, session: &SessionId) -> Option<&StreamItem> {
        self.items.get(session)?.last()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn to_json(&self) -> JsonValue {
        JsonValue::Object(
            self.items
                .iter()
                .map(|(session, items)| {
                    let values = items
                        .iter()
                        .map(|item| json!({ "madeAt": item.made_at, "value": item.value }))
                        .collect();
                    (session.to_string(), JsonValue::Array(values))
                })
                .collect(),
        )
    }
}
