use coweave_crdt::{OpId, OpStamp, RGA};
use coweave_types::{JsonValue, RawCoId};

use crate::transaction::Change;

/// Materialized ordered content.
#[derive(Debug, Clone)]
pub struct CoList {
    id: RawCoId,
    items: RGA<JsonValue>,
}

impl CoList {
    pub(crate) fn new(id: RawCoId) -> Self {
        Self {
            id,
            items: RGA::new(),
        }
    }

    pub(crate) fn apply(&mut self, stamp: OpStamp, change: &Change) -> bool {
        match change {
            Change::Append { after, value } => {
                self.items.insert_with_id(stamp, after.clone(), value.clone());
                true
            }
            Change::Remove { target } => {
                self.items.delete_by_id(target.clone());
                true
            }
            _ => false,
        }
    }

    pub fn id(&self) -> &RawCoId {
        &self.id
    }

    pub fn get(&self, index: usize) -> Option<&JsonValue> {
        self.items.get(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Visible items paired with the ids to use as `after`/`target`.
    pub fn entries(&self) -> Vec<(OpId, JsonValue)> {
        self.items.entries()
    }

    pub fn element_id_at(&self, index: usize) -> Option<OpId> {
        self.items.element_id_at(index)
    }

    /// Where a new append should go to land at the end.
    pub fn last_element_id(&self) -> Option<OpId> {
        self.items.last_element_id()
    }

    pub fn to_vec(&self) -> Vec<JsonValue> {
        self.items.to_vec()
    }

    pub fn to_json(&self) -> JsonValue {
        JsonValue::Array(self.to_vec())
    }
}
