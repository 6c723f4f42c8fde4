//! Last-Writer-Wins Register (LWW-Register).
//!
//! Stores the full history of writes to a single slot, ordered by
//! [`OpStamp`]. The current value is the write with the highest stamp; a
//! deletion is a write of `None`.
//!
//! Keeping history lets callers read the value as of any `madeAt`, which the
//! permission model needs for "role at time of transaction" checks.
//!
//! Use cases:
//! - One key of a CoMap
//! - One member's role in a group

use coweave_types::HybridTimestamp;
use serde::{Deserialize, Serialize};

use crate::op::OpStamp;

/// A Last-Writer-Wins Register with history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LWWRegister<T> {
    /// Writes sorted ascending by stamp. Stamps are unique.
    history: Vec<(OpStamp, Option<T>)>,
}

impl<T> LWWRegister<T> {
    /// Creates an empty register.
    #[must_use]
    pub fn new() -> Self {
        Self {
            history: Vec::new(),
        }
    }

    /// Returns the current value, or `None` if unset or deleted.
    #[must_use]
    pub fn value(&self) -> Option<&T> {
        self.history.last().and_then(|(_, v)| v.as_ref())
    }

    /// Stamp of the winning write.
    #[must_use]
    pub fn stamp(&self) -> Option<&OpStamp> {
        self.history.last().map(|(s, _)| s)
    }

    /// Value as of `time`: the latest write with `made_at <= time`.
    #[must_use]
    pub fn value_at(&self, time: HybridTimestamp) -> Option<&T> {
        self.history
            .iter()
            .rev()
            .find(|(stamp, _)| stamp.made_at <= time)
            .and_then(|(_, v)| v.as_ref())
    }

    /// Every write in stamp order, including deletions.
    pub fn history(&self) -> impl Iterator<Item = (&OpStamp, Option<&T>)> {
        self.history.iter().map(|(s, v)| (s, v.as_ref()))
    }

    /// Records a write. Returns false if a write with this stamp already exists.
    pub fn set(&mut self, stamp: OpStamp, value: T) -> bool {
        self.apply(stamp, Some(value))
    }

    /// Records a deletion.
    pub fn delete(&mut self, stamp: OpStamp) -> bool {
        self.apply(stamp, None)
    }

    fn apply(&mut self, stamp: OpStamp, value: Option<T>) -> bool {
        match self.history.binary_search_by(|(s, _)| s.cmp(&stamp)) {
            Ok(_) => false,
            Err(pos) => {
                self.history.insert(pos, (stamp, value));
                true
            }
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}

impl<T> Default for LWWRegister<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: PartialEq> PartialEq for LWWRegister<T> {
    fn eq(&self, other: &Self) -> bool {
        self.history == other.history
    }
}

impl<T: Eq> Eq for LWWRegister<T> {}
