//! Vector Clock over sessions.
//!
//! Each session is an append-only log, so "how much of a CoValue do I have"
//! is fully described by the number of transactions known per session. The
//! sync protocol exchanges these clocks to compute deltas.

use coweave_types::SessionId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Transaction counts per session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorClock {
    counts: BTreeMap<SessionId, u32>,
}

impl VectorClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of transactions known for a session (0 if not present).
    #[must_use]
    pub fn get(&self, session: &SessionId) -> u32 {
        self.counts.get(session).copied().unwrap_or(0)
    }

    pub fn sessions(&self) -> impl Iterator<Item = (&SessionId, u32)> {
        self.counts.iter().map(|(s, c)| (s, *c))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Total number of transactions across sessions.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.values().map(|c| u64::from(*c)).sum()
    }

    /// Raises the count for a session. Never lowers it.
    pub fn update(&mut self, session: SessionId, count: u32) {
        let entry = self.counts.entry(session).or_insert(0);
        if count > *entry {
            *entry = count;
        }
    }

    /// Replaces the count for a session, e.g. after a peer reports a shorter log.
    pub fn set(&mut self, session: SessionId, count: u32) {
        self.counts.insert(session, count);
    }

    /// For each session, takes the maximum of the two counts.
    pub fn merge(&mut self, other: &Self) {
        for (session, &count) in &other.counts {
            self.update(session.clone(), count);
        }
    }
}
