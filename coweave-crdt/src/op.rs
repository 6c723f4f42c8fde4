//! Operation identities and their total order.

use coweave_types::{HybridTimestamp, SessionId, TransactionId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a single change: the transaction it belongs to and its
/// position inside that transaction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OpId {
    pub tx: TransactionId,
    pub change: u32,
}

impl OpId {
    #[must_use]
    pub fn new(session: SessionId, tx_index: u32, change: u32) -> Self {
        Self {
            tx: TransactionId::new(session, tx_index),
            change,
        }
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.tx, self.change)
    }
}

/// Position of a change in the deterministic fold order.
///
/// Ordered by `madeAt`, then session id, then transaction index, then change
/// index. Every valid change in a CoValue has a distinct stamp, so the order
/// is total and independent of arrival order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OpStamp {
    pub made_at: HybridTimestamp,
    pub op: OpId,
}

impl OpStamp {
    #[must_use]
    pub fn new(made_at: HybridTimestamp, op: OpId) -> Self {
        Self { made_at, op }
    }
}
