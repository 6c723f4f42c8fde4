//! `madeAt` timestamps.
//!
//! Content is folded in `madeAt` order, and permission checks read roles as
//! of a transaction's `madeAt`. A table's clock therefore has to move past
//! every timestamp it has seen, even when the local wall clock lags behind
//! a peer's.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch; zero if the system clock predates it.
pub fn wall_clock_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}

/// Wall-clock millis plus a counter for writes within the same milli.
///
/// Ordered by `wall_time`, then `logical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HybridTimestamp {
    wall_time: u64,
    logical: u32,
}

impl HybridTimestamp {
    #[must_use]
    pub const fn new(wall_time: u64, logical: u32) -> Self {
        Self { wall_time, logical }
    }

    /// Sorts before any timestamp a clock issues. Fresh tables start here.
    #[must_use]
    pub const fn zero() -> Self {
        Self::new(0, 0)
    }

    #[must_use]
    pub const fn wall_time(&self) -> u64 {
        self.wall_time
    }

    #[must_use]
    pub const fn logical(&self) -> u32 {
        self.logical
    }

    /// `madeAt` for the next local transaction.
    #[must_use]
    pub fn tick(&self) -> Self {
        self.advance(wall_clock_millis())
    }

    /// Moves the clock past `seen`, a timestamp from incoming content.
    #[must_use]
    pub fn receive(&self, seen: &Self) -> Self {
        (*self).max(*seen).advance(wall_clock_millis())
    }

    /// Jumps to `now` if it is ahead, otherwise bumps the counter.
    fn advance(&self, now: u64) -> Self {
        if now > self.wall_time {
            Self::new(now, 0)
        } else {
            Self::new(self.wall_time, self.logical.saturating_add(1))
        }
    }
}
