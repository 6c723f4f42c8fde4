//! Deterministic merge structures for coweave content.
//!
//! This crate provides the building blocks CoValue content is folded into:
//!
//! - [`OpStamp`]: total order over changes (`madeAt`, session, tx, change)
//! - [`LWWRegister<T>`]: Last-Writer-Wins slot with history, for map keys
//! - [`RGA<T>`]: Replicated Growable Array, for lists
//! - [`VectorClock`]: per-session transaction counts, for sync
//!
//! Register and list state depend only on the set of writes applied, not on
//! the order they arrive in, so replicas holding the same transactions fold
//! to the same content.

mod lww_register;
mod op;
mod rga;
mod vector_clock;

pub use lww_register::LWWRegister;
pub use op::{OpId, OpStamp};
pub use rga::RGA;
pub use vector_clock::VectorClock;
