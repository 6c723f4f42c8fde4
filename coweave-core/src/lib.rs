//! CoValue core for coweave.
//!
//! A CoValue is a header plus one append-only log per authoring session.
//! Its content is a pure function of the set of valid transactions:
//! - Transactions are ordered by `(madeAt, session, index)` and folded
//! - Validity is decided by the header's ruleset, so owned values depend on
//!   the content of their group
//! - Private transactions are decrypted with read keys distributed through
//!   the group
//!
//! [`CoValueTable`] is the arena holding every core of a node; it is the
//! only place that authors transactions.

mod content;
mod covalue;
mod error;
mod group_ops;
mod header;
mod identity;
mod member;
mod permissions;
mod resolver;
mod role;
mod table;
mod transaction;

pub use content::{
    Account, CoList, CoMap, CoStream, CoValueContent, Group, PROFILE, READ_KEY, ROOT, StreamItem,
    key_for,
};
pub use covalue::{CoValueCore, Listener, NewContent, SessionNewContent, Subscription};
pub use error::{CoreError, CoreResult, PermissionError, ValidationError};
pub use group_ops::InviteOutcome;
pub use header::{CoValueHeader, CoValueType, Ruleset};
pub use identity::{ControlledIdentity, Controller};
pub use member::MemberId;
pub use permissions::{ValidTransaction, Validity, determine_valid};
pub use resolver::CoValueResolver;
pub use role::Role;
pub use table::{CoValueTable, Notification};
pub use transaction::{Change, Payload, Privacy, Transaction};
