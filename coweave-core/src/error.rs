//! Error types for the CoValue core.

use coweave_crypto::CryptoError;
use coweave_types::{RawCoId, SessionId, TransactionId};
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Malformed input: bad headers, bad session ids, index gaps.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A batch started past the end of the session's log.
    #[error("index gap in {session}: have {have} transactions, batch starts at {after}")]
    IndexGap {
        session: SessionId,
        have: u32,
        after: u32,
    },

    #[error("header hashes to {actual}, expected {expected}")]
    HeaderMismatch { expected: RawCoId, actual: RawCoId },

    #[error("session owner {0:?} is neither an agent nor an account")]
    InvalidSessionOwner(String),

    #[error("invalid member id {0:?}")]
    InvalidMember(String),

    #[error("{0} cannot carry private transactions")]
    PrivateNotAllowed(RawCoId),

    #[error("content of {0} depends on itself")]
    CyclicDependency(RawCoId),
}

/// A transaction's signer lacked the role required for it.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("transaction {tx} rejected: {reason}")]
pub struct PermissionError {
    pub tx: TransactionId,
    pub reason: String,
}

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("permission denied: {0}")]
    Permission(#[from] PermissionError),

    /// The operation needed a CoValue that is not present locally.
    #[error("covalue not loaded: {0}")]
    NotLoaded(RawCoId),

    #[error("{0} is not a group")]
    NotAGroup(RawCoId),

    #[error("no readable read key in {0}")]
    MissingReadKey(RawCoId),

    #[error("invalid invite: {0}")]
    InvalidInvite(String),

    #[error("account {0} has no profile")]
    MissingProfile(RawCoId),

    /// A scoped copy could not place these values because their
    /// dependencies are not loaded.
    #[error("unresolved dependencies for {0:?}")]
    UnresolvedDependencies(Vec<RawCoId>),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Types(#[from] coweave_types::Error),
}
