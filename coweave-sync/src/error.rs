//! Error types for the sync layer.

use coweave_core::CoreError;
use coweave_types::{PeerId, RawCoId};
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in node and sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Any other failure of the core: validation, permissions, crypto.
    #[error(transparent)]
    Core(CoreError),

    /// No peer could provide the CoValue, or it is not present locally.
    #[error("covalue not loaded: {0}")]
    NotLoaded(RawCoId),

    #[error("operation timed out")]
    Timeout,

    #[error("{0} is not a group")]
    NotAGroup(RawCoId),

    #[error("invalid invite: {0}")]
    InvalidInvite(String),

    #[error("account {0} has no profile")]
    MissingProfile(RawCoId),

    #[error("unresolved dependencies for {0:?}")]
    UnresolvedDependencies(Vec<RawCoId>),

    #[error("channel closed")]
    ChannelClosed,

    #[error("peer not found: {0}")]
    PeerNotFound(PeerId),

    /// A peer sent something that does not fit the protocol.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<CoreError> for SyncError {
    fn from(error: CoreError) -> Self {
        match error {
            CoreError::NotLoaded(id) => Self::NotLoaded(id),
            CoreError::NotAGroup(id) => Self::NotAGroup(id),
            CoreError::InvalidInvite(reason) => Self::InvalidInvite(reason),
            CoreError::MissingProfile(id) => Self::MissingProfile(id),
            CoreError::UnresolvedDependencies(ids) => Self::UnresolvedDependencies(ids),
            other => Self::Core(other),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(error: serde_json::Error) -> Self {
        Self::Protocol(error.to_string())
    }
}
