//! Identifier types used throughout coweave.
//!
//! CoValue, session and key ids are prefixed strings so they can be embedded
//! directly as keys of group content. Peer ids use UUID v7.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::Error;

const CO_PREFIX: &str = "co_z";
const KEY_PREFIX: &str = "key_z";
const SESSION_MARKER: &str = "_session_z";

fn invalid(kind: &'static str, value: &str) -> Error {
    Error::InvalidId {
        kind,
        value: value.to_string(),
    }
}

/// Globally unique id of a CoValue, derived from the hash of its header.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RawCoId(String);

impl RawCoId {
    /// Builds an id from a header hash.
    #[must_use]
    pub fn from_hash(hash: &str) -> Self {
        Self(format!("{CO_PREFIX}{hash}"))
    }

    /// Parses an id, checking the `co_z` prefix.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s.strip_prefix(CO_PREFIX) {
            Some(rest) if !rest.is_empty() => Ok(Self(s.to_string())),
            _ => Err(invalid("covalue", s)),
        }
    }

    /// Returns true if `s` looks like a CoValue id.
    #[must_use]
    pub fn is_co_id(s: &str) -> bool {
        s.len() > CO_PREFIX.len() && s.starts_with(CO_PREFIX)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RawCoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RawCoId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RawCoId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RawCoId> for String {
    fn from(id: RawCoId) -> Self {
        id.0
    }
}

/// One writer's append-only stream within a CoValue.
///
/// Formatted as `<owner>_session_z<suffix>` where the owner is an agent id or
/// an account id. The owner is recoverable from the id alone.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Creates a session id for `owner` with a random suffix.
    #[must_use]
    pub fn new(owner: &str, suffix: &str) -> Self {
        Self(format!("{owner}{SESSION_MARKER}{suffix}"))
    }

    /// Parses a session id, checking that it has an owner and a suffix.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s.rfind(SESSION_MARKER) {
            Some(pos) if pos > 0 && pos + SESSION_MARKER.len() < s.len() => {
                Ok(Self(s.to_string()))
            }
            _ => Err(invalid("session", s)),
        }
    }

    /// The agent or account id that authored this session.
    #[must_use]
    pub fn owner(&self) -> &str {
        match self.0.rfind(SESSION_MARKER) {
            Some(pos) => &self.0[..pos],
            None => &self.0,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SessionId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

/// Identifier of a symmetric read key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KeyId(String);

impl KeyId {
    #[must_use]
    pub fn from_hash(hash: &str) -> Self {
        Self(format!("{KEY_PREFIX}{hash}"))
    }

    pub fn parse(s: &str) -> crate::Result<Self> {
        match s.strip_prefix(KEY_PREFIX) {
            Some(rest) if !rest.is_empty() => Ok(Self(s.to_string())),
            _ => Err(invalid("key", s)),
        }
    }

    #[must_use]
    pub fn is_key_id(s: &str) -> bool {
        s.len() > KEY_PREFIX.len() && s.starts_with(KEY_PREFIX)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for KeyId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for KeyId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<KeyId> for String {
    fn from(id: KeyId) -> Self {
        id.0
    }
}

/// Position of a transaction: its session and index within that session.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransactionId {
    #[serde(rename = "sessionID")]
    pub session: SessionId,
    #[serde(rename = "txIndex")]
    pub index: u32,
}

impl TransactionId {
    #[must_use]
    pub fn new(session: SessionId, index: u32) -> Self {
        Self { session, index }
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.session, self.index)
    }
}

/// Unique identifier for a connected peer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Creates a new random peer id.
    #[must_use]
    pub fn new() -> Self {
        Self(format!("peer_{}", Uuid::now_v7().simple()))
    }

    /// Creates a peer id with a caller-chosen name, e.g. `"server"`.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PeerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(name: &str) -> Self {
        Self::named(name)
    }
}
