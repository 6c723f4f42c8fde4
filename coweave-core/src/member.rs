//! Identities that can hold a role in a group.

use coweave_crypto::AgentId;
use coweave_types::{RawCoId, SessionId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, ValidationError};

/// An agent or an account, as it appears in role tables and session ids.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MemberId {
    Agent(AgentId),
    Account(RawCoId),
}

impl MemberId {
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        if AgentId::is_agent_id(s) {
            AgentId::parse(s)
                .map(Self::Agent)
                .map_err(|_| ValidationError::InvalidMember(s.to_string()))
        } else if RawCoId::is_co_id(s) {
            RawCoId::parse(s)
                .map(Self::Account)
                .map_err(|_| ValidationError::InvalidMember(s.to_string()))
        } else {
            Err(ValidationError::InvalidMember(s.to_string()))
        }
    }

    /// The member that authored a session.
    pub fn from_session(session: &SessionId) -> Result<Self, ValidationError> {
        Self::parse(session.owner())
            .map_err(|_| ValidationError::InvalidSessionOwner(session.owner().to_string()))
    }

    /// Cheap check used when scanning group keys.
    pub fn looks_like_member(s: &str) -> bool {
        AgentId::is_agent_id(s) || RawCoId::is_co_id(s)
    }

    pub fn as_account(&self) -> Option<&RawCoId> {
        match self {
            Self::Account(id) => Some(id),
            Self::Agent(_) => None,
        }
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Agent(agent) => write!(f, "{agent}"),
            Self::Account(id) => write!(f, "{id}"),
        }
    }
}

impl FromStr for MemberId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s)?)
    }
}

impl TryFrom<String> for MemberId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<MemberId> for String {
    fn from(member: MemberId) -> Self {
        member.to_string()
    }
}

impl From<AgentId> for MemberId {
    fn from(agent: AgentId) -> Self {
        Self::Agent(agent)
    }
}
