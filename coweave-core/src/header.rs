//! Immutable CoValue headers and id derivation.

use coweave_crypto::{AgentId, CryptoProvider};
use coweave_types::{JsonValue, RawCoId, canonical_json, wall_clock_millis};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreResult;
use crate::member::MemberId;

/// Shape of a CoValue's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoValueType {
    #[serde(rename = "comap")]
    Map,
    #[serde(rename = "colist")]
    List,
    #[serde(rename = "costream")]
    Stream,
}

/// Who may write to a CoValue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Ruleset {
    /// Anyone may write; private transactions are not readable.
    Unowned,
    /// Writers and admins of `group` may write.
    OwnedByGroup { group: RawCoId },
    /// The value is itself a group whose first admin is `initial_admin`.
    Group {
        #[serde(rename = "initialAdmin")]
        initial_admin: MemberId,
    },
}

/// Fixed description of a CoValue. Its hash is the CoValue's id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoValueHeader {
    #[serde(rename = "type")]
    pub kind: CoValueType,
    pub ruleset: Ruleset,
    pub meta: Option<JsonValue>,
    #[serde(rename = "createdAt")]
    pub created_at: Option<u64>,
    pub uniqueness: Option<String>,
}

impl CoValueHeader {
    /// Creates a header with a fresh creation nonce.
    pub fn new(kind: CoValueType, ruleset: Ruleset, meta: Option<JsonValue>) -> Self {
        Self {
            kind,
            ruleset,
            meta,
            created_at: Some(wall_clock_millis()),
            uniqueness: Some(Uuid::new_v4().simple().to_string()),
        }
    }

    /// A group administered initially by `admin`.
    pub fn group(admin: MemberId) -> Self {
        Self::new(
            CoValueType::Map,
            Ruleset::Group {
                initial_admin: admin,
            },
            None,
        )
    }

    /// The account header for an agent.
    ///
    /// Has no creation nonce, so the account id is a pure function of the
    /// agent that created it.
    pub fn account(agent: AgentId) -> Self {
        Self {
            kind: CoValueType::Map,
            ruleset: Ruleset::Group {
                initial_admin: MemberId::Agent(agent),
            },
            meta: Some(serde_json::json!({ "type": "account" })),
            created_at: None,
            uniqueness: None,
        }
    }

    /// Derives the CoValue id from the canonical encoding of this header.
    pub fn id(&self, crypto: &dyn CryptoProvider) -> CoreResult<RawCoId> {
        let bytes = canonical_json(self)?;
        Ok(RawCoId::from_hash(&crypto.short_hash(&bytes)))
    }

    /// `meta.type`, if present.
    pub fn meta_type(&self) -> Option<&str> {
        self.meta.as_ref()?.get("type")?.as_str()
    }

    pub fn is_group(&self) -> bool {
        matches!(self.ruleset, Ruleset::Group { .. })
    }

    pub fn is_account(&self) -> bool {
        self.is_group() && self.meta_type() == Some("account")
    }

    /// The group governing this value, if it is owned by one.
    pub fn owner_group(&self) -> Option<&RawCoId> {
        match &self.ruleset {
            Ruleset::OwnedByGroup { group } => Some(group),
            _ => None,
        }
    }
}
