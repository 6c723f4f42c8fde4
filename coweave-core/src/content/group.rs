//! Materialized group content: role table and read-key distribution.

use std::collections::HashSet;

use coweave_crypto::{AgentId, CryptoError, Encrypted, KeySecret, NonceMaterial, ReadKey, Sealed};
use coweave_types::{HybridTimestamp, KeyId, RawCoId, SessionId};
use tracing::debug;

use crate::content::CoMap;
use crate::error::{CoreError, CoreResult};
use crate::member::MemberId;
use crate::resolver::CoValueResolver;
use crate::role::Role;

pub const READ_KEY: &str = "readKey";

/// Key under which `key` is stored for `holder`: a member id for sealed
/// copies, another key id for key-for-key wrapping.
pub fn key_for(key: &KeyId, holder: &str) -> String {
    format!("{key}_for_{holder}")
}

#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    map: CoMap,
    is_account: bool,
}

impl Group {
    pub(crate) fn new(map: CoMap, is_account: bool) -> Self {
        Self { map, is_account }
    }

    pub fn id(&self) -> &RawCoId {
        self.map.id()
    }

    /// Raw group entries.
    pub fn map(&self) -> &CoMap {
        &self.map
    }

    fn is_self(&self, member: &MemberId) -> bool {
        self.is_account && member.as_account() == Some(self.id())
    }

    /// Current role of `member`.
    pub fn role_of(&self, member: &MemberId) -> Option<Role> {
        if self.is_self(member) {
            return Some(Role::Admin);
        }
        self.map.get_str(&member.to_string()).and_then(Role::parse)
    }

    /// Role of `member` as of `time`.
    pub fn role_at(&self, member: &MemberId, time: HybridTimestamp) -> Option<Role> {
        if self.is_self(member) {
            return Some(Role::Admin);
        }
        self.map
            .get_at_time(&member.to_string(), time)
            .and_then(|v| v.as_str())
            .and_then(Role::parse)
    }

    /// Every member with a current role, invite agents included.
    pub fn members(&self) -> Vec<(MemberId, Role)> {
        self.map
            .entries()
            .filter(|(key, _)| MemberId::looks_like_member(key))
            .filter_map(|(key, value)| {
                let member = MemberId::parse(key).ok()?;
                let role = value.as_str().and_then(Role::parse)?;
                Some((member, role))
            })
            .collect()
    }

    /// Agents currently holding `admin`.
    pub fn admin_agents(&self) -> Vec<AgentId> {
        self.members()
            .into_iter()
            .filter_map(|(member, role)| match member {
                MemberId::Agent(agent) if role == Role::Admin => Some(agent),
                _ => None,
            })
            .collect()
    }

    /// Agents holding `admin` as of `time`.
    pub fn admin_agents_at(&self, time: HybridTimestamp) -> Vec<AgentId> {
        self.agents_ever_admin()
            .into_iter()
            .filter(|agent| self.role_at(&MemberId::Agent(*agent), time) == Some(Role::Admin))
            .collect()
    }

    /// Agents that held `admin` at any point. Signatures made while an agent
    /// was admin stay verifiable after it is revoked.
    pub fn agents_ever_admin(&self) -> Vec<AgentId> {
        self.map
            .all_keys()
            .filter_map(|key| match MemberId::parse(key) {
                Ok(MemberId::Agent(agent)) => Some(agent),
                _ => None,
            })
            .filter(|agent| {
                self.map
                    .history(&agent.to_string())
                    .any(|(_, v)| v.and_then(|v| v.as_str()) == Some(Role::Admin.as_str()))
            })
            .collect()
    }

    pub fn read_key_id(&self) -> Option<KeyId> {
        self.map.get_str(READ_KEY).and_then(|s| KeyId::parse(s).ok())
    }

    /// The current read key, if the controller can obtain it.
    pub fn current_read_key(&self, resolver: &dyn CoValueResolver) -> CoreResult<ReadKey> {
        let id = self
            .read_key_id()
            .ok_or_else(|| CoreError::MissingReadKey(self.id().clone()))?;
        let secret = self.get_read_key(&id, resolver)?;
        Ok(ReadKey { id, secret })
    }

    /// Obtains read key `key` for the resolver's controller, either from a
    /// copy sealed to it or by unwrapping through a newer key it holds.
    pub fn get_read_key(
        &self,
        key: &KeyId,
        resolver: &dyn CoValueResolver,
    ) -> CoreResult<KeySecret> {
        let mut visited = HashSet::new();
        self.read_key_inner(key, resolver, &mut visited)
    }

    fn read_key_inner(
        &self,
        key: &KeyId,
        resolver: &dyn CoValueResolver,
        visited: &mut HashSet<KeyId>,
    ) -> CoreResult<KeySecret> {
        if !visited.insert(key.clone()) {
            return Err(CoreError::MissingReadKey(self.id().clone()));
        }
        let controller = resolver
            .controller()
            .ok_or_else(|| CoreError::MissingReadKey(self.id().clone()))?;

        for holder in controller.key_holders() {
            let Some((stamp, value)) = self.map.latest(&key_for(key, &holder.to_string())) else {
                continue;
            };
            let Some(sealed) = value.as_str().and_then(|s| Sealed::parse(s).ok()) else {
                continue;
            };
            let nonce = NonceMaterial::new(self.id().clone(), stamp.op.tx.clone());
            for sender in self.sender_agents(&stamp.op.tx.session, resolver)? {
                match resolver
                    .crypto()
                    .unseal(&sealed, controller.agent_secret(), &sender, &nonce)
                {
                    Ok(bytes) => return decode_key_secret(&bytes),
                    Err(e) => debug!(group = %self.id(), %key, error = %e, "unseal attempt failed"),
                }
            }
        }

        let prefix = key_for(key, "");
        let wrapped: Vec<(KeyId, Encrypted)> = self
            .map
            .entries()
            .filter_map(|(k, v)| {
                let newer = KeyId::parse(k.strip_prefix(&prefix)?).ok()?;
                let encrypted = Encrypted::parse(v.as_str()?).ok()?;
                Some((newer, encrypted))
            })
            .collect();
        for (newer, encrypted) in wrapped {
            let Ok(secret) = self.read_key_inner(&newer, resolver, visited) else {
                continue;
            };
            let wrapping = ReadKey { id: newer, secret };
            return Ok(resolver.crypto().unwrap_key(&encrypted, key, &wrapping)?);
        }

        Err(CoreError::MissingReadKey(self.id().clone()))
    }

    /// Agents that may have sealed a key in `session`.
    fn sender_agents(
        &self,
        session: &SessionId,
        resolver: &dyn CoValueResolver,
    ) -> CoreResult<Vec<AgentId>> {
        match MemberId::from_session(session)? {
            MemberId::Agent(agent) => Ok(vec![agent]),
            MemberId::Account(account) if &account == self.id() => Ok(self.agents_ever_admin()),
            MemberId::Account(account) => {
                let core = resolver
                    .core(&account)
                    .ok_or_else(|| CoreError::NotLoaded(account.clone()))?;
                let content = core.content(resolver)?;
                let group = content
                    .as_group()
                    .ok_or_else(|| CoreError::NotAGroup(account.clone()))?;
                Ok(group.agents_ever_admin())
            }
        }
    }
}

fn decode_key_secret(bytes: &[u8]) -> CoreResult<KeySecret> {
    let encoded = std::str::from_utf8(bytes).map_err(|_| CryptoError::InvalidEncoding {
        kind: "key secret",
    })?;
    Ok(KeySecret::decode(encoded)?)
}
