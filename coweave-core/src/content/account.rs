use coweave_crypto::AgentId;
use coweave_types::RawCoId;

use crate::content::Group;

pub const PROFILE: &str = "profile";
pub const ROOT: &str = "root";

/// A group that is also a persistent identity.
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    group: Group,
}

impl Account {
    pub(crate) fn new(group: Group) -> Self {
        Self { group }
    }

    pub fn id(&self) -> &RawCoId {
        self.group.id()
    }

    pub fn group(&self) -> &Group {
        &self.group
    }

    pub fn profile_id(&self) -> Option<RawCoId> {
        self.linked(PROFILE)
    }

    /// Application root state, set by the first migration.
    pub fn root_id(&self) -> Option<RawCoId> {
        self.linked(ROOT)
    }

    /// Agents that ever acted for this account. A signature by one of them
    /// is authentic, but only counts if it was admin when it signed.
    pub fn agents(&self) -> Vec<AgentId> {
        self.group.agents_ever_admin()
    }

    /// The agent new members' keys are sealed to.
    pub fn current_agent(&self) -> Option<AgentId> {
        self.group.admin_agents().into_iter().next()
    }

    fn linked(&self, key: &str) -> Option<RawCoId> {
        self.group.map().get_str(key).and_then(|s| RawCoId::parse(s).ok())
    }
}
