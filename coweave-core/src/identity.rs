//! The identity a table authors new transactions as.

use coweave_crypto::{AgentId, AgentSecret, CryptoProvider};
use coweave_types::{RawCoId, SessionId};

use crate::member::MemberId;

/// Secret material behind a controller.
#[derive(Debug, Clone)]
pub enum ControlledIdentity {
    /// A bare agent, e.g. during account bootstrap or invite redemption.
    Agent(AgentSecret),
    /// An account acting through one of its agents.
    Account { id: RawCoId, agent: AgentSecret },
}

impl ControlledIdentity {
    pub fn agent_secret(&self) -> &AgentSecret {
        match self {
            Self::Agent(agent) | Self::Account { agent, .. } => agent,
        }
    }
}

/// A controlling identity together with its current session.
#[derive(Debug, Clone)]
pub struct Controller {
    identity: ControlledIdentity,
    agent: AgentId,
    session: SessionId,
}

impl Controller {
    /// Starts a fresh session for `identity`.
    pub fn new(identity: ControlledIdentity, crypto: &dyn CryptoProvider) -> Self {
        let agent = crypto.agent_id(identity.agent_secret());
        let owner = match &identity {
            ControlledIdentity::Agent(_) => MemberId::Agent(agent),
            ControlledIdentity::Account { id, .. } => MemberId::Account(id.clone()),
        };
        let session = SessionId::new(&owner.to_string(), &crypto.new_session_suffix());
        Self {
            identity,
            agent,
            session,
        }
    }

    /// Resumes an existing session.
    pub fn with_session(
        identity: ControlledIdentity,
        session: SessionId,
        crypto: &dyn CryptoProvider,
    ) -> Self {
        let agent = crypto.agent_id(identity.agent_secret());
        Self {
            identity,
            agent,
            session,
        }
    }

    /// The member new transactions are attributed to.
    pub fn member(&self) -> MemberId {
        match &self.identity {
            ControlledIdentity::Agent(_) => MemberId::Agent(self.agent),
            ControlledIdentity::Account { id, .. } => MemberId::Account(id.clone()),
        }
    }

    /// Member ids under which sealed read keys may be addressed to us.
    pub fn key_holders(&self) -> Vec<MemberId> {
        let mut holders = vec![MemberId::Agent(self.agent)];
        if let Some(account) = self.account_id() {
            holders.push(MemberId::Account(account.clone()));
        }
        holders
    }

    pub fn identity(&self) -> &ControlledIdentity {
        &self.identity
    }

    pub fn agent_secret(&self) -> &AgentSecret {
        self.identity.agent_secret()
    }

    pub fn agent_id(&self) -> AgentId {
        self.agent
    }

    pub fn account_id(&self) -> Option<&RawCoId> {
        match &self.identity {
            ControlledIdentity::Account { id, .. } => Some(id),
            ControlledIdentity::Agent(_) => None,
        }
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }
}
