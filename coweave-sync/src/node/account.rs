use std::sync::Arc;

use coweave_core::{CoValueContent, CoValueTable, ControlledIdentity, Controller, MemberId};
use coweave_crypto::{AgentId, AgentSecret, CryptoProvider};
use coweave_types::{RawCoId, SessionId};
use tracing::info;

use super::{LocalNode, NodeConfig};
use crate::error::{SyncError, SyncResult};
use crate::transport::Peer;

/// One-time setup run on an account that has no `root` yet, with the node,
/// the account id and the profile id.
pub type Migration = Box<dyn FnOnce(&LocalNode, &RawCoId, &RawCoId) -> SyncResult<()> + Send>;

/// A freshly created account and the node controlled by it.
#[derive(Debug)]
pub struct NewAccount {
    pub node: LocalNode,
    pub account: RawCoId,
    /// Secret of the account's agent; needed to load the account again.
    pub secret: AgentSecret,
}

impl LocalNode {
    /// Creates an account in this node's table, controlled by a new agent.
    pub fn create_account(&self, name: &str) -> SyncResult<(RawCoId, AgentSecret)> {
        self.mutate(|manager, state| {
            let (account, secret) = state.table.create_account(name)?;
            let profile = profile_of(&*state.table.content(&account)?, &account)?;
            manager.sync_co_value(state, &account);
            manager.sync_co_value(state, &profile);
            Ok((account, secret))
        })
    }

    /// Creates an account named `name` and returns a node controlled by it,
    /// connected to `peers`.
    ///
    /// Nothing is loaded, so this does not wait; connecting `peers` needs a
    /// running tokio runtime.
    pub fn with_new_account(
        name: &str,
        crypto: Arc<dyn CryptoProvider>,
        peers: Vec<Peer>,
        migration: Option<Migration>,
        config: NodeConfig,
    ) -> SyncResult<NewAccount> {
        let bootstrap = Controller::new(
            ControlledIdentity::Agent(crypto.new_agent_secret()),
            crypto.as_ref(),
        );
        let mut table = CoValueTable::new(bootstrap, crypto.clone());
        let (account, secret) = table.create_account(name)?;

        let controller = Controller::new(
            ControlledIdentity::Account {
                id: account.clone(),
                agent: secret.clone(),
            },
            crypto.as_ref(),
        );
        let node = LocalNode::new(table.scoped_copy(controller)?, config);
        for peer in peers {
            node.add_peer(peer);
        }
        node.run_migration(&account, migration)?;
        info!(%account, "started node with new account");
        Ok(NewAccount {
            node,
            account,
            secret,
        })
    }

    /// Loads `account` from `peers` and returns a node controlled by it.
    ///
    /// `session` resumes an earlier session of this account; `None` starts a
    /// fresh one. A session must not be resumed while another node still
    /// writes to it. Fails with `MissingProfile` if the account has no
    /// profile.
    pub async fn with_loaded_account(
        account: &RawCoId,
        secret: AgentSecret,
        session: Option<SessionId>,
        crypto: Arc<dyn CryptoProvider>,
        peers: Vec<Peer>,
        migration: Option<Migration>,
        config: NodeConfig,
    ) -> SyncResult<LocalNode> {
        let identity = ControlledIdentity::Account {
            id: account.clone(),
            agent: secret,
        };
        let controller = match session {
            Some(session) => Controller::with_session(identity, session, crypto.as_ref()),
            None => Controller::new(identity, crypto.as_ref()),
        };
        let node = LocalNode::new(CoValueTable::new(controller, crypto), config);
        for peer in peers {
            node.add_peer(peer);
        }

        let content = node.load(account).await?;
        let profile = profile_of(&content, account)?;
        node.load(&profile).await?;
        node.run_migration(account, migration)?;
        info!(%account, "started node with loaded account");
        Ok(node)
    }

    /// Runs `migration` unless the account already has a root.
    fn run_migration(&self, account: &RawCoId, migration: Option<Migration>) -> SyncResult<()> {
        let content = self.expect_co_value_loaded(account)?;
        let profile = profile_of(&content, account)?;
        let has_root = content.as_account().is_some_and(|a| a.root_id().is_some());
        if let Some(migration) = migration
            && !has_root
        {
            migration(self, account, &profile)?;
            info!(%account, "ran account migration");
        }
        Ok(())
    }

    /// Content of the profile of a loaded account.
    pub fn expect_profile_loaded(&self, account: &RawCoId) -> SyncResult<Arc<CoValueContent>> {
        let content = self.expect_co_value_loaded(account)?;
        let profile = profile_of(&content, account)?;
        self.expect_co_value_loaded(&profile)
    }

    /// The agent keys for `member` are sealed to, loading its account first
    /// if needed.
    pub async fn resolve_account_agent(&self, member: &MemberId) -> SyncResult<AgentId> {
        if let MemberId::Account(account) = member {
            self.load(account).await?;
        }
        Ok(self.lock().table.resolve_account_agent(member)?)
    }
}

/// Profile id of an account's content.
fn profile_of(content: &CoValueContent, account: &RawCoId) -> SyncResult<RawCoId> {
    content
        .as_account()
        .ok_or_else(|| SyncError::NotAGroup(account.clone()))?
        .profile_id()
        .ok_or_else(|| SyncError::MissingProfile(account.clone()))
}
