//! Group, invite and account flows built from ordinary transactions.

use coweave_crypto::{AgentId, AgentSecret, InviteSecret, NonceMaterial, ReadKey};
use coweave_types::{KeyId, RawCoId, TransactionId};
use serde_json::json;
use tracing::info;

use crate::content::{Group, PROFILE, READ_KEY, key_for};
use crate::error::{CoreError, CoreResult};
use crate::header::{CoValueHeader, CoValueType, Ruleset};
use crate::identity::{ControlledIdentity, Controller};
use crate::member::MemberId;
use crate::resolver::CoValueResolver;
use crate::role::Role;
use crate::table::CoValueTable;
use crate::transaction::{Change, Privacy};

/// Result of redeeming an invite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InviteOutcome {
    /// The redeemer now holds this role.
    Joined(Role),
    /// The redeemer already held this equal or stronger role.
    Unchanged(Role),
}

impl InviteOutcome {
    pub fn role(self) -> Role {
        match self {
            Self::Joined(role) | Self::Unchanged(role) => role,
        }
    }
}

impl CoValueTable {
    fn with_group<T>(
        &self,
        group: &RawCoId,
        f: impl FnOnce(&Group) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let content = self.content(group)?;
        let group_content = content
            .as_group()
            .ok_or_else(|| CoreError::NotAGroup(group.clone()))?;
        f(group_content)
    }

    /// Current role of `member` in `group`.
    pub fn role_of(&self, group: &RawCoId, member: &MemberId) -> CoreResult<Option<Role>> {
        self.with_group(group, |g| Ok(g.role_of(member)))
    }

    /// The current read key of `group`, as the controller sees it.
    pub fn current_read_key(&self, group: &RawCoId) -> CoreResult<ReadKey> {
        self.with_group(group, |g| g.current_read_key(self))
    }

    /// The agent to seal keys to for `member`.
    pub fn resolve_account_agent(&self, member: &MemberId) -> CoreResult<AgentId> {
        match member {
            MemberId::Agent(agent) => Ok(*agent),
            MemberId::Account(account) => {
                let content = self.content(account)?;
                content
                    .as_account()
                    .ok_or_else(|| CoreError::NotAGroup(account.clone()))?
                    .current_agent()
                    .ok_or_else(|| CoreError::MissingReadKey(account.clone()))
            }
        }
    }

    /// `key` sealed from the controller to `member`, bound to transaction
    /// `tx` of `group`.
    fn seal_key(
        &self,
        group: &RawCoId,
        tx: &TransactionId,
        key: &ReadKey,
        member: &MemberId,
    ) -> CoreResult<Change> {
        let recipient = self.resolve_account_agent(member)?;
        self.seal_key_to(group, tx, key, member, &recipient)
    }

    fn seal_key_to(
        &self,
        group: &RawCoId,
        tx: &TransactionId,
        key: &ReadKey,
        member: &MemberId,
        recipient: &AgentId,
    ) -> CoreResult<Change> {
        let nonce = NonceMaterial::new(group.clone(), tx.clone());
        let sealed = self.crypto().seal(
            key.secret.encode().as_bytes(),
            self.controller().agent_secret(),
            recipient,
            &nonce,
        )?;
        Ok(Change::set(
            key_for(&key.id, &member.to_string()),
            sealed.to_string(),
        ))
    }

    /// Creates a group administered by the controller, with a fresh read key.
    pub fn create_group(&mut self) -> CoreResult<RawCoId> {
        let me = self.controller().member();
        let id = self.create(CoValueHeader::group(me.clone()))?;
        self.bootstrap_group(&id, &me)?;
        info!(group = %id, "created group");
        Ok(id)
    }

    /// Self-appointment of the initial admin, then the first read key.
    fn bootstrap_group(&mut self, id: &RawCoId, admin: &MemberId) -> CoreResult<()> {
        self.make_transaction(
            id,
            Privacy::Trusting,
            vec![Change::set(admin.to_string(), Role::Admin.as_str())],
        )?;
        let key = self.crypto().new_read_key();
        self.make_transaction_with(id, Privacy::Trusting, |table, tx| {
            Ok(vec![
                table.seal_key(id, tx, &key, admin)?,
                Change::set(READ_KEY, key.id.to_string()),
            ])
        })?;
        Ok(())
    }

    /// Grants `role` to `member` and shares the current read key with it.
    pub fn add_member(
        &mut self,
        group: &RawCoId,
        member: &MemberId,
        role: Role,
    ) -> CoreResult<()> {
        let key = if role.holds_read_key() {
            Some(self.current_read_key(group)?)
        } else {
            None
        };
        self.make_transaction_with(group, Privacy::Trusting, |table, tx| {
            let mut changes = vec![Change::set(member.to_string(), role.as_str())];
            if let Some(key) = &key {
                changes.push(table.seal_key(group, tx, key, member)?);
            }
            Ok(changes)
        })?;
        info!(%group, %member, %role, "added member");
        Ok(())
    }

    /// Creates an invite agent holding `role` (an invite role) and returns
    /// the secret it is derived from.
    pub fn create_invite(&mut self, group: &RawCoId, role: Role) -> CoreResult<InviteSecret> {
        if !role.is_invite() {
            return Err(CoreError::InvalidInvite(format!("{role} is not an invite role")));
        }
        let seed = self.crypto().new_seed();
        let invite_agent = self
            .crypto()
            .agent_id(&self.crypto().agent_secret_from_seed(&seed));
        self.add_member(group, &MemberId::Agent(invite_agent), role)?;
        Ok(InviteSecret::new(seed))
    }

    /// Members that receive a new read key, with the agent each is sealed
    /// to. Fails if any of them cannot be resolved, e.g. an account member
    /// that is not loaded.
    fn key_recipients(
        &self,
        group: &RawCoId,
        excluding: Option<&MemberId>,
    ) -> CoreResult<Vec<(MemberId, AgentId)>> {
        let members = self.with_group(group, |g| Ok(g.members()))?;
        members
            .into_iter()
            .filter(|(member, role)| role.holds_read_key() && Some(member) != excluding)
            .map(|(member, _)| {
                let agent = self.resolve_account_agent(&member)?;
                Ok((member, agent))
            })
            .collect()
    }

    /// Replaces the read key. Every member except revoked ones receives the
    /// new key; the old key stays reachable through `<old>_for_<new>`.
    ///
    /// Nothing is written unless every recipient can be resolved.
    pub fn rotate_read_key(&mut self, group: &RawCoId) -> CoreResult<KeyId> {
        let recipients = self.key_recipients(group, None)?;
        self.rotate_read_key_to(group, &recipients)
    }

    fn rotate_read_key_to(
        &mut self,
        group: &RawCoId,
        recipients: &[(MemberId, AgentId)],
    ) -> CoreResult<KeyId> {
        let old = self.current_read_key(group)?;
        let new = self.crypto().new_read_key();

        self.make_transaction_with(group, Privacy::Trusting, |table, tx| {
            let mut changes = recipients
                .iter()
                .map(|(member, agent)| table.seal_key_to(group, tx, &new, member, agent))
                .collect::<CoreResult<Vec<_>>>()?;
            let wrapped = table.crypto().wrap_key(&old, &new)?;
            changes.push(Change::set(
                key_for(&old.id, new.id.as_str()),
                wrapped.to_string(),
            ));
            changes.push(Change::set(READ_KEY, new.id.to_string()));
            Ok(changes)
        })?;
        info!(%group, key = %new.id, "rotated read key");
        Ok(new.id)
    }

    /// Revokes `member` and rotates the read key away from it.
    pub fn remove_member(&mut self, group: &RawCoId, member: &MemberId) -> CoreResult<()> {
        let recipients = self.key_recipients(group, Some(member))?;
        self.make_transaction(
            group,
            Privacy::Trusting,
            vec![Change::set(member.to_string(), Role::Revoked.as_str())],
        )?;
        self.rotate_read_key_to(group, &recipients)?;
        info!(%group, %member, "removed member");
        Ok(())
    }

    /// Creates a new account with a profile named `name`.
    ///
    /// The account is bootstrapped by its own fresh agent in a separate
    /// table and grafted into this one. Returns the account id and the
    /// agent secret that controls it.
    pub fn create_account(&mut self, name: &str) -> CoreResult<(RawCoId, AgentSecret)> {
        let crypto = self.crypto_provider().clone();
        let agent_secret = crypto.new_agent_secret();
        let agent = crypto.agent_id(&agent_secret);
        let account = self.create(CoValueHeader::account(agent))?;

        let controller = Controller::new(
            ControlledIdentity::Agent(agent_secret.clone()),
            crypto.as_ref(),
        );
        let mut scoped = self.scoped_copy_of(std::slice::from_ref(&account), controller)?;
        scoped.bootstrap_group(&account, &MemberId::Agent(agent))?;

        let profile = scoped.create(CoValueHeader::new(
            CoValueType::Map,
            Ruleset::OwnedByGroup {
                group: account.clone(),
            },
            Some(json!({ "type": "profile" })),
        ))?;
        scoped.make_transaction(&profile, Privacy::Trusting, vec![Change::set("name", name)])?;
        scoped.make_transaction(
            &account,
            Privacy::Trusting,
            vec![Change::set(PROFILE, profile.to_string())],
        )?;

        self.graft(&scoped, &account)?;
        self.graft(&scoped, &profile)?;
        info!(%account, %profile, "created account");
        Ok((account, agent_secret))
    }

    /// Redeems `secret` for the controller in `group`.
    ///
    /// The invite agent's role must already be visible here. The membership
    /// transaction is authored by the invite agent in a scoped copy and
    /// grafted back.
    pub fn redeem_invite(
        &mut self,
        group: &RawCoId,
        secret: &InviteSecret,
    ) -> CoreResult<InviteOutcome> {
        let crypto = self.crypto_provider().clone();
        let invite_secret = crypto.agent_secret_from_seed(secret.seed());
        let invite_agent = MemberId::Agent(crypto.agent_id(&invite_secret));
        let me = self.controller().member();

        let (invite_role, existing) =
            self.with_group(group, |g| Ok((g.role_of(&invite_agent), g.role_of(&me))))?;
        let invite_role = invite_role
            .filter(|role| role.is_invite())
            .ok_or_else(|| {
                CoreError::InvalidInvite(format!("no invite role for {invite_agent}"))
            })?;
        let granted = invite_role
            .redeemed()
            .ok_or_else(|| CoreError::InvalidInvite(format!("{invite_role} redeems to nothing")))?;

        if !Role::accepts_invite(existing, invite_role) {
            let kept = existing.unwrap_or(granted);
            info!(%group, member = %me, role = %kept, "invite redemption left role unchanged");
            return Ok(InviteOutcome::Unchanged(kept));
        }

        let mut roots = vec![group.clone()];
        roots.extend(me.as_account().cloned());
        let controller = Controller::new(ControlledIdentity::Agent(invite_secret), crypto.as_ref());
        let mut scoped = self.scoped_copy_of(&roots, controller)?;
        let key = scoped.current_read_key(group)?;
        scoped.make_transaction_with(group, Privacy::Trusting, |table, tx| {
            Ok(vec![
                Change::set(me.to_string(), granted.as_str()),
                table.seal_key(group, tx, &key, &me)?,
            ])
        })?;

        self.graft(&scoped, group)?;
        info!(%group, member = %me, role = %granted, "redeemed invite");
        Ok(InviteOutcome::Joined(granted))
    }
}
