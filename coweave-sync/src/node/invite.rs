use coweave_core::{InviteOutcome, MemberId};
use coweave_crypto::InviteSecret;
use coweave_types::RawCoId;
use tokio::time::timeout;
use tracing::{debug, info};

use super::LocalNode;
use crate::error::{SyncError, SyncResult};

impl LocalNode {
    /// Redeems `secret` for the group governing `target`.
    ///
    /// `target` may be the group itself or a value owned by it. Waits up to
    /// [`NodeConfig::invite_timeout`](super::NodeConfig::invite_timeout) for
    /// the invite to show up in the group. A member already holding an equal
    /// or stronger role is left unchanged.
    pub async fn accept_invite(
        &self,
        target: &RawCoId,
        secret: &InviteSecret,
    ) -> SyncResult<InviteOutcome> {
        let group = self.resolve_group(target).await?;
        let crypto = self.crypto();
        let invite_secret = crypto.agent_secret_from_seed(secret.seed());
        let invite_agent = MemberId::Agent(crypto.agent_id(&invite_secret));

        let mut changed = self.inner.changed.subscribe();
        let invite_visible = async {
            loop {
                let visible = {
                    let state = self.lock();
                    state
                        .table
                        .role_of(&group, &invite_agent)
                        .ok()
                        .flatten()
                        .is_some_and(|role| role.is_invite())
                };
                if visible {
                    return Ok(());
                }
                debug!(%group, "waiting for invite to arrive");
                if changed.changed().await.is_err() {
                    return Err(SyncError::ChannelClosed);
                }
            }
        };
        timeout(self.inner.config.invite_timeout, invite_visible)
            .await
            .map_err(|_| SyncError::Timeout)??;

        let outcome = self.mutate(|manager, state| {
            let outcome = state.table.redeem_invite(&group, secret)?;
            if matches!(outcome, InviteOutcome::Joined(_)) {
                manager.sync_co_value(state, &group);
            }
            Ok(outcome)
        })?;
        info!(%group, ?outcome, "accepted invite");
        Ok(outcome)
    }

    /// The group governing `target`: itself, or its owner.
    async fn resolve_group(&self, target: &RawCoId) -> SyncResult<RawCoId> {
        let content = self.load(target).await?;
        if content.as_group().is_some() {
            return Ok(target.clone());
        }
        let owner = self
            .lock()
            .table
            .get(target)
            .and_then(|core| core.header().owner_group().cloned())
            .ok_or_else(|| SyncError::NotAGroup(target.clone()))?;
        let content = self.load(&owner).await?;
        if content.as_group().is_none() {
            return Err(SyncError::NotAGroup(owner));
        }
        Ok(owner)
    }
}
