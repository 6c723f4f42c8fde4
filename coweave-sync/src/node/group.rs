use coweave_core::{MemberId, Role};
use coweave_crypto::InviteSecret;
use coweave_types::{KeyId, RawCoId};

use super::LocalNode;
use crate::error::SyncResult;

impl LocalNode {
    /// Creates a group administered by this node's controller.
    pub fn create_group(&self) -> SyncResult<RawCoId> {
        self.mutate(|manager, state| {
            let group = state.table.create_group()?;
            manager.sync_co_value(state, &group);
            Ok(group)
        })
    }

    pub fn add_member(&self, group: &RawCoId, member: &MemberId, role: Role) -> SyncResult<()> {
        self.mutate(|manager, state| {
            state.table.add_member(group, member, role)?;
            manager.sync_co_value(state, group);
            Ok(())
        })
    }

    /// Revokes `member` and rotates the read key away from it.
    pub fn remove_member(&self, group: &RawCoId, member: &MemberId) -> SyncResult<()> {
        self.mutate(|manager, state| {
            state.table.remove_member(group, member)?;
            manager.sync_co_value(state, group);
            Ok(())
        })
    }

    /// Creates an invite for `role`, which must be one of the invite roles.
    pub fn create_invite(&self, group: &RawCoId, role: Role) -> SyncResult<InviteSecret> {
        self.mutate(|manager, state| {
            let secret = state.table.create_invite(group, role)?;
            manager.sync_co_value(state, group);
            Ok(secret)
        })
    }

    pub fn rotate_read_key(&self, group: &RawCoId) -> SyncResult<KeyId> {
        self.mutate(|manager, state| {
            let key = state.table.rotate_read_key(group)?;
            manager.sync_co_value(state, group);
            Ok(key)
        })
    }

    /// Current role of `member` in a loaded `group`.
    pub fn role_of(&self, group: &RawCoId, member: &MemberId) -> SyncResult<Option<Role>> {
        Ok(self.lock().table.role_of(group, member)?)
    }
}
