use coweave_core::{ControlledIdentity, Controller};
use coweave_types::{RawCoId, SessionId};
use tracing::debug;

use super::LocalNode;
use crate::error::SyncResult;

impl LocalNode {
    /// A new, unconnected node holding copies of every loaded value,
    /// controlled by `identity`.
    ///
    /// `session` resumes an existing session of that identity; `None` starts
    /// a fresh one. Values whose dependencies were never loaded make this
    /// fail with `UnresolvedDependencies`.
    pub fn scoped_copy(
        &self,
        identity: ControlledIdentity,
        session: Option<SessionId>,
    ) -> SyncResult<LocalNode> {
        let table = {
            let state = self.lock();
            let crypto = state.table.crypto_provider().clone();
            let controller = match session {
                Some(session) => Controller::with_session(identity, session, crypto.as_ref()),
                None => Controller::new(identity, crypto.as_ref()),
            };
            let loaded: Vec<RawCoId> = state
                .table
                .ids()
                .filter(|id| state.is_available(id))
                .cloned()
                .collect();
            debug!(count = loaded.len(), "copying loaded covalues");
            state.table.scoped_copy_of(&loaded, controller)?
        };
        Ok(LocalNode::new(table, self.inner.config.clone()))
    }
}
