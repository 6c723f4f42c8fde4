//! The arena of cores owned by one node.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use coweave_crypto::{CryptoProvider, NonceMaterial};
use coweave_types::{HybridTimestamp, RawCoId, SessionId, TransactionId};
use tracing::{debug, warn};

use crate::content::CoValueContent;
use crate::covalue::{CoValueCore, Listener};
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::header::{CoValueHeader, Ruleset};
use crate::identity::Controller;
use crate::resolver::CoValueResolver;
use crate::transaction::{Change, Payload, Privacy, Transaction};

/// Listeners to run with a core's fresh content once the table is no longer
/// borrowed.
pub struct Notification {
    pub id: RawCoId,
    content: Arc<CoValueContent>,
    listeners: Vec<Listener>,
}

impl Notification {
    pub fn content(&self) -> &Arc<CoValueContent> {
        &self.content
    }

    pub fn fire(self) {
        for listener in &self.listeners {
            listener(self.content.clone());
        }
    }
}

impl std::fmt::Debug for Notification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notification")
            .field("id", &self.id)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// All cores of a node plus the identity new transactions are authored as.
pub struct CoValueTable {
    cores: HashMap<RawCoId, CoValueCore>,
    controller: Controller,
    crypto: Arc<dyn CryptoProvider>,
    clock: HybridTimestamp,
    pending: Vec<RawCoId>,
}

impl std::fmt::Debug for CoValueTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoValueTable")
            .field("cores", &self.cores.len())
            .field("session", self.controller.session())
            .finish_non_exhaustive()
    }
}

impl CoValueResolver for CoValueTable {
    fn core(&self, id: &RawCoId) -> Option<&CoValueCore> {
        self.cores.get(id)
    }

    fn crypto(&self) -> &dyn CryptoProvider {
        self.crypto.as_ref()
    }

    fn controller(&self) -> Option<&Controller> {
        Some(&self.controller)
    }
}

impl CoValueTable {
    pub fn new(controller: Controller, crypto: Arc<dyn CryptoProvider>) -> Self {
        Self {
            cores: HashMap::new(),
            controller,
            crypto,
            clock: HybridTimestamp::zero(),
            pending: Vec::new(),
        }
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub fn crypto_provider(&self) -> &Arc<dyn CryptoProvider> {
        &self.crypto
    }

    pub fn ids(&self) -> impl Iterator<Item = &RawCoId> {
        self.cores.keys()
    }

    pub fn contains(&self, id: &RawCoId) -> bool {
        self.cores.contains_key(id)
    }

    pub fn get(&self, id: &RawCoId) -> Option<&CoValueCore> {
        self.cores.get(id)
    }

    /// The core, or `NotLoaded`.
    pub fn expect(&self, id: &RawCoId) -> CoreResult<&CoValueCore> {
        self.cores
            .get(id)
            .ok_or_else(|| CoreError::NotLoaded(id.clone()))
    }

    pub fn content(&self, id: &RawCoId) -> CoreResult<Arc<CoValueContent>> {
        self.expect(id)?.content(self)
    }

    /// Creates and registers a core for a fresh header.
    pub fn create(&mut self, header: CoValueHeader) -> CoreResult<RawCoId> {
        let id = header.id(self.crypto.as_ref())?;
        self.cores
            .entry(id.clone())
            .or_insert_with(|| CoValueCore::new(id.clone(), header));
        debug!(covalue = %id, "created covalue");
        Ok(id)
    }

    /// Registers a core received from elsewhere, checking that `header`
    /// really hashes to `id`. Returns false if it was already present.
    pub fn ensure_from_header(
        &mut self,
        id: &RawCoId,
        header: &CoValueHeader,
    ) -> CoreResult<bool> {
        if self.cores.contains_key(id) {
            return Ok(false);
        }
        let actual = header.id(self.crypto.as_ref())?;
        if &actual != id {
            return Err(ValidationError::HeaderMismatch {
                expected: id.clone(),
                actual,
            }
            .into());
        }
        self.cores
            .insert(id.clone(), CoValueCore::new(id.clone(), header.clone()));
        Ok(true)
    }

    /// Validates and appends a batch for `session` starting at `after`.
    ///
    /// Returns how many transactions were new. Listener notifications are
    /// queued; collect them with [`CoValueTable::take_notifications`].
    pub fn add_transactions(
        &mut self,
        id: &RawCoId,
        session: &SessionId,
        after: u32,
        transactions: &[Transaction],
    ) -> CoreResult<usize> {
        let core = self.expect(id)?;
        let new = core.validate_new(session, after, transactions, self)?;
        if new.is_empty() {
            return Ok(0);
        }
        let added = new.len();
        if let Some(latest) = new.iter().map(|tx| tx.made_at).max() {
            self.clock = self.clock.receive(&latest);
        }
        if let Some(core) = self.cores.get_mut(id) {
            core.commit(session.clone(), new);
        }
        // Any content may depend on the changed core through permissions or
        // read keys.
        for core in self.cores.values_mut() {
            core.invalidate();
        }
        if !self.pending.contains(id) {
            self.pending.push(id.clone());
        }
        Ok(added)
    }

    /// Notifications for every core changed since the last call, plus the
    /// values governed by changed groups.
    pub fn take_notifications(&mut self) -> Vec<Notification> {
        let changed: BTreeSet<RawCoId> = self.pending.drain(..).collect();
        let mut affected: Vec<&CoValueCore> = Vec::new();
        for core in self.cores.values() {
            let governed = core
                .header()
                .owner_group()
                .is_some_and(|group| changed.contains(group));
            if changed.contains(core.id()) || governed {
                affected.push(core);
            }
        }

        affected
            .into_iter()
            .filter_map(|core| {
                let listeners = core.listeners();
                if listeners.is_empty() {
                    return None;
                }
                match core.content(self) {
                    Ok(content) => Some(Notification {
                        id: core.id().clone(),
                        content,
                        listeners,
                    }),
                    Err(e) => {
                        warn!(covalue = %core.id(), error = %e, "content unavailable for listeners");
                        None
                    }
                }
            })
            .collect()
    }

    /// Next transaction id in the controller's session.
    pub fn next_transaction_id(&self, id: &RawCoId) -> CoreResult<TransactionId> {
        let session = self.controller.session();
        let index = self.expect(id)?.session_len(session);
        Ok(TransactionId::new(session.clone(), index))
    }

    /// Authors, signs and appends one transaction as the controller.
    pub fn make_transaction(
        &mut self,
        id: &RawCoId,
        privacy: Privacy,
        changes: Vec<Change>,
    ) -> CoreResult<TransactionId> {
        self.make_transaction_with(id, privacy, |_, _| Ok(changes))
    }

    /// Like [`CoValueTable::make_transaction`], but the changes may depend
    /// on the id the transaction will get (sealed keys bind to it).
    pub(crate) fn make_transaction_with(
        &mut self,
        id: &RawCoId,
        privacy: Privacy,
        build: impl FnOnce(&Self, &TransactionId) -> CoreResult<Vec<Change>>,
    ) -> CoreResult<TransactionId> {
        let tx_id = self.next_transaction_id(id)?;
        let changes = build(self, &tx_id)?;
        let payload = match privacy {
            Privacy::Trusting => Payload::Trusting { changes },
            Privacy::Private => {
                let header = self.expect(id)?.header();
                let Ruleset::OwnedByGroup { group } = &header.ruleset else {
                    return Err(ValidationError::PrivateNotAllowed(id.clone()).into());
                };
                let content = self.content(group)?;
                let group_content = content
                    .as_group()
                    .ok_or_else(|| CoreError::NotAGroup(group.clone()))?;
                let key = group_content.current_read_key(self)?;
                let nonce = NonceMaterial::new(id.clone(), tx_id.clone());
                Payload::private(self.crypto.as_ref(), &key, &nonce, &changes)?
            }
        };

        self.clock = self.clock.tick();
        let tx = Transaction::sign(
            self.crypto.as_ref(),
            self.controller.agent_secret(),
            id,
            &tx_id,
            self.clock,
            payload,
        )?;
        self.add_transactions(id, &tx_id.session, tx_id.index, std::slice::from_ref(&tx))?;
        Ok(tx_id)
    }

    /// A new table holding copies of every core, controlled by `controller`.
    ///
    /// Cores are inserted in dependency order. A pass that places nothing
    /// means the remaining cores depend on values this table never had.
    pub fn scoped_copy(&self, controller: Controller) -> CoreResult<CoValueTable> {
        let ids: Vec<RawCoId> = self.cores.keys().cloned().collect();
        self.scoped_copy_of(&ids, controller)
    }

    /// Like [`CoValueTable::scoped_copy`], restricted to `roots` and
    /// everything they transitively depend on.
    pub fn scoped_copy_of(
        &self,
        roots: &[RawCoId],
        controller: Controller,
    ) -> CoreResult<CoValueTable> {
        let mut wanted: BTreeSet<RawCoId> = BTreeSet::new();
        let mut stack: Vec<RawCoId> = roots.to_vec();
        while let Some(id) = stack.pop() {
            if !wanted.insert(id.clone()) {
                continue;
            }
            if let Some(core) = self.cores.get(&id) {
                stack.extend(core.depended_on());
            }
        }

        let mut copy = CoValueTable::new(controller, self.crypto.clone());
        copy.clock = self.clock;
        let mut remaining: Vec<RawCoId> = wanted.into_iter().collect();
        while !remaining.is_empty() {
            let before = remaining.len();
            remaining.retain(|id| {
                let Some(core) = self.cores.get(id) else {
                    return true;
                };
                let ready = core
                    .depended_on()
                    .iter()
                    .all(|dep| copy.cores.contains_key(dep));
                if ready {
                    copy.cores.insert(id.clone(), core.scoped_copy());
                }
                !ready
            });
            if remaining.len() == before {
                return Err(CoreError::UnresolvedDependencies(remaining));
            }
        }
        Ok(copy)
    }

    /// Appends whatever `from` has of `id` that this table lacks.
    pub fn graft(&mut self, from: &CoValueTable, id: &RawCoId) -> CoreResult<usize> {
        let source = from.expect(id)?;
        self.ensure_from_header(id, source.header())?;
        let known = self.expect(id)?.known_state();
        let Some(content) = source.new_content_since(Some(&known)) else {
            return Ok(0);
        };
        let mut added = 0;
        for (session, new) in content.new {
            added += self.add_transactions(id, &session, new.after, &new.transactions)?;
        }
        Ok(added)
    }
}
