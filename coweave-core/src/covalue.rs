//! One CoValue: its header, the per-session transaction logs, and a cached
//! materialization of its content.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};

use coweave_crdt::VectorClock;
use coweave_crypto::AgentId;
use coweave_types::{RawCoId, SessionId, TransactionId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::content::{self, CoValueContent};
use crate::error::{CoreError, CoreResult, PermissionError, ValidationError};
use crate::header::{CoValueHeader, Ruleset};
use crate::member::MemberId;
use crate::permissions::determine_valid;
use crate::resolver::CoValueResolver;
use crate::transaction::{Change, Transaction};

/// Callback invoked with fresh content after an append.
pub type Listener = Arc<dyn Fn(Arc<CoValueContent>) + Send + Sync>;

type ListenerMap = Mutex<BTreeMap<u64, Listener>>;

/// New transactions of one session, starting at index `after`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionNewContent {
    pub after: u32,
    pub transactions: Vec<Transaction>,
}

/// Everything a peer is missing of one CoValue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewContent {
    pub id: RawCoId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<CoValueHeader>,
    pub new: BTreeMap<SessionId, SessionNewContent>,
}

pub struct CoValueCore {
    id: RawCoId,
    header: CoValueHeader,
    sessions: BTreeMap<SessionId, Vec<Transaction>>,
    cache: OnceLock<Arc<CoValueContent>>,
    /// Set while content is being computed; re-entry means a cycle.
    materializing: AtomicBool,
    listeners: Arc<ListenerMap>,
    next_listener: AtomicU64,
}

impl std::fmt::Debug for CoValueCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoValueCore")
            .field("id", &self.id)
            .field("header", &self.header)
            .field("sessions", &self.known_state())
            .finish_non_exhaustive()
    }
}

impl CoValueCore {
    /// An empty core for a header already known to hash to `id`.
    pub fn new(id: RawCoId, header: CoValueHeader) -> Self {
        Self {
            id,
            header,
            sessions: BTreeMap::new(),
            cache: OnceLock::new(),
            materializing: AtomicBool::new(false),
            listeners: Arc::new(Mutex::new(BTreeMap::new())),
            next_listener: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> &RawCoId {
        &self.id
    }

    pub fn header(&self) -> &CoValueHeader {
        &self.header
    }

    pub fn sessions(&self) -> &BTreeMap<SessionId, Vec<Transaction>> {
        &self.sessions
    }

    pub fn session_len(&self, session: &SessionId) -> u32 {
        self.sessions.get(session).map_or(0, |txs| txs.len() as u32)
    }

    pub fn transaction_count(&self) -> usize {
        self.sessions.values().map(Vec::len).sum()
    }

    /// Checks a batch for `session` starting at index `after`.
    ///
    /// Returns the transactions that are actually new; already-known ones
    /// are skipped. Nothing is stored, see [`CoValueCore::commit`].
    pub fn validate_new(
        &self,
        session: &SessionId,
        after: u32,
        transactions: &[Transaction],
        resolver: &dyn CoValueResolver,
    ) -> CoreResult<Vec<Transaction>> {
        let have = self.session_len(session);
        if after > have {
            return Err(ValidationError::IndexGap {
                session: session.clone(),
                have,
                after,
            }
            .into());
        }
        let skip = (have - after) as usize;
        let new: Vec<Transaction> = transactions.iter().skip(skip).cloned().collect();
        if new.is_empty() {
            return Ok(new);
        }

        let signers = self.session_agents(session, resolver)?;
        for (offset, tx) in new.iter().enumerate() {
            let tx_id = TransactionId::new(session.clone(), have + offset as u32);
            tx.verify(resolver.crypto(), &self.id, &tx_id, &signers)?;
        }

        let mut candidate = self.sessions.clone();
        candidate
            .entry(session.clone())
            .or_default()
            .extend(new.iter().cloned());
        let validity = determine_valid(&self.id, &self.header, &candidate, resolver)?;
        if let Some((tx, reason)) = validity
            .rejected
            .into_iter()
            .find(|(tx, _)| &tx.session == session && tx.index >= have)
        {
            return Err(PermissionError { tx, reason }.into());
        }

        Ok(new)
    }

    /// Agents whose signatures are authentic in `session`. Whether a signer
    /// still acted for the account at `madeAt` is decided by the ruleset.
    fn session_agents(
        &self,
        session: &SessionId,
        resolver: &dyn CoValueResolver,
    ) -> CoreResult<Vec<AgentId>> {
        match MemberId::from_session(session)? {
            MemberId::Agent(agent) => Ok(vec![agent]),
            MemberId::Account(account) => {
                let content = if account == self.id {
                    self.content(resolver)?
                } else {
                    resolver
                        .core(&account)
                        .ok_or_else(|| CoreError::NotLoaded(account.clone()))?
                        .content(resolver)?
                };
                let account_content = content.as_account().ok_or_else(|| {
                    ValidationError::InvalidSessionOwner(session.owner().to_string())
                })?;
                Ok(account_content.agents())
            }
        }
    }

    /// Appends already validated transactions.
    pub fn commit(&mut self, session: SessionId, transactions: Vec<Transaction>) {
        if transactions.is_empty() {
            return;
        }
        debug!(covalue = %self.id, %session, count = transactions.len(), "committing transactions");
        self.sessions.entry(session).or_default().extend(transactions);
        self.invalidate();
    }

    /// Drops the cached content.
    pub fn invalidate(&mut self) {
        self.cache.take();
    }

    /// Current content, recomputed if the cache is empty.
    pub fn content(&self, resolver: &dyn CoValueResolver) -> CoreResult<Arc<CoValueContent>> {
        if let Some(content) = self.cache.get() {
            return Ok(content.clone());
        }
        if self.materializing.swap(true, Ordering::AcqRel) {
            return Err(ValidationError::CyclicDependency(self.id.clone()).into());
        }
        let result = determine_valid(&self.id, &self.header, &self.sessions, resolver)
            .and_then(|validity| content::materialize(&self.id, &self.header, &validity, resolver));
        self.materializing.store(false, Ordering::Release);

        let content = Arc::new(result?);
        Ok(self.cache.get_or_init(|| content).clone())
    }

    /// CoValues this one needs for validation and materialization.
    pub fn depended_on(&self) -> Vec<RawCoId> {
        let mut deps = BTreeSet::new();
        if let Ruleset::OwnedByGroup { group } = &self.header.ruleset {
            deps.insert(group.clone());
        }
        for session in self.sessions.keys() {
            if let Ok(MemberId::Account(account)) = MemberId::from_session(session) {
                deps.insert(account);
            }
        }
        if self.header.is_group() {
            let member_accounts = self
                .sessions
                .values()
                .flatten()
                .filter_map(Transaction::trusting_changes)
                .flatten()
                .filter_map(|change| match change {
                    Change::Set { key, .. } => match MemberId::parse(key) {
                        Ok(MemberId::Account(account)) => Some(account),
                        _ => None,
                    },
                    _ => None,
                });
            deps.extend(member_accounts);
        }
        deps.remove(&self.id);
        deps.into_iter().collect()
    }

    /// Registers `listener` to run after every successful append.
    pub fn subscribe(&self, listener: Listener) -> Subscription {
        let key = self.next_listener.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.insert(key, listener);
        }
        Subscription {
            listeners: Arc::downgrade(&self.listeners),
            key,
        }
    }

    /// Snapshot of the registered listeners.
    pub fn listeners(&self) -> Vec<Listener> {
        self.listeners
            .lock()
            .map(|listeners| listeners.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Same header and committed sessions; no listeners, empty cache.
    pub fn scoped_copy(&self) -> Self {
        let mut copy = Self::new(self.id.clone(), self.header.clone());
        copy.sessions = self.sessions.clone();
        copy
    }

    /// Per-session transaction counts.
    pub fn known_state(&self) -> VectorClock {
        let mut clock = VectorClock::new();
        for (session, txs) in &self.sessions {
            clock.set(session.clone(), txs.len() as u32);
        }
        clock
    }

    /// What a peer with `known` state is missing. `None` for `known` means
    /// the peer lacks the header too. Returns `None` when nothing is missing.
    pub fn new_content_since(&self, known: Option<&VectorClock>) -> Option<NewContent> {
        let new: BTreeMap<SessionId, SessionNewContent> = self
            .sessions
            .iter()
            .filter_map(|(session, txs)| {
                let after = known.map_or(0, |k| k.get(session));
                let missing = txs.get(after as usize..).filter(|rest| !rest.is_empty())?;
                Some((
                    session.clone(),
                    SessionNewContent {
                        after,
                        transactions: missing.to_vec(),
                    },
                ))
            })
            .collect();

        if known.is_some() && new.is_empty() {
            return None;
        }
        Some(NewContent {
            id: self.id.clone(),
            header: known.is_none().then(|| self.header.clone()),
            new,
        })
    }
}

/// Handle returned by [`CoValueCore::subscribe`].
///
/// `unsubscribe` may be called any number of times, also after the core has
/// been dropped.
#[derive(Debug, Clone)]
pub struct Subscription {
    listeners: Weak<ListenerMap>,
    key: u64,
}

impl Subscription {
    pub fn unsubscribe(&self) {
        if let Some(listeners) = self.listeners.upgrade()
            && let Ok(mut listeners) = listeners.lock()
        {
            listeners.remove(&self.key);
        }
    }
}
