//! The local node: a table of CoValues plus the sync manager feeding it.
//!
//! Per CoValue id a node moves through `Unknown -> Loading -> Loaded`.
//! All table access happens under one mutex that is never held across an
//! `.await`; listeners and progress callbacks run after it is released.

mod account;
mod copy;
mod group;
mod invite;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use coweave_core::{
    Change, CoValueContent, CoValueHeader, CoValueTable, CoValueType, ControlledIdentity,
    Controller, Listener, NewContent, Notification, Privacy, Ruleset, Subscription,
};
use coweave_crypto::CryptoProvider;
use coweave_types::{PeerId, RawCoId, TransactionId};
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};
use crate::manager::SyncManager;
use crate::state::SyncState;
use crate::transport::Peer;

pub use account::{Migration, NewAccount};

/// Called with the fraction of a value received so far while it loads.
pub type ProgressCallback = Arc<dyn Fn(f32) + Send + Sync>;

/// Configuration for a local node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// How long `accept_invite` waits for the invite to become visible.
    pub invite_timeout: Duration,
    /// How long a load waits for peers before giving up.
    pub load_timeout: Duration,
    /// Log every received sync message at debug level.
    pub trace_sync: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            invite_timeout: Duration::from_millis(2000),
            load_timeout: Duration::from_secs(30),
            trace_sync: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoadStatus {
    Pending,
    Available,
    Unavailable,
}

/// A value some peer was asked for and has not delivered yet.
pub(crate) struct Loading {
    pub(crate) status: watch::Sender<LoadStatus>,
    /// Peers that may still deliver it.
    pub(crate) waiting_on: HashSet<PeerId>,
    /// Peers whose own `load` we forwarded.
    pub(crate) requesters: Vec<PeerId>,
    /// Transactions the best-informed peer claims to have.
    pub(crate) expected: u64,
    pub(crate) progress: Vec<ProgressCallback>,
}

impl Loading {
    pub(crate) fn new(status: watch::Sender<LoadStatus>, waiting_on: HashSet<PeerId>) -> Self {
        Self {
            status,
            waiting_on,
            requesters: Vec::new(),
            expected: 0,
            progress: Vec::new(),
        }
    }
}

/// Everything guarded by the node lock.
pub(crate) struct NodeState {
    pub(crate) table: CoValueTable,
    pub(crate) loading: HashMap<RawCoId, Loading>,
    pub(crate) sync: SyncState,
    /// Content waiting for the keyed dependency to load.
    pub(crate) buffered: HashMap<RawCoId, Vec<(PeerId, NewContent)>>,
}

impl NodeState {
    fn new(table: CoValueTable) -> Self {
        Self {
            table,
            loading: HashMap::new(),
            sync: SyncState::new(),
            buffered: HashMap::new(),
        }
    }

    /// Whether content of `id` sits in the buffer.
    pub(crate) fn is_blocked(&self, id: &RawCoId) -> bool {
        self.buffered
            .values()
            .flatten()
            .any(|(_, content)| &content.id == id)
    }

    /// Present, not loading, and not waiting on a dependency.
    pub(crate) fn is_available(&self, id: &RawCoId) -> bool {
        self.table.contains(id) && !self.loading.contains_key(id) && !self.is_blocked(id)
    }
}

/// Side effects collected under the lock and run after releasing it.
#[derive(Default)]
pub(crate) struct Effects {
    pub(crate) notifications: Vec<Notification>,
    pub(crate) progress: Vec<(ProgressCallback, f32)>,
    pub(crate) changed: bool,
}

impl Effects {
    pub(crate) fn absorb(&mut self, state: &mut NodeState) {
        self.notifications.extend(state.table.take_notifications());
    }

    pub(crate) fn run(self, node: &NodeInner) {
        for notification in self.notifications {
            notification.fire();
        }
        for (callback, fraction) in self.progress {
            callback(fraction);
        }
        if self.changed {
            node.changed.send_modify(|version| *version += 1);
        }
    }
}

pub(crate) struct NodeInner {
    state: Mutex<NodeState>,
    pub(crate) manager: SyncManager,
    config: NodeConfig,
    /// Bumped after every change to the table.
    changed: watch::Sender<u64>,
}

impl NodeInner {
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, NodeState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// A node holding CoValues for one controlling identity.
///
/// Cheap to clone; clones share the same table and peers.
#[derive(Clone)]
pub struct LocalNode {
    inner: Arc<NodeInner>,
}

impl std::fmt::Debug for LocalNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock_state();
        f.debug_struct("LocalNode")
            .field("table", &state.table)
            .field("loading", &state.loading.len())
            .finish_non_exhaustive()
    }
}

impl LocalNode {
    /// A node around an existing table.
    pub fn new(table: CoValueTable, config: NodeConfig) -> Self {
        let (changed, _) = watch::channel(0);
        let trace = config.trace_sync;
        let inner = Arc::new_cyclic(|weak: &Weak<NodeInner>| NodeInner {
            state: Mutex::new(NodeState::new(table)),
            manager: SyncManager::new(weak.clone(), trace),
            config,
            changed,
        });
        Self { inner }
    }

    /// A node controlled by a freshly generated agent.
    pub fn with_new_agent(crypto: Arc<dyn CryptoProvider>, config: NodeConfig) -> Self {
        let controller = Controller::new(
            ControlledIdentity::Agent(crypto.new_agent_secret()),
            crypto.as_ref(),
        );
        Self::new(CoValueTable::new(controller, crypto), config)
    }

    pub(crate) fn from_inner(inner: Arc<NodeInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, NodeState> {
        self.inner.lock_state()
    }

    pub fn config(&self) -> &NodeConfig {
        &self.inner.config
    }

    pub fn controller(&self) -> Controller {
        self.lock().table.controller().clone()
    }

    pub fn crypto(&self) -> Arc<dyn CryptoProvider> {
        self.lock().table.crypto_provider().clone()
    }

    pub fn sync_manager(&self) -> &SyncManager {
        &self.inner.manager
    }

    /// Connects a peer; see [`SyncManager::add_peer`].
    pub fn add_peer(&self, peer: Peer) {
        self.inner.manager.add_peer(peer);
    }

    /// Runs `f` under the lock, then fires whatever it triggered.
    pub(crate) fn mutate<T>(
        &self,
        f: impl FnOnce(&SyncManager, &mut NodeState) -> SyncResult<T>,
    ) -> SyncResult<T> {
        let mut effects = Effects::default();
        let result = {
            let mut state = self.lock();
            let result = f(&self.inner.manager, &mut state);
            effects.absorb(&mut state);
            result
        };
        effects.changed = true;
        effects.run(&self.inner);
        result
    }

    // ── Creating and writing ─────────────────────────────────────

    /// Registers a new CoValue and announces it to interested peers.
    pub fn create_co_value(&self, header: CoValueHeader) -> SyncResult<RawCoId> {
        self.mutate(|manager, state| {
            let id = state.table.create(header)?;
            manager.finish_loading(state, &id, LoadStatus::Available);
            manager.sync_co_value(state, &id);
            Ok(id)
        })
    }

    fn create_owned(&self, kind: CoValueType, group: &RawCoId) -> SyncResult<RawCoId> {
        self.create_co_value(CoValueHeader::new(
            kind,
            Ruleset::OwnedByGroup {
                group: group.clone(),
            },
            None,
        ))
    }

    pub fn create_map(&self, group: &RawCoId) -> SyncResult<RawCoId> {
        self.create_owned(CoValueType::Map, group)
    }

    pub fn create_list(&self, group: &RawCoId) -> SyncResult<RawCoId> {
        self.create_owned(CoValueType::List, group)
    }

    pub fn create_stream(&self, group: &RawCoId) -> SyncResult<RawCoId> {
        self.create_owned(CoValueType::Stream, group)
    }

    /// Authors one transaction on `id` and pushes it to peers.
    pub fn make_transaction(
        &self,
        id: &RawCoId,
        privacy: Privacy,
        changes: Vec<Change>,
    ) -> SyncResult<TransactionId> {
        self.mutate(|manager, state| {
            let tx = state.table.make_transaction(id, privacy, changes)?;
            manager.sync_co_value(state, id);
            Ok(tx)
        })
    }

    // ── Loading and reading ──────────────────────────────────────

    /// Content of a value that is already loaded.
    pub fn expect_co_value_loaded(&self, id: &RawCoId) -> SyncResult<Arc<CoValueContent>> {
        let state = self.lock();
        if !state.is_available(id) {
            return Err(SyncError::NotLoaded(id.clone()));
        }
        Ok(state.table.content(id)?)
    }

    pub async fn load(&self, id: &RawCoId) -> SyncResult<Arc<CoValueContent>> {
        self.load_co_value(id, None).await
    }

    /// Loads `id` from peers unless it is already here.
    ///
    /// Concurrent loads of the same id share one request. Waiting is
    /// bounded by [`NodeConfig::load_timeout`]; dropping the returned future
    /// does not affect other waiters.
    pub async fn load_co_value(
        &self,
        id: &RawCoId,
        on_progress: Option<ProgressCallback>,
    ) -> SyncResult<Arc<CoValueContent>> {
        let mut status = {
            let mut state = self.lock();
            if state.is_available(id) {
                return Ok(state.table.content(id)?);
            }
            let status = self.inner.manager.start_loading(&mut state, id);
            if let Some(callback) = on_progress
                && let Some(loading) = state.loading.get_mut(id)
            {
                loading.progress.push(callback);
            }
            status
        };

        let outcome = match timeout(
            self.inner.config.load_timeout,
            status.wait_for(|s| *s != LoadStatus::Pending),
        )
        .await
        {
            Err(_) => {
                debug!(covalue = %id, "load timed out");
                return Err(SyncError::Timeout);
            }
            Ok(Ok(current)) => *current,
            Ok(Err(_)) => LoadStatus::Unavailable,
        };

        match outcome {
            LoadStatus::Available => self.expect_co_value_loaded(id),
            _ => Err(SyncError::NotLoaded(id.clone())),
        }
    }

    /// Calls `listener` with the content of `id` once it has loaded and
    /// after every later change.
    ///
    /// Loading happens in a background task; the returned handle can be
    /// unsubscribed at any point, also before the load finishes.
    pub fn subscribe(&self, id: &RawCoId, listener: Listener) -> NodeSubscription {
        let handle = NodeSubscription::new();
        let node = Arc::downgrade(&self.inner);
        let id = id.clone();
        let task_handle = handle.clone();
        tokio::spawn(async move {
            let Some(node) = node.upgrade().map(LocalNode::from_inner) else {
                return;
            };
            if let Err(e) = node.load(&id).await {
                warn!(covalue = %id, error = %e, "subscription could not load");
                return;
            }
            if task_handle.is_cancelled() {
                return;
            }

            let guard = task_handle.cancelled.clone();
            let forward = listener.clone();
            let guarded: Listener = Arc::new(move |content: Arc<CoValueContent>| {
                if !guard.load(Ordering::Acquire) {
                    forward(content);
                }
            });
            let (subscription, content) = {
                let state = node.lock();
                let Some(core) = state.table.get(&id) else {
                    return;
                };
                (core.subscribe(guarded), state.table.content(&id))
            };
            task_handle.attach(subscription);

            match content {
                Ok(content) if !task_handle.is_cancelled() => listener(content),
                Ok(_) => {}
                Err(e) => warn!(covalue = %id, error = %e, "content unavailable for subscriber"),
            }
        });
        handle
    }
}

/// Handle returned by [`LocalNode::subscribe`].
#[derive(Debug, Clone)]
pub struct NodeSubscription {
    cancelled: Arc<AtomicBool>,
    core: Arc<Mutex<Option<Subscription>>>,
}

impl NodeSubscription {
    fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            core: Arc::new(Mutex::new(None)),
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn attach(&self, subscription: Subscription) {
        let mut slot = self
            .core
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if self.is_cancelled() {
            subscription.unsubscribe();
        } else {
            *slot = Some(subscription);
        }
    }

    /// Stops delivery. Safe to call repeatedly and at any time.
    pub fn unsubscribe(&self) {
        self.cancelled.store(true, Ordering::Release);
        let mut slot = self
            .core
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(subscription) = slot.take() {
            subscription.unsubscribe();
        }
    }
}
