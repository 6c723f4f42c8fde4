//! Sync manager: moves CoValue content between a node and its peers.
//!
//! Every peer gets a reader task that applies incoming messages to the node
//! and a writer task that drains a per-peer outbox into the connection, so
//! a slow peer never blocks the node. Both tasks only hold a `Weak`
//! reference to the node.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, Weak};

use coweave_core::{CoreError, NewContent, ValidationError};
use coweave_types::{PeerId, RawCoId};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::node::{Effects, LoadStatus, Loading, NodeInner, NodeState};
use crate::protocol::{KnownStateMessage, SyncMessage};
use crate::state::KnownState;
use crate::transport::{Peer, PeerRole};

struct PeerHandle {
    outbox: mpsc::UnboundedSender<SyncMessage>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl PeerHandle {
    fn abort(&self) {
        self.reader.abort();
        self.writer.abort();
    }
}

/// Per-node registry of peers and the message handling logic.
pub struct SyncManager {
    node: Weak<NodeInner>,
    peers: Mutex<HashMap<PeerId, PeerHandle>>,
    trace: bool,
}

impl std::fmt::Debug for SyncManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncManager")
            .field("peers", &self.peer_ids())
            .field("trace", &self.trace)
            .finish()
    }
}

impl Drop for SyncManager {
    fn drop(&mut self) {
        let peers = self
            .peers
            .get_mut()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for handle in peers.values() {
            handle.abort();
        }
    }
}

async fn read_loop(
    node: Weak<NodeInner>,
    peer: PeerId,
    mut incoming: mpsc::Receiver<SyncMessage>,
) {
    while let Some(message) = incoming.recv().await {
        let Some(node) = node.upgrade() else {
            return;
        };
        node.manager.handle_message(&node, &peer, message);
    }
    debug!(%peer, "peer connection closed");
    if let Some(node) = node.upgrade() {
        node.manager.remove_peer(&peer);
    }
}

impl SyncManager {
    pub(crate) fn new(node: Weak<NodeInner>, trace: bool) -> Self {
        Self {
            node,
            peers: Mutex::new(HashMap::new()),
            trace,
        }
    }

    fn lock_peers(&self) -> MutexGuard<'_, HashMap<PeerId, PeerHandle>> {
        self.peers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn peer_ids(&self) -> Vec<PeerId> {
        self.lock_peers().keys().cloned().collect()
    }

    /// Role `peer` was connected with.
    pub fn peer_role(&self, peer: &PeerId) -> SyncResult<PeerRole> {
        let node = self.node.upgrade().ok_or(SyncError::ChannelClosed)?;
        let state = node.lock_state();
        state
            .sync
            .peer(peer)
            .map(|p| p.role)
            .ok_or_else(|| SyncError::PeerNotFound(peer.clone()))
    }

    // ── Peer lifecycle ───────────────────────────────────────────

    /// Registers `peer` and starts its reader and writer tasks.
    ///
    /// `Server` and `Peer` role peers are sent a `load` for every value this
    /// node has or is loading. Must be called inside a tokio runtime.
    pub fn add_peer(&self, peer: Peer) {
        let Some(node) = self.node.upgrade() else {
            return;
        };
        let Peer {
            id,
            role,
            incoming,
            outgoing,
        } = peer;

        let mut state = node.lock_state();
        state.sync.add_peer(id.clone(), role);

        let (outbox, mut queue) = mpsc::unbounded_channel::<SyncMessage>();
        let writer_peer = id.clone();
        let writer = tokio::spawn(async move {
            while let Some(message) = queue.recv().await {
                if let Err(e) = outgoing.send(message).await {
                    debug!(peer = %writer_peer, error = %e, "stopping writer");
                    break;
                }
            }
        });
        let reader = tokio::spawn(read_loop(self.node.clone(), id.clone(), incoming));
        if let Some(old) = self.lock_peers().insert(
            id.clone(),
            PeerHandle {
                outbox,
                reader,
                writer,
            },
        ) {
            old.abort();
        }
        info!(peer = %id, ?role, "added peer");

        if role.announces() {
            let ids: BTreeSet<RawCoId> = state
                .table
                .ids()
                .chain(state.loading.keys())
                .cloned()
                .collect();
            for covalue in ids {
                if let Some(loading) = state.loading.get_mut(&covalue) {
                    loading.waiting_on.insert(id.clone());
                }
                let known = known_message(&state, &covalue);
                self.send(&id, SyncMessage::Load(known));
            }
        }
    }

    /// Disconnects `peer`. Loads that only it could still serve fail.
    pub fn remove_peer(&self, peer: &PeerId) {
        if let Some(handle) = self.lock_peers().remove(peer) {
            handle.abort();
        }
        let Some(node) = self.node.upgrade() else {
            return;
        };
        let mut state = node.lock_state();
        state.sync.remove_peer(peer);
        let abandoned: Vec<RawCoId> = state
            .loading
            .iter_mut()
            .filter_map(|(id, loading)| {
                let was_waiting = loading.waiting_on.remove(peer);
                (was_waiting && loading.waiting_on.is_empty()).then(|| id.clone())
            })
            .collect();
        for id in abandoned {
            self.finish_loading(&mut state, &id, LoadStatus::Unavailable);
        }
        info!(%peer, "removed peer");
    }

    fn send(&self, peer: &PeerId, message: SyncMessage) {
        match self.lock_peers().get(peer) {
            Some(handle) => {
                if handle.outbox.send(message).is_err() {
                    debug!(%peer, "outbox closed");
                }
            }
            None => debug!(%peer, "no such peer"),
        }
    }

    // ── Loading ──────────────────────────────────────────────────

    /// Sends `load` for `id` to the peers `filter` accepts.
    fn request(
        &self,
        state: &NodeState,
        id: &RawCoId,
        filter: impl Fn(&PeerId, PeerRole) -> bool,
    ) -> HashSet<PeerId> {
        let asked: HashSet<PeerId> = state
            .sync
            .peer_ids()
            .filter(|peer| {
                state
                    .sync
                    .peer(peer)
                    .is_some_and(|p| filter(*peer, p.role))
            })
            .cloned()
            .collect();
        for peer in &asked {
            self.send(peer, SyncMessage::Load(known_message(state, id)));
        }
        asked
    }

    /// Starts loading `id` from every peer, or joins a load in flight.
    pub(crate) fn start_loading(
        &self,
        state: &mut NodeState,
        id: &RawCoId,
    ) -> watch::Receiver<LoadStatus> {
        if let Some(loading) = state.loading.get(id) {
            return loading.status.subscribe();
        }
        let (status, receiver) = watch::channel(LoadStatus::Pending);
        let asked = self.request(state, id, |_, _| true);
        if asked.is_empty() {
            debug!(covalue = %id, "no peers to load from");
            status.send_replace(LoadStatus::Unavailable);
            return receiver;
        }
        debug!(covalue = %id, peers = asked.len(), "loading from peers");
        state.loading.insert(id.clone(), Loading::new(status, asked));
        receiver
    }

    /// Resolves a pending load of `id`, if any.
    pub(crate) fn finish_loading(&self, state: &mut NodeState, id: &RawCoId, status: LoadStatus) {
        let Some(loading) = state.loading.remove(id) else {
            return;
        };
        loading.status.send_replace(status);
        if status == LoadStatus::Unavailable {
            debug!(covalue = %id, "no peer has it");
            for requester in &loading.requesters {
                self.send(requester, SyncMessage::Known(KnownStateMessage::missing(id.clone())));
            }
        }
    }

    fn report_progress(&self, state: &NodeState, id: &RawCoId, effects: &mut Effects) {
        let Some(loading) = state.loading.get(id) else {
            return;
        };
        if loading.progress.is_empty() {
            return;
        }
        let have = state.table.get(id).map_or(0, |core| core.transaction_count()) as u64;
        let fraction = if loading.expected == 0 {
            1.0
        } else {
            (have as f32 / loading.expected as f32).min(1.0)
        };
        for callback in &loading.progress {
            effects.progress.push((callback.clone(), fraction));
        }
    }

    // ── Pushing ──────────────────────────────────────────────────

    /// Pushes whatever is new of `id` to every peer that wants it: servers,
    /// and peers that have shown interest.
    pub(crate) fn sync_co_value(&self, state: &mut NodeState, id: &RawCoId) {
        let targets: Vec<PeerId> = state
            .sync
            .peer_ids()
            .filter(|peer| state.sync.peer(peer).is_some_and(|p| p.wants(id)))
            .cloned()
            .collect();
        for peer in targets {
            self.push_content(state, &peer, id);
        }
    }

    /// Sends `peer` what it lacks of `id`, dependencies first.
    fn push_content(&self, state: &mut NodeState, peer: &PeerId, id: &RawCoId) {
        let mut visited = HashSet::new();
        self.push_with_dependencies(state, peer, id, &mut visited);
    }

    fn push_with_dependencies(
        &self,
        state: &mut NodeState,
        peer: &PeerId,
        id: &RawCoId,
        visited: &mut HashSet<RawCoId>,
    ) {
        if !visited.insert(id.clone()) {
            return;
        }
        let Some(dependencies) = state.table.get(id).map(|core| core.depended_on()) else {
            return;
        };
        for dependency in &dependencies {
            self.push_with_dependencies(state, peer, dependency, visited);
        }

        let Some(core) = state.table.get(id) else {
            return;
        };
        let known = state
            .sync
            .peer(peer)
            .and_then(|p| p.known(id))
            .and_then(KnownState::clock);
        let Some(content) = core.new_content_since(known) else {
            return;
        };
        let ours = core.known_state();
        debug!(%peer, covalue = %id, sessions = content.new.len(), "pushing content");
        self.send(peer, SyncMessage::Content(content));
        state.sync.record_has(peer, id, &ours);
    }

    // ── Incoming ─────────────────────────────────────────────────

    pub(crate) fn handle_message(&self, node: &NodeInner, from: &PeerId, message: SyncMessage) {
        if self.trace {
            debug!(peer = %from, message = %message.trace_json(), "received");
        }
        let mut effects = Effects::default();
        {
            let mut state = node.lock_state();
            match message {
                SyncMessage::Load(msg) => self.handle_load(&mut state, from, msg),
                SyncMessage::Known(msg) => self.handle_known(&mut state, from, msg),
                SyncMessage::Content(content) => {
                    self.handle_content(&mut state, from, content, &mut effects)
                }
            }
            effects.absorb(&mut state);
        }
        effects.run(node);
    }

    fn handle_load(&self, state: &mut NodeState, from: &PeerId, msg: KnownStateMessage) {
        let id = msg.id.clone();
        state.sync.record_known(from, &id, peer_known(msg));

        if let Some(core) = state.table.get(&id) {
            let known = KnownStateMessage::has(id.clone(), core.known_state());
            self.send(from, SyncMessage::Known(known));
            self.push_content(state, from, &id);
            return;
        }

        if let Some(loading) = state.loading.get_mut(&id) {
            loading.requesters.push(from.clone());
            return;
        }
        // Ask our own servers on the requester's behalf.
        let asked = self.request(state, &id, |peer, role| {
            peer != from && role == PeerRole::Server
        });
        if asked.is_empty() {
            self.send(from, SyncMessage::Known(KnownStateMessage::missing(id)));
            return;
        }
        let (status, _) = watch::channel(LoadStatus::Pending);
        let mut loading = Loading::new(status, asked);
        loading.requesters.push(from.clone());
        state.loading.insert(id, loading);
    }

    fn handle_known(&self, state: &mut NodeState, from: &PeerId, msg: KnownStateMessage) {
        let id = msg.id.clone();
        let has_header = msg.header;
        let total = msg.sessions.total();
        state.sync.record_known(from, &id, peer_known(msg));

        let present = state.table.contains(&id);
        if let Some(loading) = state.loading.get_mut(&id) {
            if has_header {
                loading.expected = loading.expected.max(total);
            } else {
                loading.waiting_on.remove(from);
                if loading.waiting_on.is_empty() && !present {
                    self.finish_loading(state, &id, LoadStatus::Unavailable);
                }
            }
        }
        if present {
            self.push_content(state, from, &id);
        }
    }

    fn handle_content(
        &self,
        state: &mut NodeState,
        from: &PeerId,
        content: NewContent,
        effects: &mut Effects,
    ) {
        let id = content.id.clone();
        state.sync.record_received(from, &content);

        let created = if state.table.contains(&id) {
            false
        } else if let Some(header) = &content.header {
            match state.table.ensure_from_header(&id, header) {
                Ok(created) => created,
                Err(e) => {
                    warn!(peer = %from, covalue = %id, error = %e, "rejected header");
                    return;
                }
            }
        } else {
            debug!(peer = %from, covalue = %id, "content without header, asking for it");
            self.send(from, SyncMessage::Known(KnownStateMessage::missing(id)));
            return;
        };

        if let Some(dependency) = unready_dependency(state, &content) {
            self.buffer(state, dependency, from, content);
            return;
        }

        let mut added = 0;
        let mut gap = false;
        for (session, new) in &content.new {
            match state
                .table
                .add_transactions(&id, session, new.after, &new.transactions)
            {
                Ok(count) => added += count,
                Err(CoreError::NotLoaded(dependency)) => {
                    self.buffer(state, dependency, from, content.clone());
                    return;
                }
                Err(CoreError::Validation(ValidationError::IndexGap { .. })) => gap = true,
                Err(e) => {
                    warn!(peer = %from, covalue = %id, %session, error = %e, "rejected transactions");
                }
            }
        }

        if gap
            && let Some(core) = state.table.get(&id)
        {
            debug!(peer = %from, covalue = %id, "index gap, correcting peer");
            let known = KnownStateMessage::has(id.clone(), core.known_state());
            self.send(from, SyncMessage::Known(known));
        }

        self.report_progress(state, &id, effects);
        self.finish_loading(state, &id, LoadStatus::Available);
        if created || added > 0 {
            effects.changed = true;
            self.sync_co_value(state, &id);
            if let Some(waiting) = state.buffered.remove(&id) {
                for (peer, content) in waiting {
                    self.handle_content(state, &peer, content, effects);
                }
            }
        }
    }

    /// Parks `content` until `dependency` has loaded, starting that load.
    fn buffer(
        &self,
        state: &mut NodeState,
        dependency: RawCoId,
        from: &PeerId,
        content: NewContent,
    ) {
        debug!(covalue = %content.id, %dependency, "buffering content until dependency loads");
        let needs_load =
            !state.table.contains(&dependency) && !state.loading.contains_key(&dependency);
        state
            .buffered
            .entry(dependency.clone())
            .or_default()
            .push((from.clone(), content));
        if needs_load {
            let _ = self.start_loading(state, &dependency);
        }
    }
}

fn known_message(state: &NodeState, id: &RawCoId) -> KnownStateMessage {
    state.table.get(id).map_or_else(
        || KnownStateMessage::missing(id.clone()),
        |core| KnownStateMessage::has(id.clone(), core.known_state()),
    )
}

fn peer_known(msg: KnownStateMessage) -> KnownState {
    if msg.header {
        KnownState::Has(msg.sessions)
    } else {
        KnownState::Missing
    }
}

/// A dependency of `content` that is absent or still in flight.
fn unready_dependency(state: &NodeState, content: &NewContent) -> Option<RawCoId> {
    let core = state.table.get(&content.id)?;
    let owner = core.header().owner_group().cloned();
    let session_owners = content
        .new
        .keys()
        .filter_map(|session| match coweave_core::MemberId::from_session(session) {
            Ok(coweave_core::MemberId::Account(account)) => Some(account),
            _ => None,
        });
    owner
        .into_iter()
        .chain(session_owners)
        .filter(|dependency| dependency != &content.id)
        .find(|dependency| {
            !state.table.contains(dependency)
                || state.loading.contains_key(dependency)
                || state.is_blocked(dependency)
        })
}
