//! Sync state tracking.
//!
//! Tracks, per connected peer, what it is known to have of each CoValue.
//! An entry exists once the peer has shown interest in a value (by asking
//! for it, stating its known state, or sending content), so the entry set
//! doubles as the peer's subscriptions.

use coweave_core::NewContent;
use coweave_crdt::VectorClock;
use coweave_types::{PeerId, RawCoId};
use std::collections::HashMap;

use crate::transport::PeerRole;

/// What a peer has of one CoValue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KnownState {
    /// The peer said it lacks the value, header included.
    Missing,
    /// The peer has the header and these transaction counts.
    Has(VectorClock),
}

impl KnownState {
    /// The clock to compute a delta against; `None` means send the header.
    pub fn clock(&self) -> Option<&VectorClock> {
        match self {
            Self::Missing => None,
            Self::Has(clock) => Some(clock),
        }
    }

    fn merge(&mut self, other: &VectorClock) {
        match self {
            Self::Missing => *self = Self::Has(other.clone()),
            Self::Has(clock) => clock.merge(other),
        }
    }
}

/// Sync state of one connected peer.
#[derive(Debug, Clone)]
pub struct PeerSyncState {
    pub role: PeerRole,
    known: HashMap<RawCoId, KnownState>,
}

impl PeerSyncState {
    pub fn new(role: PeerRole) -> Self {
        Self {
            role,
            known: HashMap::new(),
        }
    }

    pub fn known(&self, id: &RawCoId) -> Option<&KnownState> {
        self.known.get(id)
    }

    pub fn is_interested(&self, id: &RawCoId) -> bool {
        self.known.contains_key(id)
    }

    /// Whether updates to `id` should be pushed to this peer unasked.
    pub fn wants(&self, id: &RawCoId) -> bool {
        self.role == PeerRole::Server || self.is_interested(id)
    }
}

/// Tracks sync state for all connected peers.
#[derive(Debug, Clone, Default)]
pub struct SyncState {
    peers: HashMap<PeerId, PeerSyncState>,
}

impl SyncState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_peer(&mut self, peer: PeerId, role: PeerRole) {
        self.peers.insert(peer, PeerSyncState::new(role));
    }

    pub fn remove_peer(&mut self, peer: &PeerId) -> Option<PeerSyncState> {
        self.peers.remove(peer)
    }

    pub fn peer(&self, peer: &PeerId) -> Option<&PeerSyncState> {
        self.peers.get(peer)
    }

    pub fn peer_ids(&self) -> impl Iterator<Item = &PeerId> {
        self.peers.keys()
    }

    /// Replaces what `peer` is known to have of `id` with its own statement.
    pub fn record_known(&mut self, peer: &PeerId, id: &RawCoId, state: KnownState) {
        if let Some(p) = self.peers.get_mut(peer) {
            p.known.insert(id.clone(), state);
        }
    }

    /// Adds `clock` to what `peer` has of `id`, after sending to or
    /// receiving from it.
    pub fn record_has(&mut self, peer: &PeerId, id: &RawCoId, clock: &VectorClock) {
        if let Some(p) = self.peers.get_mut(peer) {
            p.known
                .entry(id.clone())
                .or_insert(KnownState::Missing)
                .merge(clock);
        }
    }

    /// Records that `peer` sent us `content`: it has everything it sent.
    pub fn record_received(&mut self, peer: &PeerId, content: &NewContent) {
        let mut clock = VectorClock::new();
        for (session, new) in &content.new {
            clock.update(session.clone(), new.after + new.transactions.len() as u32);
        }
        self.record_has(peer, &content.id, &clock);
    }
}
