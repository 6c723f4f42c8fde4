use coweave_core::{NewContent, SessionNewContent};
use coweave_crdt::VectorClock;
use coweave_sync::state::{KnownState, SyncState};
use coweave_sync::transport::PeerRole;
use coweave_types::{PeerId, RawCoId, SessionId};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::collections::BTreeMap;

fn id() -> RawCoId {
    RawCoId::from_hash("state")
}

fn session(n: u8) -> SessionId {
    SessionId::new(&format!("co_zaccount{n}"), "z1")
}

fn clock(entries: &[(u8, u32)]) -> VectorClock {
    let mut clock = VectorClock::new();
    for (n, count) in entries {
        clock.set(session(*n), *count);
    }
    clock
}

fn state_with(peer: &PeerId, role: PeerRole) -> SyncState {
    let mut state = SyncState::new();
    state.add_peer(peer.clone(), role);
    state
}

// ── Peers ────────────────────────────────────────────────────────

#[test]
fn peers_are_added_and_removed() {
    let peer = PeerId::named("p");
    let mut state = state_with(&peer, PeerRole::Client);
    assert_eq!(state.peer_ids().count(), 1);
    assert_eq!(state.peer(&peer).unwrap().role, PeerRole::Client);

    assert!(state.remove_peer(&peer).is_some());
    assert!(state.peer(&peer).is_none());
}

#[test]
fn records_for_unknown_peers_are_ignored() {
    let mut state = SyncState::new();
    let stranger = PeerId::named("stranger");
    state.record_known(&stranger, &id(), KnownState::Missing);
    assert!(state.peer(&stranger).is_none());
}

// ── Interest ─────────────────────────────────────────────────────

#[test]
fn servers_want_everything_clients_only_what_they_asked() {
    let server = PeerId::named("server");
    let client = PeerId::named("client");
    let mut state = SyncState::new();
    state.add_peer(server.clone(), PeerRole::Server);
    state.add_peer(client.clone(), PeerRole::Client);

    assert!(state.peer(&server).unwrap().wants(&id()));
    assert!(!state.peer(&client).unwrap().wants(&id()));

    state.record_known(&client, &id(), KnownState::Missing);
    assert!(state.peer(&client).unwrap().wants(&id()));
    assert_eq!(state.peer(&client).unwrap().known(&id()), Some(&KnownState::Missing));
}

// ── Known state ──────────────────────────────────────────────────

#[test]
fn stated_known_state_replaces_previous() {
    let peer = PeerId::named("p");
    let mut state = state_with(&peer, PeerRole::Peer);

    state.record_known(&peer, &id(), KnownState::Has(clock(&[(1, 5)])));
    state.record_known(&peer, &id(), KnownState::Has(clock(&[(1, 2)])));
    assert_eq!(
        state.peer(&peer).unwrap().known(&id()),
        Some(&KnownState::Has(clock(&[(1, 2)])))
    );

    state.record_known(&peer, &id(), KnownState::Missing);
    assert_eq!(state.peer(&peer).unwrap().known(&id()).unwrap().clock(), None);
}

#[test]
fn sent_content_only_raises_counts() {
    let peer = PeerId::named("p");
    let mut state = state_with(&peer, PeerRole::Peer);

    state.record_has(&peer, &id(), &clock(&[(1, 3)]));
    state.record_has(&peer, &id(), &clock(&[(1, 1), (2, 4)]));
    assert_eq!(
        state.peer(&peer).unwrap().known(&id()),
        Some(&KnownState::Has(clock(&[(1, 3), (2, 4)])))
    );
}

#[test]
fn received_content_counts_what_the_peer_sent() {
    let peer = PeerId::named("p");
    let mut state = state_with(&peer, PeerRole::Peer);
    let content = NewContent {
        id: id(),
        header: None,
        new: BTreeMap::from([(
            session(1),
            SessionNewContent {
                after: 2,
                transactions: Vec::new(),
            },
        )]),
    };

    state.record_received(&peer, &content);
    assert_eq!(
        state.peer(&peer).unwrap().known(&id()),
        Some(&KnownState::Has(clock(&[(1, 2)])))
    );
}

proptest! {
    #[test]
    fn sent_clocks_merge_in_any_order(
        updates in proptest::collection::vec((0u8..4, 0u32..20), 1..12),
    ) {
        let peer = PeerId::named("p");
        let clocks: Vec<VectorClock> = updates.iter().map(|u| clock(&[*u])).collect();

        let mut forward = state_with(&peer, PeerRole::Peer);
        for c in &clocks {
            forward.record_has(&peer, &id(), c);
        }
        let mut backward = state_with(&peer, PeerRole::Peer);
        for c in clocks.iter().rev() {
            backward.record_has(&peer, &id(), c);
        }

        prop_assert_eq!(
            forward.peer(&peer).unwrap().known(&id()),
            backward.peer(&peer).unwrap().known(&id())
        );
    }
}
