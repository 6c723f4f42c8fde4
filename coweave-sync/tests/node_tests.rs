use coweave_core::{
    Change, CoValueContent, CoValueHeader, CoValueType, ControlledIdentity, CoreError, Privacy,
    Role, Ruleset,
};
use coweave_crypto::{CryptoProvider, StandardCrypto};
use coweave_sync::transport::{ConnectOptions, Peer, PeerRole, PeerSender, connected_peers};
use coweave_sync::{LocalNode, NodeConfig, SyncError};
use coweave_types::{PeerId, RawCoId};
use pretty_assertions::assert_eq;
use serde_json::{Value as JsonValue, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

/// Honors `RUST_LOG` so traced sync messages can be inspected.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn node() -> LocalNode {
    LocalNode::with_new_agent(Arc::new(StandardCrypto), NodeConfig::default())
}

fn connect(a: &LocalNode, b: &LocalNode, role_a: PeerRole, role_b: PeerRole) {
    let (a_peer, b_peer) = connected_peers(
        PeerId::named("a"),
        PeerId::named("b"),
        ConnectOptions {
            trace: true,
            role_a,
            role_b,
        },
    );
    b.add_peer(a_peer);
    a.add_peer(b_peer);
}

fn json_of(node: &LocalNode, id: &RawCoId) -> Option<JsonValue> {
    node.expect_co_value_loaded(id).ok().map(|c| c.to_json())
}

async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..300 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

/// A group on `owner` with `member` added as writer, and a private map in it.
fn shared_map(owner: &LocalNode, member: &LocalNode) -> (RawCoId, RawCoId) {
    let group = owner.create_group().unwrap();
    owner
        .add_member(&group, &member.controller().member(), Role::Writer)
        .unwrap();
    let map = owner.create_map(&group).unwrap();
    (group, map)
}

// ── Loading ──────────────────────────────────────────────────────

#[tokio::test]
async fn load_without_peers_is_not_loaded() {
    let node = node();
    let id = RawCoId::from_hash("nowhere");
    assert!(matches!(node.load(&id).await, Err(SyncError::NotLoaded(missing)) if missing == id));
}

#[tokio::test(start_paused = true)]
async fn load_from_silent_peer_times_out() {
    let node = LocalNode::with_new_agent(
        Arc::new(StandardCrypto),
        NodeConfig {
            load_timeout: Duration::from_millis(100),
            ..NodeConfig::default()
        },
    );
    let (to_peer, _peer_rx) = mpsc::channel(1);
    let (_peer_tx, from_peer) = mpsc::channel(1);
    node.add_peer(Peer::new(
        PeerId::named("silent"),
        PeerRole::Server,
        from_peer,
        PeerSender::new(to_peer),
    ));

    let id = RawCoId::from_hash("slow");
    assert!(matches!(node.load(&id).await, Err(SyncError::Timeout)));
}

#[tokio::test]
async fn peers_are_registered_with_their_role() {
    let a = node();
    let b = node();
    connect(&a, &b, PeerRole::Client, PeerRole::Server);
    assert_eq!(
        b.sync_manager().peer_role(&PeerId::named("a")).unwrap(),
        PeerRole::Client
    );
    assert_eq!(
        a.sync_manager().peer_role(&PeerId::named("b")).unwrap(),
        PeerRole::Server
    );
    assert!(matches!(
        a.sync_manager().peer_role(&PeerId::named("nobody")),
        Err(SyncError::PeerNotFound(_))
    ));
}

#[tokio::test]
async fn load_fetches_value_with_its_group() {
    let a = node();
    let b = node();
    connect(&a, &b, PeerRole::Peer, PeerRole::Peer);
    let (group, map) = shared_map(&a, &b);
    a.make_transaction(&map, Privacy::Private, vec![Change::set("title", "a")])
        .unwrap();

    let content = b.load(&map).await.unwrap();
    assert_eq!(content.to_json(), json!({ "title": "a" }));
    assert!(b.expect_co_value_loaded(&group).is_ok());
}

#[tokio::test]
async fn load_reports_progress() {
    let a = node();
    let b = node();
    connect(&a, &b, PeerRole::Peer, PeerRole::Peer);
    let group = a.create_group().unwrap();
    let stream = a.create_stream(&group).unwrap();
    for n in 0..3 {
        a.make_transaction(&stream, Privacy::Trusting, vec![Change::push(n)])
            .unwrap();
    }

    let seen: Arc<Mutex<Vec<f32>>> = Arc::new(Mutex::new(Vec::new()));
    let record = seen.clone();
    b.load_co_value(
        &stream,
        Some(Arc::new(move |fraction: f32| record.lock().unwrap().push(fraction))),
    )
    .await
    .unwrap();

    eventually(|| seen.lock().unwrap().last().copied() == Some(1.0)).await;
}

#[tokio::test]
async fn relay_server_serves_values_from_its_clients() {
    let server = node();
    let alice = node();
    let bob = node();
    let (alice_peer, server_for_alice) = connected_peers(
        PeerId::named("alice"),
        PeerId::named("server"),
        ConnectOptions {
            trace: false,
            role_a: PeerRole::Client,
            role_b: PeerRole::Server,
        },
    );
    server.add_peer(alice_peer);
    alice.add_peer(server_for_alice);
    let (bob_peer, server_for_bob) = connected_peers(
        PeerId::named("bob"),
        PeerId::named("server"),
        ConnectOptions {
            trace: false,
            role_a: PeerRole::Client,
            role_b: PeerRole::Server,
        },
    );
    server.add_peer(bob_peer);
    bob.add_peer(server_for_bob);

    let (_, map) = shared_map(&alice, &bob);
    alice
        .make_transaction(&map, Privacy::Private, vec![Change::set("title", "a")])
        .unwrap();
    eventually(|| server.expect_co_value_loaded(&map).is_ok()).await;

    let content = bob.load(&map).await.unwrap();
    assert_eq!(content.to_json(), json!({ "title": "a" }));
}

// ── Convergence ──────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_writes_converge() {
    init_tracing();
    let a = node();
    let b = node();
    connect(&a, &b, PeerRole::Peer, PeerRole::Peer);
    let (_, map) = shared_map(&a, &b);
    a.make_transaction(&map, Privacy::Private, vec![Change::set("title", "a")])
        .unwrap();
    b.load(&map).await.unwrap();

    a.make_transaction(&map, Privacy::Private, vec![Change::set("left", 1)])
        .unwrap();
    b.make_transaction(&map, Privacy::Private, vec![Change::set("right", 2)])
        .unwrap();
    b.make_transaction(&map, Privacy::Private, vec![Change::set("title", "b")])
        .unwrap();

    let expected = json!({ "title": "b", "left": 1, "right": 2 });
    eventually(|| json_of(&a, &map) == Some(expected.clone())).await;
    eventually(|| json_of(&b, &map) == Some(expected.clone())).await;
}

#[tokio::test]
async fn list_appends_from_both_sides_interleave_identically() {
    let a = node();
    let b = node();
    connect(&a, &b, PeerRole::Peer, PeerRole::Peer);
    let (group, _) = shared_map(&a, &b);
    let list_id = a.create_list(&group).unwrap();
    a.make_transaction(&list_id, Privacy::Trusting, vec![Change::append(None, "a")])
        .unwrap();
    b.load(&list_id).await.unwrap();

    b.make_transaction(&list_id, Privacy::Trusting, vec![Change::append(None, "b")])
        .unwrap();
    a.make_transaction(&list_id, Privacy::Trusting, vec![Change::append(None, "c")])
        .unwrap();

    eventually(|| {
        let left = json_of(&a, &list_id);
        left.as_ref().and_then(JsonValue::as_array).is_some_and(|items| items.len() == 3)
            && left == json_of(&b, &list_id)
    })
    .await;
}

// ── Permissions ──────────────────────────────────────────────────

#[tokio::test]
async fn reader_cannot_write() {
    let a = node();
    let b = node();
    connect(&a, &b, PeerRole::Peer, PeerRole::Peer);
    let group = a.create_group().unwrap();
    a.add_member(&group, &b.controller().member(), Role::Reader)
        .unwrap();
    let map = a.create_map(&group).unwrap();
    a.make_transaction(&map, Privacy::Private, vec![Change::set("title", "a")])
        .unwrap();
    b.load(&map).await.unwrap();

    let result = b.make_transaction(&map, Privacy::Private, vec![Change::set("title", "b")]);
    assert!(matches!(
        result,
        Err(SyncError::Core(CoreError::Permission(_)))
    ));
    assert_eq!(json_of(&b, &map), Some(json!({ "title": "a" })));
    assert_eq!(json_of(&a, &map), Some(json!({ "title": "a" })));
}

#[tokio::test]
async fn removed_member_stops_reading_new_content() {
    let a = node();
    let b = node();
    connect(&a, &b, PeerRole::Peer, PeerRole::Peer);
    let (group, map) = shared_map(&a, &b);
    a.make_transaction(&map, Privacy::Private, vec![Change::set("title", "old")])
        .unwrap();
    b.load(&map).await.unwrap();

    a.remove_member(&group, &b.controller().member()).unwrap();
    a.make_transaction(&map, Privacy::Private, vec![Change::set("secret", "new")])
        .unwrap();

    eventually(|| {
        b.role_of(&group, &b.controller().member())
            .is_ok_and(|role| role == Some(Role::Revoked))
    })
    .await;
    assert_eq!(
        json_of(&a, &map),
        Some(json!({ "title": "old", "secret": "new" }))
    );
    eventually(|| json_of(&b, &map) == Some(json!({ "title": "old" }))).await;
}

// ── Subscriptions ────────────────────────────────────────────────

#[tokio::test]
async fn subscribe_delivers_current_then_updates() {
    let a = node();
    let b = node();
    connect(&a, &b, PeerRole::Peer, PeerRole::Peer);
    let (_, map) = shared_map(&a, &b);
    a.make_transaction(&map, Privacy::Private, vec![Change::set("title", "a")])
        .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let subscription = b.subscribe(
        &map,
        Arc::new(move |content: Arc<CoValueContent>| {
            let _ = tx.send(content.to_json());
        }),
    );
    assert_eq!(rx.recv().await, Some(json!({ "title": "a" })));

    a.make_transaction(&map, Privacy::Private, vec![Change::set("title", "b")])
        .unwrap();
    loop {
        if rx.recv().await == Some(json!({ "title": "b" })) {
            break;
        }
    }

    subscription.unsubscribe();
    subscription.unsubscribe();
}

#[tokio::test]
async fn unsubscribe_before_load_stops_delivery() {
    let a = node();
    let group = a.create_group().unwrap();
    let map = a.create_map(&group).unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let subscription = a.subscribe(
        &map,
        Arc::new(move |_: Arc<CoValueContent>| {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );
    subscription.unsubscribe();

    tokio::time::sleep(Duration::from_millis(20)).await;
    a.make_transaction(&map, Privacy::Trusting, vec![Change::set("k", 1)])
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unsubscribe_after_failed_load_is_harmless() {
    let node = node();
    let subscription = node.subscribe(
        &RawCoId::from_hash("missing"),
        Arc::new(|_: Arc<CoValueContent>| {}),
    );
    tokio::time::sleep(Duration::from_millis(20)).await;
    subscription.unsubscribe();
    subscription.unsubscribe();
}

// ── Scoped copies ────────────────────────────────────────────────

#[tokio::test]
async fn scoped_copy_holds_loaded_values_for_new_identity() {
    let a = node();
    let (_, map) = shared_map(&a, &node());
    a.make_transaction(&map, Privacy::Private, vec![Change::set("title", "a")])
        .unwrap();

    let copy = a
        .scoped_copy(ControlledIdentity::Agent(StandardCrypto.new_agent_secret()), None)
        .unwrap();
    assert_ne!(copy.controller().session(), a.controller().session());
    // The new identity is no member, so private content stays hidden.
    assert_eq!(json_of(&copy, &map), Some(json!({})));

    let same = a
        .scoped_copy(
            a.controller().identity().clone(),
            Some(a.controller().session().clone()),
        )
        .unwrap();
    assert_eq!(json_of(&same, &map), Some(json!({ "title": "a" })));
}

#[tokio::test]
async fn scoped_copy_reports_missing_dependencies() {
    let a = node();
    let orphan = a
        .create_co_value(CoValueHeader::new(
            CoValueType::Map,
            Ruleset::OwnedByGroup {
                group: RawCoId::from_hash("gone"),
            },
            None,
        ))
        .unwrap();

    match a.scoped_copy(a.controller().identity().clone(), None) {
        Err(SyncError::UnresolvedDependencies(ids)) => assert!(ids.contains(&orphan)),
        other => panic!("expected unresolved dependencies, got {other:?}"),
    }
}
