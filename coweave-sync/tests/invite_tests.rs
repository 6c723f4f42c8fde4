use coweave_core::{Change, InviteOutcome, Privacy, Role};
use coweave_crypto::{InviteSecret, Seed, StandardCrypto};
use coweave_sync::transport::{ConnectOptions, connected_peers};
use coweave_sync::{LocalNode, NodeConfig, SyncError};
use coweave_types::PeerId;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn node_with(config: NodeConfig) -> LocalNode {
    LocalNode::with_new_agent(Arc::new(StandardCrypto), config)
}

fn node() -> LocalNode {
    node_with(NodeConfig::default())
}

fn connect(a: &LocalNode, b: &LocalNode) {
    let (a_peer, b_peer) = connected_peers(
        PeerId::named("a"),
        PeerId::named("b"),
        ConnectOptions::default(),
    );
    b.add_peer(a_peer);
    a.add_peer(b_peer);
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

// ── Redeeming ────────────────────────────────────────────────────

#[tokio::test]
async fn writer_invite_grants_write_access() {
    let a = node();
    let b = node();
    connect(&a, &b);
    let group = a.create_group().unwrap();
    let map = a.create_map(&group).unwrap();
    a.make_transaction(&map, Privacy::Private, vec![Change::set("title", "a")])
        .unwrap();
    let secret = a.create_invite(&group, Role::WriterInvite).unwrap();

    let outcome = b.accept_invite(&map, &secret).await.unwrap();
    assert_eq!(outcome, InviteOutcome::Joined(Role::Writer));

    let member = b.controller().member();
    assert_eq!(b.role_of(&group, &member).unwrap(), Some(Role::Writer));
    eventually(|| a.role_of(&group, &member).is_ok_and(|r| r == Some(Role::Writer))).await;

    let content = b.load(&map).await.unwrap();
    assert_eq!(content.to_json(), json!({ "title": "a" }));

    b.make_transaction(&map, Privacy::Private, vec![Change::set("title", "b")])
        .unwrap();
    eventually(|| {
        a.expect_co_value_loaded(&map)
            .is_ok_and(|c| c.to_json() == json!({ "title": "b" }))
    })
    .await;
}

#[tokio::test]
async fn invite_can_target_the_group_itself() {
    let a = node();
    let b = node();
    connect(&a, &b);
    let group = a.create_group().unwrap();
    let secret = a.create_invite(&group, Role::ReaderInvite).unwrap();

    let outcome = b.accept_invite(&group, &secret).await.unwrap();
    assert_eq!(outcome, InviteOutcome::Joined(Role::Reader));
}

#[tokio::test]
async fn stronger_role_is_not_downgraded() {
    let a = node();
    let group = a.create_group().unwrap();
    let secret = a.create_invite(&group, Role::ReaderInvite).unwrap();

    let outcome = a.accept_invite(&group, &secret).await.unwrap();
    assert_eq!(outcome, InviteOutcome::Unchanged(Role::Admin));
    assert_eq!(
        a.role_of(&group, &a.controller().member()).unwrap(),
        Some(Role::Admin)
    );
}

// ── Failures ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn unknown_invite_times_out() {
    let config = NodeConfig {
        invite_timeout: Duration::from_millis(200),
        ..NodeConfig::default()
    };
    let a = node_with(config.clone());
    let b = node_with(config);
    connect(&a, &b);
    let group = a.create_group().unwrap();

    let forged = InviteSecret::new(Seed::random());
    let result = b.accept_invite(&group, &forged).await;
    assert!(matches!(result, Err(SyncError::Timeout)));
    assert_eq!(b.role_of(&group, &b.controller().member()).unwrap(), None);
}

#[tokio::test]
async fn invite_for_unreachable_value_is_not_loaded() {
    let b = node();
    let secret = InviteSecret::new(Seed::random());
    let target = coweave_types::RawCoId::from_hash("elsewhere");
    assert!(matches!(
        b.accept_invite(&target, &secret).await,
        Err(SyncError::NotLoaded(_))
    ));
}
