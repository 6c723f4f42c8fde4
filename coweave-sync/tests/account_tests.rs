use coweave_core::{Change, Privacy, ROOT};
use coweave_crypto::StandardCrypto;
use coweave_sync::transport::{ConnectOptions, Peer, PeerRole, connected_peers};
use coweave_sync::{LocalNode, Migration, NodeConfig, SyncError, SyncResult};
use coweave_types::{PeerId, RawCoId};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn crypto() -> Arc<StandardCrypto> {
    Arc::new(StandardCrypto)
}

/// Connects a fresh client to `server`; returns the peer the client should
/// be given.
fn server_peer(server: &LocalNode, client: &str) -> Peer {
    let (client_peer, server_for_client) = connected_peers(
        PeerId::named(client),
        PeerId::named("server"),
        ConnectOptions {
            trace: false,
            role_a: PeerRole::Client,
            role_b: PeerRole::Server,
        },
    );
    server.add_peer(client_peer);
    server_for_client
}

/// Creates a group and a root map holding `app`, and links it as the
/// account root.
fn counting_migration(runs: Arc<AtomicUsize>) -> Migration {
    Box::new(move |node: &LocalNode, account: &RawCoId, _profile: &RawCoId| -> SyncResult<()> {
        runs.fetch_add(1, Ordering::SeqCst);
        let group = node.create_group()?;
        let root = node.create_map(&group)?;
        node.make_transaction(&root, Privacy::Private, vec![Change::set("app", "notes")])?;
        node.make_transaction(
            account,
            Privacy::Trusting,
            vec![Change::set(ROOT, root.to_string())],
        )?;
        Ok(())
    })
}

fn root_of(node: &LocalNode, account: &RawCoId) -> Option<RawCoId> {
    node.expect_co_value_loaded(account)
        .ok()?
        .as_account()?
        .root_id()
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

// ── New accounts ─────────────────────────────────────────────────

#[tokio::test]
async fn new_account_has_profile_and_runs_migration() {
    let runs = Arc::new(AtomicUsize::new(0));
    let created = LocalNode::with_new_account(
        "Ada",
        crypto(),
        Vec::new(),
        Some(counting_migration(runs.clone())),
        NodeConfig::default(),
    )
    .unwrap();

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(
        created.node.controller().account_id(),
        Some(&created.account)
    );
    let profile = created.node.expect_profile_loaded(&created.account).unwrap();
    assert_eq!(profile.to_json(), json!({ "name": "Ada" }));

    let root = root_of(&created.node, &created.account).unwrap();
    assert_eq!(
        created.node.expect_co_value_loaded(&root).unwrap().to_json(),
        json!({ "app": "notes" })
    );
}

#[tokio::test]
async fn new_account_without_migration_has_no_root() {
    let created =
        LocalNode::with_new_account("Ada", crypto(), Vec::new(), None, NodeConfig::default())
            .unwrap();
    assert_eq!(root_of(&created.node, &created.account), None);
}

#[tokio::test]
async fn create_account_on_a_running_node() {
    let node = LocalNode::with_new_agent(crypto(), NodeConfig::default());
    let (account, _secret) = node.create_account("Bea").unwrap();
    assert_eq!(
        node.expect_profile_loaded(&account).unwrap().to_json(),
        json!({ "name": "Bea" })
    );
}

// ── Loaded accounts ──────────────────────────────────────────────

#[tokio::test]
async fn migration_runs_once_across_sessions() {
    let server = LocalNode::with_new_agent(crypto(), NodeConfig::default());
    let runs = Arc::new(AtomicUsize::new(0));

    let created = LocalNode::with_new_account(
        "Ada",
        crypto(),
        vec![server_peer(&server, "first")],
        Some(counting_migration(runs.clone())),
        NodeConfig::default(),
    )
    .unwrap();
    let account = created.account.clone();
    eventually(|| {
        root_of(&server, &account).is_some_and(|root| server.expect_co_value_loaded(&root).is_ok())
    })
    .await;

    let loaded = LocalNode::with_loaded_account(
        &account,
        created.secret.clone(),
        None,
        crypto(),
        vec![server_peer(&server, "second")],
        Some(counting_migration(runs.clone())),
        NodeConfig::default(),
    )
    .await
    .unwrap();

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_ne!(
        loaded.controller().session(),
        created.node.controller().session()
    );
    assert_eq!(
        loaded.expect_profile_loaded(&account).unwrap().to_json(),
        json!({ "name": "Ada" })
    );

    let root = root_of(&loaded, &account).unwrap();
    let content = loaded.load(&root).await.unwrap();
    assert_eq!(content.to_json(), json!({ "app": "notes" }));
}

#[tokio::test]
async fn resumed_session_continues_its_log() {
    let server = LocalNode::with_new_agent(crypto(), NodeConfig::default());
    let created = LocalNode::with_new_account(
        "Ada",
        crypto(),
        vec![server_peer(&server, "first")],
        None,
        NodeConfig::default(),
    )
    .unwrap();
    let session = created.node.controller().session().clone();
    let group = created.node.create_group().unwrap();
    let doc = created.node.create_map(&group).unwrap();
    created
        .node
        .make_transaction(&doc, Privacy::Trusting, vec![Change::set("k", 1)])
        .unwrap();
    eventually(|| {
        server
            .expect_co_value_loaded(&doc)
            .is_ok_and(|c| c.to_json() == json!({ "k": 1 }))
    })
    .await;
    drop(created.node);

    let resumed = LocalNode::with_loaded_account(
        &created.account,
        created.secret.clone(),
        Some(session.clone()),
        crypto(),
        vec![server_peer(&server, "second")],
        None,
        NodeConfig::default(),
    )
    .await
    .unwrap();
    assert_eq!(resumed.controller().session(), &session);

    resumed.load(&doc).await.unwrap();
    resumed
        .make_transaction(&doc, Privacy::Trusting, vec![Change::set("k", 2)])
        .unwrap();
    // Index 0 of the session is taken; the server only sees the new write
    // if the resumed node appended after it.
    eventually(|| {
        server
            .expect_co_value_loaded(&doc)
            .is_ok_and(|c| c.to_json() == json!({ "k": 2 }))
    })
    .await;
}

#[tokio::test]
async fn loading_unknown_account_is_not_loaded() {
    let ghost = LocalNode::with_new_agent(crypto(), NodeConfig::default());
    let (account, secret) = ghost.create_account("Ghost").unwrap();

    let result = LocalNode::with_loaded_account(
        &account,
        secret,
        None,
        crypto(),
        Vec::new(),
        None,
        NodeConfig::default(),
    )
    .await;
    assert!(matches!(result, Err(SyncError::NotLoaded(id)) if id == account));
}

#[tokio::test]
async fn account_agent_resolves_through_peers() {
    let server = LocalNode::with_new_agent(crypto(), NodeConfig::default());
    let created = LocalNode::with_new_account(
        "Ada",
        crypto(),
        vec![server_peer(&server, "ada")],
        None,
        NodeConfig::default(),
    )
    .unwrap();
    let account = created.account.clone();
    eventually(|| server.expect_co_value_loaded(&account).is_ok()).await;

    let bea = LocalNode::with_new_agent(crypto(), NodeConfig::default());
    bea.add_peer(server_peer(&server, "bea"));
    let member = coweave_core::MemberId::Account(account);
    let agent = bea.resolve_account_agent(&member).await.unwrap();
    assert_eq!(agent, created.node.controller().agent_id());
}
