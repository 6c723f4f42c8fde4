use coweave_sync::protocol::{KnownStateMessage, SyncMessage};
use coweave_sync::transport::{ConnectOptions, PeerRole, PeerSender, connected_peers};
use coweave_sync::SyncError;
use coweave_types::{PeerId, RawCoId};
use std::time::Duration;
use tokio::sync::mpsc;

fn known(n: usize) -> SyncMessage {
    SyncMessage::Known(KnownStateMessage::missing(RawCoId::from_hash(&format!("{n}"))))
}

// ── PeerRole ─────────────────────────────────────────────────────

#[test]
fn servers_and_peers_get_announcements() {
    assert!(PeerRole::Server.announces());
    assert!(PeerRole::Peer.announces());
    assert!(!PeerRole::Client.announces());
}

#[test]
fn connect_options_default_to_symmetric_peers() {
    let options = ConnectOptions::default();
    assert!(!options.trace);
    assert_eq!(options.role_a, PeerRole::Peer);
    assert_eq!(options.role_b, PeerRole::Peer);
}

// ── connected_peers ──────────────────────────────────────────────

#[tokio::test]
async fn peers_carry_ids_and_roles() {
    let (a, b) = connected_peers(
        PeerId::named("a"),
        PeerId::named("b"),
        ConnectOptions {
            trace: false,
            role_a: PeerRole::Client,
            role_b: PeerRole::Server,
        },
    );
    assert_eq!(a.id, PeerId::named("a"));
    assert_eq!(a.role, PeerRole::Client);
    assert_eq!(b.id, PeerId::named("b"));
    assert_eq!(b.role, PeerRole::Server);
}

#[tokio::test]
async fn messages_cross_in_both_directions() {
    let (mut a, mut b) = connected_peers(
        PeerId::named("a"),
        PeerId::named("b"),
        ConnectOptions::default(),
    );

    // `b` is held by node a: writing to it reaches whoever holds `a`.
    b.outgoing.send(known(1)).await.unwrap();
    assert_eq!(a.incoming.recv().await, Some(known(1)));

    a.outgoing.send(known(2)).await.unwrap();
    assert_eq!(b.incoming.recv().await, Some(known(2)));
}

#[tokio::test]
async fn delivery_is_ordered() {
    let (mut a, b) = connected_peers(
        PeerId::named("a"),
        PeerId::named("b"),
        ConnectOptions::default(),
    );

    let writer = tokio::spawn(async move {
        for n in 0..10 {
            b.outgoing.send(known(n)).await.unwrap();
        }
    });
    for n in 0..10 {
        assert_eq!(a.incoming.recv().await, Some(known(n)));
    }
    writer.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn writes_wait_for_the_reader() {
    let (mut a, b) = connected_peers(
        PeerId::named("a"),
        PeerId::named("b"),
        ConnectOptions::default(),
    );

    b.outgoing.send(known(1)).await.unwrap();
    let blocked = tokio::time::timeout(Duration::from_millis(50), b.outgoing.send(known(2))).await;
    assert!(blocked.is_err(), "second write completed before the first was read");

    assert_eq!(a.incoming.recv().await, Some(known(1)));
    b.outgoing.send(known(2)).await.unwrap();
    assert_eq!(a.incoming.recv().await, Some(known(2)));
}

#[tokio::test]
async fn traced_connection_still_delivers() {
    let (mut a, b) = connected_peers(
        PeerId::named("a"),
        PeerId::named("b"),
        ConnectOptions {
            trace: true,
            ..ConnectOptions::default()
        },
    );
    b.outgoing.send(known(7)).await.unwrap();
    assert_eq!(a.incoming.recv().await, Some(known(7)));
}

// ── PeerSender ───────────────────────────────────────────────────

#[tokio::test]
async fn sending_to_a_dropped_receiver_fails() {
    let (tx, rx) = mpsc::channel(1);
    drop(rx);
    let sender = PeerSender::new(tx);
    assert!(matches!(
        sender.send(known(1)).await,
        Err(SyncError::ChannelClosed)
    ));
}
