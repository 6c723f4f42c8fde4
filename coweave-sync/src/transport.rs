//! Peer transport.
//!
//! A [`Peer`] is a pair of ordered message channels plus the role the remote
//! side plays for us. Any backend that can feed a `tokio::sync::mpsc`
//! channel can be turned into a peer; [`connected_peers`] wires two nodes in
//! the same process.

use coweave_types::PeerId;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{SyncError, SyncResult};
use crate::protocol::SyncMessage;

/// What the remote side is to us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerRole {
    /// Receives everything we have, whether it asked or not.
    Server,
    /// Only gets values it asked for.
    Client,
    /// Symmetric: we announce our values to it on connect.
    Peer,
}

impl PeerRole {
    /// Whether we announce our known state to this peer when it connects.
    pub fn announces(self) -> bool {
        matches!(self, Self::Server | Self::Peer)
    }
}

/// Sending half of a peer connection.
#[derive(Debug, Clone)]
pub struct PeerSender {
    tx: mpsc::Sender<SyncMessage>,
    trace: Option<String>,
}

impl PeerSender {
    pub fn new(tx: mpsc::Sender<SyncMessage>) -> Self {
        Self { tx, trace: None }
    }

    /// A sender that logs every message under `label` before sending it.
    pub fn traced(tx: mpsc::Sender<SyncMessage>, label: impl Into<String>) -> Self {
        Self {
            tx,
            trace: Some(label.into()),
        }
    }

    /// Sends one message, waiting until the receiver has room for it.
    pub async fn send(&self, message: SyncMessage) -> SyncResult<()> {
        if let Some(label) = &self.trace {
            debug!(peer = %label, message = %message.trace_json(), "sync message");
        }
        self.tx
            .send(message)
            .await
            .map_err(|_| SyncError::ChannelClosed)
    }
}

/// One connection to a remote node.
#[derive(Debug)]
pub struct Peer {
    pub id: PeerId,
    pub role: PeerRole,
    pub incoming: mpsc::Receiver<SyncMessage>,
    pub outgoing: PeerSender,
}

impl Peer {
    pub fn new(
        id: PeerId,
        role: PeerRole,
        incoming: mpsc::Receiver<SyncMessage>,
        outgoing: PeerSender,
    ) -> Self {
        Self {
            id,
            role,
            incoming,
            outgoing,
        }
    }
}

/// Options for [`connected_peers`].
#[derive(Debug, Clone, Copy)]
pub struct ConnectOptions {
    /// Log every message crossing the connection.
    pub trace: bool,
    /// Role of side `a` as seen by side `b`.
    pub role_a: PeerRole,
    /// Role of side `b` as seen by side `a`.
    pub role_b: PeerRole,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            trace: false,
            role_a: PeerRole::Peer,
            role_b: PeerRole::Peer,
        }
    }
}

/// Two in-process peers connected to each other.
///
/// Returns `(a, b)` where `a` represents side `a` and is meant to be added
/// to node `b`'s sync manager, and vice versa. The channels have capacity
/// one and deliver in order.
pub fn connected_peers(a: PeerId, b: PeerId, options: ConnectOptions) -> (Peer, Peer) {
    let (a_to_b_tx, a_to_b_rx) = mpsc::channel(1);
    let (b_to_a_tx, b_to_a_rx) = mpsc::channel(1);

    let sender = |tx: mpsc::Sender<SyncMessage>, from: &PeerId, to: &PeerId| {
        if options.trace {
            PeerSender::traced(tx, format!("{from} -> {to}"))
        } else {
            PeerSender::new(tx)
        }
    };

    // Node b holds peer `a`: it reads what a sends and writes towards a.
    let a_as_peer = Peer::new(
        a.clone(),
        options.role_a,
        a_to_b_rx,
        sender(b_to_a_tx, &b, &a),
    );
    let b_as_peer = Peer::new(
        b.clone(),
        options.role_b,
        b_to_a_rx,
        sender(a_to_b_tx, &a, &b),
    );
    (a_as_peer, b_as_peer)
}
