//! Local node and peer sync for coweave.
//!
//! A [`LocalNode`] owns a table of CoValues for one controlling identity and
//! a [`SyncManager`] that exchanges their transactions with peers.
//!
//! # Architecture
//!
//! Sync is state based: peers tell each other how many transactions they
//! have per session and send what the other side lacks. Because content is
//! a pure function of the set of valid transactions, messages may be
//! duplicated, reordered or arrive out of dependency order and replicas
//! still converge.
//!
//! ## Components
//!
//! - **Protocol**: the `load`, `known` and `content` messages
//! - **State**: what each peer is known to have
//! - **Transport**: ordered message channels to one peer
//! - **Manager**: per-peer tasks and message handling
//! - **Node**: loading, subscriptions, invites, accounts and copies
//!
//! # Example
//!
//! ```
//! use coweave_core::{Change, Privacy};
//! use coweave_crypto::StandardCrypto;
//! use coweave_sync::{LocalNode, NodeConfig};
//! use std::sync::Arc;
//!
//! # fn main() -> coweave_sync::SyncResult<()> {
//! let node = LocalNode::with_new_agent(Arc::new(StandardCrypto), NodeConfig::default());
//! let group = node.create_group()?;
//! let doc = node.create_map(&group)?;
//! node.make_transaction(&doc, Privacy::Private, vec![Change::set("title", "a")])?;
//! # Ok(())
//! # }
//! ```

mod error;
pub mod manager;
pub mod node;
pub mod protocol;
pub mod state;
pub mod transport;

pub use error::{SyncError, SyncResult};
pub use manager::SyncManager;
pub use node::{LocalNode, Migration, NewAccount, NodeConfig, NodeSubscription, ProgressCallback};
pub use protocol::{KnownStateMessage, SyncMessage, TRACE_TRUNCATE};
pub use state::{KnownState, PeerSyncState, SyncState};
pub use transport::{ConnectOptions, Peer, PeerRole, PeerSender, connected_peers};
