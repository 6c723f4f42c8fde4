//! Cryptography for coweave.
//!
//! Everything the CoValue core needs, behind the [`CryptoProvider`] trait:
//! - Agents: Ed25519 signer + X25519 sealer derived from one seed
//! - Transaction signatures
//! - Sealing read keys to individual agents
//! - Read-key encryption of private transactions (ChaCha20-Poly1305)
//! - Key-for-key wrapping for read-key rotation
//!
//! All secrets zeroize on drop and redact themselves in `Debug` output.

mod agent;
mod cipher;
mod encoding;
mod error;
mod key;
mod nonce;
mod provider;
mod seal;
mod signing;
mod wrap;

pub use agent::{AgentId, AgentSecret, InviteSecret};
pub use cipher::{Encrypted, NONCE_SIZE, TAG_SIZE, decrypt, encrypt};
pub use error::{CryptoError, CryptoResult};
pub use key::{KEY_SIZE, KeySecret, ReadKey, Seed};
pub use nonce::NonceMaterial;
pub use provider::{CryptoProvider, StandardCrypto};
pub use seal::{Sealed, seal, unseal};
pub use signing::{Signature, sign, verify};
pub use wrap::{unwrap_key, wrap_key};
