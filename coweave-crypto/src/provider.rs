//! Abstract crypto interface used by the CoValue core.
//!
//! The core depends on `Arc<dyn CryptoProvider>` and never touches the
//! primitives directly. `StandardCrypto` is the production implementation;
//! alternative providers only need to agree on the textual encodings.

use coweave_types::KeyId;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::agent::{AgentId, AgentSecret};
use crate::cipher::{self, Encrypted};
use crate::error::CryptoResult;
use crate::key::{KeySecret, ReadKey, Seed};
use crate::nonce::NonceMaterial;
use crate::seal::{self, Sealed};
use crate::signing::{self, Signature};
use crate::wrap;

/// Bytes of SHA-256 kept by [`CryptoProvider::short_hash`].
const SHORT_HASH_BYTES: usize = 16;

/// Every cryptographic operation the core performs.
pub trait CryptoProvider: Send + Sync {
    fn new_seed(&self) -> Seed;

    fn agent_secret_from_seed(&self, seed: &Seed) -> AgentSecret;

    fn new_agent_secret(&self) -> AgentSecret {
        self.agent_secret_from_seed(&self.new_seed())
    }

    fn agent_id(&self, secret: &AgentSecret) -> AgentId;

    fn sign(&self, secret: &AgentSecret, message: &[u8]) -> Signature;

    fn verify(&self, agent: &AgentId, message: &[u8], signature: &Signature) -> CryptoResult<()>;

    fn seal(
        &self,
        message: &[u8],
        from: &AgentSecret,
        to: &AgentId,
        nonce: &NonceMaterial,
    ) -> CryptoResult<Sealed>;

    fn unseal(
        &self,
        sealed: &Sealed,
        to: &AgentSecret,
        from: &AgentId,
        nonce: &NonceMaterial,
    ) -> CryptoResult<Vec<u8>>;

    fn new_read_key(&self) -> ReadKey;

    fn encrypt(
        &self,
        key: &KeySecret,
        plaintext: &[u8],
        nonce: &NonceMaterial,
    ) -> CryptoResult<Encrypted>;

    fn decrypt(
        &self,
        key: &KeySecret,
        encrypted: &Encrypted,
        nonce: &NonceMaterial,
    ) -> CryptoResult<Vec<u8>>;

    /// Encrypts `key` under `wrapping` for read-key rotation.
    fn wrap_key(&self, key: &ReadKey, wrapping: &ReadKey) -> CryptoResult<Encrypted>;

    fn unwrap_key(
        &self,
        encrypted: &Encrypted,
        wrapped: &KeyId,
        wrapping: &ReadKey,
    ) -> CryptoResult<KeySecret>;

    /// Hex digest prefix used for CoValue and key ids.
    fn short_hash(&self, bytes: &[u8]) -> String;

    /// Random suffix for a new session id.
    fn new_session_suffix(&self) -> String;
}

/// Ed25519 + X25519/XSalsa20-Poly1305 + ChaCha20-Poly1305 + SHA-256.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardCrypto;

impl CryptoProvider for StandardCrypto {
    fn new_seed(&self) -> Seed {
        Seed::random()
    }

    fn agent_secret_from_seed(&self, seed: &Seed) -> AgentSecret {
        AgentSecret::from_seed(seed)
    }

    fn agent_id(&self, secret: &AgentSecret) -> AgentId {
        secret.id()
    }

    fn sign(&self, secret: &AgentSecret, message: &[u8]) -> Signature {
        signing::sign(secret, message)
    }

    fn verify(&self, agent: &AgentId, message: &[u8], signature: &Signature) -> CryptoResult<()> {
        signing::verify(agent, message, signature)
    }

    fn seal(
        &self,
        message: &[u8],
        from: &AgentSecret,
        to: &AgentId,
        nonce: &NonceMaterial,
    ) -> CryptoResult<Sealed> {
        seal::seal(message, from, to, nonce)
    }

    fn unseal(
        &self,
        sealed: &Sealed,
        to: &AgentSecret,
        from: &AgentId,
        nonce: &NonceMaterial,
    ) -> CryptoResult<Vec<u8>> {
        seal::unseal(sealed, to, from, nonce)
    }

    fn new_read_key(&self) -> ReadKey {
        let secret = KeySecret::random();
        let mut id_bytes = [0u8; SHORT_HASH_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut id_bytes);
        ReadKey {
            id: KeyId::from_hash(&hex::encode(id_bytes)),
            secret,
        }
    }

    fn encrypt(
        &self,
        key: &KeySecret,
        plaintext: &[u8],
        nonce: &NonceMaterial,
    ) -> CryptoResult<Encrypted> {
        cipher::encrypt(key, plaintext, nonce)
    }

    fn decrypt(
        &self,
        key: &KeySecret,
        encrypted: &Encrypted,
        nonce: &NonceMaterial,
    ) -> CryptoResult<Vec<u8>> {
        cipher::decrypt(key, encrypted, nonce)
    }

    fn wrap_key(&self, key: &ReadKey, wrapping: &ReadKey) -> CryptoResult<Encrypted> {
        wrap::wrap_key(key, wrapping)
    }

    fn unwrap_key(
        &self,
        encrypted: &Encrypted,
        wrapped: &KeyId,
        wrapping: &ReadKey,
    ) -> CryptoResult<KeySecret> {
        wrap::unwrap_key(encrypted, wrapped, wrapping)
    }

    fn short_hash(&self, bytes: &[u8]) -> String {
        let digest = Sha256::digest(bytes);
        hex::encode(&digest[..SHORT_HASH_BYTES])
    }

    fn new_session_suffix(&self) -> String {
        let mut bytes = [0u8; 8];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        hex::encode(bytes)
    }
}
