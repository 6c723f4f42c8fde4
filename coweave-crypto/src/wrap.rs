//! Key-for-key wrapping used by read-key rotation.
//!
//! When a group rotates its read key, the previous key is encrypted under
//! the new one and stored as `<old>_for_<new>`. Anyone holding the newest key
//! can therefore walk back through every older key without the group
//! re-sealing history to each member.

use coweave_types::KeyId;
use sha2::{Digest, Sha256};

use crate::cipher::{self, Encrypted, NONCE_SIZE};
use crate::error::{CryptoError, CryptoResult};
use crate::key::{KEY_SIZE, KeySecret, ReadKey};

fn wrap_nonce(wrapped: &KeyId, wrapping: &KeyId) -> [u8; NONCE_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(b"coweave/key-for-key");
    hasher.update(wrapped.as_str().as_bytes());
    hasher.update(b"_for_");
    hasher.update(wrapping.as_str().as_bytes());
    let digest = hasher.finalize();
    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(&digest[..NONCE_SIZE]);
    nonce
}

/// Encrypts `key` so that holders of `wrapping` can recover it.
pub fn wrap_key(key: &ReadKey, wrapping: &ReadKey) -> CryptoResult<Encrypted> {
    cipher::encrypt_with_nonce(
        &wrapping.secret,
        key.secret.as_bytes(),
        &wrap_nonce(&key.id, &wrapping.id),
    )
}

/// Recovers the secret of `wrapped` from its `<wrapped>_for_<wrapping>` entry.
pub fn unwrap_key(
    encrypted: &Encrypted,
    wrapped: &KeyId,
    wrapping: &ReadKey,
) -> CryptoResult<KeySecret> {
    let bytes = cipher::decrypt_with_nonce(
        &wrapping.secret,
        encrypted,
        &wrap_nonce(wrapped, &wrapping.id),
    )?;

    if bytes.len() != KEY_SIZE {
        return Err(CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual: bytes.len(),
        });
    }

    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(&bytes);
    Ok(KeySecret::from_bytes(key))
}
