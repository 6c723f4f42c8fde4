//! Read-key encryption using ChaCha20-Poly1305.
//!
//! Provides authenticated encryption for private transaction payloads. The
//! nonce is derived from the transaction's `NonceMaterial`, so ciphertext
//! carries no nonce of its own.

use chacha20poly1305::{
    ChaCha20Poly1305, Nonce,
    aead::{Aead, KeyInit},
};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::encoding::{decode_b64, encode_b64};
use crate::error::{CryptoError, CryptoResult};
use crate::key::KeySecret;
use crate::nonce::NonceMaterial;

/// Size of nonce in bytes (96 bits for ChaCha20-Poly1305).
pub const NONCE_SIZE: usize = 12;

/// Size of authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

const ENCRYPTED_PREFIX: &str = "encrypted_z";

/// Ciphertext including the auth tag, rendered as `encrypted_z<base64>`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Encrypted(Vec<u8>);

impl Encrypted {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn parse(s: &str) -> CryptoResult<Self> {
        let bytes = decode_b64(ENCRYPTED_PREFIX, "encrypted", s)?;
        if bytes.len() < TAG_SIZE {
            return Err(CryptoError::Decryption("data too short".to_string()));
        }
        Ok(Self(bytes))
    }
}

impl fmt::Display for Encrypted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode_b64(ENCRYPTED_PREFIX, &self.0))
    }
}

impl fmt::Debug for Encrypted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Encrypted({} bytes)", self.0.len())
    }
}

impl TryFrom<String> for Encrypted {
    type Error = CryptoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Encrypted> for String {
    fn from(encrypted: Encrypted) -> Self {
        encrypted.to_string()
    }
}

pub(crate) fn encrypt_with_nonce(
    key: &KeySecret,
    plaintext: &[u8],
    nonce: &[u8; NONCE_SIZE],
) -> CryptoResult<Encrypted> {
    let cipher = ChaCha20Poly1305::new(key.as_bytes().into());
    cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map(Encrypted)
        .map_err(|e| CryptoError::Encryption(e.to_string()))
}

pub(crate) fn decrypt_with_nonce(
    key: &KeySecret,
    encrypted: &Encrypted,
    nonce: &[u8; NONCE_SIZE],
) -> CryptoResult<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(key.as_bytes().into());
    cipher
        .decrypt(Nonce::from_slice(nonce), encrypted.0.as_slice())
        .map_err(|_| {
            CryptoError::Decryption("decryption failed (wrong key or tampered data)".to_string())
        })
}

/// Encrypts plaintext under a read key.
pub fn encrypt(
    key: &KeySecret,
    plaintext: &[u8],
    nonce: &NonceMaterial,
) -> CryptoResult<Encrypted> {
    encrypt_with_nonce(key, plaintext, &nonce.derive::<NONCE_SIZE>()?)
}

/// Decrypts ciphertext produced by [`encrypt`] with the same key and nonce material.
pub fn decrypt(
    key: &KeySecret,
    encrypted: &Encrypted,
    nonce: &NonceMaterial,
) -> CryptoResult<Vec<u8>> {
    decrypt_with_nonce(key, encrypted, &nonce.derive::<NONCE_SIZE>()?)
}
