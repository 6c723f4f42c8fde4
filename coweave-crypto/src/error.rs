//! Error types for the crypto layer.

use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur in cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Signature did not verify against the claimed agent.
    #[error("invalid signature")]
    InvalidSignature,

    /// Public key bytes do not describe a valid curve point.
    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("sealing failed: {0}")]
    Sealing(String),

    /// Unsealing failed (wrong recipient, wrong sender or wrong nonce material).
    #[error("unsealing failed")]
    Unsealing,

    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Decryption failed (wrong key or tampered data).
    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    /// A textual encoding had the wrong prefix or was not valid hex/base64.
    #[error("invalid {kind} encoding")]
    InvalidEncoding { kind: &'static str },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("canonical encoding failed: {0}")]
    Canonical(#[from] coweave_types::Error),
}
