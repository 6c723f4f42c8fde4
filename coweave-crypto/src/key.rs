//! Symmetric read keys and random seeds.

use coweave_types::KeyId;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::encoding::{decode_hex, encode_hex};
use crate::error::CryptoResult;

/// Size of symmetric keys and seeds in bytes (256 bits).
pub const KEY_SIZE: usize = 32;

const KEY_SECRET_PREFIX: &str = "keySecret_z";

/// Secret bytes of a read key, zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct KeySecret {
    bytes: [u8; KEY_SIZE],
}

impl KeySecret {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn random() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// Textual form stored (encrypted or sealed) inside group content.
    pub fn encode(&self) -> String {
        encode_hex(KEY_SECRET_PREFIX, &self.bytes)
    }

    pub fn decode(s: &str) -> CryptoResult<Self> {
        decode_hex::<KEY_SIZE>(KEY_SECRET_PREFIX, "key secret", s).map(Self::from_bytes)
    }
}

impl std::fmt::Debug for KeySecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySecret")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// A read key: its public id plus the secret used to encrypt private transactions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadKey {
    pub id: KeyId,
    pub secret: KeySecret,
}

/// Random 32-byte seed from which agent secrets are derived.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Seed {
    bytes: [u8; KEY_SIZE],
}

impl Seed {
    pub fn random() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for Seed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Seed").field("bytes", &"[REDACTED]").finish()
    }
}
