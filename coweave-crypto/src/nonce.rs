//! Deterministic nonce derivation.

use coweave_types::{RawCoId, TransactionId, canonical_json};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::CryptoResult;

/// Context a nonce is derived from: the CoValue and the transaction that
/// carries the ciphertext.
///
/// Every transaction id is unique within a CoValue, so nonces never repeat
/// for a given key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NonceMaterial {
    #[serde(rename = "in")]
    pub in_id: RawCoId,
    pub tx: TransactionId,
}

impl NonceMaterial {
    pub fn new(in_id: RawCoId, tx: TransactionId) -> Self {
        Self { in_id, tx }
    }

    pub(crate) fn derive<const N: usize>(&self) -> CryptoResult<[u8; N]> {
        let digest = Sha256::digest(canonical_json(self)?);
        let mut nonce = [0u8; N];
        nonce.copy_from_slice(&digest[..N]);
        Ok(nonce)
    }
}
