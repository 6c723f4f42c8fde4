//! Sealing: authenticated public-key encryption from one agent to another.
//!
//! Used to hand a read key to a specific member. The box nonce is derived
//! from the transaction that carries the sealed value, so a sealed blob
//! copied into a different transaction no longer opens.

use crypto_box::aead::Aead;
use crypto_box::aead::generic_array::GenericArray;
use crypto_box::{PublicKey, SalsaBox};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::agent::{AgentId, AgentSecret};
use crate::encoding::{decode_b64, encode_b64};
use crate::error::{CryptoError, CryptoResult};
use crate::nonce::NonceMaterial;

const SEALED_PREFIX: &str = "sealed_z";

/// Size of the XSalsa20 box nonce.
pub const BOX_NONCE_SIZE: usize = 24;

/// Sealed bytes, rendered as `sealed_z<base64>`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sealed(Vec<u8>);

impl Sealed {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn parse(s: &str) -> CryptoResult<Self> {
        decode_b64(SEALED_PREFIX, "sealed", s).map(Self)
    }
}

impl fmt::Display for Sealed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode_b64(SEALED_PREFIX, &self.0))
    }
}

impl fmt::Debug for Sealed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sealed({} bytes)", self.0.len())
    }
}

impl TryFrom<String> for Sealed {
    type Error = CryptoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Sealed> for String {
    fn from(sealed: Sealed) -> Self {
        sealed.to_string()
    }
}

fn salsa_box(own: &AgentSecret, other: &AgentId) -> SalsaBox {
    let public = PublicKey::from(*other.sealer_bytes());
    SalsaBox::new(&public, &own.sealer_key())
}

/// Seals `message` from `from` to `to`.
pub fn seal(
    message: &[u8],
    from: &AgentSecret,
    to: &AgentId,
    nonce: &NonceMaterial,
) -> CryptoResult<Sealed> {
    let nonce = nonce.derive::<BOX_NONCE_SIZE>()?;
    salsa_box(from, to)
        .encrypt(GenericArray::from_slice(&nonce), message)
        .map(Sealed)
        .map_err(|e| CryptoError::Sealing(e.to_string()))
}

/// Opens a sealed message addressed to `to` and sent by `from`.
pub fn unseal(
    sealed: &Sealed,
    to: &AgentSecret,
    from: &AgentId,
    nonce: &NonceMaterial,
) -> CryptoResult<Vec<u8>> {
    let nonce = nonce.derive::<BOX_NONCE_SIZE>()?;
    salsa_box(to, from)
        .decrypt(GenericArray::from_slice(&nonce), sealed.0.as_slice())
        .map_err(|_| CryptoError::Unsealing)
}
