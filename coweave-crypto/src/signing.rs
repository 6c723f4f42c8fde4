//! Ed25519 signing and verification of transactions.

use ed25519_dalek::{Signature as DalekSignature, Signer as _, Verifier as _, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::agent::{AgentId, AgentSecret};
use crate::encoding::{decode_hex, encode_hex};
use crate::error::{CryptoError, CryptoResult};

const SIGNATURE_PREFIX: &str = "sig_z";

/// Ed25519 signature, rendered as `sig_z<hex>`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Signature([u8; 64]);

impl Signature {
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    pub fn to_bytes(&self) -> [u8; 64] {
        self.0
    }

    pub fn parse(s: &str) -> CryptoResult<Self> {
        decode_hex::<64>(SIGNATURE_PREFIX, "signature", s).map(Self)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode_hex(SIGNATURE_PREFIX, &self.0))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({self})")
    }
}

impl TryFrom<String> for Signature {
    type Error = CryptoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Signature> for String {
    fn from(sig: Signature) -> Self {
        sig.to_string()
    }
}

/// Signs a message with the agent's signer key.
pub fn sign(secret: &AgentSecret, message: &[u8]) -> Signature {
    Signature(secret.signing_key().sign(message).to_bytes())
}

/// Verifies a signature against the agent's public signer key.
pub fn verify(agent: &AgentId, message: &[u8], signature: &Signature) -> CryptoResult<()> {
    let key = VerifyingKey::from_bytes(agent.signer_bytes())
        .map_err(|_| CryptoError::InvalidPublicKey)?;
    key.verify(message, &DalekSignature::from_bytes(&signature.0))
        .map_err(|_| CryptoError::InvalidSignature)
}
