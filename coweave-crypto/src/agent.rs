//! Agent identities.
//!
//! An agent is a pair of keypairs derived from a single seed:
//! - an Ed25519 signer that authenticates transactions
//! - an X25519 sealer that receives read keys
//!
//! The public half (`AgentId`) is what appears in session ids and group
//! role tables.

use crypto_box::SecretKey as SealerSecret;
use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::encoding::{decode_hex, encode_hex};
use crate::error::{CryptoError, CryptoResult};
use crate::key::{KEY_SIZE, Seed};

const AGENT_PREFIX: &str = "agent_z";
const AGENT_SECRET_PREFIX: &str = "agentSecret_z";
const INVITE_SECRET_PREFIX: &str = "inviteSecret_z";

fn derive(domain: &[u8], seed: &Seed) -> [u8; KEY_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(domain);
    hasher.update(seed.as_bytes());
    hasher.finalize().into()
}

/// Private signer and sealer keys of an agent, zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct AgentSecret {
    signer: [u8; KEY_SIZE],
    sealer: [u8; KEY_SIZE],
}

impl AgentSecret {
    /// Deterministically derives both keypairs from a seed.
    pub fn from_seed(seed: &Seed) -> Self {
        Self {
            signer: derive(b"coweave/agent/signer", seed),
            sealer: derive(b"coweave/agent/sealer", seed),
        }
    }

    /// Public identity of this agent.
    pub fn id(&self) -> AgentId {
        let signer = SigningKey::from_bytes(&self.signer).verifying_key().to_bytes();
        let sealer = *self.sealer_key().public_key().as_bytes();
        AgentId { signer, sealer }
    }

    pub(crate) fn signing_key(&self) -> SigningKey {
        SigningKey::from_bytes(&self.signer)
    }

    pub(crate) fn sealer_key(&self) -> SealerSecret {
        SealerSecret::from(self.sealer)
    }

    pub fn encode(&self) -> String {
        let mut bytes = [0u8; KEY_SIZE * 2];
        bytes[..KEY_SIZE].copy_from_slice(&self.signer);
        bytes[KEY_SIZE..].copy_from_slice(&self.sealer);
        let encoded = encode_hex(AGENT_SECRET_PREFIX, &bytes);
        bytes.zeroize();
        encoded
    }

    pub fn decode(s: &str) -> CryptoResult<Self> {
        let mut bytes = decode_hex::<{ KEY_SIZE * 2 }>(AGENT_SECRET_PREFIX, "agent secret", s)?;
        let mut signer = [0u8; KEY_SIZE];
        let mut sealer = [0u8; KEY_SIZE];
        signer.copy_from_slice(&bytes[..KEY_SIZE]);
        sealer.copy_from_slice(&bytes[KEY_SIZE..]);
        bytes.zeroize();
        Ok(Self { signer, sealer })
    }
}

impl fmt::Debug for AgentSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentSecret")
            .field("id", &self.id())
            .field("keys", &"[REDACTED]")
            .finish()
    }
}

/// Public signer and sealer keys of an agent, rendered as `agent_z<hex><hex>`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AgentId {
    signer: [u8; KEY_SIZE],
    sealer: [u8; KEY_SIZE],
}

impl AgentId {
    pub fn parse(s: &str) -> CryptoResult<Self> {
        let bytes = decode_hex::<{ KEY_SIZE * 2 }>(AGENT_PREFIX, "agent id", s)?;
        let mut signer = [0u8; KEY_SIZE];
        let mut sealer = [0u8; KEY_SIZE];
        signer.copy_from_slice(&bytes[..KEY_SIZE]);
        sealer.copy_from_slice(&bytes[KEY_SIZE..]);
        Ok(Self { signer, sealer })
    }

    pub fn is_agent_id(s: &str) -> bool {
        s.starts_with(AGENT_PREFIX)
    }

    pub fn signer_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.signer
    }

    pub fn sealer_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.sealer
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{AGENT_PREFIX}{}{}",
            hex::encode(self.signer),
            hex::encode(self.sealer)
        )
    }
}

impl fmt::Debug for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AgentId({self})")
    }
}

impl FromStr for AgentId {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for AgentId {
    type Error = CryptoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<AgentId> for String {
    fn from(id: AgentId) -> Self {
        id.to_string()
    }
}

/// Shareable invite token: the seed of a throwaway invite agent.
#[derive(Clone, PartialEq, Eq)]
pub struct InviteSecret(Seed);

impl InviteSecret {
    pub fn new(seed: Seed) -> Self {
        Self(seed)
    }

    pub fn seed(&self) -> &Seed {
        &self.0
    }

    pub fn parse(s: &str) -> CryptoResult<Self> {
        decode_hex::<KEY_SIZE>(INVITE_SECRET_PREFIX, "invite secret", s)
            .map(|bytes| Self(Seed::from_bytes(bytes)))
    }
}

impl fmt::Display for InviteSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode_hex(INVITE_SECRET_PREFIX, self.0.as_bytes()))
    }
}

impl fmt::Debug for InviteSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("InviteSecret([REDACTED])")
    }
}

impl FromStr for InviteSecret {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
