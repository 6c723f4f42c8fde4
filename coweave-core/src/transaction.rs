//! Signed transactions and their change payloads.

use coweave_crdt::OpId;
use coweave_crypto::{
    AgentId, AgentSecret, CryptoError, CryptoProvider, Encrypted, KeySecret, NonceMaterial,
    ReadKey, Signature,
};
use coweave_types::{HybridTimestamp, JsonValue, KeyId, RawCoId, TransactionId, canonical_json};
use serde::{Deserialize, Serialize};

use crate::error::CoreResult;

/// Whether a transaction's changes are stored in plaintext.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Privacy {
    Trusting,
    Private,
}

/// One element of a transaction payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Change {
    /// Map, group and account entries.
    Set { key: String, value: JsonValue },
    Delete { key: String },
    /// List insertion after `after`, or at the head when `None`.
    Append {
        after: Option<OpId>,
        value: JsonValue,
    },
    Remove { target: OpId },
    /// Stream item.
    Push { item: JsonValue },
}

impl Change {
    pub fn set(key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        Self::Set {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Self::Delete { key: key.into() }
    }

    pub fn append(after: Option<OpId>, value: impl Into<JsonValue>) -> Self {
        Self::Append {
            after,
            value: value.into(),
        }
    }

    pub fn remove(target: OpId) -> Self {
        Self::Remove { target }
    }

    pub fn push(item: impl Into<JsonValue>) -> Self {
        Self::Push { item: item.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "privacy", rename_all = "camelCase")]
pub enum Payload {
    Trusting {
        changes: Vec<Change>,
    },
    Private {
        #[serde(rename = "keyUsed")]
        key_used: KeyId,
        #[serde(rename = "encryptedChanges")]
        encrypted_changes: Encrypted,
    },
}

impl Payload {
    /// Encrypts `changes` under `key`, bound to the transaction's position.
    pub fn private(
        crypto: &dyn CryptoProvider,
        key: &ReadKey,
        nonce: &NonceMaterial,
        changes: &[Change],
    ) -> CoreResult<Self> {
        let plaintext = serde_json::to_vec(changes)?;
        Ok(Self::Private {
            key_used: key.id.clone(),
            encrypted_changes: crypto.encrypt(&key.secret, &plaintext, nonce)?,
        })
    }
}

/// Bytes covered by a transaction signature.
#[derive(Serialize)]
struct SignedFields<'a> {
    #[serde(rename = "in")]
    in_id: &'a RawCoId,
    tx: &'a TransactionId,
    #[serde(rename = "madeAt")]
    made_at: &'a HybridTimestamp,
    payload: &'a Payload,
}

/// A signed, immutable entry in a session log.
///
/// The transaction's index is implied by its position in the session, so
/// the signature binds it via the [`TransactionId`] rather than storing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(rename = "madeAt")]
    pub made_at: HybridTimestamp,
    #[serde(flatten)]
    pub payload: Payload,
    pub signature: Signature,
}

impl Transaction {
    /// Signs `payload` as transaction `tx` of CoValue `in_id`.
    pub fn sign(
        crypto: &dyn CryptoProvider,
        signer: &AgentSecret,
        in_id: &RawCoId,
        tx: &TransactionId,
        made_at: HybridTimestamp,
        payload: Payload,
    ) -> CoreResult<Self> {
        let bytes = signing_bytes(in_id, tx, &made_at, &payload)?;
        let signature = crypto.sign(signer, &bytes);
        Ok(Self {
            made_at,
            payload,
            signature,
        })
    }

    /// Succeeds if any of `agents` produced the signature.
    pub fn verify(
        &self,
        crypto: &dyn CryptoProvider,
        in_id: &RawCoId,
        tx: &TransactionId,
        agents: &[AgentId],
    ) -> CoreResult<()> {
        let bytes = signing_bytes(in_id, tx, &self.made_at, &self.payload)?;
        if agents
            .iter()
            .any(|agent| crypto.verify(agent, &bytes, &self.signature).is_ok())
        {
            Ok(())
        } else {
            Err(CryptoError::InvalidSignature.into())
        }
    }

    pub fn privacy(&self) -> Privacy {
        match self.payload {
            Payload::Trusting { .. } => Privacy::Trusting,
            Payload::Private { .. } => Privacy::Private,
        }
    }

    pub fn key_used(&self) -> Option<&KeyId> {
        match &self.payload {
            Payload::Private { key_used, .. } => Some(key_used),
            Payload::Trusting { .. } => None,
        }
    }

    /// Plaintext changes of a trusting transaction.
    pub fn trusting_changes(&self) -> Option<&[Change]> {
        match &self.payload {
            Payload::Trusting { changes } => Some(changes),
            Payload::Private { .. } => None,
        }
    }

    /// Decrypts the changes of a private transaction.
    pub fn decrypt_changes(
        &self,
        crypto: &dyn CryptoProvider,
        key: &KeySecret,
        nonce: &NonceMaterial,
    ) -> CoreResult<Vec<Change>> {
        match &self.payload {
            Payload::Trusting { changes } => Ok(changes.clone()),
            Payload::Private {
                encrypted_changes, ..
            } => {
                let plaintext = crypto.decrypt(key, encrypted_changes, nonce)?;
                Ok(serde_json::from_slice(&plaintext)?)
            }
        }
    }
}

fn signing_bytes(
    in_id: &RawCoId,
    tx: &TransactionId,
    made_at: &HybridTimestamp,
    payload: &Payload,
) -> CoreResult<Vec<u8>> {
    Ok(canonical_json(&SignedFields {
        in_id,
        tx,
        made_at,
        payload,
    })?)
}
