//! Materialized views of CoValue content, one variant per header shape.

mod account;
mod group;
mod list;
mod map;
mod stream;

pub use account::{Account, PROFILE, ROOT};
pub use group::{Group, READ_KEY, key_for};
pub use list::CoList;
pub use map::CoMap;
pub use stream::{CoStream, StreamItem};

use std::collections::HashMap;

use coweave_crdt::{OpId, OpStamp};
use coweave_crypto::{KeySecret, NonceMaterial};
use coweave_types::{JsonValue, KeyId, RawCoId};
use tracing::{debug, warn};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::header::{CoValueHeader, CoValueType, Ruleset};
use crate::permissions::Validity;
use crate::resolver::CoValueResolver;
use crate::transaction::{Change, Payload};

#[derive(Debug, Clone)]
pub enum CoValueContent {
    Map(CoMap),
    List(CoList),
    Stream(CoStream),
    Group(Group),
    Account(Account),
}

impl CoValueContent {
    pub fn id(&self) -> &RawCoId {
        match self {
            Self::Map(map) => map.id(),
            Self::List(list) => list.id(),
            Self::Stream(stream) => stream.id(),
            Self::Group(group) => group.id(),
            Self::Account(account) => account.id(),
        }
    }

    pub fn as_map(&self) -> Option<&CoMap> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&CoList> {
        match self {
            Self::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_stream(&self) -> Option<&CoStream> {
        match self {
            Self::Stream(stream) => Some(stream),
            _ => None,
        }
    }

    /// Groups and accounts alike.
    pub fn as_group(&self) -> Option<&Group> {
        match self {
            Self::Group(group) => Some(group),
            Self::Account(account) => Some(account.group()),
            _ => None,
        }
    }

    pub fn as_account(&self) -> Option<&Account> {
        match self {
            Self::Account(account) => Some(account),
            _ => None,
        }
    }

    /// Plain JSON rendering of the visible content.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Map(map) => map.to_json(),
            Self::List(list) => list.to_json(),
            Self::Stream(stream) => stream.to_json(),
            Self::Group(group) => group.map().to_json(),
            Self::Account(account) => account.group().map().to_json(),
        }
    }
}

/// Shape-specific fold target.
enum Folder {
    Map(CoMap),
    List(CoList),
    Stream(CoStream),
}

impl Folder {
    fn apply(&mut self, stamp: OpStamp, change: &Change) -> bool {
        match self {
            Self::Map(map) => map.apply(stamp, change),
            Self::List(list) => list.apply(stamp, change),
            Self::Stream(stream) => stream.apply(stamp, change),
        }
    }
}

/// Folds the valid transactions of a CoValue into its content.
///
/// `validity.valid` is already in fold order, so every register and list
/// sees its writes in the same order on every replica.
pub(crate) fn materialize(
    id: &RawCoId,
    header: &CoValueHeader,
    validity: &Validity<'_>,
    resolver: &dyn CoValueResolver,
) -> CoreResult<CoValueContent> {
    let mut folder = match header.kind {
        CoValueType::Map => Folder::Map(CoMap::new(id.clone())),
        CoValueType::List => Folder::List(CoList::new(id.clone())),
        CoValueType::Stream => Folder::Stream(CoStream::new(id.clone())),
    };
    let mut keys = KeyCache::default();

    for valid in &validity.valid {
        let tx_id = valid.id();
        let changes = match &valid.tx.payload {
            Payload::Trusting { changes } => changes.clone(),
            Payload::Private { key_used, .. } => {
                let Some(secret) = keys.get(id, header, key_used, resolver) else {
                    continue;
                };
                let nonce = NonceMaterial::new(id.clone(), tx_id.clone());
                match valid.tx.decrypt_changes(resolver.crypto(), secret, &nonce) {
                    Ok(changes) => changes,
                    Err(e) => {
                        warn!(covalue = %id, tx = %tx_id, error = %e, "skipping undecryptable transaction");
                        continue;
                    }
                }
            }
        };

        for (index, change) in changes.iter().enumerate() {
            let stamp = OpStamp::new(
                valid.made_at(),
                OpId::new(tx_id.session.clone(), tx_id.index, index as u32),
            );
            if !folder.apply(stamp, change) {
                debug!(covalue = %id, tx = %tx_id, "ignoring change of the wrong shape");
            }
        }
    }

    Ok(match (folder, &header.ruleset) {
        (Folder::Map(map), Ruleset::Group { .. }) if header.is_account() => {
            CoValueContent::Account(Account::new(Group::new(map, true)))
        }
        (Folder::Map(map), Ruleset::Group { .. }) => CoValueContent::Group(Group::new(map, false)),
        (Folder::Map(map), _) => CoValueContent::Map(map),
        (Folder::List(list), _) => CoValueContent::List(list),
        (Folder::Stream(stream), _) => CoValueContent::Stream(stream),
    })
}

/// Read keys resolved during one materialization. `None` records a key the
/// controller cannot obtain, so the failure is logged once.
#[derive(Default)]
struct KeyCache {
    keys: HashMap<KeyId, Option<KeySecret>>,
}

impl KeyCache {
    fn get(
        &mut self,
        id: &RawCoId,
        header: &CoValueHeader,
        key: &KeyId,
        resolver: &dyn CoValueResolver,
    ) -> Option<&KeySecret> {
        self.keys
            .entry(key.clone())
            .or_insert_with(|| match lookup_read_key(id, header, key, resolver) {
                Ok(secret) => Some(secret),
                Err(e) => {
                    warn!(covalue = %id, %key, error = %e, "read key unavailable; private transactions hidden");
                    None
                }
            })
            .as_ref()
    }
}

fn lookup_read_key(
    id: &RawCoId,
    header: &CoValueHeader,
    key: &KeyId,
    resolver: &dyn CoValueResolver,
) -> CoreResult<KeySecret> {
    let group_id = header
        .owner_group()
        .ok_or_else(|| ValidationError::PrivateNotAllowed(id.clone()))?;
    let core = resolver
        .core(group_id)
        .ok_or_else(|| CoreError::NotLoaded(group_id.clone()))?;
    let content = core.content(resolver)?;
    let group = content
        .as_group()
        .ok_or_else(|| CoreError::NotAGroup(group_id.clone()))?;
    group.get_read_key(key, resolver)
}
