//! Which transactions of a CoValue count towards its content.
//!
//! The same function decides validity when a transaction is appended and
//! when content is materialized, so a replica never shows content it would
//! have refused to store.

use std::collections::{BTreeMap, HashMap};

use coweave_crypto::{AgentId, CryptoProvider};
use coweave_types::{HybridTimestamp, JsonValue, RawCoId, SessionId, TransactionId};
use tracing::debug;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::header::{CoValueHeader, Ruleset};
use crate::member::MemberId;
use crate::resolver::CoValueResolver;
use crate::role::Role;
use crate::transaction::{Change, Transaction};

/// Group keys only an admin may set.
const ADMIN_KEYS: [&str; 3] = ["readKey", "profile", "root"];

/// A transaction that passed the ruleset, with its position in the fold.
#[derive(Debug, Clone, Copy)]
pub struct ValidTransaction<'a> {
    pub session: &'a SessionId,
    pub index: u32,
    pub tx: &'a Transaction,
}

impl ValidTransaction<'_> {
    pub fn id(&self) -> TransactionId {
        TransactionId::new(self.session.clone(), self.index)
    }

    pub fn made_at(&self) -> HybridTimestamp {
        self.tx.made_at
    }
}

/// Outcome of applying a ruleset to a transaction set.
#[derive(Debug, Default)]
pub struct Validity<'a> {
    /// Accepted transactions in fold order.
    pub valid: Vec<ValidTransaction<'a>>,
    pub rejected: Vec<(TransactionId, String)>,
}

/// Applies `header`'s ruleset to every transaction in `sessions`.
///
/// Errors only when the verdict cannot be reached at all, e.g. the governing
/// group is not loaded.
pub fn determine_valid<'a>(
    id: &RawCoId,
    header: &CoValueHeader,
    sessions: &'a BTreeMap<SessionId, Vec<Transaction>>,
    resolver: &dyn CoValueResolver,
) -> CoreResult<Validity<'a>> {
    let ordered = fold_order(sessions);
    match &header.ruleset {
        Ruleset::Unowned => {
            let mut validity = Validity::default();
            for candidate in ordered {
                match account_signer(id, &candidate, resolver)? {
                    Ok(()) => validity.valid.push(candidate),
                    Err(reason) => validity.rejected.push((candidate.id(), reason)),
                }
            }
            Ok(validity)
        }
        Ruleset::OwnedByGroup { group } => {
            let core = resolver
                .core(group)
                .ok_or_else(|| CoreError::NotLoaded(group.clone()))?;
            let content = core.content(resolver)?;
            let group_content = content
                .as_group()
                .ok_or_else(|| CoreError::NotAGroup(group.clone()))?;

            let mut validity = Validity::default();
            for candidate in ordered {
                let verdict = account_signer(id, &candidate, resolver)?
                    .and_then(|()| {
                        MemberId::from_session(candidate.session).map_err(|e| e.to_string())
                    })
                    .and_then(|member| {
                        match group_content.role_at(&member, candidate.made_at()) {
                            Some(role) if role.can_write() => Ok(()),
                            Some(role) => Err(format!("{member} is only {role} in {group}")),
                            None => Err(format!("{member} has no role in {group}")),
                        }
                    });
                match verdict {
                    Ok(()) => validity.valid.push(candidate),
                    Err(reason) => validity.rejected.push((candidate.id(), reason)),
                }
            }
            Ok(validity)
        }
        Ruleset::Group { initial_admin } => {
            validate_group(id, initial_admin, header.is_account(), ordered, resolver)
        }
    }
}

/// For a session owned by another account, checks that the signing agent
/// was an admin of that account when the transaction was made.
///
/// The outer error means the account is not available; the inner one is a
/// rejection of the transaction.
fn account_signer(
    id: &RawCoId,
    candidate: &ValidTransaction<'_>,
    resolver: &dyn CoValueResolver,
) -> CoreResult<Result<(), String>> {
    let Ok(MemberId::Account(account)) = MemberId::from_session(candidate.session) else {
        return Ok(Ok(()));
    };
    if &account == id {
        return Ok(Ok(()));
    }
    let core = resolver
        .core(&account)
        .ok_or_else(|| CoreError::NotLoaded(account.clone()))?;
    let content = core.content(resolver)?;
    let account_content = content
        .as_account()
        .ok_or_else(|| ValidationError::InvalidSessionOwner(account.to_string()))?;
    let admins = account_content.group().admin_agents_at(candidate.made_at());
    Ok(signed_by_admin(id, candidate, &admins, &account, resolver.crypto()))
}

fn signed_by_admin(
    id: &RawCoId,
    candidate: &ValidTransaction<'_>,
    admins: &[AgentId],
    account: &RawCoId,
    crypto: &dyn CryptoProvider,
) -> Result<(), String> {
    candidate
        .tx
        .verify(crypto, id, &candidate.id(), admins)
        .map_err(|_| format!("signer was not an admin agent of {account}"))
}

/// Every transaction sorted by `(madeAt, session, index)`.
fn fold_order(sessions: &BTreeMap<SessionId, Vec<Transaction>>) -> Vec<ValidTransaction<'_>> {
    let mut all: Vec<ValidTransaction<'_>> = sessions
        .iter()
        .flat_map(|(session, txs)| {
            txs.iter().enumerate().map(move |(index, tx)| ValidTransaction {
                session,
                index: index as u32,
                tx,
            })
        })
        .collect();
    all.sort_by(|a, b| {
        (a.tx.made_at, a.session, a.index).cmp(&(b.tx.made_at, b.session, b.index))
    });
    all
}

/// Running role table of a group while its transactions are folded.
struct RoleTable<'g> {
    group: &'g RawCoId,
    is_account: bool,
    entries: HashMap<String, JsonValue>,
}

impl RoleTable<'_> {
    fn role_of(&self, member: &MemberId) -> Option<Role> {
        if self.is_account && member.as_account() == Some(self.group) {
            return Some(Role::Admin);
        }
        self.entries
            .get(&member.to_string())
            .and_then(JsonValue::as_str)
            .and_then(Role::parse)
    }

    fn role_of_key(&self, key: &str) -> Option<Role> {
        MemberId::parse(key).ok().and_then(|m| self.role_of(&m))
    }

    fn admin_agents(&self) -> Vec<AgentId> {
        self.entries
            .iter()
            .filter(|(_, role)| role.as_str() == Some(Role::Admin.as_str()))
            .filter_map(|(key, _)| match MemberId::parse(key) {
                Ok(MemberId::Agent(agent)) => Some(agent),
                _ => None,
            })
            .collect()
    }

    /// True if `session` is the account's own session.
    fn is_own_session(&self, session: &SessionId) -> bool {
        self.is_account
            && matches!(MemberId::from_session(session), Ok(MemberId::Account(a)) if &a == self.group)
    }
}

fn validate_group<'a>(
    id: &RawCoId,
    initial_admin: &MemberId,
    is_account: bool,
    ordered: Vec<ValidTransaction<'a>>,
    resolver: &dyn CoValueResolver,
) -> CoreResult<Validity<'a>> {
    let mut table = RoleTable {
        group: id,
        is_account,
        entries: HashMap::new(),
    };
    let mut validity = Validity::default();

    for candidate in ordered {
        // The account's own session counts only while its signer is admin.
        let signer = if table.is_own_session(candidate.session) {
            signed_by_admin(id, &candidate, &table.admin_agents(), id, resolver.crypto())
        } else {
            account_signer(id, &candidate, resolver)?
        };
        let verdict = signer.and_then(|()| {
            check_group_transaction(&table, initial_admin, candidate.tx, candidate.session)
        });
        match verdict {
            Ok(staged) => {
                table.entries.extend(staged);
                validity.valid.push(candidate);
            }
            Err(reason) => {
                debug!(group = %id, tx = %candidate.id(), %reason, "group transaction invalid");
                validity.rejected.push((candidate.id(), reason));
            }
        }
    }
    Ok(validity)
}

/// Checks one group transaction atomically. Returns the entries it sets.
fn check_group_transaction(
    table: &RoleTable<'_>,
    initial_admin: &MemberId,
    tx: &Transaction,
    session: &SessionId,
) -> Result<Vec<(String, JsonValue)>, String> {
    let signer = MemberId::from_session(session).map_err(|e| e.to_string())?;
    let changes = tx
        .trusting_changes()
        .ok_or_else(|| "groups only accept trusting transactions".to_string())?;

    let mut staged: Vec<(String, JsonValue)> = Vec::with_capacity(changes.len());
    for change in changes {
        let Change::Set { key, value } = change else {
            return Err("groups only accept set changes".to_string());
        };
        // Later changes in the same transaction see earlier ones.
        let lookup = |k: &str| {
            staged
                .iter()
                .rev()
                .find(|(sk, _)| sk == k)
                .and_then(|(_, v)| v.as_str().and_then(Role::parse))
                .or_else(|| table.role_of_key(k))
        };
        let signer_role = if table.is_account && signer.as_account() == Some(table.group) {
            Some(Role::Admin)
        } else {
            lookup(&signer.to_string())
        };

        if MemberId::looks_like_member(key) {
            let member = MemberId::parse(key).map_err(|e| e.to_string())?;
            let granted = value
                .as_str()
                .and_then(Role::parse)
                .ok_or_else(|| format!("{value} is not a role"))?;
            let existing = lookup(key);
            let allowed = match signer_role {
                Some(Role::Admin) => true,
                None => member == signer && &signer == initial_admin && granted == Role::Admin,
                Some(invite) if invite.is_invite() => {
                    invite.redeemed() == Some(granted) && Role::accepts_invite(existing, invite)
                }
                Some(_) => false,
            };
            if !allowed {
                return Err(format!(
                    "{signer} ({}) cannot set {member} to {granted}",
                    signer_role.map_or("no role", Role::as_str)
                ));
            }
        } else if key.contains("_for_") {
            match signer_role {
                Some(role) if role == Role::Admin || role.is_invite() => {}
                _ => return Err(format!("{signer} cannot reveal {key}")),
            }
        } else if signer_role != Some(Role::Admin) {
            let kind = if ADMIN_KEYS.contains(&key.as_str()) { "reserved" } else { "plain" };
            return Err(format!("only admins may set {kind} key {key}"));
        }
        staged.push((key.clone(), value.clone()));
    }
    Ok(staged)
}
