//! Group roles and the no-downgrade relation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Access level of a member in a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    Admin,
    Writer,
    Reader,
    AdminInvite,
    WriterInvite,
    ReaderInvite,
    /// Former member; holds no access and receives no new read keys.
    Revoked,
}

impl Role {
    /// Strength used by the no-downgrade rule. Invite and revoked roles grant
    /// no membership, so they rank below every real role.
    #[must_use]
    pub const fn strength(self) -> u8 {
        match self {
            Self::Admin => 3,
            Self::Writer => 2,
            Self::Reader => 1,
            Self::AdminInvite | Self::WriterInvite | Self::ReaderInvite | Self::Revoked => 0,
        }
    }

    #[must_use]
    pub const fn is_invite(self) -> bool {
        matches!(
            self,
            Self::AdminInvite | Self::WriterInvite | Self::ReaderInvite
        )
    }

    /// The member role an invite role redeems to.
    #[must_use]
    pub const fn redeemed(self) -> Option<Role> {
        match self {
            Self::AdminInvite => Some(Self::Admin),
            Self::WriterInvite => Some(Self::Writer),
            Self::ReaderInvite => Some(Self::Reader),
            _ => None,
        }
    }

    /// May author content in values owned by the group.
    #[must_use]
    pub const fn can_write(self) -> bool {
        matches!(self, Self::Admin | Self::Writer)
    }

    /// Should hold the group's current read key.
    #[must_use]
    pub const fn holds_read_key(self) -> bool {
        !matches!(self, Self::Revoked)
    }

    /// Whether redeeming `invite` would change `existing`.
    ///
    /// Redemption never replaces an equal or stronger role: an admin stays
    /// admin, a writer offered a reader invite stays writer.
    #[must_use]
    pub fn accepts_invite(existing: Option<Role>, invite: Role) -> bool {
        match invite.redeemed() {
            Some(granted) => existing.map_or(0, Role::strength) < granted.strength(),
            None => false,
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "admin" => Some(Self::Admin),
            "writer" => Some(Self::Writer),
            "reader" => Some(Self::Reader),
            "adminInvite" => Some(Self::AdminInvite),
            "writerInvite" => Some(Self::WriterInvite),
            "readerInvite" => Some(Self::ReaderInvite),
            "revoked" => Some(Self::Revoked),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Writer => "writer",
            Self::Reader => "reader",
            Self::AdminInvite => "adminInvite",
            Self::WriterInvite => "writerInvite",
            Self::ReaderInvite => "readerInvite",
            Self::Revoked => "revoked",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
