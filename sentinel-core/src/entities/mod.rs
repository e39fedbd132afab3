pub mod badge;
pub mod billing;
pub mod membership;

pub use badge::{BadgeRecord, GameProgress, GameSlot, GameSlotProgress};
pub use billing::BillingEntry;
pub use membership::{MembershipRecord, MembershipTier};

use serde::{Deserialize, Serialize};

/// Lowercase-normalized EVM wallet address.
///
/// This is the unique key for all membership and badge records. The
/// constructor normalizes casing so that checksummed and lowercase forms
/// of the same address always resolve to the same record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalletAddress(String);

impl WalletAddress {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for WalletAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WalletAddress {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Identifier of a badge in the fixed catalog.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct BadgeId(pub u32);

impl BadgeId {
    /// Awarded for any paid membership.
    pub const PRO_MEMBER: BadgeId = BadgeId(3001);
    /// Awarded for yearly membership evidence.
    pub const SENTINEL_ELITE: BadgeId = BadgeId(3002);

    pub const DEFI_NOVICE: BadgeId = BadgeId(2001);
    pub const DEFI_INTERMEDIATE: BadgeId = BadgeId(2002);
    pub const DEFI_MASTER: BadgeId = BadgeId(2003);
    pub const RISK_GUARDIAN: BadgeId = BadgeId(2004);
}

impl std::fmt::Display for BadgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The fixed badge catalog created for every wallet on first contact.
pub const ALL_BADGES: [BadgeId; 9] = [
    BadgeId(1001),
    BadgeId(2001),
    BadgeId(2002),
    BadgeId(2003),
    BadgeId(2004),
    BadgeId(3001),
    BadgeId(3002),
    BadgeId(4001),
    BadgeId(4002),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wallet_address_is_lowercase_normalized() {
        let a = WalletAddress::new("0xAbC123DEF");
        let b = WalletAddress::new(" 0xabc123def ");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "0xabc123def");
    }

    #[test]
    fn badge_catalog_contains_membership_badges() {
        assert!(ALL_BADGES.contains(&BadgeId::PRO_MEMBER));
        assert!(ALL_BADGES.contains(&BadgeId::SENTINEL_ELITE));
    }
}
