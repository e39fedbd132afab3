use super::WalletAddress;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Membership level derived from on-chain payment evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipTier {
    Free,
    Monthly,
    Yearly,
}

impl std::fmt::Display for MembershipTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MembershipTier::Free => "free",
            MembershipTier::Monthly => "monthly",
            MembershipTier::Yearly => "yearly",
        };
        f.write_str(s)
    }
}

/// Off-chain membership record for one wallet.
///
/// Owned exclusively by the ledger and mutated only through the event
/// reducer. Two invariants hold across all mutations:
///
/// - `expiry_date` never moves backward through a payment application;
///   extensions start from `max(current expiry, now)`.
/// - `tier` never reverts from `Yearly` to `Monthly` on a later
///   monthly-only payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipRecord {
    pub id: Uuid,
    pub wallet: WalletAddress,
    pub tier: MembershipTier,
    pub expiry_date: Option<OffsetDateTime>,
    pub member_since: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl MembershipRecord {
    /// Fresh record for a wallet seen for the first time.
    pub fn new(wallet: WalletAddress, now: OffsetDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            wallet,
            tier: MembershipTier::Free,
            expiry_date: None,
            member_since: now,
            updated_at: now,
        }
    }

    /// Whether the membership is active at `now`.
    pub fn is_active(&self, now: OffsetDateTime) -> bool {
        self.expiry_date.is_some_and(|expiry| expiry > now)
    }
}
