//! Ledger port.
//!
//! The authoritative off-chain store of membership and badge state,
//! consumed only through this trait. The host application decides what
//! backs it; [`MemoryLedger`] is the in-process implementation used by
//! the server default and by every test.
//!
//! Implementations must guarantee atomic read-modify-write per record.
//! Cross-record write ordering per wallet is the reducer's job.

pub mod memory;

pub use memory::MemoryLedger;

use crate::entities::{
    BadgeId, BadgeRecord, BillingEntry, GameProgress, GameSlot, MembershipRecord, MembershipTier,
    WalletAddress,
};
use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

/// Storage failures surfaced by a ledger implementation.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("storage failure: {0}")]
    Storage(String),

    #[error("unknown wallet: {0}")]
    UnknownWallet(WalletAddress),
}

/// Complete ledger view of one wallet.
#[derive(Debug, Clone)]
pub struct MembershipSnapshot {
    pub membership: MembershipRecord,
    pub badges: Vec<BadgeRecord>,
    pub billing: Vec<BillingEntry>,
}

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Fetch the membership for `wallet`, creating it lazily on first
    /// contact together with the full fixed badge catalog. Both the live
    /// feed and the reconciliation path create records through here, so
    /// initial state never diverges between them.
    async fn find_or_create(&self, wallet: &WalletAddress)
    -> Result<MembershipRecord, LedgerError>;

    async fn membership(
        &self,
        wallet: &WalletAddress,
    ) -> Result<Option<MembershipRecord>, LedgerError>;

    /// Whether a billing entry for this transaction hash already exists.
    async fn payment_recorded(&self, tx_hash: &str) -> Result<bool, LedgerError>;

    /// Atomically apply one paid-membership mutation, keyed by the billing
    /// entry's transaction hash. Returns false and writes nothing when the
    /// hash is already recorded. Tier, expiry, the billing entry and the
    /// earned badges land in a single storage transaction: a failure
    /// leaves either all of them or none of them, so a redelivered event
    /// can always be re-applied safely.
    async fn apply_payment(
        &self,
        wallet: &WalletAddress,
        tier: MembershipTier,
        expiry: OffsetDateTime,
        entry: BillingEntry,
        badges: &[BadgeId],
        now: OffsetDateTime,
    ) -> Result<bool, LedgerError>;

    async fn billing(&self, wallet: &WalletAddress) -> Result<Vec<BillingEntry>, LedgerError>;

    async fn badges(&self, wallet: &WalletAddress) -> Result<Vec<BadgeRecord>, LedgerError>;

    /// Flip `earned` to true. Monotonic: returns false and writes nothing
    /// (timestamps included) when the flag is already set. Creates the
    /// badge row if the catalog row is missing.
    async fn mark_badge_earned(
        &self,
        wallet: &WalletAddress,
        badge: BadgeId,
        at: OffsetDateTime,
    ) -> Result<bool, LedgerError>;

    /// Flip `nft_minted` to true. Same monotonic contract as
    /// [`mark_badge_earned`](Ledger::mark_badge_earned).
    async fn mark_badge_minted(
        &self,
        wallet: &WalletAddress,
        badge: BadgeId,
        at: OffsetDateTime,
    ) -> Result<bool, LedgerError>;

    async fn game_progress(&self, wallet: &WalletAddress) -> Result<GameProgress, LedgerError>;

    /// Mark a game dashboard slot as minted (convenience projection).
    async fn set_game_slot_minted(
        &self,
        wallet: &WalletAddress,
        slot: GameSlot,
    ) -> Result<(), LedgerError>;
}

/// Load the complete read view for one wallet, if it exists.
pub async fn load_snapshot(
    ledger: &dyn Ledger,
    wallet: &WalletAddress,
) -> Result<Option<MembershipSnapshot>, LedgerError> {
    let Some(membership) = ledger.membership(wallet).await? else {
        return Ok(None);
    };
    Ok(Some(MembershipSnapshot {
        membership,
        badges: ledger.badges(wallet).await?,
        billing: ledger.billing(wallet).await?,
    }))
}
