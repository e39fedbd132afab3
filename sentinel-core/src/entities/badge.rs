use super::{BadgeId, WalletAddress};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Badge row for one (wallet, badge) pair.
///
/// Both flags are monotonic: they flip false→true and never back. A write
/// that would not change either flag is skipped entirely, so timestamps
/// record the first transition and are never overwritten by replays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadgeRecord {
    pub wallet: WalletAddress,
    pub badge_id: BadgeId,
    pub earned: bool,
    pub earned_at: Option<OffsetDateTime>,
    pub nft_minted: bool,
    pub minted_at: Option<OffsetDateTime>,
}

impl BadgeRecord {
    pub fn new(wallet: WalletAddress, badge_id: BadgeId) -> Self {
        Self {
            wallet,
            badge_id,
            earned: false,
            earned_at: None,
            nft_minted: false,
            minted_at: None,
        }
    }
}

/// Game dashboard slot a minted badge projects into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameSlot {
    Easy,
    Medium,
    Hard,
    Risk,
}

/// Progress of one quiz/risk slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSlotProgress {
    pub completed: bool,
    pub score: u32,
    #[serde(default)]
    pub best_score: u32,
    pub minted: bool,
}

/// Denormalized game dashboard projection.
///
/// Convenience view only. The badge rows stay authoritative; nothing in
/// the reconciliation or reducer paths reads this back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameProgress {
    pub easy: GameSlotProgress,
    pub medium: GameSlotProgress,
    pub hard: GameSlotProgress,
    pub risk: GameSlotProgress,
}

impl GameProgress {
    pub fn slot_mut(&mut self, slot: GameSlot) -> &mut GameSlotProgress {
        match slot {
            GameSlot::Easy => &mut self.easy,
            GameSlot::Medium => &mut self.medium,
            GameSlot::Hard => &mut self.hard,
            GameSlot::Risk => &mut self.risk,
        }
    }
}
