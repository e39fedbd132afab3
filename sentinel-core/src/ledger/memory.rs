//! In-memory ledger.
//!
//! Backs the server by default and every test. All maps live behind one
//! `RwLock`, which makes every trait operation an atomic
//! read-modify-write.

use super::{Ledger, LedgerError};
use crate::entities::{
    ALL_BADGES, BadgeId, BadgeRecord, BillingEntry, GameProgress, GameSlot, MembershipRecord,
    MembershipTier, WalletAddress,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use time::OffsetDateTime;
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    memberships: HashMap<WalletAddress, MembershipRecord>,
    badges: HashMap<(WalletAddress, BadgeId), BadgeRecord>,
    billing: Vec<BillingEntry>,
    billing_keys: HashSet<String>,
    game: HashMap<WalletAddress, GameProgress>,
}

#[derive(Default)]
pub struct MemoryLedger {
    inner: RwLock<Inner>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn find_or_create(
        &self,
        wallet: &WalletAddress,
    ) -> Result<MembershipRecord, LedgerError> {
        let mut inner = self.inner.write().await;
        if let Some(record) = inner.memberships.get(wallet) {
            return Ok(record.clone());
        }

        tracing::info!(%wallet, "Auto-creating membership record");
        let record = MembershipRecord::new(wallet.clone(), OffsetDateTime::now_utc());
        inner.memberships.insert(wallet.clone(), record.clone());
        for badge_id in ALL_BADGES {
            inner
                .badges
                .insert((wallet.clone(), badge_id), BadgeRecord::new(wallet.clone(), badge_id));
        }
        Ok(record)
    }

    async fn membership(
        &self,
        wallet: &WalletAddress,
    ) -> Result<Option<MembershipRecord>, LedgerError> {
        Ok(self.inner.read().await.memberships.get(wallet).cloned())
    }

    async fn payment_recorded(&self, tx_hash: &str) -> Result<bool, LedgerError> {
        Ok(self
            .inner
            .read()
            .await
            .billing_keys
            .contains(&tx_hash.to_lowercase()))
    }

    async fn apply_payment(
        &self,
        wallet: &WalletAddress,
        tier: MembershipTier,
        expiry: OffsetDateTime,
        entry: BillingEntry,
        badges: &[BadgeId],
        now: OffsetDateTime,
    ) -> Result<bool, LedgerError> {
        // One write lock for the whole mutation: either everything below
        // lands, or nothing does.
        let mut inner = self.inner.write().await;
        let key = entry.tx_hash.to_lowercase();
        if inner.billing_keys.contains(&key) {
            return Ok(false);
        }

        let record = inner
            .memberships
            .get_mut(wallet)
            .ok_or_else(|| LedgerError::UnknownWallet(wallet.clone()))?;
        record.tier = tier;
        record.expiry_date = Some(expiry);
        record.updated_at = now;

        inner.billing_keys.insert(key);
        inner.billing.push(entry);

        for &badge in badges {
            let row = inner
                .badges
                .entry((wallet.clone(), badge))
                .or_insert_with(|| BadgeRecord::new(wallet.clone(), badge));
            if !row.earned {
                row.earned = true;
                row.earned_at = Some(now);
            }
        }
        Ok(true)
    }

    async fn billing(&self, wallet: &WalletAddress) -> Result<Vec<BillingEntry>, LedgerError> {
        Ok(self
            .inner
            .read()
            .await
            .billing
            .iter()
            .filter(|entry| &entry.wallet == wallet)
            .cloned()
            .collect())
    }

    async fn badges(&self, wallet: &WalletAddress) -> Result<Vec<BadgeRecord>, LedgerError> {
        let inner = self.inner.read().await;
        let mut rows: Vec<BadgeRecord> = inner
            .badges
            .iter()
            .filter(|((w, _), _)| w == wallet)
            .map(|(_, record)| record.clone())
            .collect();
        rows.sort_by_key(|record| record.badge_id);
        Ok(rows)
    }

    async fn mark_badge_earned(
        &self,
        wallet: &WalletAddress,
        badge: BadgeId,
        at: OffsetDateTime,
    ) -> Result<bool, LedgerError> {
        let mut inner = self.inner.write().await;
        let record = inner
            .badges
            .entry((wallet.clone(), badge))
            .or_insert_with(|| BadgeRecord::new(wallet.clone(), badge));
        if record.earned {
            return Ok(false);
        }
        record.earned = true;
        record.earned_at = Some(at);
        Ok(true)
    }

    async fn mark_badge_minted(
        &self,
        wallet: &WalletAddress,
        badge: BadgeId,
        at: OffsetDateTime,
    ) -> Result<bool, LedgerError> {
        let mut inner = self.inner.write().await;
        let record = inner
            .badges
            .entry((wallet.clone(), badge))
            .or_insert_with(|| BadgeRecord::new(wallet.clone(), badge));
        if record.nft_minted {
            return Ok(false);
        }
        record.nft_minted = true;
        record.minted_at = Some(at);
        Ok(true)
    }

    async fn game_progress(&self, wallet: &WalletAddress) -> Result<GameProgress, LedgerError> {
        Ok(self
            .inner
            .read()
            .await
            .game
            .get(wallet)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_game_slot_minted(
        &self,
        wallet: &WalletAddress,
        slot: GameSlot,
    ) -> Result<(), LedgerError> {
        let mut inner = self.inner.write().await;
        let progress = inner.game.entry(wallet.clone()).or_default();
        progress.slot_mut(slot).minted = true;
        Ok(())
    }
}
