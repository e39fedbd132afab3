//! Event reducer.
//!
//! Maps decoded chain events onto ledger state. The business rules live
//! in pure transition functions; [`EventReducer`] wraps them with the
//! per-wallet serialization and transaction-hash dedup that make
//! application idempotent under at-least-once delivery.
//!
//! Both the live feed and the reconciliation scanner apply events through
//! the same reducer instance, so identical events produce identical
//! ledger state on either path.

use crate::entities::{
    BadgeId, BillingEntry, GameSlot, MembershipRecord, MembershipTier, WalletAddress,
    billing::format_usdc,
};
use crate::events::{BadgeMintEvent, ChainEvent, PaymentEvent};
use crate::ledger::{Ledger, LedgerError};
use kanau::processor::Processor;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;

/// The system's fixed calendar convention: a purchased month is exactly
/// 30 days, not a Gregorian month.
pub const MONTH: Duration = Duration::days(30);

#[derive(Debug, Error)]
pub enum ReduceError {
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

/// Whether applying an event changed ledger state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// State was mutated.
    Applied,
    /// The event had been applied before; nothing changed.
    Duplicate,
}

/// Result of the pure payment transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentOutcome {
    pub tier: MembershipTier,
    pub expiry: OffsetDateTime,
    /// Badges earned by this payment.
    pub badges: Vec<BadgeId>,
    pub plan: &'static str,
    pub price: String,
}

/// Pure `MembershipPaid` transition.
///
/// - Extension starts from `max(current expiry, now)`, so expiry never
///   moves backward.
/// - Tier upgrades monotonically: yearly evidence, past or present, wins
///   over a monthly-only event.
pub fn membership_paid_transition(
    current: &MembershipRecord,
    event: &PaymentEvent,
    now: OffsetDateTime,
) -> PaymentOutcome {
    let effective_start = match current.expiry_date {
        Some(expiry) if expiry > now => expiry,
        _ => now,
    };
    let expiry = effective_start + Duration::days(30 * i64::from(event.months));

    let yearly = event.year_count > 0 || current.tier == MembershipTier::Yearly;
    let tier = if yearly {
        MembershipTier::Yearly
    } else {
        MembershipTier::Monthly
    };

    let mut badges = vec![BadgeId::PRO_MEMBER];
    if event.year_count > 0 {
        badges.push(BadgeId::SENTINEL_ELITE);
    }

    PaymentOutcome {
        tier,
        expiry,
        badges,
        plan: if event.year_count > 0 { "year" } else { "month" },
        price: format_usdc(event.amount),
    }
}

/// Game dashboard slot a badge projects into, if any.
pub fn game_slot_for(badge_id: BadgeId) -> Option<GameSlot> {
    match badge_id {
        BadgeId::DEFI_NOVICE => Some(GameSlot::Easy),
        BadgeId::DEFI_INTERMEDIATE => Some(GameSlot::Medium),
        BadgeId::DEFI_MASTER => Some(GameSlot::Hard),
        BadgeId::RISK_GUARDIAN => Some(GameSlot::Risk),
        _ => None,
    }
}

/// Applies decoded events to the ledger, idempotently.
pub struct EventReducer {
    ledger: Arc<dyn Ledger>,
    /// Per-wallet locks serializing read-modify-write sequences across
    /// the live feed and concurrent reconciliation scans.
    wallet_locks: Mutex<HashMap<WalletAddress, Arc<Mutex<()>>>>,
}

impl EventReducer {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self {
            ledger,
            wallet_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn ledger(&self) -> Arc<dyn Ledger> {
        self.ledger.clone()
    }

    async fn lock_for(&self, wallet: &WalletAddress) -> Arc<Mutex<()>> {
        let mut locks = self.wallet_locks.lock().await;
        // Drop locks nobody holds anymore, so the map tracks wallets with
        // in-flight events rather than every wallet ever observed.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(wallet.clone()).or_default().clone()
    }

    async fn apply_membership_paid(&self, event: &PaymentEvent) -> Result<Applied, ReduceError> {
        let lock = self.lock_for(&event.wallet).await;
        let _guard = lock.lock().await;

        if self.ledger.payment_recorded(&event.tx_hash).await? {
            tracing::debug!(wallet = %event.wallet, tx = %event.tx_hash, "Payment already applied");
            return Ok(Applied::Duplicate);
        }

        let current = self.ledger.find_or_create(&event.wallet).await?;
        let now = OffsetDateTime::now_utc();
        let outcome = membership_paid_transition(&current, event, now);

        let entry = BillingEntry {
            tx_hash: event.tx_hash.clone(),
            wallet: event.wallet.clone(),
            plan: outcome.plan,
            months: event.months,
            price: outcome.price.clone(),
            date: now,
        };
        let applied = self
            .ledger
            .apply_payment(
                &event.wallet,
                outcome.tier,
                outcome.expiry,
                entry,
                &outcome.badges,
                now,
            )
            .await?;
        if !applied {
            tracing::debug!(wallet = %event.wallet, tx = %event.tx_hash, "Payment already applied");
            return Ok(Applied::Duplicate);
        }

        tracing::info!(
            wallet = %event.wallet,
            tx = %event.tx_hash,
            tier = %outcome.tier,
            expiry = %outcome.expiry,
            "Applied MembershipPaid"
        );
        Ok(Applied::Applied)
    }

    async fn apply_badge_minted(&self, event: &BadgeMintEvent) -> Result<Applied, ReduceError> {
        let lock = self.lock_for(&event.wallet).await;
        let _guard = lock.lock().await;

        self.ledger.find_or_create(&event.wallet).await?;
        let now = OffsetDateTime::now_utc();

        let newly_earned = self
            .ledger
            .mark_badge_earned(&event.wallet, event.badge_id, now)
            .await?;
        let newly_minted = self
            .ledger
            .mark_badge_minted(&event.wallet, event.badge_id, now)
            .await?;

        if let Some(slot) = game_slot_for(event.badge_id) {
            self.ledger
                .set_game_slot_minted(&event.wallet, slot)
                .await?;
        }

        if newly_earned || newly_minted {
            tracing::info!(wallet = %event.wallet, badge = %event.badge_id, "Applied BadgeMinted");
            Ok(Applied::Applied)
        } else {
            tracing::debug!(wallet = %event.wallet, badge = %event.badge_id, "Badge already minted");
            Ok(Applied::Duplicate)
        }
    }
}

impl Processor<ChainEvent> for EventReducer {
    type Output = Applied;
    type Error = ReduceError;

    async fn process(&self, event: ChainEvent) -> Result<Applied, ReduceError> {
        match event {
            ChainEvent::MembershipPaid(payment) => self.apply_membership_paid(&payment).await,
            ChainEvent::BadgeMinted(mint) => self.apply_badge_minted(&mint).await,
        }
    }
}
