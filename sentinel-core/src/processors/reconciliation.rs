//! Reconciliation scanner.
//!
//! On-demand historical replay for one wallet, used as the manual
//! recovery path when the continuous feed under-reports. Scans payment
//! logs from a fixed starting block, selects the most recent one, and
//! runs it through the same reducer as the live feed, so both paths
//! produce identical results for identical events.
//!
//! Safe to invoke concurrently with the live feed for the same wallet:
//! transaction-hash dedup and the reducer's per-wallet locks prevent
//! double application.

use crate::chain::{ChainClient, ChainError, LogFilter, decode_log};
use crate::config::ListenerConfig;
use crate::entities::WalletAddress;
use crate::events::ChainEvent;
use crate::reducer::{EventReducer, ReduceError};
use kanau::processor::Processor;
use std::sync::Arc;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};

/// Typed result of a manual reconciliation, surfaced synchronously to
/// the caller. Live-feed failures never reach users; this is the only
/// user-visible failure surface of the subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// A still-valid payment was found and applied.
    Restored,
    /// The most recent on-chain payment has already lapsed; state was
    /// left untouched.
    Expired,
    /// No payment logs exist for this wallet in the scanned range.
    NoHistory,
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("chain query failed: {0}")]
    Chain(#[from] ChainError),

    #[error("event application failed: {0}")]
    Apply(#[from] ReduceError),
}

pub struct ReconciliationScanner {
    client: Arc<dyn ChainClient>,
    reducer: Arc<EventReducer>,
    payment_contract: String,
    from_block: u64,
}

impl ReconciliationScanner {
    pub fn new(
        client: Arc<dyn ChainClient>,
        reducer: Arc<EventReducer>,
        config: &ListenerConfig,
    ) -> Self {
        Self {
            client,
            reducer,
            payment_contract: config.payment_contract.clone(),
            from_block: config.reconcile_from_block,
        }
    }

    /// Replay the most recent on-chain payment for `wallet`.
    pub async fn reconcile(
        &self,
        wallet: &WalletAddress,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        info!(%wallet, from_block = self.from_block, "Reconciling membership from chain history");

        let filter = LogFilter::membership_paid(&self.payment_contract).for_wallet(wallet)?;
        let logs = self
            .client
            .logs_in_range(&filter, self.from_block, None)
            .await?;

        let Some(latest) = logs.iter().rev().find(|log| !log.removed) else {
            info!(%wallet, "No payment history found on-chain");
            return Ok(ReconcileOutcome::NoHistory);
        };

        let event = decode_log(latest)?;
        let ChainEvent::MembershipPaid(mut payment) = event else {
            return Err(ChainError::Decode("payment scan returned a non-payment event".into()).into());
        };

        let block_hash = latest.block_hash.as_deref().ok_or_else(|| {
            ChainError::Decode("historical log carries no block hash".into())
        })?;
        let timestamp = self.client.block_timestamp(block_hash).await?;
        payment.block_timestamp = Some(timestamp);

        let paid_at = OffsetDateTime::from_unix_timestamp(timestamp)
            .map_err(|e| ChainError::Decode(format!("bad block timestamp {timestamp}: {e}")))?;
        let expected_expiry = paid_at + Duration::days(30 * i64::from(payment.months));
        if expected_expiry <= OffsetDateTime::now_utc() {
            // The tier is not retroactively nulled; the record stays as is.
            warn!(%wallet, %expected_expiry, "Latest on-chain payment already lapsed");
            return Ok(ReconcileOutcome::Expired);
        }

        self.reducer
            .process(ChainEvent::MembershipPaid(payment))
            .await?;
        info!(%wallet, "Membership restored from chain history");
        Ok(ReconcileOutcome::Restored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{MEMBERSHIP_PAID_TOPIC, RawLog};
    use crate::entities::{BadgeId, MembershipTier};
    use crate::events::PaymentEvent;
    use crate::ledger::MemoryLedger;
    use async_trait::async_trait;

    const WALLET_HEX: &str = "abcdef0123456789abcdef0123456789abcdef01";

    struct FixtureClient {
        logs: Vec<RawLog>,
        block_timestamp: i64,
    }

    #[async_trait]
    impl ChainClient for FixtureClient {
        async fn latest_block(&self) -> Result<u64, ChainError> {
            Ok(10_000_000)
        }

        async fn logs_in_range(
            &self,
            _filter: &LogFilter,
            _from_block: u64,
            _to_block: Option<u64>,
        ) -> Result<Vec<RawLog>, ChainError> {
            Ok(self.logs.clone())
        }

        async fn block_timestamp(&self, _block_hash: &str) -> Result<i64, ChainError> {
            Ok(self.block_timestamp)
        }
    }

    fn wallet() -> WalletAddress {
        WalletAddress::new(format!("0x{WALLET_HEX}"))
    }

    fn payment_log(tx: &str, months: u64, year_count: u64) -> RawLog {
        RawLog {
            address: "0xcontract".into(),
            topics: vec![
                MEMBERSHIP_PAID_TOPIC.clone(),
                format!("0x{WALLET_HEX:0>64}"),
            ],
            data: format!(
                "0x{months:064x}{:064x}{year_count:064x}{:064x}",
                months * 5_000_000,
                if year_count > 0 { 0 } else { months }
            ),
            block_number: "0x6b1a2c".into(),
            block_hash: Some("0xblockhash".into()),
            transaction_hash: tx.into(),
            removed: false,
        }
    }

    fn scanner(client: FixtureClient) -> (ReconciliationScanner, Arc<EventReducer>) {
        let reducer = Arc::new(EventReducer::new(Arc::new(MemoryLedger::new())));
        let scanner = ReconciliationScanner::new(
            Arc::new(client),
            reducer.clone(),
            &ListenerConfig::new("wss://node.example/v2/key"),
        );
        (scanner, reducer)
    }

    fn recent_timestamp() -> i64 {
        (OffsetDateTime::now_utc() - Duration::days(2)).unix_timestamp()
    }

    fn stale_timestamp() -> i64 {
        (OffsetDateTime::now_utc() - Duration::days(400)).unix_timestamp()
    }

    #[tokio::test]
    async fn empty_history_reports_no_history_without_mutation() {
        let (scanner, reducer) = scanner(FixtureClient {
            logs: Vec::new(),
            block_timestamp: recent_timestamp(),
        });
        let outcome = scanner.reconcile(&wallet()).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::NoHistory);
        assert!(reducer.ledger().membership(&wallet()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn lapsed_payment_reports_expired_without_mutation() {
        let (scanner, reducer) = scanner(FixtureClient {
            logs: vec![payment_log("0x1", 1, 0)],
            block_timestamp: stale_timestamp(),
        });
        let outcome = scanner.reconcile(&wallet()).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Expired);
        assert!(reducer.ledger().membership(&wallet()).await.unwrap().is_none());
        assert!(reducer.ledger().billing(&wallet()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn valid_payment_is_restored_through_the_reducer() {
        let (scanner, reducer) = scanner(FixtureClient {
            logs: vec![payment_log("0x1", 1, 0), payment_log("0x2", 12, 1)],
            block_timestamp: recent_timestamp(),
        });

        let outcome = scanner.reconcile(&wallet()).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Restored);

        // The most recent log won, and went through the shared reducer:
        // tier, billing and badges all match a live application.
        let ledger = reducer.ledger();
        let membership = ledger.membership(&wallet()).await.unwrap().unwrap();
        assert_eq!(membership.tier, MembershipTier::Yearly);
        assert!(membership.is_active(OffsetDateTime::now_utc()));

        let billing = ledger.billing(&wallet()).await.unwrap();
        assert_eq!(billing.len(), 1);
        assert_eq!(billing[0].tx_hash, "0x2");
        assert_eq!(billing[0].plan, "year");

        let badges = ledger.badges(&wallet()).await.unwrap();
        assert!(badges.iter().any(|b| b.badge_id == BadgeId::SENTINEL_ELITE && b.earned));
    }

    #[tokio::test]
    async fn reconciliation_agrees_with_the_live_feed() {
        let (scanner, reducer) = scanner(FixtureClient {
            logs: vec![payment_log("0xsame", 12, 1)],
            block_timestamp: recent_timestamp(),
        });

        // Live feed already applied the same transaction.
        reducer
            .process(ChainEvent::MembershipPaid(PaymentEvent {
                wallet: wallet(),
                months: 12,
                amount: 60_000_000,
                year_count: 1,
                month_count: 0,
                tx_hash: "0xsame".into(),
                block_number: 0x6b1a2c,
                block_timestamp: None,
            }))
            .await
            .unwrap();
        let live_state = reducer.ledger().membership(&wallet()).await.unwrap().unwrap();

        // The manual scan finds the identical transaction and changes nothing.
        let outcome = scanner.reconcile(&wallet()).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Restored);
        let after = reducer.ledger().membership(&wallet()).await.unwrap().unwrap();
        assert_eq!(live_state, after);
        assert_eq!(reducer.ledger().billing(&wallet()).await.unwrap().len(), 1);
    }
}
