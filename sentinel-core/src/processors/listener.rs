//! Chain listener.
//!
//! The ChainListener is responsible for:
//! - Supervising one subscription per watch target (payments, badge
//!   mints) for the life of the process
//! - Owning the push/poll transport state machine: counting transport
//!   faults, failing over push→poll at the error threshold, and probing
//!   for push recovery while polling
//! - Draining the feed channel and applying each batch, in order,
//!   through the event reducer
//!
//! Decode failures never reach the failure counter (they are dropped in
//! the adapter tasks), and neither do ledger failures.

use crate::chain::{
    ChainClient, ChainError, Endpoints, LogFilter, SubscriptionHandle, probe_push,
    spawn_poll_subscription, spawn_push_subscription,
};
use crate::config::ListenerConfig;
use crate::events::{EventBatch, FeedMessage, FeedSender, feed_channel};
use crate::reducer::EventReducer;
use kanau::processor::Processor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Live-feed transport strategy currently in effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    /// Persistent WebSocket subscription.
    Push,
    /// Fixed-interval log queries.
    Poll,
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportMode::Push => f.write_str("push"),
            TransportMode::Poll => f.write_str("poll"),
        }
    }
}

/// Failure-detection state machine.
///
/// `record_fault` is the single mutation point for the error counter;
/// every transport failure, from either watch target and either mode,
/// funnels through it exactly once via the feed channel.
#[derive(Debug)]
struct FailoverState {
    mode: TransportMode,
    error_count: u32,
    threshold: u32,
}

impl FailoverState {
    fn new(threshold: u32) -> Self {
        Self {
            mode: TransportMode::Push,
            error_count: 0,
            threshold,
        }
    }

    /// A single good batch forgives all prior errors.
    fn record_success(&mut self) {
        if self.error_count != 0 {
            debug!(forgiven = self.error_count, "Good batch resets error counter");
        }
        self.error_count = 0;
    }

    /// Count one transport fault. Returns the mode to switch to, if the
    /// threshold was crossed.
    fn record_fault(&mut self) -> Option<TransportMode> {
        self.error_count += 1;
        if self.error_count >= self.threshold && self.mode == TransportMode::Push {
            Some(TransportMode::Poll)
        } else {
            None
        }
    }

    fn switch_to(&mut self, mode: TransportMode) {
        self.mode = mode;
        self.error_count = 0;
    }
}

/// Supervises the live event feed.
///
/// Constructed once at process start with injected configuration, chain
/// client and reducer. `start` is idempotent if already running; `stop`
/// releases all subscriptions and is safe to call multiple times.
pub struct ChainListener {
    config: ListenerConfig,
    endpoints: Endpoints,
    client: Arc<dyn ChainClient>,
    reducer: Arc<EventReducer>,
    running: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
}

impl ChainListener {
    pub fn new(
        config: ListenerConfig,
        client: Arc<dyn ChainClient>,
        reducer: Arc<EventReducer>,
    ) -> Result<Self, ChainError> {
        let endpoints = Endpoints::derive(&config.rpc_url)?;
        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            config,
            endpoints,
            client,
            reducer,
            running: AtomicBool::new(false),
            shutdown_tx,
        })
    }

    fn payment_filter(&self) -> LogFilter {
        LogFilter::membership_paid(&self.config.payment_contract)
    }

    fn badge_filter(&self) -> LogFilter {
        LogFilter::badge_minted(&self.config.badge_contract)
    }

    /// Spawn the supervision loop. A no-op when already running.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("Listener already running");
            return;
        }
        let _ = self.shutdown_tx.send(false);
        // Subscribe before spawning: a stop() issued before the loop first
        // polls must still be observed.
        let shutdown_rx = self.shutdown_tx.subscribe();
        let listener = self.clone();
        tokio::spawn(listener.run(shutdown_rx));
    }

    /// Signal the supervision loop to release all subscriptions and exit.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    async fn run(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        let (feed_tx, mut feed_rx) = feed_channel();
        let mut state = FailoverState::new(self.config.error_threshold);
        let mut subscriptions = self.open_subscriptions(state.mode, &feed_tx);

        let mut probe = tokio::time::interval(self.config.probe_interval());
        probe.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(mode = %state.mode, "Listener started");

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Listener received shutdown signal");
                        break;
                    }
                }

                Some(message) = feed_rx.recv() => {
                    match message {
                        FeedMessage::Batch(batch) => {
                            state.record_success();
                            self.apply_batch(batch).await;
                        }
                        FeedMessage::Fault(e) => {
                            warn!(mode = %state.mode, error = %e, "Transport fault");
                            if !e.is_transport() {
                                continue;
                            }
                            if let Some(new_mode) = state.record_fault() {
                                warn!(
                                    errors = state.error_count,
                                    "Error threshold reached, failing over to poll"
                                );
                                state.switch_to(new_mode);
                                self.switch_subscriptions(&mut subscriptions, new_mode, &feed_tx)
                                    .await;
                                probe.reset();
                            } else if state.mode == TransportMode::Push {
                                // A dead push socket never comes back on its
                                // own; reconnect so consecutive failures can
                                // accumulate to the threshold. Poll tasks
                                // survive their own faults and need no help.
                                warn!(
                                    errors = state.error_count,
                                    "Re-establishing push subscriptions"
                                );
                                self.switch_subscriptions(
                                    &mut subscriptions,
                                    TransportMode::Push,
                                    &feed_tx,
                                )
                                .await;
                            }
                        }
                    }
                }

                _ = probe.tick(), if state.mode == TransportMode::Poll => {
                    match probe_push(&self.endpoints.ws, &self.payment_filter()).await {
                        Ok(()) => {
                            info!("Push transport healthy again, recovering");
                            state.switch_to(TransportMode::Push);
                            self.switch_subscriptions(
                                &mut subscriptions,
                                TransportMode::Push,
                                &feed_tx,
                            )
                            .await;
                        }
                        Err(e) => {
                            debug!(error = %e, "Push probe failed, staying in poll mode");
                        }
                    }
                }

                else => {
                    info!("Feed channel closed");
                    break;
                }
            }
        }

        drop(subscriptions);
        self.running.store(false, Ordering::SeqCst);
        info!("Listener shutdown complete");
    }

    /// Apply one batch strictly in order.
    ///
    /// A failure on one event aborts the remainder of the batch only; the
    /// skipped events come back through at-least-once delivery or a
    /// reconciliation scan.
    async fn apply_batch(&self, batch: EventBatch) {
        debug!(events = batch.len(), "Applying event batch");
        for event in batch {
            let wallet = event.wallet().clone();
            let tx_hash = event.tx_hash().to_owned();
            if let Err(e) = self.reducer.process(event).await {
                error!(%wallet, tx = %tx_hash, error = %e, "Failed to apply event, aborting batch");
                break;
            }
        }
    }

    fn open_subscriptions(
        &self,
        mode: TransportMode,
        feed: &FeedSender,
    ) -> Vec<SubscriptionHandle> {
        let targets = [
            ("payments", self.payment_filter(), self.config.payment_poll_interval()),
            ("badges", self.badge_filter(), self.config.badge_poll_interval()),
        ];
        targets
            .into_iter()
            .map(|(label, filter, poll_interval)| match mode {
                TransportMode::Push => spawn_push_subscription(
                    self.endpoints.ws.clone(),
                    filter,
                    feed.clone(),
                    label,
                ),
                TransportMode::Poll => spawn_poll_subscription(
                    self.client.clone(),
                    filter,
                    poll_interval,
                    feed.clone(),
                    label,
                ),
            })
            .collect()
    }

    /// Tear down, wait out the settle delay, resubscribe in `mode`.
    async fn switch_subscriptions(
        &self,
        subscriptions: &mut Vec<SubscriptionHandle>,
        mode: TransportMode,
        feed: &FeedSender,
    ) {
        for subscription in subscriptions.iter_mut() {
            subscription.stop();
        }
        subscriptions.clear();
        tokio::time::sleep(self.config.settle_delay()).await;
        *subscriptions = self.open_subscriptions(mode, feed);
        info!(mode = %mode, "Subscriptions re-established");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::RawLog;
    use crate::entities::{BadgeId, MembershipTier, WalletAddress};
    use crate::events::{BadgeMintEvent, ChainEvent, PaymentEvent};
    use crate::ledger::MemoryLedger;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU64;
    use std::time::Duration;

    struct NullClient;

    #[async_trait]
    impl ChainClient for NullClient {
        async fn latest_block(&self) -> Result<u64, ChainError> {
            Ok(0)
        }

        async fn logs_in_range(
            &self,
            _filter: &LogFilter,
            _from_block: u64,
            _to_block: Option<u64>,
        ) -> Result<Vec<RawLog>, ChainError> {
            Ok(Vec::new())
        }

        async fn block_timestamp(&self, _block_hash: &str) -> Result<i64, ChainError> {
            Ok(0)
        }
    }

    struct CountingClient {
        head_queries: AtomicU64,
    }

    #[async_trait]
    impl ChainClient for CountingClient {
        async fn latest_block(&self) -> Result<u64, ChainError> {
            self.head_queries.fetch_add(1, Ordering::SeqCst);
            Ok(100)
        }

        async fn logs_in_range(
            &self,
            _filter: &LogFilter,
            _from_block: u64,
            _to_block: Option<u64>,
        ) -> Result<Vec<RawLog>, ChainError> {
            Ok(Vec::new())
        }

        async fn block_timestamp(&self, _block_hash: &str) -> Result<i64, ChainError> {
            Ok(0)
        }
    }

    fn listener() -> Arc<ChainListener> {
        let reducer = Arc::new(EventReducer::new(Arc::new(MemoryLedger::new())));
        Arc::new(
            ChainListener::new(
                ListenerConfig::new("wss://node.example/v2/key"),
                Arc::new(NullClient),
                reducer,
            )
            .unwrap(),
        )
    }

    #[test]
    fn failover_after_threshold_consecutive_faults() {
        let mut state = FailoverState::new(3);
        assert_eq!(state.record_fault(), None);
        assert_eq!(state.record_fault(), None);
        assert_eq!(state.record_fault(), Some(TransportMode::Poll));
        state.switch_to(TransportMode::Poll);
        assert_eq!(state.mode, TransportMode::Poll);
        assert_eq!(state.error_count, 0);
    }

    #[test]
    fn good_batch_forgives_prior_faults() {
        let mut state = FailoverState::new(3);
        state.record_fault();
        state.record_fault();
        state.record_success();
        // Counter restarted: two more faults are still under threshold.
        assert_eq!(state.record_fault(), None);
        assert_eq!(state.record_fault(), None);
        assert_eq!(state.record_fault(), Some(TransportMode::Poll));
    }

    #[test]
    fn faults_while_polling_never_request_a_switch() {
        let mut state = FailoverState::new(3);
        state.switch_to(TransportMode::Poll);
        for _ in 0..10 {
            assert_eq!(state.record_fault(), None);
        }
    }

    #[test]
    fn recovery_switches_back_to_push() {
        let mut state = FailoverState::new(3);
        state.switch_to(TransportMode::Poll);
        state.switch_to(TransportMode::Push);
        assert_eq!(state.mode, TransportMode::Push);
        assert_eq!(state.error_count, 0);
    }

    #[tokio::test]
    async fn batch_events_are_applied_in_order() {
        let listener = listener();
        let wallet = WalletAddress::new("0xWallet000000000000000000000000000000000a");

        let batch = vec![
            ChainEvent::MembershipPaid(PaymentEvent {
                wallet: wallet.clone(),
                months: 12,
                amount: 120_000_000,
                year_count: 1,
                month_count: 0,
                tx_hash: "0x1".into(),
                block_number: 1,
                block_timestamp: None,
            }),
            ChainEvent::BadgeMinted(BadgeMintEvent {
                wallet: wallet.clone(),
                badge_id: BadgeId::DEFI_NOVICE,
                tx_hash: "0x2".into(),
                block_number: 2,
            }),
        ];
        listener.apply_batch(batch).await;

        let ledger = listener.reducer.ledger();
        let membership = ledger.membership(&wallet).await.unwrap().unwrap();
        assert_eq!(membership.tier, MembershipTier::Yearly);
        let badges = ledger.badges(&wallet).await.unwrap();
        assert!(badges.iter().any(|b| b.badge_id == BadgeId::DEFI_NOVICE && b.nft_minted));
    }

    #[tokio::test]
    async fn start_is_idempotent_and_stop_is_reentrant() {
        let listener = listener();
        listener.start();
        listener.start();
        assert!(listener.running.load(Ordering::SeqCst));

        listener.stop();
        listener.stop();
        // Give the supervision loop a moment to wind down.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!listener.running.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn repeated_connect_failures_fail_over_to_poll() {
        // Nothing listens here: every push subscription dies on connect,
        // and each death must be followed by a reconnect attempt until the
        // threshold switches the machine to poll mode.
        let mut config = ListenerConfig::new("ws://127.0.0.1:9");
        config.settle_delay_ms = 10;
        config.payment_poll_interval_ms = 25;
        config.badge_poll_interval_ms = 25;

        let client = Arc::new(CountingClient {
            head_queries: AtomicU64::new(0),
        });
        let reducer = Arc::new(EventReducer::new(Arc::new(MemoryLedger::new())));
        let listener =
            Arc::new(ChainListener::new(config, client.clone(), reducer).unwrap());
        listener.start();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while client.head_queries.load(Ordering::SeqCst) == 0 {
            assert!(
                tokio::time::Instant::now() < deadline,
                "listener never failed over to poll"
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        listener.stop();
    }
}
