//! Poll subscriptions over fixed-interval `eth_getLogs`.
//!
//! The fallback transport. Each watch target runs one task that tracks
//! the last block it has seen and queries the range above it on every
//! tick. Batches and faults travel the same feed channel as in push
//! mode, so the listener treats both transports identically.

use super::{ChainClient, ChainError, LogFilter, SubscriptionHandle, decode::decode_log};
use crate::events::{ChainEvent, FeedMessage, FeedSender};
use std::sync::Arc;
use std::time::Duration;

/// Spawn a poll subscription for one watch target.
pub fn spawn_poll_subscription(
    client: Arc<dyn ChainClient>,
    filter: LogFilter,
    poll_interval: Duration,
    feed: FeedSender,
    label: &'static str,
) -> SubscriptionHandle {
    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // Start from the chain head: the poll feed only reports events
        // that happen from now on, matching push-mode behavior.
        let mut last_seen: Option<u64> = None;

        loop {
            interval.tick().await;
            match poll_once(client.as_ref(), &filter, &mut last_seen, label).await {
                Ok(events) => {
                    if !events.is_empty()
                        && feed.send(FeedMessage::Batch(events)).await.is_err()
                    {
                        return;
                    }
                }
                Err(e) => {
                    tracing::warn!(subscription = label, error = %e, "Poll round failed");
                    if feed.send(FeedMessage::Fault(e)).await.is_err() {
                        return;
                    }
                }
            }
        }
    });
    SubscriptionHandle::new(label, handle)
}

async fn poll_once(
    client: &dyn ChainClient,
    filter: &LogFilter,
    last_seen: &mut Option<u64>,
    label: &'static str,
) -> Result<Vec<ChainEvent>, ChainError> {
    let latest = client.latest_block().await?;

    let from_block = match *last_seen {
        None => {
            *last_seen = Some(latest);
            return Ok(Vec::new());
        }
        Some(seen) if latest <= seen => return Ok(Vec::new()),
        Some(seen) => seen + 1,
    };

    let logs = client.logs_in_range(filter, from_block, Some(latest)).await?;
    *last_seen = Some(latest);

    let mut events = Vec::with_capacity(logs.len());
    for log in &logs {
        if log.removed {
            continue;
        }
        match decode_log(log) {
            Ok(event) => events.push(event),
            Err(e) => {
                tracing::warn!(subscription = label, error = %e, "Dropping undecodable log");
            }
        }
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{MEMBERSHIP_PAID_TOPIC, RawLog};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedClient {
        heads: Mutex<Vec<u64>>,
        logs: Mutex<Vec<Vec<RawLog>>>,
    }

    #[async_trait]
    impl ChainClient for ScriptedClient {
        async fn latest_block(&self) -> Result<u64, ChainError> {
            let mut heads = self.heads.lock().unwrap();
            if heads.is_empty() {
                Err(ChainError::Transport("script exhausted".into()))
            } else {
                Ok(heads.remove(0))
            }
        }

        async fn logs_in_range(
            &self,
            _filter: &LogFilter,
            _from_block: u64,
            _to_block: Option<u64>,
        ) -> Result<Vec<RawLog>, ChainError> {
            let mut logs = self.logs.lock().unwrap();
            if logs.is_empty() {
                Ok(Vec::new())
            } else {
                Ok(logs.remove(0))
            }
        }

        async fn block_timestamp(&self, _block_hash: &str) -> Result<i64, ChainError> {
            Ok(0)
        }
    }

    fn payment_log(block: u64) -> RawLog {
        RawLog {
            address: "0xcontract".into(),
            topics: vec![
                MEMBERSHIP_PAID_TOPIC.clone(),
                format!("0x{:0>64}", "abcdef0123456789abcdef0123456789abcdef01"),
            ],
            data: format!("0x{:064x}{:064x}{:064x}{:064x}", 1, 5_000_000, 0, 1),
            block_number: format!("0x{block:x}"),
            block_hash: None,
            transaction_hash: format!("0xtx{block}"),
            removed: false,
        }
    }

    #[tokio::test]
    async fn first_round_only_records_the_head() {
        let client = ScriptedClient {
            heads: Mutex::new(vec![100]),
            logs: Mutex::new(vec![vec![payment_log(100)]]),
        };
        let filter = LogFilter::membership_paid("0xcontract");
        let mut last_seen = None;

        let events = poll_once(&client, &filter, &mut last_seen, "test").await.unwrap();
        assert!(events.is_empty());
        assert_eq!(last_seen, Some(100));
    }

    #[tokio::test]
    async fn later_rounds_decode_new_logs() {
        let client = ScriptedClient {
            heads: Mutex::new(vec![105]),
            logs: Mutex::new(vec![vec![payment_log(103), payment_log(104)]]),
        };
        let filter = LogFilter::membership_paid("0xcontract");
        let mut last_seen = Some(100);

        let events = poll_once(&client, &filter, &mut last_seen, "test").await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(last_seen, Some(105));
    }

    #[tokio::test]
    async fn unchanged_head_yields_no_query() {
        let client = ScriptedClient {
            heads: Mutex::new(vec![100]),
            logs: Mutex::new(Vec::new()),
        };
        let filter = LogFilter::membership_paid("0xcontract");
        let mut last_seen = Some(100);

        let events = poll_once(&client, &filter, &mut last_seen, "test").await.unwrap();
        assert!(events.is_empty());
    }
}
