//! Listener runtime configuration.
//!
//! Constructed once at process start and injected into the listener and
//! scanner, so both can be unit-tested without a real network. Defaults
//! match the production constants: failover after 3 transport errors, 1s
//! settle delay, 5s/10s poll intervals for the two watch targets.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sepolia deployment of the payment contract.
pub const DEFAULT_PAYMENT_CONTRACT: &str = "0x7FDeF9316dBF206f57Aab2eAaE12fC7ee63953A9";
/// Sepolia deployment of the badge NFT contract.
pub const DEFAULT_BADGE_CONTRACT: &str = "0xA1F0019EE670Aa204f56B7D142AC43C64E998cD9";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// Node endpoint. One base value; the wss/https forms are derived.
    pub rpc_url: String,

    #[serde(default = "default_payment_contract")]
    pub payment_contract: String,

    #[serde(default = "default_badge_contract")]
    pub badge_contract: String,

    /// Consecutive transport errors before failing over push→poll.
    #[serde(default = "default_error_threshold")]
    pub error_threshold: u32,

    /// Settle delay between tearing down and re-establishing
    /// subscriptions on a mode switch, to avoid rapid flapping.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    #[serde(default = "default_payment_poll_interval_ms")]
    pub payment_poll_interval_ms: u64,

    #[serde(default = "default_badge_poll_interval_ms")]
    pub badge_poll_interval_ms: u64,

    /// How often, while polling, to probe whether the push transport has
    /// recovered.
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,

    /// Block the reconciliation scan starts from.
    #[serde(default = "default_reconcile_from_block")]
    pub reconcile_from_block: u64,
}

fn default_payment_contract() -> String {
    DEFAULT_PAYMENT_CONTRACT.to_owned()
}

fn default_badge_contract() -> String {
    DEFAULT_BADGE_CONTRACT.to_owned()
}

fn default_error_threshold() -> u32 {
    3
}

fn default_settle_delay_ms() -> u64 {
    1000
}

fn default_payment_poll_interval_ms() -> u64 {
    5000
}

fn default_badge_poll_interval_ms() -> u64 {
    10_000
}

fn default_probe_interval_ms() -> u64 {
    60_000
}

fn default_reconcile_from_block() -> u64 {
    7_000_000
}

impl ListenerConfig {
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            payment_contract: default_payment_contract(),
            badge_contract: default_badge_contract(),
            error_threshold: default_error_threshold(),
            settle_delay_ms: default_settle_delay_ms(),
            payment_poll_interval_ms: default_payment_poll_interval_ms(),
            badge_poll_interval_ms: default_badge_poll_interval_ms(),
            probe_interval_ms: default_probe_interval_ms(),
            reconcile_from_block: default_reconcile_from_block(),
        }
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn payment_poll_interval(&self) -> Duration {
        Duration::from_millis(self.payment_poll_interval_ms)
    }

    pub fn badge_poll_interval(&self) -> Duration {
        Duration::from_millis(self.badge_poll_interval_ms)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_production_constants() {
        let config: ListenerConfig =
            serde_json::from_str(r#"{"rpc_url":"wss://node.example/v2/key"}"#).unwrap();
        assert_eq!(config.error_threshold, 3);
        assert_eq!(config.settle_delay(), Duration::from_secs(1));
        assert_eq!(config.payment_poll_interval(), Duration::from_secs(5));
        assert_eq!(config.badge_poll_interval(), Duration::from_secs(10));
        assert_eq!(config.reconcile_from_block, 7_000_000);
    }
}
