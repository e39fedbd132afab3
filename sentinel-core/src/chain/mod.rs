//! Chain client adapter.
//!
//! The only component that talks to the external node. It exposes:
//! - a JSON-RPC query client for historical log scans ([`RpcClient`]),
//! - push subscriptions over WebSocket (`eth_subscribe`),
//! - poll subscriptions over fixed-interval `eth_getLogs`.
//!
//! The adapter never retries internally; every failure surfaces to the
//! caller as a [`ChainError`] and retry/failover policy lives entirely in
//! the listener.

pub mod decode;
pub mod poll;
pub mod rpc;
pub mod ws;

pub use decode::{decode_log, BADGE_MINTED_TOPIC, MEMBERSHIP_PAID_TOPIC};
pub use poll::spawn_poll_subscription;
pub use rpc::RpcClient;
pub use ws::{probe_push, spawn_push_subscription};

use crate::entities::WalletAddress;
use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use url::Url;

/// Errors surfaced by the chain adapter.
#[derive(Debug, Error)]
pub enum ChainError {
    /// Connection drop, request failure, RPC timeout. Counts against the
    /// failover counter.
    #[error("transport error: {0}")]
    Transport(String),

    /// Error object returned by the node. Counts against the failover
    /// counter.
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// Malformed or unexpected log payload. A data problem, not a
    /// connectivity problem: never counted against the failover counter.
    #[error("decode error: {0}")]
    Decode(String),

    /// The configured endpoint cannot be turned into ws/http forms.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

impl ChainError {
    /// Whether this failure should increment the transport error counter.
    pub fn is_transport(&self) -> bool {
        matches!(self, ChainError::Transport(_) | ChainError::Rpc { .. })
    }
}

impl From<reqwest::Error> for ChainError {
    fn from(value: reqwest::Error) -> Self {
        ChainError::Transport(value.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ChainError {
    fn from(value: tokio_tungstenite::tungstenite::Error) -> Self {
        ChainError::Transport(value.to_string())
    }
}

/// WebSocket and HTTP forms of the node endpoint, derived from one base
/// value. A single provider key is assumed to serve both schemes.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub ws: Url,
    pub http: Url,
}

impl Endpoints {
    pub fn derive(base: &str) -> Result<Self, ChainError> {
        let (ws, http) = if let Some(rest) = base.strip_prefix("wss://") {
            (base.to_owned(), format!("https://{rest}"))
        } else if let Some(rest) = base.strip_prefix("https://") {
            (format!("wss://{rest}"), base.to_owned())
        } else if let Some(rest) = base.strip_prefix("ws://") {
            (base.to_owned(), format!("http://{rest}"))
        } else if let Some(rest) = base.strip_prefix("http://") {
            (format!("ws://{rest}"), base.to_owned())
        } else {
            return Err(ChainError::InvalidEndpoint(base.to_owned()));
        };

        let ws = Url::parse(&ws).map_err(|e| ChainError::InvalidEndpoint(e.to_string()))?;
        let http = Url::parse(&http).map_err(|e| ChainError::InvalidEndpoint(e.to_string()))?;
        Ok(Self { ws, http })
    }
}

/// Filter for one contract event, optionally narrowed to one indexed user.
#[derive(Debug, Clone)]
pub struct LogFilter {
    pub address: String,
    pub topic0: String,
    pub topic1: Option<String>,
}

impl LogFilter {
    pub fn membership_paid(contract: &str) -> Self {
        Self {
            address: contract.to_lowercase(),
            topic0: MEMBERSHIP_PAID_TOPIC.clone(),
            topic1: None,
        }
    }

    pub fn badge_minted(contract: &str) -> Self {
        Self {
            address: contract.to_lowercase(),
            topic0: BADGE_MINTED_TOPIC.clone(),
            topic1: None,
        }
    }

    /// Narrow the filter to a single indexed wallet.
    pub fn for_wallet(mut self, wallet: &WalletAddress) -> Result<Self, ChainError> {
        let hex_part = wallet
            .as_str()
            .strip_prefix("0x")
            .unwrap_or(wallet.as_str());
        if hex_part.len() != 40 || !hex_part.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ChainError::Decode(format!(
                "not a valid address: {wallet}"
            )));
        }
        self.topic1 = Some(format!("0x{:0>64}", hex_part));
        Ok(self)
    }

    /// Topics array in `eth_getLogs` / `eth_subscribe` form.
    pub fn topics_json(&self) -> serde_json::Value {
        match &self.topic1 {
            Some(topic1) => serde_json::json!([self.topic0, topic1]),
            None => serde_json::json!([self.topic0]),
        }
    }
}

/// Undecoded log as returned by the node.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    pub block_number: String,
    pub block_hash: Option<String>,
    pub transaction_hash: String,
    #[serde(default)]
    pub removed: bool,
}

/// Query-side contract with the node.
///
/// Mocked in tests; implemented by [`RpcClient`] in production.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn latest_block(&self) -> Result<u64, ChainError>;

    /// Historical logs in `from_block ..= to_block` (latest when `None`),
    /// in chain order.
    async fn logs_in_range(
        &self,
        filter: &LogFilter,
        from_block: u64,
        to_block: Option<u64>,
    ) -> Result<Vec<RawLog>, ChainError>;

    /// Unix timestamp of the block with the given hash.
    async fn block_timestamp(&self, block_hash: &str) -> Result<i64, ChainError>;
}

/// Handle to a running subscription task.
///
/// Stopping is idempotent; stopping an already-stopped subscription is a
/// no-op. Dropping the handle stops the task.
pub struct SubscriptionHandle {
    label: &'static str,
    handle: Option<JoinHandle<()>>,
}

impl SubscriptionHandle {
    pub fn new(label: &'static str, handle: JoinHandle<()>) -> Self {
        Self {
            label,
            handle: Some(handle),
        }
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            tracing::debug!(subscription = self.label, "Stopping subscription task");
            handle.abort();
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
