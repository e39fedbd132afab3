//! Event type definitions.
//!
//! Each consumed contract event has a strongly-typed decoded form. Events
//! are ephemeral: they are used once to derive ledger mutations and are
//! never persisted as their own entities.

use crate::chain::ChainError;
use crate::entities::{BadgeId, WalletAddress};

/// Decoded `MembershipPaid(address,uint256,uint256,uint256,uint256)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentEvent {
    pub wallet: WalletAddress,
    pub months: u32,
    /// Raw amount in 6-decimal USDC units.
    pub amount: u128,
    pub year_count: u32,
    pub month_count: u32,
    pub tx_hash: String,
    pub block_number: u64,
    /// Unix seconds of the containing block, when known.
    pub block_timestamp: Option<i64>,
}

/// Decoded `BadgeMinted(address,uint256)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadgeMintEvent {
    pub wallet: WalletAddress,
    pub badge_id: BadgeId,
    pub tx_hash: String,
    pub block_number: u64,
}

/// A decoded contract event, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
    MembershipPaid(PaymentEvent),
    BadgeMinted(BadgeMintEvent),
}

impl ChainEvent {
    pub fn wallet(&self) -> &WalletAddress {
        match self {
            ChainEvent::MembershipPaid(e) => &e.wallet,
            ChainEvent::BadgeMinted(e) => &e.wallet,
        }
    }

    pub fn tx_hash(&self) -> &str {
        match self {
            ChainEvent::MembershipPaid(e) => &e.tx_hash,
            ChainEvent::BadgeMinted(e) => &e.tx_hash,
        }
    }
}

/// Events observed together, in chain order.
///
/// Ordering holds within one batch only; batches spanning a reconnect
/// carry no ordering guarantee relative to each other.
pub type EventBatch = Vec<ChainEvent>;

/// Message flowing from a subscription task to the listener.
///
/// Transport faults travel the same pipe as event batches so that the
/// listener has a single place to count failures.
#[derive(Debug)]
pub enum FeedMessage {
    Batch(EventBatch),
    Fault(ChainError),
}
