//! Feed channel factory.
//!
//! Subscription tasks push [`FeedMessage`]s into a bounded channel and the
//! listener drains it, making backpressure and ordering explicit.

use super::types::FeedMessage;
use tokio::sync::mpsc;

/// Default buffer size for the feed channel.
///
/// Enough to absorb bursts from a reconnect replay while keeping memory
/// bounded.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

/// Sender handle for feed messages.
pub type FeedSender = mpsc::Sender<FeedMessage>;
/// Receiver handle for feed messages.
pub type FeedReceiver = mpsc::Receiver<FeedMessage>;

/// Create the feed channel between subscription tasks and the listener.
pub fn feed_channel() -> (FeedSender, FeedReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}
