//! Decoded chain events and channel infrastructure.
//!
//! Contract logs are decoded into tagged variants at the chain adapter
//! boundary; nothing downstream ever sees a raw log object. Delivery is
//! at-least-once: duplicates across reconnects are expected and the
//! reducer is responsible for tolerating them.

pub mod channels;
pub mod types;

pub use channels::{FeedReceiver, FeedSender, DEFAULT_CHANNEL_BUFFER, feed_channel};
pub use types::{BadgeMintEvent, ChainEvent, EventBatch, FeedMessage, PaymentEvent};
