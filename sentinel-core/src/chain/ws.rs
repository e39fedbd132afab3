//! Push subscriptions over WebSocket (`eth_subscribe`).
//!
//! Each watch target runs one task that holds a socket open, decodes log
//! notifications and forwards them to the feed channel. Any socket-level
//! failure is forwarded as a [`FeedMessage::Fault`] and ends the task;
//! re-establishing a subscription is the listener's decision.

use super::{ChainError, LogFilter, SubscriptionHandle, decode::decode_log};
use crate::events::{FeedMessage, FeedSender};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

const HANDSHAKE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// Spawn a push subscription for one watch target.
pub fn spawn_push_subscription(
    ws_url: Url,
    filter: LogFilter,
    feed: FeedSender,
    label: &'static str,
) -> SubscriptionHandle {
    let handle = tokio::spawn(async move {
        if let Err(e) = run_push(&ws_url, &filter, &feed, label).await {
            tracing::warn!(subscription = label, error = %e, "Push subscription failed");
            let _ = feed.send(FeedMessage::Fault(e)).await;
        }
    });
    SubscriptionHandle::new(label, handle)
}

/// Lightweight push-transport health probe.
///
/// Connects, performs the `eth_subscribe` handshake and drops the
/// connection. Used to decide whether the listener can recover from poll
/// mode back to push mode.
pub async fn probe_push(ws_url: &Url, filter: &LogFilter) -> Result<(), ChainError> {
    tokio::time::timeout(HANDSHAKE_TIMEOUT, async {
        let (ws_stream, _) = connect_async(ws_url.as_str()).await?;
        let (mut write, mut read) = ws_stream.split();
        write
            .send(Message::Text(subscribe_request(filter).to_string()))
            .await?;
        while let Some(msg) = read.next().await {
            if let Message::Text(text) = msg? {
                ack_subscription(&text)?;
                return Ok(());
            }
        }
        Err(ChainError::Transport("websocket closed during probe".into()))
    })
    .await
    .map_err(|_| ChainError::Transport("push probe timed out".into()))?
}

fn subscribe_request(filter: &LogFilter) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "eth_subscribe",
        "params": ["logs", {
            "address": filter.address,
            "topics": filter.topics_json(),
        }]
    })
}

/// Parse the subscription acknowledgement frame, returning the id.
fn ack_subscription(text: &str) -> Result<String, ChainError> {
    let frame: Value = serde_json::from_str(text)
        .map_err(|e| ChainError::Decode(format!("bad subscribe ack: {e}")))?;
    if let Some(error) = frame.get("error") {
        return Err(ChainError::Rpc {
            code: error.get("code").and_then(Value::as_i64).unwrap_or(0),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("subscription rejected")
                .to_owned(),
        });
    }
    frame
        .get("result")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| ChainError::Decode("subscribe ack carries no subscription id".into()))
}

async fn run_push(
    ws_url: &Url,
    filter: &LogFilter,
    feed: &FeedSender,
    label: &'static str,
) -> Result<(), ChainError> {
    let (ws_stream, _) = connect_async(ws_url.as_str()).await?;
    let (mut write, mut read) = ws_stream.split();

    write
        .send(Message::Text(subscribe_request(filter).to_string()))
        .await?;

    let mut subscription_id: Option<String> = None;

    while let Some(msg) = read.next().await {
        match msg? {
            Message::Text(text) => {
                if subscription_id.is_none() {
                    subscription_id = Some(ack_subscription(&text)?);
                    tracing::info!(
                        subscription = label,
                        id = subscription_id.as_deref().unwrap_or(""),
                        "Push subscription established"
                    );
                    continue;
                }
                forward_notification(&text, feed, label).await;
            }
            Message::Ping(data) => write.send(Message::Pong(data)).await?,
            Message::Close(frame) => {
                return Err(ChainError::Transport(format!(
                    "websocket closed by peer: {frame:?}"
                )));
            }
            _ => {}
        }
    }

    Err(ChainError::Transport("websocket stream ended".into()))
}

/// Decode one `eth_subscription` notification and forward it.
///
/// Malformed payloads are a data problem: they are logged and dropped
/// without touching the transport failure path.
async fn forward_notification(text: &str, feed: &FeedSender, label: &'static str) {
    let frame: Value = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(subscription = label, error = %e, "Dropping unparseable frame");
            return;
        }
    };
    if frame.get("method").and_then(Value::as_str) != Some("eth_subscription") {
        return;
    }
    let Some(result) = frame.pointer("/params/result") else {
        tracing::warn!(subscription = label, "Notification carries no log payload");
        return;
    };

    let raw: super::RawLog = match serde_json::from_value(result.clone()) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(subscription = label, error = %e, "Dropping malformed log object");
            return;
        }
    };
    if raw.removed {
        tracing::debug!(subscription = label, tx = %raw.transaction_hash, "Skipping reorged log");
        return;
    }
    match decode_log(&raw) {
        Ok(event) => {
            let _ = feed.send(FeedMessage::Batch(vec![event])).await;
        }
        Err(e) => {
            tracing::warn!(subscription = label, error = %e, "Dropping undecodable log");
        }
    }
}
