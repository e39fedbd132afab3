//! JSON-RPC 2.0 client over the HTTPS form of the node endpoint.
//!
//! Used by the poll subscriptions and by the reconciliation scanner. No
//! retry or backoff here: failures surface immediately as [`ChainError`].

use super::{ChainClient, ChainError, LogFilter, RawLog};
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use url::Url;

const RPC_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// Separate a node error from the result. A `null` result is legitimate
/// for some methods (e.g. `eth_getBlockByHash` on an unknown hash) and
/// comes back as `Ok(None)`; the caller decides what that means.
fn split_response<T>(response: RpcResponse<T>) -> Result<Option<T>, ChainError> {
    if let Some(error) = response.error {
        return Err(ChainError::Rpc {
            code: error.code,
            message: error.message,
        });
    }
    Ok(response.result)
}

pub struct RpcClient {
    http_url: Url,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(http_url: Url) -> Self {
        let client = reqwest::Client::builder()
            .timeout(RPC_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http_url,
            client,
            next_id: AtomicU64::new(1),
        }
    }

    async fn request_optional<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Option<T>, ChainError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        });

        let response: RpcResponse<T> = self
            .client
            .post(self.http_url.clone())
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        split_response(response)
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, ChainError> {
        self.request_optional(method, params)
            .await?
            .ok_or_else(|| ChainError::Decode(format!("{method} returned neither result nor error")))
    }
}

#[async_trait]
impl ChainClient for RpcClient {
    async fn latest_block(&self) -> Result<u64, ChainError> {
        let number: String = self.request("eth_blockNumber", json!([])).await?;
        super::decode::parse_hex_u64(&number)
    }

    async fn logs_in_range(
        &self,
        filter: &LogFilter,
        from_block: u64,
        to_block: Option<u64>,
    ) -> Result<Vec<RawLog>, ChainError> {
        let to_block = match to_block {
            Some(block) => format!("0x{block:x}"),
            None => "latest".to_owned(),
        };
        let params = json!([{
            "address": filter.address,
            "topics": filter.topics_json(),
            "fromBlock": format!("0x{from_block:x}"),
            "toBlock": to_block,
        }]);
        self.request("eth_getLogs", params).await
    }

    async fn block_timestamp(&self, block_hash: &str) -> Result<i64, ChainError> {
        #[derive(Debug, Deserialize)]
        struct BlockHeader {
            timestamp: String,
        }

        let header: BlockHeader = self
            .request_optional("eth_getBlockByHash", json!([block_hash, false]))
            .await?
            .ok_or_else(|| ChainError::Decode(format!("unknown block {block_hash}")))?;
        let seconds = super::decode::parse_hex_u64(&header.timestamp)?;
        Ok(seconds as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_result_splits_to_none() {
        let response: RpcResponse<u64> =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":null}"#).unwrap();
        assert!(matches!(split_response(response), Ok(None)));
    }

    #[test]
    fn error_body_splits_to_rpc_error() {
        let response: RpcResponse<u64> = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"header not found"}}"#,
        )
        .unwrap();
        assert!(matches!(
            split_response(response),
            Err(ChainError::Rpc { code: -32000, .. })
        ));
    }

    #[test]
    fn value_result_splits_to_some() {
        let response: RpcResponse<u64> =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":7}"#).unwrap();
        assert!(matches!(split_response(response), Ok(Some(7))));
    }
}
