//! JSON-RPC 2.0 client for EVM nodes
//!
//! Only the three methods reconciliation needs are exposed: native balance,
//! read-only contract calls and the `net_listening` liveness check.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use primitive_types::U256;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

use crate::error::RpcError;
use crate::retry::RetryPolicy;

/// Block tag every read is made against.
pub const LATEST: &str = "latest";

#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Endpoint this client talks to, for logs.
    fn endpoint(&self) -> &str;

    /// `eth_getBalance(address, latest)`
    async fn balance(&self, address: &str) -> Result<U256, RpcError>;

    /// `eth_call({to, data}, latest)`. Returns the raw hex result.
    async fn call(&self, to: &str, data: &str) -> Result<String, RpcError>;

    /// `net_listening`
    async fn is_listening(&self) -> Result<bool, RpcError>;
}

#[derive(Debug, Deserialize)]
struct Response {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: i64,
    #[serde(default)]
    message: String,
}

/// [`ChainClient`] over HTTP(S).
pub struct JsonRpcClient {
    client: reqwest::Client,
    url: Url,
    retry: RetryPolicy,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(endpoint: &str) -> Result<Self, RpcError> {
        let url =
            Url::parse(endpoint).map_err(|_| RpcError::InvalidEndpoint(endpoint.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(RpcError::InvalidEndpoint(endpoint.to_string()));
        }

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RpcError::transport(&e))?;

        Ok(Self {
            client,
            url,
            retry: RetryPolicy::default(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
        self.retry
            .execute(|| self.send(method, params.clone()))
            .await
    }

    async fn send<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        tracing::trace!(target: "reconciler_chain::client", url = %self.url, method, id, "Sending request");

        let response = self
            .client
            .post(self.url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| RpcError::transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RpcError::Http(status.as_u16()));
        }

        let response: Response = response.json().await.map_err(|e| RpcError::transport(&e))?;
        decode_response(response)
    }
}

fn decode_response<T: DeserializeOwned>(response: Response) -> Result<T, RpcError> {
    if let Some(error) = response.error {
        return Err(RpcError::Rpc {
            code: error.code,
            message: error.message,
        });
    }
    let result = response
        .result
        .ok_or_else(|| RpcError::InvalidResponse("missing result".into()))?;
    serde_json::from_value(result).map_err(|e| RpcError::InvalidResponse(e.to_string()))
}

/// Parse a JSON-RPC quantity (`0x`-prefixed hex, no padding required).
pub fn parse_quantity(quantity: &str) -> Result<U256, RpcError> {
    let digits = quantity
        .strip_prefix("0x")
        .or_else(|| quantity.strip_prefix("0X"))
        .ok_or_else(|| RpcError::InvalidResponse(format!("quantity without 0x: {quantity}")))?;
    if digits.is_empty() {
        return Ok(U256::zero());
    }
    U256::from_str_radix(digits, 16)
        .map_err(|_| RpcError::InvalidResponse(format!("invalid quantity {quantity}")))
}

#[async_trait]
impl ChainClient for JsonRpcClient {
    fn endpoint(&self) -> &str {
        self.url.as_str()
    }

    async fn balance(&self, address: &str) -> Result<U256, RpcError> {
        let quantity: String = self
            .request("eth_getBalance", json!([address, LATEST]))
            .await?;
        parse_quantity(&quantity)
    }

    async fn call(&self, to: &str, data: &str) -> Result<String, RpcError> {
        self.request("eth_call", json!([{ "to": to, "data": data }, LATEST]))
            .await
    }

    async fn is_listening(&self) -> Result<bool, RpcError> {
        self.request("net_listening", json!([])).await
    }
}
