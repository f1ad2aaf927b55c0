/// Node JSON-RPC client
///
/// Request/response over loopback HTTP POST, authenticated with the node's
/// rotating cookie. The cookie is re-read from disk on every call - the node
/// rewrites it on restart, so caching a credential across calls is exactly
/// the failure mode the health-check recovery in the workflow exists for.
use std::path::PathBuf;
use std::time::Duration;

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::RpcError;
use crate::retry::{wait_until, PollOutcome, RetryPolicy, WaitError};

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: &'static str,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcErrorBody>,
    #[serde(default)]
    #[allow(dead_code)]
    id: Value,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// RPC error code the node uses for "wallet already exists".
const ERR_WALLET_EXISTS: i64 = -4;
/// RPC error code for "wallet already loaded".
const ERR_WALLET_ALREADY_LOADED: i64 = -35;

pub struct RpcClient {
    http: reqwest::Client,
    url: String,
    cookie_path: PathBuf,
    cookie_retry: RetryPolicy,
}

impl RpcClient {
    pub fn new(url: String, cookie_path: PathBuf) -> Self {
        Self {
            http: reqwest::Client::new(),
            url,
            cookie_path,
            // The node writes the cookie shortly after its process starts;
            // a read racing that write retries briefly instead of failing.
            cookie_retry: RetryPolicy::new(Duration::from_millis(200), 10),
        }
    }

    /// Override the cookie retry cadence (tests use a zero interval).
    pub fn with_cookie_retry(mut self, policy: RetryPolicy) -> Self {
        self.cookie_retry = policy;
        self
    }

    /// Read the cookie fresh from disk, retrying while the file does not
    /// exist yet. Never cached beyond this single call.
    async fn read_cookie(&self) -> Result<String, RpcError> {
        let path = self.cookie_path.clone();
        let result = wait_until(&self.cookie_retry, |_| {
            let path = path.clone();
            async move {
                match tokio::fs::read_to_string(&path).await {
                    Ok(contents) => PollOutcome::Ready(contents.trim().to_string()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => PollOutcome::NotYet,
                    Err(e) => PollOutcome::Failed(RpcError::CookieUnreadable(e)),
                }
            }
        })
        .await;

        match result {
            Ok(cookie) => Ok(cookie),
            Err(WaitError::Aborted(e)) => Err(e),
            Err(WaitError::TimedOut { .. }) => Err(RpcError::CookieNotFound(
                self.cookie_path.display().to_string(),
            )),
        }
    }

    async fn call_at(&self, url: &str, method: &str, params: Value) -> Result<Value, RpcError> {
        let cookie = self.read_cookie().await?;
        let auth = format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(cookie.as_bytes())
        );

        let request = RpcRequest {
            jsonrpc: "1.0",
            id: "ord-harness",
            method,
            params,
        };

        let response = self
            .http
            .post(url)
            .header(reqwest::header::AUTHORIZATION, auth)
            .json(&request)
            .send()
            .await?;

        // The node answers RPC-level errors with a non-2xx status but still
        // carries the envelope in the body, so decode before checking status.
        let status = response.status();
        let text = response.text().await?;
        let envelope: RpcResponse = serde_json::from_str(&text).map_err(|_| {
            RpcError::Malformed(format!("HTTP {}: {}", status.as_u16(), text.trim()))
        })?;

        if let Some(err) = envelope.error {
            return Err(RpcError::Server {
                code: err.code,
                message: err.message,
            });
        }
        envelope
            .result
            .ok_or_else(|| RpcError::Malformed("response has neither result nor error".into()))
    }

    /// Issue a node-scoped call.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        self.call_at(&self.url, method, params).await
    }

    /// Issue a wallet-scoped call against `/wallet/{name}`.
    pub async fn call_wallet(
        &self,
        wallet: &str,
        method: &str,
        params: Value,
    ) -> Result<Value, RpcError> {
        let url = format!("{}/wallet/{}", self.url, wallet);
        self.call_at(&url, method, params).await
    }

    // ------------------------------------------------------------------
    // Consumed methods
    // ------------------------------------------------------------------

    /// Chain-status query used as the readiness probe. The returned fields
    /// are not validated beyond successful deserialization.
    pub async fn get_blockchain_info(&self) -> Result<Value, RpcError> {
        self.call("getblockchaininfo", json!([])).await
    }

    pub async fn get_block_count(&self) -> Result<u64, RpcError> {
        let value = self.call("getblockcount", json!([])).await?;
        value
            .as_u64()
            .ok_or_else(|| RpcError::Malformed(format!("getblockcount returned {}", value)))
    }

    /// Idempotent: an "already exists" answer from the node is success.
    pub async fn create_wallet(&self, name: &str) -> Result<(), RpcError> {
        match self.call("createwallet", json!([name])).await {
            Ok(_) => Ok(()),
            Err(RpcError::Server { code, ref message })
                if code == ERR_WALLET_EXISTS || message.contains("already exists") =>
            {
                log::debug!("Node wallet '{}' already exists", name);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Idempotent: "already loaded" is success.
    pub async fn load_wallet(&self, name: &str) -> Result<(), RpcError> {
        match self.call("loadwallet", json!([name])).await {
            Ok(_) => Ok(()),
            Err(RpcError::Server { code, ref message })
                if code == ERR_WALLET_ALREADY_LOADED || message.contains("already loaded") =>
            {
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn unload_wallet(&self, name: &str) -> Result<(), RpcError> {
        self.call("unloadwallet", json!([name])).await.map(|_| ())
    }

    pub async fn list_wallets(&self) -> Result<Vec<String>, RpcError> {
        let value = self.call("listwallets", json!([])).await?;
        serde_json::from_value(value.clone())
            .map_err(|_| RpcError::Malformed(format!("listwallets returned {}", value)))
    }

    pub async fn get_new_address(&self, wallet: &str) -> Result<String, RpcError> {
        let value = self.call_wallet(wallet, "getnewaddress", json!([])).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| RpcError::Malformed(format!("getnewaddress returned {}", value)))
    }

    /// Mine `count` blocks paying the given address. Regtest affordance; the
    /// workflow guards the network before calling this.
    pub async fn generate_to_address(
        &self,
        count: u64,
        address: &str,
    ) -> Result<Vec<String>, RpcError> {
        let value = self
            .call("generatetoaddress", json!([count, address]))
            .await?;
        serde_json::from_value(value.clone())
            .map_err(|_| RpcError::Malformed(format!("generatetoaddress returned {}", value)))
    }

    pub async fn get_balances(&self, wallet: &str) -> Result<Value, RpcError> {
        self.call_wallet(wallet, "getbalances", json!([])).await
    }

    pub async fn get_wallet_info(&self, wallet: &str) -> Result<Value, RpcError> {
        self.call_wallet(wallet, "getwalletinfo", json!([])).await
    }

    /// Ask the node to shut down gracefully.
    pub async fn stop(&self) -> Result<(), RpcError> {
        self.call("stop", json!([])).await.map(|_| ())
    }
}
