//! JSON-RPC transport used by the executor.

use std::{future::Future, time::Duration};

use anyhow::Context;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use url::Url;

/// Per-request HTTP timeout. Receipt waits are bounded separately by [`poll_until`].
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub fn create_client() -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("Failed to build JSON-RPC client")
}

/// Response envelope. A node answers with either `result` or `error`.
#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// Send one request to the node and decode its `result`.
///
/// A `null` result decodes only when `T` accepts it, e.g. `Option<_>`.
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &Url,
    method: &str,
    params: Vec<Value>,
) -> anyhow::Result<T> {
    let request = serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": method,
        "params": params,
    });

    let response: RpcResponse<Value> = client
        .post(url.clone())
        .json(&request)
        .send()
        .await
        .with_context(|| format!("{method} request to {url} failed"))?
        .json()
        .await
        .with_context(|| format!("{method} returned a malformed response"))?;

    if let Some(error) = response.error {
        anyhow::bail!("{method} rejected by node ({}): {}", error.code, error.message);
    }

    serde_json::from_value(response.result.unwrap_or(Value::Null))
        .with_context(|| format!("Unexpected {method} result"))
}

/// Call `poll_fn` every `interval` until it yields a value, for at most `timeout`.
///
/// Errors from `poll_fn` end the wait immediately.
pub async fn poll_until<T, F, Fut>(
    name: &str,
    timeout: Duration,
    interval: Duration,
    poll_fn: F,
) -> anyhow::Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = anyhow::Result<Option<T>>>,
{
    let start = std::time::Instant::now();

    loop {
        if let Some(value) = poll_fn().await? {
            return Ok(value);
        }

        if start.elapsed() >= timeout {
            anyhow::bail!("Timeout waiting for {name}");
        }

        tracing::trace!(%name, "Still waiting");
        tokio::time::sleep(interval).await;
    }
}
