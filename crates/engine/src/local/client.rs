//! JSON-RPC client for the warehouse API.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use tracing::{debug, instrument};
use url::Url;

use super::{Entity, LocalCommerce, LocalError, SearchResult};

/// Path of the JSON-RPC endpoint below the warehouse base URL.
const RPC_PATH: &str = "api/jsonrpc";

/// Warehouse JSON-RPC client.
///
/// Cheap to clone; clones share the HTTP connection pool and request ids.
#[derive(Clone)]
pub struct WarehouseClient {
    inner: Arc<WarehouseClientInner>,
}

struct WarehouseClientInner {
    client: reqwest::Client,
    endpoint: Url,
    token: SecretString,
    next_id: AtomicU64,
}

impl std::fmt::Debug for WarehouseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WarehouseClient")
            .field("endpoint", &self.inner.endpoint.as_str())
            .field("token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<JsonValue>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

impl WarehouseClient {
    /// Create a client for the warehouse at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `LocalError::MissingConfig` for empty settings,
    /// `LocalError::InvalidUrl` for an unparseable URL, and
    /// `LocalError::Transport` if the HTTP client cannot be built.
    pub fn new(base_url: &str, username: &str, api_key: &SecretString) -> Result<Self, LocalError> {
        if base_url.trim().is_empty() {
            return Err(LocalError::MissingConfig("warehouse_url"));
        }
        if username.is_empty() {
            return Err(LocalError::MissingConfig("warehouse_user"));
        }
        if api_key.expose_secret().is_empty() {
            return Err(LocalError::MissingConfig("warehouse_key"));
        }

        let mut base = base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let endpoint = Url::parse(&base)?.join(RPC_PATH)?;

        let token = BASE64.encode(format!("{username}:{}", api_key.expose_secret()));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            inner: Arc::new(WarehouseClientInner {
                client,
                endpoint,
                token: SecretString::from(token),
                next_id: AtomicU64::new(1),
            }),
        })
    }

    /// Call a JSON-RPC method and return its `result`.
    ///
    /// # Errors
    ///
    /// Returns `LocalError::Rpc` when the API answers with an error object.
    #[instrument(skip(self, params), fields(method = %method))]
    pub async fn call(&self, method: &str, params: JsonValue) -> Result<JsonValue, LocalError> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self
            .inner
            .client
            .post(self.inner.endpoint.clone())
            .header(
                "Authorization",
                format!("Basic {}", self.inner.token.expose_secret()),
            )
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        debug!(status = status.as_u16(), "warehouse responded");

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(LocalError::Auth(format!("HTTP {}", status.as_u16())));
        }

        let text = response.text().await?;
        if !status.is_success() {
            return Err(LocalError::Http {
                status: status.as_u16(),
                body: text.chars().take(500).collect(),
            });
        }

        let rpc: RpcResponse = serde_json::from_str(&text)?;
        if let Some(error) = rpc.error {
            return Err(LocalError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        Ok(rpc.result.unwrap_or(JsonValue::Null))
    }
}

#[async_trait]
impl LocalCommerce for WarehouseClient {
    async fn search(&self, entity: Entity, filter: JsonValue) -> Result<SearchResult, LocalError> {
        let result = self
            .call(&format!("{entity}.search"), json!([filter, [], []]))
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn create(&self, entity: Entity, fields: JsonValue) -> Result<JsonValue, LocalError> {
        let method = match entity {
            Entity::Order => "order.import".to_string(),
            other => format!("{other}.create"),
        };
        self.call(&method, json!([fields])).await
    }

    async fn comment(&self, id: &str, text: &str) -> Result<(), LocalError> {
        self.call("order.comment", json!([id, text])).await?;
        Ok(())
    }

    async fn get(&self, entity: Entity, id: JsonValue) -> Result<JsonValue, LocalError> {
        self.call(&format!("{entity}.get"), json!([id])).await
    }
}
