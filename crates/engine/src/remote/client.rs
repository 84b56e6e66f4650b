//! `reqwest` implementation of the storefront gateway.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value as JsonValue;
use tracing::{debug, instrument};
use url::Url;

use super::{HttpMethod, RemoteError, RemoteGateway};

/// Request timeout enforced on every storefront call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest response body kept in an error message.
const MAX_ERROR_BODY: usize = 500;

/// Storefront REST client.
///
/// The Basic auth token is derived once from the consumer key and secret at
/// construction and is never logged.
#[derive(Clone)]
pub struct RemoteClient {
    client: reqwest::Client,
    base_url: String,
    token: SecretString,
}

impl std::fmt::Debug for RemoteClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteClient")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl RemoteClient {
    /// Create a client for the storefront at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::MissingConfig` if any argument is empty,
    /// `RemoteError::InvalidUrl` if the base URL does not parse, and
    /// `RemoteError::Transport` if the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        consumer_key: &str,
        consumer_secret: &SecretString,
    ) -> Result<Self, RemoteError> {
        if base_url.trim().is_empty() {
            return Err(RemoteError::MissingConfig("base_url"));
        }
        if consumer_key.is_empty() {
            return Err(RemoteError::MissingConfig("consumer_key"));
        }
        if consumer_secret.expose_secret().is_empty() {
            return Err(RemoteError::MissingConfig("consumer_secret"));
        }

        let mut base_url = base_url.trim().to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Url::parse(&base_url)?;

        let token = BASE64.encode(format!(
            "{consumer_key}:{}",
            consumer_secret.expose_secret()
        ));

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url,
            token: SecretString::from(token),
        })
    }

    /// Base URL requests are resolved against.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint_url(&self, endpoint: &str) -> Result<Url, RemoteError> {
        Ok(Url::parse(&format!(
            "{}{}",
            self.base_url,
            endpoint.trim_start_matches('/')
        ))?)
    }
}

#[async_trait]
impl RemoteGateway for RemoteClient {
    #[instrument(skip(self, params), fields(endpoint = %endpoint, method = %method))]
    async fn request(
        &self,
        endpoint: &str,
        method: HttpMethod,
        params: JsonValue,
    ) -> Result<JsonValue, RemoteError> {
        let mut url = self.endpoint_url(endpoint)?;

        let builder = match method {
            HttpMethod::Get => {
                append_query(&mut url, &params);
                self.client.get(url)
            }
            HttpMethod::Post => self.client.post(url).json(&params),
            HttpMethod::Put => self.client.put(url).json(&params),
            HttpMethod::Delete => self.client.delete(url),
        };

        let response = builder
            .header(
                "Authorization",
                format!("Basic {}", self.token.expose_secret()),
            )
            .header("Content-Type", "application/json")
            .send()
            .await?;

        let status = response.status();
        debug!(status = status.as_u16(), "storefront responded");

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Auth(format!(
                "HTTP {}: {}",
                status.as_u16(),
                truncate(&body)
            )));
        }

        let body = response.text().await?;

        if !status.is_success() {
            return Err(RemoteError::Http {
                status: status.as_u16(),
                body: truncate(&body),
            });
        }

        if body.trim().is_empty() {
            return Ok(JsonValue::Null);
        }

        Ok(serde_json::from_str(&body)?)
    }
}

/// Flatten a JSON object into query parameters.
///
/// Arrays become comma-separated lists; nulls are dropped; nested objects are
/// sent as JSON text.
fn append_query(url: &mut Url, params: &JsonValue) {
    let JsonValue::Object(map) = params else {
        return;
    };
    if map.is_empty() {
        return;
    }

    let mut pairs = url.query_pairs_mut();
    for (key, value) in map {
        let rendered = match value {
            JsonValue::Null => continue,
            JsonValue::String(s) => s.clone(),
            JsonValue::Array(values) => values
                .iter()
                .map(scalar_to_string)
                .collect::<Vec<_>>()
                .join(","),
            other => scalar_to_string(other),
        };
        pairs.append_pair(key, &rendered);
    }
}

fn scalar_to_string(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn truncate(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
