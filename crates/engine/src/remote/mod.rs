//! Storefront (WooCommerce) REST gateway.
//!
//! The storefront runs a sync extension that exposes a small REST surface
//! under `shipstream/v1/`. This module only moves JSON in and out; every
//! business decision lives in the sync core.
//!
//! # Architecture
//!
//! - [`RemoteGateway`] is the seam the sync core depends on
//! - [`RemoteClient`] implements it with `reqwest` and HTTP Basic auth
//! - No retry logic lives here - callers decide

pub mod client;
pub mod endpoints;

pub use client::RemoteClient;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use thiserror::Error;

/// HTTP method of a storefront request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    /// Method name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur when talking to the storefront.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Network failure.
    #[error("Request error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success HTTP status other than an auth rejection.
    #[error("HTTP {status}: {body}")]
    Http {
        /// Status code.
        status: u16,
        /// Response body (truncated).
        body: String,
    },

    /// The storefront rejected the consumer key/secret.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The gateway was constructed without a required setting.
    #[error("Configuration parameter '{0}' is required.")]
    MissingConfig(&'static str),

    /// The configured base URL is not a valid URL.
    #[error("Invalid base URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The storefront answered with a payload the caller cannot use.
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl RemoteError {
    /// Whether retrying the same request later may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            Self::Auth(_)
            | Self::Parse(_)
            | Self::MissingConfig(_)
            | Self::InvalidUrl(_)
            | Self::UnexpectedResponse(_) => false,
        }
    }
}

/// Authenticated request/response access to the storefront.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Send a request and return the decoded JSON response.
    ///
    /// `GET` params become the query string; `POST`/`PUT` send them as the
    /// JSON body; `DELETE` sends nothing.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::Transport`/`RemoteError::Http` on network or HTTP
    /// failure and `RemoteError::Auth` when credentials are rejected.
    async fn request(
        &self,
        endpoint: &str,
        method: HttpMethod,
        params: JsonValue,
    ) -> Result<JsonValue, RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_display() {
        let err = RemoteError::MissingConfig("base_url");
        assert_eq!(err.to_string(), "Configuration parameter 'base_url' is required.");

        let err = RemoteError::Http {
            status: 502,
            body: "bad gateway".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 502: bad gateway");
    }

    #[test]
    fn test_transient_classification() {
        assert!(
            RemoteError::Http {
                status: 503,
                body: String::new()
            }
            .is_transient()
        );
        assert!(
            !RemoteError::Http {
                status: 404,
                body: String::new()
            }
            .is_transient()
        );
        assert!(!RemoteError::Auth("nope".to_string()).is_transient());
    }
}
