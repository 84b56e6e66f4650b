//! Warehouse (local commerce system) API access.
//!
//! The warehouse owns imported orders, product records, and inventory. It is
//! reached over JSON-RPC; the sync core only sees the [`LocalCommerce`] seam.

pub mod client;

pub use client::WarehouseClient;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Warehouse entity types the connector touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    Order,
    Product,
    Inventory,
    Warehouse,
}

impl Entity {
    /// API resource name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Order => "order",
            Self::Product => "product",
            Self::Inventory => "inventory",
            Self::Warehouse => "warehouse",
        }
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SearchResult {
    /// Total number of matching records.
    #[serde(rename = "totalCount", default)]
    pub total_count: u64,
    /// Matching records.
    #[serde(default)]
    pub results: Vec<JsonValue>,
}

impl SearchResult {
    /// The first matching record, if any.
    #[must_use]
    pub fn first(&self) -> Option<&JsonValue> {
        if self.total_count == 0 {
            return None;
        }
        self.results.first()
    }
}

/// Errors that can occur when talking to the warehouse.
#[derive(Debug, Error)]
pub enum LocalError {
    /// Network failure.
    #[error("Request error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Credentials rejected.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The API answered with a JSON-RPC error object.
    #[error("API error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Missing connection setting.
    #[error("Configuration parameter '{0}' is required.")]
    MissingConfig(&'static str),

    /// The configured URL is not valid.
    #[error("Invalid warehouse URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl LocalError {
    /// Whether retrying later may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            Self::Auth(_)
            | Self::Rpc { .. }
            | Self::Parse(_)
            | Self::MissingConfig(_)
            | Self::InvalidUrl(_) => false,
        }
    }
}

/// Access to the warehouse API.
#[async_trait]
pub trait LocalCommerce: Send + Sync {
    /// Search `entity` records matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns `LocalError` on transport or API failure.
    async fn search(&self, entity: Entity, filter: JsonValue) -> Result<SearchResult, LocalError>;

    /// Create an `entity` record and return the API's response object.
    ///
    /// Orders are created through the import call, which answers with
    /// `{success, unique_id, message}`.
    ///
    /// # Errors
    ///
    /// Returns `LocalError` on transport or API failure.
    async fn create(&self, entity: Entity, fields: JsonValue) -> Result<JsonValue, LocalError>;

    /// Attach a comment to the warehouse order `id`.
    ///
    /// # Errors
    ///
    /// Returns `LocalError` on transport or API failure.
    async fn comment(&self, id: &str, text: &str) -> Result<(), LocalError>;

    /// Fetch one `entity` record by id.
    ///
    /// # Errors
    ///
    /// Returns `LocalError` on transport or API failure.
    async fn get(&self, entity: Entity, id: JsonValue) -> Result<JsonValue, LocalError>;
}
