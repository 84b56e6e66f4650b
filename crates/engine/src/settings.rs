//! Connector settings.
//!
//! Settings are plain strings keyed by [`SettingKey`]. The store is a seam:
//! the server layers the Postgres settings table over the environment, tests
//! use [`MemoryConfigStore`]. [`ConnectorSettings`] is a typed snapshot read
//! at the start of each operation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use thiserror::Error;
use tokio::sync::RwLock;
use woosync_core::{ShippingRule, StatusFilter};

use crate::classify::RuleError;
use crate::remote::{RemoteClient, RemoteError};

/// Connector setting keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    /// Storefront base URL.
    ApiUrl,
    /// Storefront REST consumer key.
    ApiLogin,
    /// Storefront REST consumer secret.
    ApiPassword,
    /// Start date (`YYYY-MM-DD`) of a manual order sync.
    SyncOrdersSince,
    /// Storefront status picked up by the incremental pull (`custom` for a list).
    AutoFulfillStatus,
    /// Comma-separated statuses when `auto_fulfill_status` is `custom`.
    AutoFulfillCustom,
    /// JSON array of shipping method rules.
    ShippingMethodConfig,
    /// Order transform script.
    OrderTransformScript,
    /// Public URL the storefront uses to reach this connector.
    CallbackUrl,
}

impl SettingKey {
    pub const ALL: [Self; 9] = [
        Self::ApiUrl,
        Self::ApiLogin,
        Self::ApiPassword,
        Self::SyncOrdersSince,
        Self::AutoFulfillStatus,
        Self::AutoFulfillCustom,
        Self::ShippingMethodConfig,
        Self::OrderTransformScript,
        Self::CallbackUrl,
    ];

    /// Storage key.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ApiUrl => "api_url",
            Self::ApiLogin => "api_login",
            Self::ApiPassword => "api_password",
            Self::SyncOrdersSince => "sync_orders_since",
            Self::AutoFulfillStatus => "auto_fulfill_status",
            Self::AutoFulfillCustom => "auto_fulfill_custom",
            Self::ShippingMethodConfig => "shipping_method_config",
            Self::OrderTransformScript => "order_transform_script",
            Self::CallbackUrl => "callback_url",
        }
    }

    /// Environment variable holding the setting (`WOOSYNC_<KEY>`).
    #[must_use]
    pub fn env_var(self) -> String {
        format!("WOOSYNC_{}", self.as_str().to_ascii_uppercase())
    }

    /// Whether the value must never be logged.
    #[must_use]
    pub const fn is_secret(self) -> bool {
        matches!(self, Self::ApiPassword)
    }
}

impl std::fmt::Display for SettingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SettingKey {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| SettingsError::UnknownKey(s.to_string()))
    }
}

/// Error type for settings operations.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("unknown setting: {0}")]
    UnknownKey(String),
}

/// Persistent connector configuration.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Read a setting. Empty values read as absent.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if the backing store fails.
    async fn get(&self, key: SettingKey) -> Result<Option<String>, SettingsError>;

    /// Write a setting. Returns `false` if the store is read-only.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if the backing store fails.
    async fn set(&self, key: SettingKey, value: &str) -> Result<bool, SettingsError>;
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// =============================================================================
// Stores
// =============================================================================

/// Read-only settings taken from `WOOSYNC_<KEY>` environment variables.
#[derive(Default)]
pub struct EnvConfigStore {
    values: HashMap<SettingKey, String>,
}

impl std::fmt::Debug for EnvConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<_> = self.values.keys().map(|k| k.as_str()).collect();
        keys.sort_unstable();
        f.debug_struct("EnvConfigStore").field("keys", &keys).finish()
    }
}

impl EnvConfigStore {
    /// Snapshot the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let values = SettingKey::ALL
            .into_iter()
            .filter_map(|key| non_empty(lookup(&key.env_var())).map(|value| (key, value)))
            .collect();
        Self { values }
    }
}

#[async_trait]
impl ConfigStore for EnvConfigStore {
    async fn get(&self, key: SettingKey) -> Result<Option<String>, SettingsError> {
        Ok(self.values.get(&key).cloned())
    }

    async fn set(&self, _key: SettingKey, _value: &str) -> Result<bool, SettingsError> {
        Ok(false)
    }
}

/// In-memory settings.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    values: RwLock<HashMap<SettingKey, String>>,
}

impl MemoryConfigStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style initial value.
    #[must_use]
    pub fn with(mut self, key: SettingKey, value: impl Into<String>) -> Self {
        self.values.get_mut().insert(key, value.into());
        self
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn get(&self, key: SettingKey) -> Result<Option<String>, SettingsError> {
        Ok(non_empty(self.values.read().await.get(&key).cloned()))
    }

    async fn set(&self, key: SettingKey, value: &str) -> Result<bool, SettingsError> {
        self.values.write().await.insert(key, value.to_string());
        Ok(true)
    }
}

/// A writable store read before a fallback.
pub struct LayeredConfigStore {
    primary: Arc<dyn ConfigStore>,
    fallback: Arc<dyn ConfigStore>,
}

impl LayeredConfigStore {
    #[must_use]
    pub fn new(primary: Arc<dyn ConfigStore>, fallback: Arc<dyn ConfigStore>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl ConfigStore for LayeredConfigStore {
    async fn get(&self, key: SettingKey) -> Result<Option<String>, SettingsError> {
        if let Some(value) = self.primary.get(key).await? {
            return Ok(Some(value));
        }
        self.fallback.get(key).await
    }

    async fn set(&self, key: SettingKey, value: &str) -> Result<bool, SettingsError> {
        self.primary.set(key, value).await
    }
}

// =============================================================================
// Typed Snapshot
// =============================================================================

/// All connector settings, parsed.
#[derive(Debug, Clone, Default)]
pub struct ConnectorSettings {
    pub api_url: Option<String>,
    pub api_login: Option<String>,
    pub api_password: Option<SecretString>,
    pub sync_orders_since: Option<String>,
    pub status_filter: StatusFilter,
    pub shipping_method_config: Option<String>,
    pub transform_script: Option<String>,
    pub callback_url: Option<String>,
}

impl ConnectorSettings {
    /// Read every setting from `store`.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if the store fails.
    pub async fn load(store: &dyn ConfigStore) -> Result<Self, SettingsError> {
        let status = store.get(SettingKey::AutoFulfillStatus).await?;
        let custom = store.get(SettingKey::AutoFulfillCustom).await?;

        Ok(Self {
            api_url: store.get(SettingKey::ApiUrl).await?,
            api_login: store.get(SettingKey::ApiLogin).await?,
            api_password: store
                .get(SettingKey::ApiPassword)
                .await?
                .map(SecretString::from),
            sync_orders_since: store.get(SettingKey::SyncOrdersSince).await?,
            status_filter: StatusFilter::from_settings(status.as_deref(), custom.as_deref()),
            shipping_method_config: store.get(SettingKey::ShippingMethodConfig).await?,
            transform_script: store.get(SettingKey::OrderTransformScript).await?,
            callback_url: store.get(SettingKey::CallbackUrl).await?,
        })
    }

    /// The configured shipping rules, in evaluation order.
    ///
    /// # Errors
    ///
    /// Returns `RuleError::MalformedConfig` if any entry fails to parse.
    pub fn shipping_rules(&self) -> Result<Vec<ShippingRule>, RuleError> {
        parse_rules(self.shipping_method_config.as_deref())
    }

    /// Whether the storefront URL and credentials are all set.
    #[must_use]
    pub const fn has_connection_config(&self) -> bool {
        self.api_url.is_some() && self.api_login.is_some() && self.api_password.is_some()
    }

    /// Build a storefront client from the connection settings.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::MissingConfig` if a connection setting is absent.
    pub fn remote_client(&self) -> Result<RemoteClient, RemoteError> {
        let url = self
            .api_url
            .as_deref()
            .ok_or(RemoteError::MissingConfig("base_url"))?;
        let login = self
            .api_login
            .as_deref()
            .ok_or(RemoteError::MissingConfig("consumer_key"))?;
        let password = self
            .api_password
            .as_ref()
            .ok_or(RemoteError::MissingConfig("consumer_secret"))?;
        RemoteClient::new(url, login, password)
    }
}

/// Parse the `shipping_method_config` JSON array.
///
/// An absent or blank value means no rules.
///
/// # Errors
///
/// Returns `RuleError::MalformedConfig` if the value is not a list of rules.
pub fn parse_rules(raw: Option<&str>) -> Result<Vec<ShippingRule>, RuleError> {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(Vec::new());
    };
    serde_json::from_str(raw).map_err(|source| RuleError::MalformedConfig { source })
}
