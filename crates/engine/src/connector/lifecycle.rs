//! Activation, diagnostics, and the lock callbacks.

use serde_json::{Value as JsonValue, json};
use tracing::{info, instrument, warn};

use super::Connector;
use crate::error::SyncError;
use crate::remote::{HttpMethod, endpoints};

impl Connector {
    /// Whether the storefront URL and credentials are configured.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Settings` if the settings store fails.
    pub async fn has_connection_config(&self) -> Result<bool, SyncError> {
        Ok(self.settings().await?.has_connection_config())
    }

    /// Register with the storefront. Returns warnings; never fails.
    #[instrument(skip(self))]
    pub async fn activate(&self) -> Vec<String> {
        match self.register_fulfillment_service().await {
            Ok(()) => Vec::new(),
            Err(e) => {
                warn!(error = %e, "Fulfillment service registration failed");
                vec![e.to_string()]
            }
        }
    }

    /// Unregister and forget all sync state. Returns errors; never fails.
    #[instrument(skip(self))]
    pub async fn deactivate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if let Err(e) = self.unregister_fulfillment_service().await {
            warn!(error = %e, "Fulfillment service unregistration failed");
            errors.push(e.to_string());
        }
        if let Err(e) = self.state.clear().await {
            warn!(error = %e, "Could not clear sync state");
            errors.push(e.to_string());
        }
        errors
    }

    /// Same as [`Connector::activate`].
    pub async fn reinstall(&self) -> Vec<String> {
        self.activate().await
    }

    /// Point the storefront's sync extension at this connector.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Precondition` without a callback URL, and
    /// `SyncError::Remote`/`SyncError::State` when a call fails.
    pub async fn register_fulfillment_service(&self) -> Result<(), SyncError> {
        let callback_url = self
            .settings()
            .await?
            .callback_url
            .ok_or_else(|| SyncError::Precondition("Callback URL is not configured.".to_string()))?;

        let accepted = self
            .remote
            .request(
                endpoints::SET_CONFIG,
                HttpMethod::Post,
                json!({"path": endpoints::WAREHOUSE_API_URL_PATH, "value": callback_url}),
            )
            .await?;
        if truthy(&accepted) {
            self.state.set_registered(true).await?;
            info!(callback_url = %callback_url, "Fulfillment service registered");
        } else {
            warn!(response = %accepted, "Storefront did not accept the callback URL");
        }
        Ok(())
    }

    /// Remove the callback URL from the storefront.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Remote`/`SyncError::State` when a call fails.
    pub async fn unregister_fulfillment_service(&self) -> Result<(), SyncError> {
        self.remote
            .request(
                endpoints::SET_CONFIG,
                HttpMethod::Post,
                json!({"path": endpoints::WAREHOUSE_API_URL_PATH, "value": null}),
            )
            .await?;
        self.state.set_registered(false).await?;
        info!("Fulfillment service unregistered");
        Ok(())
    }

    /// Human-readable connection report.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Remote` if the storefront cannot be reached.
    #[instrument(skip(self))]
    pub async fn diagnostics(&self) -> Result<Vec<String>, SyncError> {
        let info = self
            .remote
            .request(endpoints::INFO, HttpMethod::Get, JsonValue::Null)
            .await?;
        let version = |key: &str| {
            info.get(key)
                .and_then(JsonValue::as_str)
                .unwrap_or("undefined")
                .to_string()
        };
        let registered = self.state.is_registered().await?;

        Ok(vec![
            format!("WooCommerce Version: {}", version("woocommerce_version")),
            format!("WordPress Version: {}", version("wordpress_version")),
            format!("ShipStream Sync Version: {}", version("shipstream_sync_version")),
            format!(
                "Service Status: {}",
                if registered {
                    "✅ Registered"
                } else {
                    "🚨 Not registered"
                }
            ),
        ])
    }

    // =========================================================================
    // Lock Callbacks
    // =========================================================================

    /// Take the import lock on behalf of the storefront.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Lock` if the lock cannot be taken in time.
    pub async fn lock_import(&self) -> Result<bool, SyncError> {
        self.guard.acquire().await?;
        Ok(true)
    }

    /// Release the import lock on behalf of the storefront.
    pub async fn unlock_import(&self) -> bool {
        self.guard.release().await;
        true
    }
}

fn truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => false,
        JsonValue::Bool(flag) => *flag,
        JsonValue::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        JsonValue::String(s) => !s.is_empty() && s != "0",
        JsonValue::Array(items) => !items.is_empty(),
        JsonValue::Object(fields) => !fields.is_empty(),
    }
}
