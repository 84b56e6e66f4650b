//! Packed warehouse shipments become storefront shipments.

use serde_json::{Value as JsonValue, json};
use tracing::{info, instrument};
use woosync_core::{ExternalRef, FeedbackStatus};

use super::Connector;
use crate::error::{SyncError, ValidationError};
use crate::local::Entity;
use crate::remote::{HttpMethod, endpoints};

/// Prefix of the `source` of warehouse shipments that belong to the storefront.
pub const SHIPMENT_SOURCE_PREFIX: &str = "woocommerce_shipment:";

/// Storefront order reference encoded in a warehouse shipment source.
#[must_use]
pub fn storefront_order_ref(source: &str) -> Option<&str> {
    source
        .strip_prefix(SHIPMENT_SOURCE_PREFIX)
        .filter(|id| !id.is_empty())
}

impl Connector {
    /// Create a storefront shipment with tracking for a packed warehouse
    /// shipment. Returns the storefront's response (the new shipment id).
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Validation` when the payload has no storefront
    /// source, `SyncError::Precondition` when the storefront order is not in
    /// a shippable status, and `SyncError::Remote`/`SyncError::Local` when a
    /// call fails.
    #[instrument(skip(self, payload))]
    pub async fn shipment_packed(&self, payload: &JsonValue) -> Result<JsonValue, SyncError> {
        let order_ref = payload
            .get("source")
            .and_then(JsonValue::as_str)
            .and_then(storefront_order_ref)
            .map(ExternalRef::new)
            .ok_or(ValidationError::MissingField("source"))?;

        let order = self
            .remote
            .request(
                endpoints::ORDER_INFO,
                HttpMethod::Post,
                JsonValue::String(order_ref.to_string()),
            )
            .await?;
        let status = order.get("status").and_then(JsonValue::as_str).unwrap_or_default();
        if !FeedbackStatus::SHIPPABLE.iter().any(|s| s.as_str() == status) {
            return Err(SyncError::Precondition(format!(
                "Order {order_ref} status is '{status}', expected 'submitted'."
            )));
        }

        let mut payload = payload.clone();
        let warehouse_name = self.warehouse_name(payload.get("warehouse_id")).await?;
        if let Some(fields) = payload.as_object_mut() {
            fields.insert("warehouse_name".to_string(), warehouse_name);
        }

        let shipment_id = self
            .remote
            .request(
                endpoints::SHIPMENT_CREATE_WITH_TRACKING,
                HttpMethod::Post,
                json!([order_ref.as_str(), payload]),
            )
            .await?;

        info!(
            order_ref = %order_ref,
            shipment_id = %shipment_id,
            "Created WooCommerce shipment # {shipment_id} for order # {order_ref}"
        );
        Ok(shipment_id)
    }

    async fn warehouse_name(&self, warehouse_id: Option<&JsonValue>) -> Result<JsonValue, SyncError> {
        let Some(warehouse_id) = warehouse_id.filter(|id| !id.is_null()) else {
            return Ok(JsonValue::Null);
        };
        let warehouse = self.local.get(Entity::Warehouse, warehouse_id.clone()).await?;
        Ok(warehouse.get("name").cloned().unwrap_or(JsonValue::Null))
    }
}
