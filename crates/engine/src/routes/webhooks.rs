//! Warehouse webhooks.
//!
//! Webhooks only queue work; the event worker does the rest.

use std::collections::BTreeMap;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    response::{IntoResponse, Response},
};
use serde_json::{Value as JsonValue, json};
use tracing::{debug, instrument, warn};
use woosync_core::StockAdjustment;

use crate::connector::shipments::storefront_order_ref;
use crate::error::{SyncError, ValidationError};
use crate::events::SyncEvent;
use crate::state::AppState;

/// Queue the work for a warehouse webhook topic.
#[instrument(skip(state, body))]
pub async fn handle(
    State(state): State<AppState>,
    Path(topic): Path<String>,
    body: Bytes,
) -> Response {
    match event_for(&topic, &body) {
        Ok(Some(event)) => {
            if let Err(e) = state.connector().dispatch(event).await {
                return e.into_response();
            }
        }
        Ok(None) => debug!(topic = %topic, "Webhook ignored"),
        Err(e) => return e.into_response(),
    }
    Json(json!({ "success": true })).into_response()
}

/// The event a webhook translates to, if any.
fn event_for(topic: &str, body: &[u8]) -> Result<Option<SyncEvent>, SyncError> {
    let payload: JsonValue = serde_json::from_slice(body)
        .map_err(|e| ValidationError::InvalidPayload(e.to_string()))?;

    match topic {
        "delivery:committed" | "inventory:adjusted" => {
            let raw = payload
                .get("stock_adjustments")
                .cloned()
                .ok_or(ValidationError::MissingField("stock_adjustments"))?;
            let adjustments: BTreeMap<String, StockAdjustment> = serde_json::from_value(raw)
                .map_err(|e| ValidationError::InvalidPayload(e.to_string()))?;
            Ok(Some(SyncEvent::AdjustInventory { adjustments }))
        }
        "shipment:packed" => {
            let ours = payload
                .get("source")
                .and_then(JsonValue::as_str)
                .and_then(storefront_order_ref)
                .is_some();
            Ok(ours.then_some(SyncEvent::ShipmentPacked { payload }))
        }
        _ => {
            warn!(topic = %topic, "Unknown webhook topic");
            Err(ValidationError::InvalidPayload(format!("Unknown topic '{topic}'")).into())
        }
    }
}
