//! Storefront callbacks.
//!
//! The storefront's sync extension calls `POST /callback/{method}` with a
//! JSON body (possibly empty) and relays whatever JSON comes back.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    response::{IntoResponse, Response},
};
use serde_json::{Value as JsonValue, json};
use tracing::{info, instrument, warn};
use woosync_core::ExternalRef;

use crate::error::{SyncError, ValidationError};
use crate::state::AppState;

/// Dispatch a callback by method name.
#[instrument(skip(state, body))]
pub async fn handle(
    State(state): State<AppState>,
    Path(method): Path<String>,
    body: Bytes,
) -> Response {
    let params = match parse_body(&body) {
        Ok(params) => params,
        Err(e) => return SyncError::from(e).into_response(),
    };

    let result = match method.as_str() {
        "inventoryQuery" => inventory_query(&state, params).await,
        "lockImport" => state.connector().lock_import().await.map(|locked| json!(locked)),
        "unlockImport" => Ok(json!(state.connector().unlock_import().await)),
        "triggerOrderSync" => trigger_order_sync(&state, &params).await,
        _ => {
            warn!(method = %method, "Unknown callback method");
            return Json(json!({ "errors": "Unknown method" })).into_response();
        }
    };

    match result {
        Ok(value) => Json(value).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn inventory_query(state: &AppState, params: JsonValue) -> Result<JsonValue, SyncError> {
    let filters = match params {
        JsonValue::Object(mut fields) if fields.contains_key("filters") => {
            fields.remove("filters").unwrap_or(JsonValue::Null)
        }
        other => other,
    };
    let levels = state.connector().inventory_query(filters).await?;
    Ok(serde_json::to_value(levels).map_err(|e| ValidationError::InvalidPayload(e.to_string()))?)
}

async fn trigger_order_sync(state: &AppState, params: &JsonValue) -> Result<JsonValue, SyncError> {
    let external_ref = match params.get("increment_id") {
        Some(JsonValue::String(id)) => ExternalRef::new(id.trim()),
        Some(JsonValue::Number(id)) => ExternalRef::new(id.to_string()),
        _ => return Err(ValidationError::MissingField("increment_id").into()),
    };
    state.connector().queue_import(external_ref.clone()).await?;
    info!(external_ref = %external_ref, "Order sync triggered by storefront");
    Ok(json!(true))
}

fn parse_body(body: &[u8]) -> Result<JsonValue, ValidationError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(JsonValue::Null);
    }
    serde_json::from_slice(body).map_err(|e| ValidationError::InvalidPayload(e.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::StatusCode;

    use super::*;
    use crate::connector::test_support::fixture;
    use crate::events::SyncEvent;
    use crate::routes::test_support::{app, post_json};
    use crate::settings::MemoryConfigStore;
    use crate::testing::FakeLocal;

    #[tokio::test]
    async fn test_inventory_query() {
        let local = FakeLocal {
            inventory: vec![json!({"sku": "MUG", "qty_available": 12})],
            ..FakeLocal::default()
        };
        let f = fixture(MemoryConfigStore::new(), local);

        let (status, body) = post_json(
            app(&f),
            "/callback/inventoryQuery",
            r#"{"filters": {"sku": {"in": ["MUG"]}}}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"skus": {"MUG": 12}}));
    }

    #[tokio::test]
    async fn test_lock_and_unlock() {
        let f = fixture(MemoryConfigStore::new(), FakeLocal::default());

        let (_, locked) = post_json(app(&f), "/callback/lockImport", "").await;
        assert_eq!(locked, json!(true));
        assert!(f.connector.guard().is_locked().await.unwrap());

        let (_, unlocked) = post_json(app(&f), "/callback/unlockImport", "{}").await;
        assert_eq!(unlocked, json!(true));
        assert!(!f.connector.guard().is_locked().await.unwrap());
    }

    #[tokio::test]
    async fn test_trigger_order_sync_queues_import() {
        let f = fixture(MemoryConfigStore::new(), FakeLocal::default());

        let (_, body) = post_json(
            app(&f),
            "/callback/triggerOrderSync",
            r#"{"increment_id": 1001}"#,
        )
        .await;

        assert_eq!(body, json!(true));
        assert_eq!(
            f.bus.events(),
            vec![SyncEvent::ImportOrder {
                external_ref: ExternalRef::new("1001")
            }]
        );
    }

    #[tokio::test]
    async fn test_trigger_order_sync_without_ref() {
        let f = fixture(MemoryConfigStore::new(), FakeLocal::default());
        let (status, body) = post_json(app(&f), "/callback/triggerOrderSync", "{}").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"errors": "Missing required field: increment_id"}));
        assert!(f.bus.events().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let f = fixture(MemoryConfigStore::new(), FakeLocal::default());
        let (status, body) = post_json(app(&f), "/callback/doSomething", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"errors": "Unknown method"}));
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let f = fixture(MemoryConfigStore::new(), FakeLocal::default());
        let (_, body) = post_json(app(&f), "/callback/inventoryQuery", "{not json").await;
        assert!(
            body["errors"]
                .as_str()
                .unwrap()
                .starts_with("Invalid payload")
        );
    }
}
