//! HTTP surface: callbacks and webhooks through the router to the simulators.

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use serde_json::{Value as JsonValue, json};
use tower::ServiceExt;
use woosync_core::ExternalRef;
use woosync_engine::routes::routes;
use woosync_engine::state::AppState;
use woosync_integration_tests::{Harness, storefront_order};

fn app(h: &Harness) -> Router {
    routes().with_state(AppState::new(h.connector.clone()))
}

async fn post(h: &Harness, uri: &str, body: JsonValue) -> (StatusCode, JsonValue) {
    let response = app(h)
        .oneshot(
            Request::post(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_health_endpoints() {
    let h = Harness::new();
    for uri in ["/health", "/health/ready"] {
        let response = app(&h)
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{uri}");
    }
}

// =============================================================================
// Callbacks
// =============================================================================

#[tokio::test]
async fn test_trigger_order_sync_imports_order() {
    let mut h = Harness::new();
    h.storefront
        .add_order(storefront_order("1001", "processing", "2024-01-09 08:00:00"));

    let (status, body) = post(
        &h,
        "/callback/triggerOrderSync",
        json!({"increment_id": 1001}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(true));

    assert_eq!(h.drain().await, 1);
    assert_eq!(h.warehouse.orders()[0]["options"]["order_ref"], "1001");
    assert_eq!(h.storefront.status_of("1001").as_deref(), Some("submitted"));
}

#[tokio::test]
async fn test_inventory_query_reports_warehouse_stock() {
    let h = Harness::new();
    h.warehouse.set_stock("MUG", 12);
    h.warehouse.set_stock("MUG-RED", 0);

    let (_, body) = post(
        &h,
        "/callback/inventoryQuery",
        json!({"filters": {"sku": {"in": ["MUG", "MUG-RED"]}}}),
    )
    .await;

    assert_eq!(body, json!({"skus": {"MUG": 12, "MUG-RED": 0}}));
}

#[tokio::test]
async fn test_lock_callback_blocks_overlapping_lock() {
    let h = Harness::new();

    let (_, locked) = post(&h, "/callback/lockImport", json!({})).await;
    assert_eq!(locked, json!(true));
    assert!(!h.connector.guard().try_acquire().await.unwrap());

    let (_, unlocked) = post(&h, "/callback/unlockImport", json!({})).await;
    assert_eq!(unlocked, json!(true));
    assert!(h.connector.guard().try_acquire().await.unwrap());
}

// =============================================================================
// Webhooks
// =============================================================================

#[tokio::test]
async fn test_inventory_adjusted_reaches_storefront() {
    let mut h = Harness::new();

    let (_, body) = post(
        &h,
        "/webhook/inventory:adjusted",
        json!({"stock_adjustments": {
            "MUG": {"qty_adjust": "-2"},
            "PLATE": {"qty_adjust": "0"}
        }}),
    )
    .await;
    assert_eq!(body, json!({"success": true}));

    h.drain().await;
    assert_eq!(
        h.storefront.stock_adjustments(),
        vec![("MUG".to_string(), -2.0)]
    );
}

#[tokio::test]
async fn test_shipment_packed_creates_storefront_shipment() {
    let mut h = Harness::new();
    h.storefront
        .add_order(storefront_order("1001", "processing", "2024-01-09 08:00:00"));
    h.warehouse.add_warehouse("2", "Reno");
    h.connector
        .import_order(&ExternalRef::new("1001"))
        .await
        .unwrap();

    let (_, body) = post(
        &h,
        "/webhook/shipment:packed",
        json!({
            "source": "woocommerce_shipment:1001",
            "warehouse_id": "2",
            "tracking_numbers": ["1Z999"]
        }),
    )
    .await;
    assert_eq!(body, json!({"success": true}));
    h.drain().await;

    let shipments = h.storefront.shipments();
    assert_eq!(shipments.len(), 1);
    assert_eq!(shipments[0].0, "1001");
    assert_eq!(shipments[0].1["warehouse_name"], "Reno");
    assert_eq!(shipments[0].1["tracking_numbers"], json!(["1Z999"]));
}

#[tokio::test]
async fn test_shipment_for_unsubmitted_order_is_not_created() {
    let mut h = Harness::new();
    h.storefront
        .add_order(storefront_order("1001", "processing", "2024-01-09 08:00:00"));

    post(
        &h,
        "/webhook/shipment:packed",
        json!({"source": "woocommerce_shipment:1001"}),
    )
    .await;
    h.drain().await;

    assert!(h.storefront.shipments().is_empty());
}

#[tokio::test]
async fn test_unknown_webhook_topic_is_reported() {
    let mut h = Harness::new();

    let (status, body) = post(&h, "/webhook/order:created", json!({})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"errors": "Invalid payload: Unknown topic 'order:created'"})
    );
    assert_eq!(h.drain().await, 0);
}
