//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health               - Liveness
//! GET  /health/ready         - Sync state store reachable
//!
//! # Storefront callbacks
//! POST /callback/{method}    - inventoryQuery, lockImport, unlockImport, triggerOrderSync
//!
//! # Warehouse webhooks
//! POST /webhook/{topic}      - delivery:committed, inventory:adjusted, shipment:packed
//! ```
//!
//! Callbacks and webhooks always answer 200; failures are reported in an
//! `{errors: message}` body.

pub mod callbacks;
pub mod webhooks;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use tracing::warn;

use crate::state::AppState;

/// Build the application router.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(ready))
        .route("/callback/{method}", post(callbacks::handle))
        .route("/webhook/{topic}", post(webhooks::handle))
}

async fn health() -> &'static str {
    "ok"
}

async fn ready(State(state): State<AppState>) -> StatusCode {
    match state.ready().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
