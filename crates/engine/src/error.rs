//! Unified error handling for the sync engine.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use woosync_core::ExternalRef;

use crate::classify::RuleError;
use crate::cursor::PollError;
use crate::events::DispatchError;
use crate::guard::LockError;
use crate::local::LocalError;
use crate::remote::RemoteError;
use crate::settings::SettingsError;
use crate::sync_state::StateError;
use crate::transform::TransformError;

/// Input that failed validation before any work was attempted.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A date setting is not `YYYY-MM-DD`.
    #[error("Invalid date for '{key}': '{value}' (expected YYYY-MM-DD)")]
    InvalidDate { key: &'static str, value: String },

    /// A required field is absent from a callback or webhook payload.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// A payload could not be interpreted.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

/// Error type for every connector operation.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Storefront call failed.
    #[error("{0}")]
    Remote(#[from] RemoteError),

    /// Warehouse call failed.
    #[error("{0}")]
    Local(#[from] LocalError),

    /// Shipping method classification failed.
    #[error("{0}")]
    Rule(#[from] RuleError),

    /// Transform stage failed.
    #[error("{0}")]
    Transform(#[from] TransformError),

    /// Import lock could not be acquired.
    #[error("{0}")]
    Lock(#[from] LockError),

    /// Incremental pull failed.
    #[error("{0}")]
    Poll(#[from] PollError),

    /// Invalid input.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// Sync state store failed.
    #[error("{0}")]
    State(#[from] StateError),

    /// Settings store failed.
    #[error("{0}")]
    Settings(#[from] SettingsError),

    /// Event could not be queued.
    #[error("{0}")]
    Dispatch(#[from] DispatchError),

    /// The warehouse answered an import with `success: false`.
    #[error("{0}")]
    Rejected(String),

    /// A storefront record is not in a state the operation accepts.
    #[error("{0}")]
    Precondition(String),

    /// Stock adjustments stopped part way through; the applied ones stay
    /// applied.
    ///
    /// Never retried automatically, so no delta is pushed twice.
    #[error(
        "Inventory adjustment stopped after {applied} SKU(s); not applied: {}: {source}",
        unapplied.join(", ")
    )]
    PartialAdjustment {
        applied: usize,
        unapplied: Vec<String>,
        #[source]
        source: Box<SyncError>,
    },

    /// An order import failed after the storefront was told so.
    ///
    /// Never retried automatically.
    #[error("WooCommerce Order # {order_ref}: {source}")]
    Submission {
        order_ref: ExternalRef,
        #[source]
        source: Box<SyncError>,
    },
}

impl SyncError {
    /// Whether the event worker may retry the operation.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Remote(e) => e.is_transient(),
            Self::Local(e) => e.is_transient(),
            Self::Lock(LockError::Timeout { .. }) | Self::State(_) => true,
            Self::Poll(e) => e.is_transient(),
            Self::Lock(_)
            | Self::Rule(_)
            | Self::Transform(_)
            | Self::Validation(_)
            | Self::Settings(_)
            | Self::Dispatch(_)
            | Self::Rejected(_)
            | Self::Precondition(_)
            | Self::PartialAdjustment { .. }
            | Self::Submission { .. } => false,
        }
    }

    /// Whether the failure originates on this side and should be reported.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::State(_) | Self::Settings(_) | Self::Dispatch(_) | Self::Lock(LockError::State(_))
        )
    }

    /// Message sent back to callers of the callback and webhook endpoints.
    #[must_use]
    pub fn public_message(&self) -> String {
        if self.is_internal() {
            "Internal server error".to_string()
        } else {
            self.to_string()
        }
    }
}

impl IntoResponse for SyncError {
    /// Callers always get a `{errors: message}` body so the host can relay it.
    fn into_response(self) -> Response {
        if self.is_internal() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Callback request error"
            );
        } else {
            tracing::warn!(error = %self, "Callback request failed");
        }

        (StatusCode::OK, Json(json!({ "errors": self.public_message() }))).into_response()
    }
}
