//! Status feedback to the storefront.
//!
//! Comments move the storefront order into the matching sync status. They
//! are best effort: a failed comment is logged and never fails the caller.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};
use woosync_core::{ExternalRef, FeedbackStatus};

use crate::remote::{HttpMethod, RemoteGateway, endpoints};

/// Posts order comments to the storefront.
#[derive(Clone)]
pub struct StatusFeedback {
    remote: Arc<dyn RemoteGateway>,
}

impl StatusFeedback {
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteGateway>) -> Self {
        Self { remote }
    }

    /// Add a comment with a status transition to a storefront order.
    pub async fn comment(&self, external_ref: &ExternalRef, status: FeedbackStatus, message: &str) {
        let params = json!([external_ref.as_str(), status.as_str(), message]);
        match self
            .remote
            .request(endpoints::ORDER_ADD_COMMENT, HttpMethod::Post, params)
            .await
        {
            Ok(_) => info!(
                external_ref = %external_ref,
                status = %status,
                "Status comment posted"
            ),
            Err(e) => warn!(
                external_ref = %external_ref,
                status = %status,
                error = %e,
                "Could not post status comment"
            ),
        }
    }
}
