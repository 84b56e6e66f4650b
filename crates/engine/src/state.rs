//! Application state shared across handlers.

use std::sync::Arc;

use crate::connector::Connector;
use crate::sync_state::StateError;

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    connector: Connector,
}

impl AppState {
    #[must_use]
    pub fn new(connector: Connector) -> Self {
        Self {
            inner: Arc::new(AppStateInner { connector }),
        }
    }

    /// Get a reference to the connector.
    #[must_use]
    pub fn connector(&self) -> &Connector {
        &self.inner.connector
    }

    /// Check that the sync state store is reachable.
    ///
    /// # Errors
    ///
    /// Returns `StateError` if it is not.
    pub async fn ready(&self) -> Result<(), StateError> {
        self.inner.connector.state().store().ping().await
    }
}
