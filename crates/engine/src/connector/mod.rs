//! Connector flows.
//!
//! [`Connector`] wires the sync core to its collaborators and exposes one
//! method per operation the server, the event worker, and the CLI trigger:
//!
//! - [`orders`] - Order import and the manual/cron order syncs
//! - [`inventory`] - Stock adjustments, full inventory sync, inventory query
//! - [`shipments`] - Packed warehouse shipments to storefront shipments
//! - [`lifecycle`] - Activation, deactivation, diagnostics, lock callbacks
//!
//! Queued events arrive through the [`EventHandler`] impl.

pub mod inventory;
pub mod lifecycle;
pub mod orders;
pub mod shipments;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use crate::clock::Clock;
use crate::cursor::OrderCursor;
use crate::error::SyncError;
use crate::events::{EventBus, EventHandler, SyncEvent};
use crate::feedback::StatusFeedback;
use crate::guard::ImportGuard;
use crate::local::LocalCommerce;
use crate::remote::RemoteGateway;
use crate::settings::{ConfigStore, ConnectorSettings};
use crate::sync_state::{StateStore, SyncState};

/// The storefront-to-warehouse connector.
#[derive(Clone)]
pub struct Connector {
    config: Arc<dyn ConfigStore>,
    remote: Arc<dyn RemoteGateway>,
    local: Arc<dyn LocalCommerce>,
    state: SyncState,
    clock: Arc<dyn Clock>,
    bus: Arc<dyn EventBus>,
    feedback: StatusFeedback,
    guard: ImportGuard,
    cursor: OrderCursor,
}

impl Connector {
    #[must_use]
    pub fn new(
        config: Arc<dyn ConfigStore>,
        remote: Arc<dyn RemoteGateway>,
        local: Arc<dyn LocalCommerce>,
        state: Arc<dyn StateStore>,
        bus: Arc<dyn EventBus>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let state = SyncState::new(state);
        let feedback = StatusFeedback::new(remote.clone());
        let guard = ImportGuard::new(
            state.clone(),
            clock.clone(),
            local.clone(),
            feedback.clone(),
        );
        let cursor = OrderCursor::new(
            remote.clone(),
            state.clone(),
            guard.clone(),
            bus.clone(),
            clock.clone(),
        );

        Self {
            config,
            remote,
            local,
            state,
            clock,
            bus,
            feedback,
            guard,
            cursor,
        }
    }

    /// Override the import lock timings.
    #[must_use]
    pub fn with_lock_timing(
        mut self,
        max_wait: Duration,
        stale_after: Duration,
        poll_interval: Duration,
    ) -> Self {
        self.guard = self
            .guard
            .with_timing(max_wait, stale_after, poll_interval);
        self.cursor = OrderCursor::new(
            self.remote.clone(),
            self.state.clone(),
            self.guard.clone(),
            self.bus.clone(),
            self.clock.clone(),
        );
        self
    }

    /// Override the order pull page size.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.cursor = self.cursor.with_page_size(page_size);
        self
    }

    #[must_use]
    pub const fn state(&self) -> &SyncState {
        &self.state
    }

    #[must_use]
    pub const fn guard(&self) -> &ImportGuard {
        &self.guard
    }

    #[must_use]
    pub const fn cursor(&self) -> &OrderCursor {
        &self.cursor
    }

    #[must_use]
    pub fn config(&self) -> &dyn ConfigStore {
        self.config.as_ref()
    }

    /// Read the current settings.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Settings` if the settings store fails.
    pub async fn settings(&self) -> Result<ConnectorSettings, SyncError> {
        Ok(ConnectorSettings::load(self.config.as_ref()).await?)
    }

    /// Queue an event for the worker.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Dispatch` if the queue is closed.
    pub async fn dispatch(&self, event: SyncEvent) -> Result<Uuid, SyncError> {
        let name = event.name();
        let event_id = self.bus.dispatch(event).await?;
        debug!(event_id = %event_id, event = name, "Event queued");
        Ok(event_id)
    }
}

#[async_trait]
impl EventHandler for Connector {
    async fn handle(&self, event: &SyncEvent) -> Result<(), SyncError> {
        match event {
            SyncEvent::ImportOrder { external_ref } => {
                self.import_order(external_ref).await.map(|_| ())
            }
            SyncEvent::AdjustInventory { adjustments } => {
                self.adjust_inventory(adjustments).await
            }
            SyncEvent::ShipmentPacked { payload } => {
                self.shipment_packed(payload).await.map(|_| ())
            }
        }
    }
}
