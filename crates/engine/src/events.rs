//! Queued sync events.
//!
//! Webhooks, callbacks, and the cursor never do import work inline; they
//! dispatch a [`SyncEvent`] and the [`EventWorker`] processes events one at a
//! time. Retryable failures are retried a bounded number of times with a
//! growing delay; anything else is logged and dropped.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;
use woosync_core::{ExternalRef, StockAdjustment};

use crate::error::SyncError;

/// Default number of attempts per event.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Delay before the first retry; later retries wait proportionally longer.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);
/// Queue capacity.
pub const QUEUE_CAPACITY: usize = 1024;

/// A unit of queued work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    /// Import one storefront order.
    ImportOrder { external_ref: ExternalRef },
    /// Push warehouse stock changes to the storefront.
    AdjustInventory {
        adjustments: BTreeMap<String, StockAdjustment>,
    },
    /// Create a storefront shipment from a packed warehouse shipment.
    ShipmentPacked { payload: JsonValue },
}

impl SyncEvent {
    /// Short name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ImportOrder { .. } => "import_order",
            Self::AdjustInventory { .. } => "adjust_inventory",
            Self::ShipmentPacked { .. } => "shipment_packed",
        }
    }
}

/// A queued event with its identity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventEnvelope {
    pub id: Uuid,
    pub event: SyncEvent,
}

/// Event could not be queued.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("event queue is closed")]
    Closed,
}

/// Where events are sent.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Queue an event and return its id.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::Closed` if the queue no longer accepts events.
    async fn dispatch(&self, event: SyncEvent) -> Result<Uuid, DispatchError>;
}

/// Processes one event.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle an event.
    ///
    /// # Errors
    ///
    /// Returns `SyncError`; retryable errors are retried by the worker.
    async fn handle(&self, event: &SyncEvent) -> Result<(), SyncError>;
}

// =============================================================================
// In-Process Queue
// =============================================================================

/// [`EventBus`] backed by a `tokio` channel.
#[derive(Debug, Clone)]
pub struct QueueBus {
    sender: mpsc::Sender<EventEnvelope>,
}

impl QueueBus {
    /// Create a bus and the receiving end for an [`EventWorker`].
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<EventEnvelope>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl EventBus for QueueBus {
    async fn dispatch(&self, event: SyncEvent) -> Result<Uuid, DispatchError> {
        let envelope = EventEnvelope {
            id: Uuid::new_v4(),
            event,
        };
        let id = envelope.id;
        debug!(event_id = %id, event = envelope.event.name(), "Queueing event");
        self.sender
            .send(envelope)
            .await
            .map_err(|_| DispatchError::Closed)?;
        Ok(id)
    }
}

/// Drains the queue.
pub struct EventWorker {
    receiver: mpsc::Receiver<EventEnvelope>,
    handler: Arc<dyn EventHandler>,
    max_attempts: u32,
    retry_delay: Duration,
}

impl EventWorker {
    #[must_use]
    pub fn new(receiver: mpsc::Receiver<EventEnvelope>, handler: Arc<dyn EventHandler>) -> Self {
        Self {
            receiver,
            handler,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Override the retry policy.
    #[must_use]
    pub const fn with_retry(mut self, max_attempts: u32, retry_delay: Duration) -> Self {
        self.max_attempts = max_attempts;
        self.retry_delay = retry_delay;
        self
    }

    /// Process events until the queue closes or `shutdown` resolves.
    pub async fn run(&mut self, shutdown: impl Future<Output = ()> + Send) {
        info!("Event worker started");
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("Event worker stopping");
                    break;
                }
                envelope = self.receiver.recv() => {
                    let Some(envelope) = envelope else {
                        info!("Event queue closed");
                        break;
                    };
                    self.process(&envelope).await;
                }
            }
        }
    }

    /// Process whatever is already queued, then return how many events ran.
    pub async fn drain(&mut self) -> usize {
        let mut processed = 0;
        while let Ok(envelope) = self.receiver.try_recv() {
            self.process(&envelope).await;
            processed += 1;
        }
        processed
    }

    /// Handle one event, retrying retryable failures.
    ///
    /// Returns whether the event eventually succeeded.
    #[instrument(skip(self, envelope), fields(event_id = %envelope.id, event = envelope.event.name()))]
    pub async fn process(&self, envelope: &EventEnvelope) -> bool {
        let mut attempt = 1;
        loop {
            match self.handler.handle(&envelope.event).await {
                Ok(()) => {
                    debug!(attempt, "Event processed");
                    return true;
                }
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    warn!(attempt, error = %e, "Event failed, retrying");
                    tokio::time::sleep(self.retry_delay * attempt).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(attempt, error = %e, "Event failed");
                    return false;
                }
            }
        }
    }
}
