//! Persisted sync state.
//!
//! The watermark, the import lock record, and the fulfillment-service
//! registration flag are the connector's only mutable shared state. They live
//! behind a [`StateStore`] handle that is passed around explicitly.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::warn;
use woosync_core::types::timestamp::{format_timestamp, parse_timestamp};
use woosync_core::{LockRecord, StateKey};

/// Error type for state store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("state database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("state serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Key/value store for sync state.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read a value.
    ///
    /// # Errors
    ///
    /// Returns `StateError` if the backing store fails.
    async fn get(&self, key: StateKey) -> Result<Option<JsonValue>, StateError>;

    /// Write a value; `None` removes the key.
    ///
    /// # Errors
    ///
    /// Returns `StateError` if the backing store fails.
    async fn set(&self, key: StateKey, value: Option<JsonValue>) -> Result<(), StateError>;

    /// Atomically replace `expected` with `new`.
    ///
    /// Returns `false` without writing if the stored value is not `expected`.
    ///
    /// # Errors
    ///
    /// Returns `StateError` if the backing store fails.
    async fn compare_and_set(
        &self,
        key: StateKey,
        expected: Option<&JsonValue>,
        new: Option<JsonValue>,
    ) -> Result<bool, StateError>;

    /// Check the backing store is reachable.
    ///
    /// # Errors
    ///
    /// Returns `StateError` if it is not.
    async fn ping(&self) -> Result<(), StateError> {
        self.get(StateKey::OrderLastSyncAt).await.map(|_| ())
    }
}

/// In-memory state store.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    values: RwLock<HashMap<StateKey, JsonValue>>,
}

impl MemoryStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, key: StateKey) -> Result<Option<JsonValue>, StateError> {
        Ok(self.values.read().await.get(&key).cloned())
    }

    async fn set(&self, key: StateKey, value: Option<JsonValue>) -> Result<(), StateError> {
        let mut values = self.values.write().await;
        match value {
            Some(value) => values.insert(key, value),
            None => values.remove(&key),
        };
        Ok(())
    }

    async fn compare_and_set(
        &self,
        key: StateKey,
        expected: Option<&JsonValue>,
        new: Option<JsonValue>,
    ) -> Result<bool, StateError> {
        let mut values = self.values.write().await;
        if values.get(&key) != expected {
            return Ok(false);
        }
        match new {
            Some(value) => values.insert(key, value),
            None => values.remove(&key),
        };
        Ok(true)
    }
}

// =============================================================================
// Typed Access
// =============================================================================

/// Typed view over a [`StateStore`].
#[derive(Clone)]
pub struct SyncState {
    store: Arc<dyn StateStore>,
}

impl std::fmt::Debug for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncState").finish_non_exhaustive()
    }
}

impl SyncState {
    #[must_use]
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &dyn StateStore {
        self.store.as_ref()
    }

    /// Time up to which incremental polling has completed.
    ///
    /// An unreadable value is logged and treated as absent.
    ///
    /// # Errors
    ///
    /// Returns `StateError` if the store fails.
    pub async fn watermark(&self) -> Result<Option<DateTime<Utc>>, StateError> {
        let Some(value) = self.store.get(StateKey::OrderLastSyncAt).await? else {
            return Ok(None);
        };
        let parsed = value.as_str().and_then(parse_timestamp);
        if parsed.is_none() {
            warn!(value = %value, "Ignoring unreadable order_last_sync_at");
        }
        Ok(parsed)
    }

    /// Persist the watermark.
    ///
    /// # Errors
    ///
    /// Returns `StateError` if the store fails.
    pub async fn set_watermark(&self, at: DateTime<Utc>) -> Result<(), StateError> {
        self.store
            .set(
                StateKey::OrderLastSyncAt,
                Some(JsonValue::String(format_timestamp(at))),
            )
            .await
    }

    /// Raw lock record value, for compare-and-set.
    ///
    /// # Errors
    ///
    /// Returns `StateError` if the store fails.
    pub async fn lock_value(&self) -> Result<Option<JsonValue>, StateError> {
        self.store.get(StateKey::LockOrderPull).await
    }

    /// Current lock record.
    ///
    /// An unreadable record is logged and treated as absent.
    ///
    /// # Errors
    ///
    /// Returns `StateError` if the store fails.
    pub async fn lock_record(&self) -> Result<Option<LockRecord>, StateError> {
        Ok(self.lock_value().await?.and_then(|value| decode_lock(&value)))
    }

    /// Overwrite the lock record.
    ///
    /// # Errors
    ///
    /// Returns `StateError` if the store fails.
    pub async fn write_lock(&self, record: LockRecord) -> Result<(), StateError> {
        self.store
            .set(StateKey::LockOrderPull, Some(serde_json::to_value(record)?))
            .await
    }

    /// Replace the lock value only if it still equals `expected`.
    ///
    /// # Errors
    ///
    /// Returns `StateError` if the store fails.
    pub async fn swap_lock(
        &self,
        expected: Option<&JsonValue>,
        record: LockRecord,
    ) -> Result<bool, StateError> {
        self.store
            .compare_and_set(
                StateKey::LockOrderPull,
                expected,
                Some(serde_json::to_value(record)?),
            )
            .await
    }

    /// Whether the warehouse is registered as fulfillment service.
    ///
    /// # Errors
    ///
    /// Returns `StateError` if the store fails.
    pub async fn is_registered(&self) -> Result<bool, StateError> {
        let value = self
            .store
            .get(StateKey::FulfillmentServiceRegistered)
            .await?;
        Ok(match value {
            Some(JsonValue::Bool(flag)) => flag,
            Some(JsonValue::Number(n)) => n.as_i64().is_some_and(|n| n != 0),
            Some(JsonValue::String(s)) => !s.is_empty() && s != "0",
            _ => false,
        })
    }

    /// Set or clear the registration flag.
    ///
    /// # Errors
    ///
    /// Returns `StateError` if the store fails.
    pub async fn set_registered(&self, registered: bool) -> Result<(), StateError> {
        let value = registered.then_some(JsonValue::Bool(true));
        self.store
            .set(StateKey::FulfillmentServiceRegistered, value)
            .await
    }

    /// Remove every state key.
    ///
    /// # Errors
    ///
    /// Returns `StateError` on the first key that fails.
    pub async fn clear(&self) -> Result<(), StateError> {
        for key in StateKey::ALL {
            self.store.set(key, None).await?;
        }
        Ok(())
    }
}

/// Decode a stored lock record, logging unreadable values.
#[must_use]
pub fn decode_lock(value: &JsonValue) -> Option<LockRecord> {
    match serde_json::from_value(value.clone()) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!(error = %e, "Ignoring unreadable lock_order_pull record");
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn state() -> SyncState {
        SyncState::new(Arc::new(MemoryStateStore::new()))
    }

    #[tokio::test]
    async fn test_watermark_roundtrip() {
        let state = state();
        assert!(state.watermark().await.unwrap().is_none());

        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        state.set_watermark(at).await.unwrap();
        assert_eq!(state.watermark().await.unwrap(), Some(at));
        assert_eq!(
            state.store().get(StateKey::OrderLastSyncAt).await.unwrap(),
            Some(json!("2024-01-01 00:00:00"))
        );
    }

    #[tokio::test]
    async fn test_unreadable_watermark_is_absent() {
        let state = state();
        state
            .store()
            .set(StateKey::OrderLastSyncAt, Some(json!("yesterday")))
            .await
            .unwrap();
        assert!(state.watermark().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_compare_and_set() {
        let store = MemoryStateStore::new();
        assert!(
            store
                .compare_and_set(StateKey::LockOrderPull, None, Some(json!(1)))
                .await
                .unwrap()
        );
        assert!(
            !store
                .compare_and_set(StateKey::LockOrderPull, None, Some(json!(2)))
                .await
                .unwrap()
        );
        assert!(
            store
                .compare_and_set(StateKey::LockOrderPull, Some(&json!(1)), Some(json!(2)))
                .await
                .unwrap()
        );
        assert_eq!(
            store.get(StateKey::LockOrderPull).await.unwrap(),
            Some(json!(2))
        );
    }

    #[tokio::test]
    async fn test_registration_flag_and_clear() {
        let state = state();
        assert!(!state.is_registered().await.unwrap());
        state.set_registered(true).await.unwrap();
        assert!(state.is_registered().await.unwrap());

        state
            .write_lock(LockRecord::locked(Utc::now()))
            .await
            .unwrap();
        state.set_watermark(Utc::now()).await.unwrap();
        state.clear().await.unwrap();

        for key in StateKey::ALL {
            assert!(state.store().get(key).await.unwrap().is_none());
        }
    }
}
