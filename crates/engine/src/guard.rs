//! Idempotency and import guard.
//!
//! Two things keep an order from being created twice: a lookup of the
//! warehouse by order reference, and an advisory lock around the import
//! critical section. The lock is a record in the sync state store that is
//! polled once per second; a held record older than the staleness threshold
//! is treated as abandoned.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt as _;
use serde_json::{Value as JsonValue, json};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use woosync_core::{ExistingOrder, ExternalRef, FeedbackStatus, LocalOrderId, LockRecord};

use crate::clock::Clock;
use crate::feedback::StatusFeedback;
use crate::local::{Entity, LocalCommerce, LocalError};
use crate::sync_state::{StateError, SyncState, decode_lock};

/// Longest time spent waiting for the lock.
pub const LOCK_MAX_WAIT: Duration = Duration::from_secs(20);
/// Age after which a held lock is presumed abandoned.
pub const LOCK_STALE_AFTER: Duration = Duration::from_secs(60);
/// Delay between acquisition attempts.
pub const LOCK_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Lock failures.
#[derive(Debug, Error)]
pub enum LockError {
    /// The lock stayed held for the whole wait.
    #[error("cannot lock order import (waited {waited_secs}s)")]
    Timeout { waited_secs: u64 },

    /// The lock record could not be read or written.
    #[error("lock state error: {0}")]
    State(#[from] StateError),
}

/// Guards order imports against duplicates and concurrent runs.
#[derive(Clone)]
pub struct ImportGuard {
    state: SyncState,
    clock: Arc<dyn Clock>,
    local: Arc<dyn LocalCommerce>,
    feedback: StatusFeedback,
    max_wait: Duration,
    stale_after: Duration,
    poll_interval: Duration,
}

impl ImportGuard {
    #[must_use]
    pub fn new(
        state: SyncState,
        clock: Arc<dyn Clock>,
        local: Arc<dyn LocalCommerce>,
        feedback: StatusFeedback,
    ) -> Self {
        Self {
            state,
            clock,
            local,
            feedback,
            max_wait: LOCK_MAX_WAIT,
            stale_after: LOCK_STALE_AFTER,
            poll_interval: LOCK_POLL_INTERVAL,
        }
    }

    /// Override the lock timings.
    #[must_use]
    pub const fn with_timing(
        mut self,
        max_wait: Duration,
        stale_after: Duration,
        poll_interval: Duration,
    ) -> Self {
        self.max_wait = max_wait;
        self.stale_after = stale_after;
        self.poll_interval = poll_interval;
        self
    }

    // =========================================================================
    // Already Imported
    // =========================================================================

    /// Look up a warehouse order created from `external_ref`.
    ///
    /// When one exists the storefront order is marked `submitted` with a
    /// comment citing it.
    ///
    /// # Errors
    ///
    /// Returns `LocalError` if the warehouse search fails.
    #[instrument(skip(self), fields(external_ref = %external_ref))]
    pub async fn already_imported(
        &self,
        external_ref: &ExternalRef,
    ) -> Result<Option<ExistingOrder>, LocalError> {
        let result = self
            .local
            .search(Entity::Order, json!({ "order_ref": external_ref.as_str() }))
            .await?;

        let Some(existing) = result.first().and_then(existing_order) else {
            return Ok(None);
        };

        info!(
            unique_id = %existing.unique_id,
            "WooCommerce Order # {external_ref}: already imported"
        );
        let message = format!(
            "Warehouse Order # {} was created at {}",
            existing.unique_id,
            existing.created_at.as_deref().unwrap_or("an unknown time")
        );
        self.feedback
            .comment(external_ref, FeedbackStatus::Submitted, &message)
            .await;

        Ok(Some(existing))
    }

    // =========================================================================
    // Advisory Lock
    // =========================================================================

    /// Acquire the import lock, waiting up to the configured maximum.
    ///
    /// # Errors
    ///
    /// Returns `LockError::Timeout` if the lock stays held and
    /// `LockError::State` if the state store fails.
    #[instrument(skip(self))]
    pub async fn acquire(&self) -> Result<(), LockError> {
        let started = tokio::time::Instant::now();
        loop {
            if self.try_acquire().await? {
                debug!("Import lock acquired");
                return Ok(());
            }
            if started.elapsed() >= self.max_wait {
                warn!(waited_secs = self.max_wait.as_secs(), "Import lock timed out");
                return Err(LockError::Timeout {
                    waited_secs: self.max_wait.as_secs(),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// One acquisition attempt.
    ///
    /// # Errors
    ///
    /// Returns `LockError::State` if the state store fails.
    pub async fn try_acquire(&self) -> Result<bool, LockError> {
        let now = self.clock.now();
        let current = self.state.lock_value().await?;
        if self.is_held(current.as_ref(), now) {
            return Ok(false);
        }
        Ok(self
            .state
            .swap_lock(current.as_ref(), LockRecord::locked(now))
            .await?)
    }

    /// Whether the lock is currently held by anyone.
    ///
    /// # Errors
    ///
    /// Returns `StateError` if the state store fails.
    pub async fn is_locked(&self) -> Result<bool, StateError> {
        let current = self.state.lock_value().await?;
        Ok(self.is_held(current.as_ref(), self.clock.now()))
    }

    fn is_held(&self, current: Option<&JsonValue>, now: chrono::DateTime<chrono::Utc>) -> bool {
        let stale_after =
            chrono::Duration::from_std(self.stale_after).unwrap_or_else(|_| chrono::Duration::days(365));
        current
            .and_then(decode_lock)
            .is_some_and(|record| record.is_held(now, stale_after))
    }

    /// Release the lock. Failures are logged, never returned.
    pub async fn release(&self) {
        if let Err(e) = self
            .state
            .write_lock(LockRecord::unlocked(self.clock.now()))
            .await
        {
            warn!(error = %e, "Could not release import lock");
        } else {
            debug!("Import lock released");
        }
    }

    /// Run `f` while holding the lock.
    ///
    /// The lock is released on every exit path, including when `f` fails or
    /// panics; a panic is resumed after the release.
    ///
    /// # Errors
    ///
    /// Returns the lock error if the lock cannot be acquired, otherwise
    /// whatever `f` returns.
    pub async fn with_import_lock<F, Fut, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<LockError>,
    {
        self.acquire().await?;
        let outcome = AssertUnwindSafe(f()).catch_unwind().await;
        self.release().await;
        match outcome {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

/// Read an existing order from a warehouse search hit.
fn existing_order(record: &JsonValue) -> Option<ExistingOrder> {
    let unique_id = match record.get("unique_id")? {
        JsonValue::String(id) if !id.is_empty() => id.clone(),
        JsonValue::Number(id) => id.to_string(),
        _ => return None,
    };
    let created_at = record
        .get("created_at")
        .and_then(JsonValue::as_str)
        .map(str::to_string);
    Some(ExistingOrder {
        unique_id: LocalOrderId::new(unique_id),
        created_at,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::clock::ManualClock;
    use crate::local::SearchResult;
    use crate::remote::{HttpMethod, RemoteError, RemoteGateway};
    use crate::sync_state::MemoryStateStore;

    struct OrdersByRef(Vec<JsonValue>);

    #[async_trait]
    impl LocalCommerce for OrdersByRef {
        async fn search(&self, _entity: Entity, _filter: JsonValue) -> Result<SearchResult, LocalError> {
            Ok(SearchResult {
                total_count: self.0.len() as u64,
                results: self.0.clone(),
            })
        }
        async fn create(&self, _entity: Entity, _fields: JsonValue) -> Result<JsonValue, LocalError> {
            Ok(JsonValue::Null)
        }
        async fn comment(&self, _id: &str, _text: &str) -> Result<(), LocalError> {
            Ok(())
        }
        async fn get(&self, _entity: Entity, _id: JsonValue) -> Result<JsonValue, LocalError> {
            Ok(JsonValue::Null)
        }
    }

    #[derive(Default)]
    struct Comments(Mutex<Vec<JsonValue>>);

    #[async_trait]
    impl RemoteGateway for Comments {
        async fn request(
            &self,
            _endpoint: &str,
            _method: HttpMethod,
            params: JsonValue,
        ) -> Result<JsonValue, RemoteError> {
            self.0.lock().unwrap().push(params);
            Ok(JsonValue::Bool(true))
        }
    }

    fn start() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn guard_with(orders: Vec<JsonValue>) -> (ImportGuard, Arc<ManualClock>, Arc<Comments>) {
        let clock = Arc::new(ManualClock::new(start()));
        let comments = Arc::new(Comments::default());
        let guard = ImportGuard::new(
            SyncState::new(Arc::new(MemoryStateStore::new())),
            clock.clone(),
            Arc::new(OrdersByRef(orders)),
            StatusFeedback::new(comments.clone()),
        );
        (guard, clock, comments)
    }

    #[tokio::test]
    async fn test_already_imported_comments_existing_order() {
        let (guard, _, comments) = guard_with(vec![json!({
            "unique_id": "100000042",
            "created_at": "2024-01-01 10:00:00"
        })]);

        let existing = guard
            .already_imported(&ExternalRef::new("1001"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(existing.unique_id.as_str(), "100000042");

        let comments = comments.0.lock().unwrap();
        assert_eq!(
            *comments,
            vec![json!([
                "1001",
                "submitted",
                "Warehouse Order # 100000042 was created at 2024-01-01 10:00:00"
            ])]
        );
    }

    #[tokio::test]
    async fn test_not_imported() {
        let (guard, _, comments) = guard_with(Vec::new());
        assert!(
            guard
                .already_imported(&ExternalRef::new("1001"))
                .await
                .unwrap()
                .is_none()
        );
        assert!(comments.0.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_acquire_times_out() {
        let (guard, _, _) = guard_with(Vec::new());
        guard.acquire().await.unwrap();

        let err = guard.acquire().await.unwrap_err();
        assert!(matches!(err, LockError::Timeout { waited_secs: 20 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_lock_is_reclaimed() {
        let (guard, clock, _) = guard_with(Vec::new());
        guard.acquire().await.unwrap();

        clock.advance(chrono::Duration::seconds(61));
        guard.acquire().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_released_lock_can_be_acquired() {
        let (guard, _, _) = guard_with(Vec::new());
        guard.acquire().await.unwrap();
        assert!(guard.is_locked().await.unwrap());
        guard.release().await;
        assert!(!guard.is_locked().await.unwrap());
        assert!(guard.try_acquire().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_import_lock_releases_on_error() {
        let (guard, _, _) = guard_with(Vec::new());
        let result: Result<(), LockError> = guard
            .with_import_lock(|| async { Err(LockError::Timeout { waited_secs: 0 }) })
            .await;
        assert!(result.is_err());
        assert!(!guard.is_locked().await.unwrap());
    }

    const fn inner_panics() -> bool {
        true
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_import_lock_releases_on_panic() {
        let (guard, _, _) = guard_with(Vec::new());
        let inner = guard.clone();
        let handle = tokio::spawn(async move {
            inner
                .with_import_lock(|| async {
                    if inner_panics() {
                        panic!("import blew up");
                    }
                    Ok::<(), LockError>(())
                })
                .await
        });
        assert!(handle.await.is_err());
        assert!(!guard.is_locked().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_holders_never_overlap() {
        let (guard, _, _) = guard_with(Vec::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..3)
            .map(|_| {
                let guard = guard.clone();
                let inside = inside.clone();
                let max_inside = max_inside.clone();
                tokio::spawn(async move {
                    guard
                        .with_import_lock(|| async {
                            let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                            max_inside.fetch_max(now, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_secs(2)).await;
                            inside.fetch_sub(1, Ordering::SeqCst);
                            Ok::<(), LockError>(())
                        })
                        .await
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }
}
