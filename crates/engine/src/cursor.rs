//! Incremental order pull.
//!
//! Each pass pages through storefront orders modified inside a time window
//! and queues one import event per order. The window starts at the persisted
//! watermark and ends at "now"; the watermark only moves forward once every
//! page has been fetched.
//!
//! The cursor reads the import lock for logging but never waits on it. It
//! only queues events, and each import takes the lock itself.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::{Value as JsonValue, json};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use woosync_core::timestamp::{format_timestamp, parse_timestamp};
use woosync_core::{RemoteOrderRecord, StatusFilter};

use crate::clock::Clock;
use crate::events::{DispatchError, EventBus, SyncEvent};
use crate::guard::ImportGuard;
use crate::remote::{HttpMethod, RemoteError, RemoteGateway, endpoints};
use crate::sync_state::{StateError, SyncState};

/// Orders requested per page.
pub const PAGE_SIZE: usize = 100;
/// Window start when no watermark has been persisted.
pub const DEFAULT_LOOKBACK_DAYS: i64 = 5;

/// Failures of a pull pass.
#[derive(Debug, Error)]
pub enum PollError {
    /// A page could not be fetched.
    #[error("order list request failed: {0}")]
    Fetch(#[from] RemoteError),

    /// The watermark could not be read or written.
    #[error("{0}")]
    State(#[from] StateError),

    /// An import event could not be queued.
    #[error("{0}")]
    Dispatch(#[from] DispatchError),

    /// The order list response was not a list of orders.
    #[error("invalid order list response: {0}")]
    InvalidResponse(String),

    /// A full page ended before the window start; the storefront is not
    /// honoring `modified_after`.
    #[error("order list did not advance past {from}")]
    Stalled { from: DateTime<Utc> },
}

impl PollError {
    /// Whether a later pass may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Fetch(e) => e.is_transient(),
            Self::State(_) => true,
            Self::Dispatch(_) | Self::InvalidResponse(_) | Self::Stalled { .. } => false,
        }
    }
}

/// What one pass did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PollSummary {
    /// Window start.
    pub from: DateTime<Utc>,
    /// Window end, persisted as the new watermark.
    pub to: DateTime<Utc>,
    /// Pages fetched.
    pub pages: u32,
    /// Import events queued.
    pub queued: usize,
}

/// Paginated, watermark-driven order pull.
#[derive(Clone)]
pub struct OrderCursor {
    remote: Arc<dyn RemoteGateway>,
    state: SyncState,
    guard: ImportGuard,
    bus: Arc<dyn EventBus>,
    clock: Arc<dyn Clock>,
    page_size: usize,
}

impl OrderCursor {
    #[must_use]
    pub fn new(
        remote: Arc<dyn RemoteGateway>,
        state: SyncState,
        guard: ImportGuard,
        bus: Arc<dyn EventBus>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            remote,
            state,
            guard,
            bus,
            clock,
            page_size: PAGE_SIZE,
        }
    }

    /// Override the page size.
    #[must_use]
    pub const fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Run one pass.
    ///
    /// Returns `None` when the status filter is disabled; nothing is fetched
    /// and the watermark is left alone.
    ///
    /// # Errors
    ///
    /// Returns `PollError` if a page fetch, an event dispatch, or the state
    /// store fails. The watermark is not advanced on failure.
    #[instrument(skip(self, filter), fields(since = ?since))]
    pub async fn run(
        &self,
        filter: &StatusFilter,
        since: Option<DateTime<Utc>>,
    ) -> Result<Option<PollSummary>, PollError> {
        let statuses = filter.statuses();
        if statuses.is_empty() {
            debug!("Automatic order import disabled");
            return Ok(None);
        }

        match self.guard.is_locked().await {
            Ok(true) => info!("Order import lock is held, continuing"),
            Ok(false) => {}
            Err(e) => warn!(error = %e, "Could not read order import lock"),
        }

        let to = self.clock.now();
        let start = match since {
            Some(since) => since,
            None => self
                .state
                .watermark()
                .await?
                .unwrap_or_else(|| to - Duration::days(DEFAULT_LOOKBACK_DAYS)),
        };

        let mut from = start;
        let mut pages = 0;
        let mut queued = 0;
        loop {
            let page = self.fetch_page(statuses, from, to).await?;
            pages += 1;
            debug!(
                page = pages,
                count = page.orders.len(),
                from = %from,
                "Fetched order page"
            );

            for order in &page.orders {
                self.bus
                    .dispatch(SyncEvent::ImportOrder {
                        external_ref: order.increment_id.clone(),
                    })
                    .await?;
                queued += 1;
            }

            let Some(latest) = page.latest else {
                break;
            };
            let next = (latest + Duration::seconds(1)).min(to);
            if next <= from {
                if page.len < self.page_size {
                    break;
                }
                warn!(from = %from, latest = %latest, "Order list did not move past the window start");
                return Err(PollError::Stalled { from });
            }
            from = next;
            if page.len < self.page_size || from >= to {
                break;
            }
        }

        self.state.set_watermark(to).await?;
        info!(
            watermark = %to,
            pages,
            queued,
            "Order pull complete"
        );

        Ok(Some(PollSummary {
            from: start,
            to,
            pages,
            queued,
        }))
    }

    async fn fetch_page(
        &self,
        statuses: &[String],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<OrderPage, PollError> {
        let params = json!({
            "status": statuses,
            "modified_after": format_timestamp(from),
            "modified_before": format_timestamp(to),
            "per_page": self.page_size,
            "orderby": "modified",
            "order": "asc",
        });
        let response = self
            .remote
            .request(endpoints::ORDER_LIST, HttpMethod::Get, params)
            .await?;
        parse_page(response)
    }
}

/// One page of the order list.
#[derive(Debug)]
struct OrderPage {
    /// Records that could be read.
    orders: Vec<RemoteOrderRecord>,
    /// Records returned, readable or not.
    len: usize,
    /// Latest modification time on the page, unreadable records included.
    latest: Option<DateTime<Utc>>,
}

/// Read an order list page. Unreadable records are logged and skipped so
/// one bad order cannot hold the watermark back.
fn parse_page(response: JsonValue) -> Result<OrderPage, PollError> {
    let JsonValue::Array(records) = response else {
        return Err(PollError::InvalidResponse(format!(
            "expected an array, got {response}"
        )));
    };

    let len = records.len();
    let latest = records
        .iter()
        .filter_map(|record| record.get("updated_at").and_then(JsonValue::as_str))
        .filter_map(parse_timestamp)
        .max();
    let orders = records
        .into_iter()
        .filter_map(|record| {
            let increment_id = record.get("increment_id").cloned();
            match serde_json::from_value::<RemoteOrderRecord>(record) {
                Ok(order) => Some(order),
                Err(e) => {
                    warn!(increment_id = ?increment_id, error = %e, "Skipping unreadable order record");
                    None
                }
            }
        })
        .collect();

    Ok(OrderPage {
        orders,
        len,
        latest,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;
    use woosync_core::{ExternalRef, LockRecord};

    use super::*;
    use crate::clock::ManualClock;
    use crate::feedback::StatusFeedback;
    use crate::sync_state::MemoryStateStore;
    use crate::testing::{FakeLocal, FakeRemote, RecordingBus};

    struct Harness {
        remote: Arc<FakeRemote>,
        bus: Arc<RecordingBus>,
        state: SyncState,
        cursor: OrderCursor,
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 10, 12, 0, 0).unwrap()
    }

    fn harness(page_size: usize) -> Harness {
        let remote = Arc::new(FakeRemote::default());
        let bus = Arc::new(RecordingBus::default());
        let state = SyncState::new(Arc::new(MemoryStateStore::new()));
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(now()));
        let guard = ImportGuard::new(
            state.clone(),
            clock.clone(),
            Arc::new(FakeLocal::default()),
            StatusFeedback::new(remote.clone()),
        );
        let cursor = OrderCursor::new(remote.clone(), state.clone(), guard, bus.clone(), clock)
            .with_page_size(page_size);
        Harness {
            remote,
            bus,
            state,
            cursor,
        }
    }

    fn processing() -> StatusFilter {
        StatusFilter::from_settings(Some("processing"), None)
    }

    fn order(increment_id: &str, updated_at: &str) -> JsonValue {
        json!({"increment_id": increment_id, "updated_at": updated_at})
    }

    fn import(increment_id: &str) -> SyncEvent {
        SyncEvent::ImportOrder {
            external_ref: ExternalRef::new(increment_id),
        }
    }

    #[tokio::test]
    async fn test_disabled_filter_does_nothing() {
        let h = harness(PAGE_SIZE);
        let summary = h.cursor.run(&StatusFilter::Disabled, None).await.unwrap();
        assert!(summary.is_none());
        assert!(h.remote.calls_to(endpoints::ORDER_LIST).is_empty());
        assert!(h.state.watermark().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_window_advances_watermark() {
        let h = harness(PAGE_SIZE);
        h.state
            .set_watermark(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
            .await
            .unwrap();
        h.remote.respond(endpoints::ORDER_LIST, json!([]));

        let summary = h.cursor.run(&processing(), None).await.unwrap().unwrap();

        assert_eq!(summary.pages, 1);
        assert_eq!(summary.queued, 0);
        assert_eq!(h.state.watermark().await.unwrap(), Some(now()));
        assert!(h.bus.events().is_empty());

        let calls = h.remote.calls_to(endpoints::ORDER_LIST);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0]["modified_after"], "2024-01-01 00:00:00");
        assert_eq!(calls[0]["modified_before"], "2024-01-10 12:00:00");
        assert_eq!(calls[0]["status"], json!(["processing"]));
    }

    #[tokio::test]
    async fn test_default_window_looks_back_five_days() {
        let h = harness(PAGE_SIZE);
        h.remote.respond(endpoints::ORDER_LIST, json!([]));

        let summary = h.cursor.run(&processing(), None).await.unwrap().unwrap();
        assert_eq!(summary.from, now() - Duration::days(5));
    }

    #[tokio::test]
    async fn test_pages_until_short_page() {
        let h = harness(2);
        h.remote.respond(
            endpoints::ORDER_LIST,
            json!([
                order("1001", "2024-01-09 08:00:00"),
                order("1002", "2024-01-09 09:00:00")
            ]),
        );
        h.remote.respond(
            endpoints::ORDER_LIST,
            json!([order("1003", "2024-01-09 10:00:00")]),
        );

        let summary = h.cursor.run(&processing(), None).await.unwrap().unwrap();

        assert_eq!(summary.pages, 2);
        assert_eq!(
            h.bus.events(),
            vec![import("1001"), import("1002"), import("1003")]
        );
        let calls = h.remote.calls_to(endpoints::ORDER_LIST);
        assert_eq!(calls[1]["modified_after"], "2024-01-09 09:00:01");
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_watermark() {
        let h = harness(PAGE_SIZE);
        let watermark = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        h.state.set_watermark(watermark).await.unwrap();
        h.remote.fail(
            endpoints::ORDER_LIST,
            RemoteError::Http {
                status: 502,
                body: "bad gateway".to_string(),
            },
        );

        let err = h.cursor.run(&processing(), None).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(h.state.watermark().await.unwrap(), Some(watermark));
    }

    #[tokio::test]
    async fn test_held_lock_does_not_block() {
        let h = harness(PAGE_SIZE);
        h.state.write_lock(LockRecord::locked(now())).await.unwrap();
        h.remote
            .respond(endpoints::ORDER_LIST, json!([order("1001", "2024-01-09 08:00:00")]));

        let summary = h.cursor.run(&processing(), None).await.unwrap().unwrap();
        assert_eq!(summary.queued, 1);
    }

    #[tokio::test]
    async fn test_since_override_wins_over_watermark() {
        let h = harness(PAGE_SIZE);
        h.state
            .set_watermark(Utc.with_ymd_and_hms(2024, 1, 9, 0, 0, 0).unwrap())
            .await
            .unwrap();
        h.remote.respond(endpoints::ORDER_LIST, json!([]));

        let since = Utc.with_ymd_and_hms(2023, 12, 1, 0, 0, 0).unwrap();
        let summary = h.cursor.run(&processing(), Some(since)).await.unwrap().unwrap();
        assert_eq!(summary.from, since);
    }

    #[tokio::test]
    async fn test_numeric_increment_id_is_queued() {
        let h = harness(PAGE_SIZE);
        h.remote.respond(
            endpoints::ORDER_LIST,
            json!([{"increment_id": 1001, "updated_at": "2024-01-09 10:00:00"}]),
        );

        let summary = h.cursor.run(&processing(), None).await.unwrap().unwrap();

        assert_eq!(summary.queued, 1);
        assert_eq!(h.bus.events(), vec![import("1001")]);
        assert_eq!(h.state.watermark().await.unwrap(), Some(now()));
    }

    #[tokio::test]
    async fn test_unreadable_record_is_skipped() {
        let h = harness(2);
        h.remote.respond(
            endpoints::ORDER_LIST,
            json!([
                order("1001", "2024-01-09 08:00:00"),
                {"increment_id": {"bad": true}, "updated_at": "2024-01-09 09:00:00"}
            ]),
        );
        h.remote.respond(
            endpoints::ORDER_LIST,
            json!([order("1003", "2024-01-09 10:00:00")]),
        );

        let summary = h.cursor.run(&processing(), None).await.unwrap().unwrap();

        assert_eq!(summary.pages, 2);
        assert_eq!(h.bus.events(), vec![import("1001"), import("1003")]);
        let calls = h.remote.calls_to(endpoints::ORDER_LIST);
        assert_eq!(calls[1]["modified_after"], "2024-01-09 09:00:01");
        assert_eq!(h.state.watermark().await.unwrap(), Some(now()));
    }

    #[tokio::test]
    async fn test_full_page_before_window_start_stops_the_pass() {
        let h = harness(2);
        let watermark = Utc.with_ymd_and_hms(2024, 1, 9, 12, 0, 0).unwrap();
        h.state.set_watermark(watermark).await.unwrap();
        for _ in 0..3 {
            h.remote.respond(
                endpoints::ORDER_LIST,
                json!([
                    order("1001", "2024-01-09 08:00:00"),
                    order("1002", "2024-01-09 09:00:00")
                ]),
            );
        }

        let err = h.cursor.run(&processing(), None).await.unwrap_err();

        assert!(matches!(err, PollError::Stalled { from } if from == watermark));
        assert!(!err.is_transient());
        assert_eq!(h.remote.calls_to(endpoints::ORDER_LIST).len(), 1);
        assert_eq!(h.bus.events().len(), 2);
        assert_eq!(h.state.watermark().await.unwrap(), Some(watermark));
    }

    #[tokio::test]
    async fn test_short_page_before_window_start_completes() {
        let h = harness(2);
        let watermark = Utc.with_ymd_and_hms(2024, 1, 9, 12, 0, 0).unwrap();
        h.state.set_watermark(watermark).await.unwrap();
        h.remote.respond(
            endpoints::ORDER_LIST,
            json!([order("1001", "2024-01-09 08:00:00")]),
        );

        let summary = h.cursor.run(&processing(), None).await.unwrap().unwrap();

        assert_eq!(summary.pages, 1);
        assert_eq!(h.state.watermark().await.unwrap(), Some(now()));
    }

    #[tokio::test]
    async fn test_non_list_response_is_rejected() {
        let h = harness(PAGE_SIZE);
        h.remote
            .respond(endpoints::ORDER_LIST, json!({"code": "rest_no_route"}));

        let err = h.cursor.run(&processing(), None).await.unwrap_err();
        assert!(matches!(err, PollError::InvalidResponse(_)));
    }
}
