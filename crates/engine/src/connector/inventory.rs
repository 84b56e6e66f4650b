//! Inventory side channel.

use std::collections::BTreeMap;
use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde_json::{Value as JsonValue, json};
use tracing::{error, info, instrument, warn};
use woosync_core::{InventoryLevels, StockAdjustment};

use super::Connector;
use crate::error::SyncError;
use crate::local::Entity;
use crate::remote::{HttpMethod, RemoteError, endpoints};

impl Connector {
    /// Push warehouse stock deltas to the storefront, one SKU at a time.
    ///
    /// Entries with an empty SKU or a zero delta are skipped.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Remote` when the first adjustment fails, and
    /// `SyncError::PartialAdjustment` when a later one does. Deltas are not
    /// idempotent, so a partial failure is never retryable; earlier
    /// adjustments stay applied.
    #[instrument(skip(self, adjustments), fields(count = adjustments.len()))]
    pub async fn adjust_inventory(
        &self,
        adjustments: &BTreeMap<String, StockAdjustment>,
    ) -> Result<(), SyncError> {
        let pending: Vec<(&String, &StockAdjustment)> = adjustments
            .iter()
            .filter(|(sku, change)| !sku.trim().is_empty() && !change.qty_adjust.is_zero())
            .collect();

        for (applied, (sku, change)) in pending.iter().enumerate() {
            let result = self
                .remote
                .request(
                    endpoints::STOCK_ITEM_ADJUST,
                    HttpMethod::Post,
                    json!([sku, change.qty_adjust.to_f64()]),
                )
                .await;

            if let Err(e) = result {
                if applied == 0 {
                    return Err(e.into());
                }
                let unapplied: Vec<String> =
                    pending.iter().skip(applied).map(|(sku, _)| sku.to_string()).collect();
                error!(
                    applied,
                    unapplied = ?unapplied,
                    error = %e,
                    "Inventory adjustment stopped part way"
                );
                return Err(SyncError::PartialAdjustment {
                    applied,
                    unapplied,
                    source: Box::new(e.into()),
                });
            }

            info!(
                sku = %sku,
                qty_adjust = %change.qty_adjust.round_dp(4),
                "Adjusted inventory for the product"
            );
        }
        Ok(())
    }

    /// Ask the storefront to pull a full inventory snapshot.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Remote` when the call fails or the storefront
    /// reports `success: false`.
    #[instrument(skip(self))]
    pub async fn sync_inventory(&self) -> Result<(), SyncError> {
        let result = self
            .remote
            .request(endpoints::SYNC_INVENTORY, HttpMethod::Post, json!({}))
            .await?;
        if result.get("success").and_then(JsonValue::as_bool) == Some(true) {
            info!("Inventory sync started");
            return Ok(());
        }
        let message = result
            .get("message")
            .and_then(JsonValue::as_str)
            .unwrap_or("Inventory sync was not accepted");
        Err(RemoteError::UnexpectedResponse(message.to_string()).into())
    }

    /// Warehouse stock levels for the SKUs matching `filters`.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Local` if the warehouse search fails.
    #[instrument(skip(self, filters))]
    pub async fn inventory_query(&self, filters: JsonValue) -> Result<InventoryLevels, SyncError> {
        let filters = if filters.is_null() { json!({}) } else { filters };
        let result = self.local.search(Entity::Inventory, filters).await?;

        let mut levels = InventoryLevels::default();
        for row in &result.results {
            let Some(sku) = row.get("sku").and_then(JsonValue::as_str) else {
                continue;
            };
            let qty = row
                .get("qty_available")
                .or_else(|| row.get("qty"))
                .and_then(decimal);
            match qty {
                Some(qty) => {
                    levels.skus.insert(sku.to_string(), qty);
                }
                None => warn!(sku = %sku, "Inventory row has no quantity"),
            }
        }
        Ok(levels)
    }
}

fn decimal(value: &JsonValue) -> Option<Decimal> {
    match value {
        JsonValue::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        JsonValue::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use uuid::Uuid;

    use super::super::test_support::fixture;
    use super::*;
    use crate::events::{EventEnvelope, EventWorker, QueueBus, SyncEvent};
    use crate::settings::MemoryConfigStore;
    use crate::testing::FakeLocal;

    fn unavailable() -> RemoteError {
        RemoteError::Http {
            status: 503,
            body: "Service Unavailable".to_string(),
        }
    }

    fn adjust_two() -> EventEnvelope {
        EventEnvelope {
            id: Uuid::new_v4(),
            event: SyncEvent::AdjustInventory {
                adjustments: BTreeMap::from([
                    ("A".to_string(), StockAdjustment::new(Decimal::ONE)),
                    ("B".to_string(), StockAdjustment::new(Decimal::ONE)),
                ]),
            },
        }
    }

    #[tokio::test]
    async fn test_adjust_inventory_skips_empty_entries() {
        let f = fixture(MemoryConfigStore::new(), FakeLocal::default());
        let adjustments = BTreeMap::from([
            ("MUG".to_string(), StockAdjustment::new(Decimal::new(-2, 0))),
            ("KIT".to_string(), StockAdjustment::new(Decimal::ZERO)),
            (String::new(), StockAdjustment::new(Decimal::new(5, 0))),
        ]);

        f.connector.adjust_inventory(&adjustments).await.unwrap();

        let calls = f.remote.calls_to(endpoints::STOCK_ITEM_ADJUST);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], json!(["MUG", -2.0]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_does_not_replay_partially_applied_adjustments() {
        let f = fixture(MemoryConfigStore::new(), FakeLocal::default());
        f.remote.respond(endpoints::STOCK_ITEM_ADJUST, json!(true));
        f.remote.fail(endpoints::STOCK_ITEM_ADJUST, unavailable());
        let (_bus, receiver) = QueueBus::channel(1);
        let worker = EventWorker::new(receiver, Arc::new(f.connector.clone()))
            .with_retry(3, Duration::from_millis(10));

        assert!(!worker.process(&adjust_two()).await);

        assert_eq!(
            f.remote.calls_to(endpoints::STOCK_ITEM_ADJUST),
            vec![json!(["A", 1.0]), json!(["B", 1.0])]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_retries_when_nothing_was_applied() {
        let f = fixture(MemoryConfigStore::new(), FakeLocal::default());
        f.remote.fail(endpoints::STOCK_ITEM_ADJUST, unavailable());
        let (_bus, receiver) = QueueBus::channel(1);
        let worker = EventWorker::new(receiver, Arc::new(f.connector.clone()))
            .with_retry(3, Duration::from_millis(10));

        assert!(worker.process(&adjust_two()).await);

        assert_eq!(
            f.remote.calls_to(endpoints::STOCK_ITEM_ADJUST),
            vec![json!(["A", 1.0]), json!(["A", 1.0]), json!(["B", 1.0])]
        );
    }

    #[tokio::test]
    async fn test_partial_failure_names_unapplied_skus() {
        let f = fixture(MemoryConfigStore::new(), FakeLocal::default());
        f.remote.respond(endpoints::STOCK_ITEM_ADJUST, json!(true));
        f.remote.fail(endpoints::STOCK_ITEM_ADJUST, unavailable());
        let SyncEvent::AdjustInventory { adjustments } = adjust_two().event else {
            unreachable!()
        };

        let err = f.connector.adjust_inventory(&adjustments).await.unwrap_err();

        assert!(!err.is_retryable());
        assert!(matches!(
            &err,
            SyncError::PartialAdjustment { applied: 1, unapplied, .. } if unapplied == &vec!["B".to_string()]
        ));
    }

    #[tokio::test]
    async fn test_sync_inventory_failure_carries_message() {
        let f = fixture(MemoryConfigStore::new(), FakeLocal::default());
        f.remote.respond(
            endpoints::SYNC_INVENTORY,
            json!({"success": false, "message": "Sync already running"}),
        );

        let err = f.connector.sync_inventory().await.unwrap_err();
        assert!(err.to_string().contains("Sync already running"));
    }

    #[tokio::test]
    async fn test_sync_inventory_success() {
        let f = fixture(MemoryConfigStore::new(), FakeLocal::default());
        f.remote
            .respond(endpoints::SYNC_INVENTORY, json!({"success": true}));
        f.connector.sync_inventory().await.unwrap();
    }

    #[tokio::test]
    async fn test_inventory_query_reads_signed_levels() {
        let local = FakeLocal {
            inventory: vec![
                json!({"sku": "MUG", "qty_available": "12.0000"}),
                json!({"sku": "KIT", "qty_available": -3}),
                json!({"sku": "GHOST"}),
            ],
            ..FakeLocal::default()
        };
        let f = fixture(MemoryConfigStore::new(), local);

        let levels = f
            .connector
            .inventory_query(json!({"sku": {"in": ["MUG", "KIT"]}}))
            .await
            .unwrap();

        assert_eq!(levels.skus.len(), 2);
        assert_eq!(levels.skus["MUG"], Decimal::new(12, 0));
        assert_eq!(levels.skus["KIT"], Decimal::new(-3, 0));
    }
}
