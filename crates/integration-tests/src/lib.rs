//! End-to-end test support for woosync.
//!
//! Stateful in-memory stand-ins for the storefront and the warehouse, plus a
//! [`Harness`] wiring them to a real [`Connector`] with a real event queue.
//! No network or database is needed.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p woosync-integration-tests
//! ```

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Value as JsonValue, json};
use woosync_core::timestamp::parse_timestamp;
use woosync_engine::Connector;
use woosync_engine::clock::ManualClock;
use woosync_engine::events::{EventWorker, QueueBus};
use woosync_engine::local::{Entity, LocalCommerce, LocalError, SearchResult};
use woosync_engine::remote::{HttpMethod, RemoteError, RemoteGateway, endpoints};
use woosync_engine::settings::{MemoryConfigStore, SettingKey};
use woosync_engine::sync_state::MemoryStateStore;

/// Fixed "now" of every harness.
#[must_use]
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 10, 12, 0, 0).unwrap()
}

/// A storefront order with one parent line, one child line, and a flat rate
/// shipping line.
#[must_use]
pub fn storefront_order(increment_id: &str, status: &str, updated_at: &str) -> JsonValue {
    json!({
        "increment_id": increment_id,
        "status": status,
        "updated_at": updated_at,
        "shipping_method": "flat",
        "shipping_address": {
            "firstname": "Ada",
            "lastname": "Lovelace",
            "street": "12 Analytical Row",
            "street2": "Unit 3",
            "city": "London",
            "postcode": "N1 9GU",
            "country_id": "GB"
        },
        "items": [
            {"item_id": 1, "sku": "MUG", "name": "Mug", "qty_ordered": "2.0000"},
            {"item_id": 2, "parent_item_id": 1, "sku": "MUG-RED", "name": "Mug (red)", "qty_ordered": "2.0000"}
        ],
        "shipping_lines": [{"shipping_method": "flat", "shipping_description": "Flat Rate"}]
    })
}

// =============================================================================
// Storefront
// =============================================================================

/// A storefront comment: order reference, new status, message.
pub type Comment = (String, String, String);

/// In-memory storefront implementing the sync extension endpoints.
#[derive(Default)]
pub struct SimStorefront {
    orders: Mutex<Vec<JsonValue>>,
    comments: Mutex<Vec<Comment>>,
    stock_adjustments: Mutex<Vec<(String, f64)>>,
    shipments: Mutex<Vec<(String, JsonValue)>>,
    config: Mutex<HashMap<String, JsonValue>>,
    list_calls: Mutex<Vec<JsonValue>>,
    down: Mutex<HashSet<&'static str>>,
}

impl SimStorefront {
    pub fn add_order(&self, order: JsonValue) {
        self.orders.lock().unwrap().push(order);
    }

    /// Make `endpoint` answer 503 until [`SimStorefront::restore`].
    pub fn take_down(&self, endpoint: &'static str) {
        self.down.lock().unwrap().insert(endpoint);
    }

    pub fn restore(&self, endpoint: &'static str) {
        self.down.lock().unwrap().remove(endpoint);
    }

    #[must_use]
    pub fn comments(&self) -> Vec<Comment> {
        self.comments.lock().unwrap().clone()
    }

    #[must_use]
    pub fn status_of(&self, increment_id: &str) -> Option<String> {
        self.orders
            .lock()
            .unwrap()
            .iter()
            .find(|o| o["increment_id"] == increment_id)
            .and_then(|o| o["status"].as_str().map(str::to_string))
    }

    #[must_use]
    pub fn stock_adjustments(&self) -> Vec<(String, f64)> {
        self.stock_adjustments.lock().unwrap().clone()
    }

    #[must_use]
    pub fn shipments(&self) -> Vec<(String, JsonValue)> {
        self.shipments.lock().unwrap().clone()
    }

    #[must_use]
    pub fn config_value(&self, path: &str) -> Option<JsonValue> {
        self.config.lock().unwrap().get(path).cloned()
    }

    /// Params of every order list request.
    #[must_use]
    pub fn list_calls(&self) -> Vec<JsonValue> {
        self.list_calls.lock().unwrap().clone()
    }

    fn list(&self, params: &JsonValue) -> JsonValue {
        self.list_calls.lock().unwrap().push(params.clone());

        let statuses: Vec<&str> = params["status"]
            .as_array()
            .map(|s| s.iter().filter_map(JsonValue::as_str).collect())
            .unwrap_or_default();
        let after = params["modified_after"].as_str().and_then(parse_timestamp);
        let before = params["modified_before"].as_str().and_then(parse_timestamp);
        let per_page = params["per_page"]
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(usize::MAX);

        let mut matching: Vec<(DateTime<Utc>, JsonValue)> = self
            .orders
            .lock()
            .unwrap()
            .iter()
            .filter(|o| statuses.contains(&o["status"].as_str().unwrap_or_default()))
            .filter_map(|o| {
                let updated = o["updated_at"].as_str().and_then(parse_timestamp)?;
                let in_window = after.is_none_or(|a| updated >= a)
                    && before.is_none_or(|b| updated <= b);
                in_window.then(|| (updated, o.clone()))
            })
            .collect();
        matching.sort_by_key(|(updated, _)| *updated);

        JsonValue::Array(
            matching
                .into_iter()
                .take(per_page)
                .map(|(_, order)| order)
                .collect(),
        )
    }

    fn info(&self, params: &JsonValue) -> Result<JsonValue, RemoteError> {
        let id = params.as_str().unwrap_or_default();
        self.orders
            .lock()
            .unwrap()
            .iter()
            .find(|o| o["increment_id"] == id)
            .cloned()
            .ok_or_else(|| RemoteError::Http {
                status: 404,
                body: format!("order {id} not found"),
            })
    }

    fn add_comment(&self, params: &JsonValue) -> JsonValue {
        let field = |i: usize| {
            params
                .get(i)
                .and_then(JsonValue::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let (id, status, message) = (field(0), field(1), field(2));
        if let Some(order) = self
            .orders
            .lock()
            .unwrap()
            .iter_mut()
            .find(|o| o["increment_id"] == id.as_str())
        {
            order["status"] = json!(status);
        }
        self.comments.lock().unwrap().push((id, status, message));
        json!(true)
    }
}

#[async_trait]
impl RemoteGateway for SimStorefront {
    async fn request(
        &self,
        endpoint: &str,
        _method: HttpMethod,
        params: JsonValue,
    ) -> Result<JsonValue, RemoteError> {
        if self.down.lock().unwrap().contains(endpoint) {
            return Err(RemoteError::Http {
                status: 503,
                body: "Service Unavailable".to_string(),
            });
        }

        match endpoint {
            endpoints::ORDER_LIST => Ok(self.list(&params)),
            endpoints::ORDER_INFO => self.info(&params),
            endpoints::ORDER_ADD_COMMENT => Ok(self.add_comment(&params)),
            endpoints::STOCK_ITEM_ADJUST => {
                let sku = params[0].as_str().unwrap_or_default().to_string();
                let qty = params[1].as_f64().unwrap_or_default();
                self.stock_adjustments.lock().unwrap().push((sku, qty));
                Ok(json!(true))
            }
            endpoints::SHIPMENT_CREATE_WITH_TRACKING => {
                let mut shipments = self.shipments.lock().unwrap();
                let id = params[0].as_str().unwrap_or_default().to_string();
                shipments.push((id, params[1].clone()));
                Ok(json!(shipments.len()))
            }
            endpoints::SET_CONFIG => {
                let path = params["path"].as_str().unwrap_or_default().to_string();
                self.config
                    .lock()
                    .unwrap()
                    .insert(path, params["value"].clone());
                Ok(json!(true))
            }
            endpoints::SYNC_INVENTORY => Ok(json!({"success": true})),
            endpoints::INFO => Ok(json!({
                "woocommerce_version": "8.5.1",
                "wordpress_version": "6.4.2",
                "shipstream_sync_version": "1.2.0"
            })),
            other => Err(RemoteError::UnexpectedResponse(format!(
                "no such endpoint: {other}"
            ))),
        }
    }
}

// =============================================================================
// Warehouse
// =============================================================================

/// In-memory warehouse.
#[derive(Default)]
pub struct SimWarehouse {
    orders: Mutex<Vec<JsonValue>>,
    comments: Mutex<Vec<(String, String)>>,
    inventory: Mutex<Vec<JsonValue>>,
    warehouses: Mutex<HashMap<String, JsonValue>>,
    create_delay: Mutex<Option<Duration>>,
}

impl SimWarehouse {
    /// Delay every order creation (lets concurrent imports interleave).
    pub fn delay_creates(&self, by: Duration) {
        *self.create_delay.lock().unwrap() = Some(by);
    }

    pub fn set_stock(&self, sku: &str, qty: i64) {
        self.inventory
            .lock()
            .unwrap()
            .push(json!({"sku": sku, "qty_available": qty}));
    }

    pub fn add_warehouse(&self, id: &str, name: &str) {
        self.warehouses
            .lock()
            .unwrap()
            .insert(id.to_string(), json!({"warehouse_id": id, "name": name}));
    }

    /// Import payloads of every created order, in creation order.
    #[must_use]
    pub fn orders(&self) -> Vec<JsonValue> {
        self.orders.lock().unwrap().clone()
    }

    #[must_use]
    pub fn comments(&self) -> Vec<(String, String)> {
        self.comments.lock().unwrap().clone()
    }
}

fn search_result(results: Vec<JsonValue>) -> SearchResult {
    SearchResult {
        total_count: results.len() as u64,
        results,
    }
}

#[async_trait]
impl LocalCommerce for SimWarehouse {
    async fn search(&self, entity: Entity, filter: JsonValue) -> Result<SearchResult, LocalError> {
        let results = match entity {
            Entity::Order => self
                .orders
                .lock()
                .unwrap()
                .iter()
                .filter(|o| o["order_ref"] == filter["order_ref"])
                .map(|o| {
                    json!({
                        "unique_id": o["unique_id"],
                        "order_ref": o["order_ref"],
                        "created_at": "2024-01-10 12:00:00"
                    })
                })
                .collect(),
            Entity::Inventory => self.inventory.lock().unwrap().clone(),
            Entity::Product | Entity::Warehouse => Vec::new(),
        };
        Ok(search_result(results))
    }

    async fn create(&self, entity: Entity, fields: JsonValue) -> Result<JsonValue, LocalError> {
        if entity != Entity::Order {
            return Err(LocalError::Rpc {
                code: 400,
                message: format!("cannot create {entity}"),
            });
        }
        let delay = *self.create_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut orders = self.orders.lock().unwrap();
        let unique_id = format!("1000000{:02}", orders.len() + 1);
        let mut record = fields;
        record["unique_id"] = json!(unique_id);
        record["order_ref"] = record["options"]["order_ref"].clone();
        orders.push(record);
        Ok(json!({"success": true, "unique_id": unique_id}))
    }

    async fn comment(&self, id: &str, text: &str) -> Result<(), LocalError> {
        self.comments
            .lock()
            .unwrap()
            .push((id.to_string(), text.to_string()));
        Ok(())
    }

    async fn get(&self, entity: Entity, id: JsonValue) -> Result<JsonValue, LocalError> {
        let key = match &id {
            JsonValue::String(s) => s.clone(),
            other => other.to_string(),
        };
        let found = match entity {
            Entity::Warehouse => self.warehouses.lock().unwrap().get(&key).cloned(),
            _ => None,
        };
        found.ok_or_else(|| LocalError::Rpc {
            code: 404,
            message: format!("{entity} {key} not found"),
        })
    }
}

// =============================================================================
// Harness
// =============================================================================

/// A connector wired to the simulators, a manual clock, in-memory state,
/// and a real event queue.
pub struct Harness {
    pub storefront: Arc<SimStorefront>,
    pub warehouse: Arc<SimWarehouse>,
    pub clock: Arc<ManualClock>,
    pub connector: Connector,
    pub worker: EventWorker,
}

impl Harness {
    /// Harness importing `processing` orders.
    #[must_use]
    pub fn new() -> Self {
        Self::with_settings(MemoryConfigStore::new())
    }

    /// Harness with extra settings, importing `processing` orders and with a
    /// callback URL configured.
    #[must_use]
    pub fn with_settings(settings: MemoryConfigStore) -> Self {
        let settings = settings
            .with(SettingKey::AutoFulfillStatus, "processing")
            .with(SettingKey::CallbackUrl, "https://sync.example.com/callback");
        Self::from_parts(settings)
    }

    /// Harness with exactly `settings`.
    #[must_use]
    pub fn from_parts(settings: MemoryConfigStore) -> Self {
        let storefront = Arc::new(SimStorefront::default());
        let warehouse = Arc::new(SimWarehouse::default());
        let clock = Arc::new(ManualClock::new(now()));
        let (bus, receiver) = QueueBus::channel(64);

        let connector = Connector::new(
            Arc::new(settings),
            storefront.clone(),
            warehouse.clone(),
            Arc::new(MemoryStateStore::new()),
            Arc::new(bus),
            clock.clone(),
        );
        let worker = EventWorker::new(receiver, Arc::new(connector.clone()))
            .with_retry(3, Duration::from_millis(10));

        Self {
            storefront,
            warehouse,
            clock,
            connector,
            worker,
        }
    }

    /// Process every queued event.
    pub async fn drain(&mut self) -> usize {
        self.worker.drain().await
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
