//! Test doubles shared by the unit tests of this crate.

#![allow(clippy::unwrap_used)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};
use uuid::Uuid;

use crate::events::{DispatchError, EventBus, SyncEvent};
use crate::local::{Entity, LocalCommerce, LocalError, SearchResult};
use crate::remote::{HttpMethod, RemoteError, RemoteGateway};

/// Storefront double answering from per-endpoint queues.
///
/// Endpoints with nothing queued answer `true`.
#[derive(Default)]
pub struct FakeRemote {
    responses: Mutex<HashMap<String, VecDeque<Result<JsonValue, RemoteError>>>>,
    calls: Mutex<Vec<(String, HttpMethod, JsonValue)>>,
}

impl FakeRemote {
    pub fn respond(&self, endpoint: &str, value: JsonValue) {
        self.push(endpoint, Ok(value));
    }

    pub fn fail(&self, endpoint: &str, error: RemoteError) {
        self.push(endpoint, Err(error));
    }

    fn push(&self, endpoint: &str, response: Result<JsonValue, RemoteError>) {
        self.responses
            .lock()
            .unwrap()
            .entry(endpoint.to_string())
            .or_default()
            .push_back(response);
    }

    /// Params of every call made to `endpoint`.
    pub fn calls_to(&self, endpoint: &str) -> Vec<JsonValue> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(e, _, _)| e == endpoint)
            .map(|(_, _, params)| params.clone())
            .collect()
    }
}

#[async_trait]
impl RemoteGateway for FakeRemote {
    async fn request(
        &self,
        endpoint: &str,
        method: HttpMethod,
        params: JsonValue,
    ) -> Result<JsonValue, RemoteError> {
        self.calls
            .lock()
            .unwrap()
            .push((endpoint.to_string(), method, params));
        self.responses
            .lock()
            .unwrap()
            .get_mut(endpoint)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Ok(JsonValue::Bool(true)))
    }
}

/// Warehouse double keeping imported orders in memory.
#[derive(Default)]
pub struct FakeLocal {
    pub orders: Mutex<Vec<JsonValue>>,
    pub products: Vec<JsonValue>,
    pub inventory: Vec<JsonValue>,
    pub warehouses: HashMap<String, JsonValue>,
    pub reject_with: Option<String>,
    pub comments: Mutex<Vec<(String, String)>>,
    pub(crate) next_id: AtomicU64,
}

impl FakeLocal {
    pub fn imported(&self) -> usize {
        self.orders.lock().unwrap().len()
    }

    /// Seed an order as if it had been imported earlier.
    pub fn seed_order(&self, order_ref: &str, unique_id: &str) {
        self.orders.lock().unwrap().push(json!({
            "unique_id": unique_id,
            "order_ref": order_ref,
            "created_at": "2024-01-01 10:00:00"
        }));
    }
}

fn found(results: Vec<JsonValue>) -> SearchResult {
    SearchResult {
        total_count: results.len() as u64,
        results,
    }
}

#[async_trait]
impl LocalCommerce for FakeLocal {
    async fn search(&self, entity: Entity, filter: JsonValue) -> Result<SearchResult, LocalError> {
        Ok(match entity {
            Entity::Order => found(
                self.orders
                    .lock()
                    .unwrap()
                    .iter()
                    .filter(|o| o["order_ref"] == filter["order_ref"])
                    .cloned()
                    .collect(),
            ),
            Entity::Product => {
                let wanted = filter["sku"]["in"].as_array().cloned().unwrap_or_default();
                found(
                    self.products
                        .iter()
                        .filter(|p| wanted.contains(&p["sku"]))
                        .cloned()
                        .collect(),
                )
            }
            Entity::Inventory => found(self.inventory.clone()),
            Entity::Warehouse => found(self.warehouses.values().cloned().collect()),
        })
    }

    async fn create(&self, entity: Entity, fields: JsonValue) -> Result<JsonValue, LocalError> {
        assert_eq!(entity, Entity::Order);
        if let Some(message) = &self.reject_with {
            return Ok(json!({"success": false, "message": message}));
        }
        let unique_id = format!("1000000{:02}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.orders.lock().unwrap().push(json!({
            "unique_id": unique_id,
            "order_ref": fields["options"]["order_ref"],
            "created_at": "2024-01-01 10:00:00",
            "fields": fields
        }));
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
        assert_eq!(entity, Entity::Warehouse);
        let key = match &id {
            JsonValue::String(s) => s.clone(),
            other => other.to_string(),
        };
        self.warehouses
            .get(&key)
            .cloned()
            .ok_or_else(|| LocalError::Rpc {
                code: 404,
                message: format!("warehouse {key} not found"),
            })
    }
}

/// Bus that records events instead of queueing them.
#[derive(Default)]
pub struct RecordingBus {
    pub events: Mutex<Vec<SyncEvent>>,
}

impl RecordingBus {
    pub fn events(&self) -> Vec<SyncEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventBus for RecordingBus {
    async fn dispatch(&self, event: SyncEvent) -> Result<Uuid, DispatchError> {
        self.events.lock().unwrap().push(event);
        Ok(Uuid::new_v4())
    }
}
