//! Order transform stage.
//!
//! Runs the configured transform script over the import payload. Without a
//! script the payload passes through untouched.
//!
//! With a script:
//!
//! 1. Each item gets a `product` field with the warehouse product record for
//!    its SKU (one batched search, best effort)
//! 2. The script runs with `{order, remote}`
//! 3. The result must still look like an import payload
//! 4. A whole-order skip ends processing
//! 5. `product` is stripped, items marked `skip` are dropped, and an order
//!    left without items is skipped

pub mod script;

use std::collections::HashMap;

use serde_json::{Value as JsonValue, json};
use thiserror::Error;
use tracing::{info, warn};
use woosync_core::{NormalizedOrder, RemoteOrderRecord};

pub use script::{ScriptError, ScriptOutput, TransformScript, YamlScript};

use crate::local::{Entity, LocalCommerce};

/// Item field carrying the product record during a script run.
const PRODUCT_FIELD: &str = "product";
/// Item flag a script sets to drop the item.
const SKIP_FIELD: &str = "skip";

/// Transform stage failures.
#[derive(Debug, Error)]
pub enum TransformError {
    /// The script returned something that is not an import payload.
    #[error("unexpected shape")]
    UnexpectedShape,

    /// The script failed.
    #[error("{subject}: Transform Script: {source}")]
    Script {
        subject: String,
        #[source]
        source: ScriptError,
    },

    /// The payload could not be converted to or from JSON.
    #[error("transform payload error: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Result of the transform stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Transformed {
    /// The order to import, with any script log lines.
    Order {
        order: NormalizedOrder,
        log: Vec<String>,
    },
    /// The order should not be imported.
    Skipped { reason: String },
}

/// Log subject for an order.
#[must_use]
pub fn subject(order_ref: &str) -> String {
    format!("WooCommerce Order # {order_ref}")
}

/// Apply `script` (if any) to `order`.
///
/// # Errors
///
/// Returns `TransformError::Script` when the script fails,
/// `TransformError::UnexpectedShape` when its result is not an import payload,
/// and `TransformError::Payload` when the result cannot be decoded.
pub async fn apply(
    order: NormalizedOrder,
    remote: &RemoteOrderRecord,
    script: Option<&dyn TransformScript>,
    local: &dyn LocalCommerce,
) -> Result<Transformed, TransformError> {
    let Some(script) = script else {
        return Ok(Transformed::Order {
            order,
            log: Vec::new(),
        });
    };

    let subject = subject(order.order_ref().as_str());

    let mut document = serde_json::to_value(&order)?;
    enrich_items(&mut document, local, &subject).await;

    let remote_document = serde_json::to_value(remote)?;
    let ScriptOutput {
        order: mut document,
        skip_order,
        log,
    } = script
        .run(document, &remote_document)
        .map_err(|source| TransformError::Script {
            subject: subject.clone(),
            source,
        })?;

    for line in &log {
        info!("{subject}: Transform Script: {line}");
    }

    validate_shape(&document)?;

    if skip_order {
        info!("{subject}: Transform Script: order skipped");
        return Ok(Transformed::Skipped {
            reason: "skipped by transform script".to_string(),
        });
    }

    let remaining = strip_items(&mut document, &subject);
    if remaining == 0 {
        info!("{subject}: Transform Script: no items left, order skipped");
        return Ok(Transformed::Skipped {
            reason: "no items left after transform".to_string(),
        });
    }

    info!("{subject}: Transform Script: Applied.");
    Ok(Transformed::Order {
        order: serde_json::from_value(document)?,
        log,
    })
}

/// Attach the warehouse product record to every item.
async fn enrich_items(document: &mut JsonValue, local: &dyn LocalCommerce, subject: &str) {
    let Some(JsonValue::Array(items)) = document.get_mut("items") else {
        return;
    };

    let skus: Vec<String> = items
        .iter()
        .filter_map(|item| item.get("sku").and_then(JsonValue::as_str))
        .filter(|sku| !sku.is_empty())
        .map(str::to_string)
        .collect();
    if skus.is_empty() {
        return;
    }

    let products = match local
        .search(Entity::Product, json!({ "sku": { "in": skus } }))
        .await
    {
        Ok(result) => result
            .results
            .into_iter()
            .filter_map(|product| {
                let sku = product.get("sku")?.as_str()?.to_string();
                Some((sku, product))
            })
            .collect::<HashMap<_, _>>(),
        Err(e) => {
            warn!(error = %e, "{subject}: product lookup failed, continuing without it");
            return;
        }
    };

    for item in items.iter_mut() {
        let product = item
            .get("sku")
            .and_then(JsonValue::as_str)
            .and_then(|sku| products.get(sku))
            .cloned()
            .unwrap_or(JsonValue::Null);
        if let JsonValue::Object(fields) = item {
            fields.insert(PRODUCT_FIELD.to_string(), product);
        }
    }
}

fn validate_shape(document: &JsonValue) -> Result<(), TransformError> {
    let JsonValue::Object(fields) = document else {
        return Err(TransformError::UnexpectedShape);
    };
    let non_empty_object =
        |key: &str| matches!(fields.get(key), Some(JsonValue::Object(map)) if !map.is_empty());

    if fields.contains_key("store")
        && matches!(fields.get("items"), Some(JsonValue::Array(_)))
        && non_empty_object("address")
        && non_empty_object("options")
    {
        Ok(())
    } else {
        Err(TransformError::UnexpectedShape)
    }
}

/// Remove the product field and drop skipped items. Returns how many remain.
fn strip_items(document: &mut JsonValue, subject: &str) -> usize {
    let Some(JsonValue::Array(items)) = document.get_mut("items") else {
        return 0;
    };

    items.retain_mut(|item| {
        let JsonValue::Object(fields) = item else {
            return true;
        };
        fields.remove(PRODUCT_FIELD);
        let skipped = fields.remove(SKIP_FIELD).is_some_and(|flag| is_truthy(&flag));
        if skipped {
            let sku = fields
                .get("sku")
                .and_then(JsonValue::as_str)
                .unwrap_or_default();
            info!("{subject}: Transform Script: skipped item {sku}");
        }
        !skipped
    });

    items.len()
}

fn is_truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => false,
        JsonValue::Bool(flag) => *flag,
        JsonValue::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        JsonValue::String(s) => !s.is_empty() && s != "0",
        JsonValue::Array(list) => !list.is_empty(),
        JsonValue::Object(map) => !map.is_empty(),
    }
}
