//! Outcomes of an order import attempt.

use serde::{Deserialize, Serialize};

use super::id::LocalOrderId;

/// Result of one `order.import` call against the warehouse.
///
/// Never persisted; it only drives status feedback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportResult {
    /// Whether the warehouse accepted the order.
    #[serde(default)]
    pub success: bool,
    /// Warehouse order number on success.
    #[serde(default)]
    pub unique_id: Option<LocalOrderId>,
    /// Failure reason reported by the warehouse.
    #[serde(default)]
    pub message: Option<String>,
}

/// An order that already exists in the warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingOrder {
    /// Warehouse order number.
    pub unique_id: LocalOrderId,
    /// Creation time as reported by the warehouse.
    #[serde(default)]
    pub created_at: Option<String>,
}

/// What happened to one storefront order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ImportOutcome {
    /// A new warehouse order was created.
    Submitted { unique_id: LocalOrderId },
    /// The order had already been imported; nothing was created.
    AlreadyImported { unique_id: LocalOrderId },
    /// The transform stage dropped the order.
    Skipped { reason: String },
    /// The order had no importable items.
    NoItems,
}

impl ImportOutcome {
    /// Whether a warehouse order was created by this attempt.
    #[must_use]
    pub const fn created(&self) -> bool {
        matches!(self, Self::Submitted { .. })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_import_result_from_warehouse_response() {
        let result: ImportResult =
            serde_json::from_value(json!({"success": true, "unique_id": "100000042"})).unwrap();
        assert!(result.success);
        assert_eq!(result.unique_id, Some(LocalOrderId::new("100000042")));
        assert!(result.message.is_none());
    }

    #[test]
    fn test_failed_import_result() {
        let result: ImportResult =
            serde_json::from_value(json!({"success": false, "message": "Unknown SKU"})).unwrap();
        assert!(!result.success);
        assert_eq!(result.message.as_deref(), Some("Unknown SKU"));
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = ImportOutcome::Skipped {
            reason: "no items".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({"outcome": "skipped", "reason": "no items"})
        );
        assert!(!outcome.created());
    }
}
