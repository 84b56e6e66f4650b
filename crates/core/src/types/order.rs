//! Order records on both sides of the sync.
//!
//! [`RemoteOrderRecord`] is the storefront's view of an order, deserialized
//! from the sync extension's JSON and never mutated. [`NormalizedOrder`] is
//! the warehouse import payload built from it, which the transform stage may
//! rewrite before it is committed.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use super::id::ExternalRef;

/// Prefix of the `source` option attached to every imported order.
pub const SOURCE_PREFIX: &str = "woocommerce:";

// =============================================================================
// Storefront Records
// =============================================================================

/// Immutable snapshot of a storefront order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteOrderRecord {
    /// Storefront order number.
    pub increment_id: ExternalRef,
    /// Storefront order status (e.g. `processing`).
    #[serde(default)]
    pub status: Option<String>,
    /// Order-level shipping method code.
    #[serde(default)]
    pub shipping_method: Option<String>,
    /// Shipping address.
    #[serde(default)]
    pub shipping_address: RemoteAddress,
    /// Line items, including child items of bundles/configurables.
    #[serde(default)]
    pub items: Vec<RemoteLineItem>,
    /// Shipping lines (one per selected shipping rate).
    #[serde(default)]
    pub shipping_lines: Vec<ShippingLineEntry>,
    /// Last modification time.
    #[serde(default, with = "super::timestamp::lenient")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Shipping address as reported by the storefront.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAddress {
    #[serde(default)]
    pub firstname: Option<String>,
    #[serde(default)]
    pub lastname: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub street2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub postcode: Option<String>,
    #[serde(default)]
    pub country_id: Option<String>,
    #[serde(default)]
    pub telephone: Option<String>,
}

/// A storefront line item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteLineItem {
    /// Storefront item ID.
    #[serde(default)]
    pub item_id: Option<JsonValue>,
    /// Parent item ID for children of composite products.
    #[serde(default)]
    pub parent_item_id: Option<JsonValue>,
    /// Product SKU.
    #[serde(default)]
    pub sku: String,
    /// Product name.
    #[serde(default)]
    pub name: String,
    /// Quantity ordered (storefronts report this as a decimal).
    #[serde(default)]
    pub qty_ordered: Decimal,
    /// Product type tag (`simple`, `bundle`, `virtual`, ...).
    #[serde(default)]
    pub product_type: Option<String>,
}

impl RemoteLineItem {
    /// Whether this item is the child of another line item.
    ///
    /// Null, `0`, `""`, and `false` all mean "no parent".
    #[must_use]
    pub fn has_parent(&self) -> bool {
        match &self.parent_item_id {
            None | Some(JsonValue::Null) => false,
            Some(JsonValue::Bool(flag)) => *flag,
            Some(JsonValue::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
            Some(JsonValue::String(s)) => !s.is_empty() && s != "0",
            Some(_) => true,
        }
    }
}

/// One shipping line of a storefront order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingLineEntry {
    /// Shipping method code (e.g. `flat_rate:1`).
    #[serde(default)]
    pub shipping_method: Option<String>,
    /// Human readable shipping description.
    #[serde(default)]
    pub shipping_description: Option<String>,
}

impl ShippingLineEntry {
    /// Placeholder line used when an order reports no shipping lines.
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            shipping_method: Some("unknown".to_string()),
            shipping_description: Some("unknown".to_string()),
        }
    }
}

// =============================================================================
// Warehouse Import Payload
// =============================================================================

/// Working order record submitted to the warehouse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedOrder {
    /// Destination store selector (`None` lets the warehouse pick the default).
    pub store: Option<String>,
    /// Items to ship.
    pub items: Vec<OrderItem>,
    /// Shipping address.
    pub address: ShippingAddress,
    /// Order options (reference, shipping method, source, and extras).
    pub options: OrderOptions,
    /// Time the import payload was built.
    pub timestamp: DateTime<Utc>,
}

impl NormalizedOrder {
    /// Build the import payload for a storefront order.
    ///
    /// Child line items are dropped and quantities are truncated to whole
    /// units.
    #[must_use]
    pub fn from_remote(
        remote: &RemoteOrderRecord,
        shipping_method: String,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let items = remote
            .items
            .iter()
            .filter(|item| !item.has_parent())
            .map(OrderItem::from_remote)
            .collect();

        Self {
            store: None,
            items,
            address: ShippingAddress::from_remote(&remote.shipping_address),
            options: OrderOptions::new(remote.increment_id.clone(), shipping_method),
            timestamp,
        }
    }

    /// The storefront order reference this payload was built from.
    #[must_use]
    pub const fn order_ref(&self) -> &ExternalRef {
        &self.options.order_ref
    }
}

/// A line item in the import payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    /// Product SKU.
    pub sku: String,
    /// Product name.
    pub name: String,
    /// Whole-unit quantity.
    pub quantity: i64,
    /// Extra fields added by a transform script.
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl OrderItem {
    fn from_remote(item: &RemoteLineItem) -> Self {
        Self {
            sku: item.sku.clone(),
            name: item.name.clone(),
            quantity: item.qty_ordered.trunc().to_i64().unwrap_or_default(),
            extra: Map::new(),
        }
    }
}

/// Shipping address in warehouse format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub full_name: String,
    pub company: Option<String>,
    pub street1: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub phone: Option<String>,
}

impl ShippingAddress {
    /// Convert a storefront address.
    ///
    /// The full name is the trimmed first and last name; `street1` joins both
    /// street lines with a space.
    #[must_use]
    pub fn from_remote(address: &RemoteAddress) -> Self {
        let first = address.firstname.as_deref().unwrap_or_default();
        let last = address.lastname.as_deref().unwrap_or_default();
        let street = address.street.as_deref().unwrap_or_default();
        let street2 = address.street2.as_deref().unwrap_or_default();

        Self {
            full_name: format!("{first} {last}").trim().to_string(),
            company: address.company.clone(),
            street1: format!("{street} {street2}").trim_end().to_string(),
            city: address.city.clone(),
            state: address.region.clone(),
            postal_code: address.postcode.clone(),
            country: address.country_id.clone(),
            phone: address.telephone.clone(),
        }
    }
}

/// Free-form order options with the three required keys pulled out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderOptions {
    /// Storefront order reference.
    pub order_ref: ExternalRef,
    /// Warehouse shipping method.
    pub shipping_method: String,
    /// Source tag (`woocommerce:<ref>`).
    pub source: String,
    /// Any other options set by a transform script.
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl OrderOptions {
    /// Create options for an order reference.
    #[must_use]
    pub fn new(order_ref: ExternalRef, shipping_method: String) -> Self {
        let source = format!("{SOURCE_PREFIX}{order_ref}");
        Self {
            order_ref,
            shipping_method,
            source,
            extra: Map::new(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn sample_remote() -> RemoteOrderRecord {
        serde_json::from_value(json!({
            "increment_id": "1001",
            "status": "processing",
            "shipping_method": "flat_rate",
            "shipping_address": {
                "firstname": "Ada",
                "lastname": "Lovelace",
                "company": null,
                "street": "1 Analytical Way",
                "street2": "Suite 2",
                "city": "London",
                "region": "LDN",
                "postcode": "N1",
                "country_id": "GB",
                "telephone": "555-0100"
            },
            "items": [
                {"item_id": 1, "parent_item_id": null, "sku": "KIT", "name": "Kit", "qty_ordered": "2.0000"},
                {"item_id": 2, "parent_item_id": 1, "sku": "KIT-A", "name": "Kit part", "qty_ordered": 2},
                {"item_id": 3, "parent_item_id": "0", "sku": "MUG", "name": "Mug", "qty_ordered": 1.5}
            ],
            "shipping_lines": [{"shipping_method": "flat_rate", "shipping_description": "Flat Rate"}],
            "updated_at": "2024-02-03 04:05:06"
        }))
        .unwrap()
    }

    #[test]
    fn test_remote_record_deserializes() {
        let remote = sample_remote();
        assert_eq!(remote.increment_id.as_str(), "1001");
        assert_eq!(remote.items.len(), 3);
        assert_eq!(
            remote.updated_at,
            Utc.with_ymd_and_hms(2024, 2, 3, 4, 5, 6).single()
        );
    }

    #[test]
    fn test_child_items_are_dropped() {
        let remote = sample_remote();
        let now = Utc.with_ymd_and_hms(2024, 2, 3, 4, 5, 6).unwrap();
        let order = NormalizedOrder::from_remote(&remote, "standard".to_string(), now);

        let skus: Vec<_> = order.items.iter().map(|i| i.sku.as_str()).collect();
        assert_eq!(skus, vec!["KIT", "MUG"]);
        assert_eq!(order.items[0].quantity, 2);
        assert_eq!(order.items[1].quantity, 1);
    }

    #[test]
    fn test_address_formatting() {
        let address = ShippingAddress::from_remote(&sample_remote().shipping_address);
        assert_eq!(address.full_name, "Ada Lovelace");
        assert_eq!(address.street1, "1 Analytical Way Suite 2");
        assert_eq!(address.state.as_deref(), Some("LDN"));
        assert_eq!(address.country.as_deref(), Some("GB"));
    }

    #[test]
    fn test_address_without_last_name_is_trimmed() {
        let address = ShippingAddress::from_remote(&RemoteAddress {
            firstname: Some("Cher".to_string()),
            street: Some("Main St".to_string()),
            ..RemoteAddress::default()
        });
        assert_eq!(address.full_name, "Cher");
        assert_eq!(address.street1, "Main St");
    }

    #[test]
    fn test_options_carry_source_tag() {
        let options = OrderOptions::new(ExternalRef::new("1001"), "standard".to_string());
        assert_eq!(options.source, "woocommerce:1001");

        let json = serde_json::to_value(&options).unwrap();
        assert_eq!(json["order_ref"], "1001");
        assert_eq!(json["shipping_method"], "standard");
    }

    #[test]
    fn test_extra_item_fields_survive_roundtrip() {
        let item: OrderItem = serde_json::from_value(json!({
            "sku": "MUG", "name": "Mug", "quantity": 1, "gift_wrap": true
        }))
        .unwrap();
        assert_eq!(item.extra.get("gift_wrap"), Some(&json!(true)));
    }
}
