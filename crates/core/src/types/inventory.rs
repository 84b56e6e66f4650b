//! Inventory side-channel types.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::ser::{Error as _, SerializeMap};
use serde::{Deserialize, Serialize, Serializer};

/// A single stock change reported by the warehouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjustment {
    /// Signed quantity delta.
    #[serde(default)]
    pub qty_adjust: Decimal,
}

impl StockAdjustment {
    /// Create an adjustment.
    #[must_use]
    pub const fn new(qty_adjust: Decimal) -> Self {
        Self { qty_adjust }
    }
}

/// Answer to an inventory query: signed available quantity per SKU.
///
/// Quantities go out as JSON numbers; whole quantities as integers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryLevels {
    #[serde(serialize_with = "serialize_quantities")]
    pub skus: BTreeMap<String, Decimal>,
}

fn serialize_quantities<S>(skus: &BTreeMap<String, Decimal>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut map = serializer.serialize_map(Some(skus.len()))?;
    for (sku, qty) in skus {
        if qty.fract().is_zero()
            && let Some(whole) = qty.to_i64()
        {
            map.serialize_entry(sku, &whole)?;
            continue;
        }
        let qty = qty
            .to_f64()
            .ok_or_else(|| S::Error::custom(format!("quantity for {sku} is out of range")))?;
        map.serialize_entry(sku, &qty)?;
    }
    map.end()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;

    #[test]
    fn test_adjustments_deserialize_from_webhook_payload() {
        let adjustments: HashMap<String, StockAdjustment> = serde_json::from_value(json!({
            "MUG": {"qty_adjust": "-2"},
            "KIT": {"qty_adjust": 5}
        }))
        .unwrap();
        assert_eq!(adjustments["MUG"].qty_adjust, Decimal::new(-2, 0));
        assert_eq!(adjustments["KIT"].qty_adjust, Decimal::new(5, 0));
    }

    #[test]
    fn test_levels_serialize_as_numbers() {
        let levels = InventoryLevels {
            skus: BTreeMap::from([
                ("MUG".to_string(), Decimal::new(12, 0)),
                ("MUG-RED".to_string(), Decimal::new(-3, 0)),
                ("TEA".to_string(), Decimal::new(25, 1)),
                ("BOWL".to_string(), Decimal::new(40_000, 4)),
            ]),
        };

        assert_eq!(
            serde_json::to_value(&levels).unwrap(),
            json!({"skus": {"BOWL": 4, "MUG": 12, "MUG-RED": -3, "TEA": 2.5}})
        );
    }
}
