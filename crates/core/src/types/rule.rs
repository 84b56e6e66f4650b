//! Shipping method classification rules.
//!
//! Rules are authored elsewhere and stored as a JSON array under the
//! `shipping_method_config` setting:
//!
//! ```json
//! [{"shipping_method": "ups_ground", "field": "shipping_description",
//!   "operator": "=~", "pattern": "ground.*"}]
//! ```
//!
//! Every field is optional on the wire; completeness is checked when the rule
//! is evaluated, not when it is loaded.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// One classification rule as stored in configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingRule {
    /// Value adopted when the rule matches.
    #[serde(default, alias = "target")]
    pub shipping_method: Option<String>,
    /// Shipping line field to inspect.
    #[serde(default)]
    pub field: Option<String>,
    /// Comparison operator symbol (`=`, `!=`, `=~`).
    #[serde(default)]
    pub operator: Option<String>,
    /// Pattern or literal value to compare against.
    #[serde(default)]
    pub pattern: Option<String>,
}

impl ShippingRule {
    /// Create a complete rule.
    #[must_use]
    pub fn new(target: &str, field: RuleField, operator: RuleOperator, pattern: &str) -> Self {
        Self {
            shipping_method: Some(target.to_string()),
            field: Some(field.as_str().to_string()),
            operator: Some(operator.as_str().to_string()),
            pattern: Some(pattern.to_string()),
        }
    }

    /// Whether all four fields are present and non-empty.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        [
            &self.shipping_method,
            &self.field,
            &self.operator,
            &self.pattern,
        ]
        .iter()
        .all(|value| value.as_deref().is_some_and(|v| !v.is_empty()))
    }
}

/// Shipping line field a rule inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleField {
    ShippingMethod,
    ShippingDescription,
}

impl RuleField {
    /// Wire name of the field.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ShippingMethod => "shipping_method",
            Self::ShippingDescription => "shipping_description",
        }
    }
}

impl FromStr for RuleField {
    type Err = UnknownRulePart;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shipping_method" => Ok(Self::ShippingMethod),
            "shipping_description" => Ok(Self::ShippingDescription),
            other => Err(UnknownRulePart(other.to_string())),
        }
    }
}

impl fmt::Display for RuleField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison operator of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleOperator {
    /// `=` - exact equality.
    #[serde(rename = "=")]
    Equals,
    /// `!=` - exact inequality.
    #[serde(rename = "!=")]
    NotEquals,
    /// `=~` - anchored, case-insensitive regular expression.
    #[serde(rename = "=~")]
    RegexMatch,
}

impl RuleOperator {
    /// Operator symbol.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Equals => "=",
            Self::NotEquals => "!=",
            Self::RegexMatch => "=~",
        }
    }
}

impl FromStr for RuleOperator {
    type Err = UnknownRulePart;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "=" => Ok(Self::Equals),
            "!=" => Ok(Self::NotEquals),
            "=~" => Ok(Self::RegexMatch),
            other => Err(UnknownRulePart(other.to_string())),
        }
    }
}

impl fmt::Display for RuleOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rule field or operator that is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown rule part: {0}")]
pub struct UnknownRulePart(pub String);

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_deserializes_from_config_json() {
        let rules: Vec<ShippingRule> = serde_json::from_str(
            r#"[{"shipping_method":"standard","field":"shipping_method","operator":"=","pattern":"flat"}]"#,
        )
        .unwrap();
        assert_eq!(rules.len(), 1);
        assert!(rules[0].is_complete());
    }

    #[test]
    fn test_incomplete_rule() {
        let rule = ShippingRule {
            shipping_method: Some("standard".to_string()),
            field: Some("shipping_method".to_string()),
            operator: Some(String::new()),
            pattern: Some("flat".to_string()),
        };
        assert!(!rule.is_complete());
        assert!(!ShippingRule::default().is_complete());
    }

    #[test]
    fn test_operator_parsing() {
        assert_eq!("=".parse::<RuleOperator>(), Ok(RuleOperator::Equals));
        assert_eq!("!=".parse::<RuleOperator>(), Ok(RuleOperator::NotEquals));
        assert_eq!("=~".parse::<RuleOperator>(), Ok(RuleOperator::RegexMatch));
        assert!("~".parse::<RuleOperator>().is_err());
    }

    #[test]
    fn test_field_parsing() {
        assert_eq!(
            "shipping_description".parse::<RuleField>(),
            Ok(RuleField::ShippingDescription)
        );
        assert!("carrier".parse::<RuleField>().is_err());
    }

    #[test]
    fn test_new_rule_uses_wire_names() {
        let rule = ShippingRule::new(
            "express",
            RuleField::ShippingDescription,
            RuleOperator::RegexMatch,
            "next.*day",
        );
        assert_eq!(rule.field.as_deref(), Some("shipping_description"));
        assert_eq!(rule.operator.as_deref(), Some("=~"));
    }
}
