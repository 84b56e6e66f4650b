//! Shipping method classification.
//!
//! Maps an order's shipping lines to a warehouse shipping method using the
//! ordered rule list from `shipping_method_config`. Lines are scanned in order
//! and, for each line, rules in order; the first rule that matches any line
//! decides the result.

use regex::{Regex, RegexBuilder};
use thiserror::Error;
use tracing::debug;
use woosync_core::{RemoteOrderRecord, RuleField, RuleOperator, ShippingLineEntry, ShippingRule};

/// Classification failures.
#[derive(Debug, Error)]
pub enum RuleError {
    /// A rule is incomplete or names an unknown field or operator.
    #[error("invalid rule (#{index})")]
    InvalidRule { index: usize },

    /// A `=~` pattern does not compile.
    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// `shipping_method_config` is not a JSON list of rules.
    #[error("invalid shipping_method_config: {source}")]
    MalformedConfig {
        #[source]
        source: serde_json::Error,
    },

    /// No rule matched and there is no fallback.
    #[error("cannot classify shipping method")]
    CannotClassify,
}

/// A validated rule ready for evaluation.
enum Matcher {
    Equals(String),
    NotEquals(String),
    Regex(Regex),
}

struct CompiledRule<'a> {
    target: &'a str,
    field: RuleField,
    matcher: Matcher,
}

impl<'a> CompiledRule<'a> {
    fn compile(index: usize, rule: &'a ShippingRule) -> Result<Self, RuleError> {
        let invalid = || RuleError::InvalidRule { index };
        if !rule.is_complete() {
            return Err(invalid());
        }

        let target = rule.shipping_method.as_deref().ok_or_else(invalid)?;
        let field: RuleField = rule
            .field
            .as_deref()
            .ok_or_else(invalid)?
            .parse()
            .map_err(|_| invalid())?;
        let operator: RuleOperator = rule
            .operator
            .as_deref()
            .ok_or_else(invalid)?
            .parse()
            .map_err(|_| invalid())?;
        let pattern = rule.pattern.as_deref().ok_or_else(invalid)?;

        let matcher = match operator {
            RuleOperator::Equals => Matcher::Equals(strip_quotes(pattern)),
            RuleOperator::NotEquals => Matcher::NotEquals(strip_quotes(pattern)),
            RuleOperator::RegexMatch => Matcher::Regex(
                RegexBuilder::new(&format!("^(?:{pattern})$"))
                    .case_insensitive(true)
                    .build()
                    .map_err(|source| RuleError::InvalidPattern {
                        pattern: pattern.to_string(),
                        source,
                    })?,
            ),
        };

        Ok(Self {
            target,
            field,
            matcher,
        })
    }

    fn matches(&self, line: &ShippingLineEntry) -> bool {
        let value = match self.field {
            RuleField::ShippingMethod => line.shipping_method.as_deref(),
            RuleField::ShippingDescription => line.shipping_description.as_deref(),
        }
        .unwrap_or_default();

        match &self.matcher {
            Matcher::Equals(expected) => value == expected,
            Matcher::NotEquals(expected) => value != expected,
            Matcher::Regex(re) => re.is_match(value),
        }
    }
}

fn strip_quotes(pattern: &str) -> String {
    pattern.replace(['"', '\''], "")
}

/// Pick the shipping method for a set of shipping lines.
///
/// With no lines a single `unknown` line is evaluated. The fallback is the
/// first line's method, else `default_value`.
///
/// # Errors
///
/// Returns `RuleError::InvalidRule`/`RuleError::InvalidPattern` when a rule
/// reached during evaluation is malformed, and `RuleError::CannotClassify`
/// when nothing matched and there is no fallback.
pub fn classify(
    lines: &[ShippingLineEntry],
    rules: &[ShippingRule],
    default_value: Option<&str>,
) -> Result<String, RuleError> {
    let unknown = [ShippingLineEntry::unknown()];
    let lines = if lines.is_empty() { &unknown[..] } else { lines };

    let fallback = lines
        .first()
        .and_then(|line| line.shipping_method.as_deref())
        .filter(|method| !method.is_empty())
        .or_else(|| default_value.filter(|value| !value.is_empty()));

    let mut compiled: Vec<Option<CompiledRule<'_>>> =
        std::iter::repeat_with(|| None).take(rules.len()).collect();

    for line in lines {
        for (index, (rule, slot)) in rules.iter().zip(compiled.iter_mut()).enumerate() {
            if slot.is_none() {
                *slot = Some(CompiledRule::compile(index, rule)?);
            }
            let Some(rule) = slot.as_ref() else {
                continue;
            };
            if rule.matches(line) {
                debug!(rule = index, target = rule.target, "Shipping rule matched");
                return Ok(rule.target.to_string());
            }
        }
    }

    fallback
        .map(str::to_string)
        .ok_or(RuleError::CannotClassify)
}

/// Shipping method for a storefront order.
///
/// Without rules the order-level method is used as is.
///
/// # Errors
///
/// See [`classify`].
pub fn shipping_method(
    remote: &RemoteOrderRecord,
    rules: &[ShippingRule],
) -> Result<String, RuleError> {
    let order_level = remote
        .shipping_method
        .as_deref()
        .filter(|method| !method.is_empty());

    if rules.is_empty()
        && let Some(method) = order_level
    {
        return Ok(method.to_string());
    }

    classify(&remote.shipping_lines, rules, order_level)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn line(method: &str, description: &str) -> ShippingLineEntry {
        ShippingLineEntry {
            shipping_method: Some(method.to_string()),
            shipping_description: Some(description.to_string()),
        }
    }

    fn rule(target: &str, field: RuleField, operator: RuleOperator, pattern: &str) -> ShippingRule {
        ShippingRule::new(target, field, operator, pattern)
    }

    #[test]
    fn test_equals_rule_matches() {
        let lines = [line("flat", "Flat Rate")];
        let rules = [rule(
            "standard",
            RuleField::ShippingMethod,
            RuleOperator::Equals,
            "flat",
        )];
        assert_eq!(classify(&lines, &rules, None).unwrap(), "standard");
    }

    #[test]
    fn test_equals_strips_quotes() {
        let lines = [line("flat", "Flat Rate")];
        let rules = [rule(
            "standard",
            RuleField::ShippingDescription,
            RuleOperator::Equals,
            "\"Flat Rate\"",
        )];
        assert_eq!(classify(&lines, &rules, None).unwrap(), "standard");
    }

    #[test]
    fn test_regex_is_anchored_and_case_insensitive() {
        let lines = [line("ups", "UPS Ground Saver")];
        let anchored = [rule(
            "ground",
            RuleField::ShippingDescription,
            RuleOperator::RegexMatch,
            "ground",
        )];
        assert_eq!(classify(&lines, &anchored, None).unwrap(), "ups");

        let whole = [rule(
            "ground",
            RuleField::ShippingDescription,
            RuleOperator::RegexMatch,
            "ups ground.*",
        )];
        assert_eq!(classify(&lines, &whole, None).unwrap(), "ground");
    }

    #[test]
    fn test_regex_alternation_stays_anchored() {
        let lines = [line("x", "Express Saver")];
        let rules = [rule(
            "express",
            RuleField::ShippingDescription,
            RuleOperator::RegexMatch,
            "overnight|express",
        )];
        assert_eq!(classify(&lines, &rules, Some("default")).unwrap(), "x");
    }

    #[test]
    fn test_not_equals() {
        let lines = [line("pickup", "Local pickup")];
        let rules = [rule(
            "ship",
            RuleField::ShippingMethod,
            RuleOperator::NotEquals,
            "flat",
        )];
        assert_eq!(classify(&lines, &rules, None).unwrap(), "ship");
    }

    #[test]
    fn test_first_global_match_wins() {
        let lines = [line("flat", "Flat Rate"), line("express", "Express")];
        let rules = [
            rule("fast", RuleField::ShippingMethod, RuleOperator::Equals, "express"),
            rule("slow", RuleField::ShippingMethod, RuleOperator::Equals, "flat"),
        ];
        assert_eq!(classify(&lines, &rules, None).unwrap(), "slow");
    }

    #[test]
    fn test_fallback_is_first_line_method() {
        let lines = [line("flat", "Flat Rate")];
        let rules = [rule(
            "express",
            RuleField::ShippingMethod,
            RuleOperator::Equals,
            "express",
        )];
        assert_eq!(classify(&lines, &rules, Some("default")).unwrap(), "flat");
    }

    #[test]
    fn test_unmatched_without_fallback_fails() {
        let lines = [ShippingLineEntry {
            shipping_method: Some(String::new()),
            shipping_description: Some("Mystery".to_string()),
        }];
        let rules = [rule(
            "express",
            RuleField::ShippingMethod,
            RuleOperator::Equals,
            "express",
        )];
        assert!(matches!(
            classify(&lines, &rules, None),
            Err(RuleError::CannotClassify)
        ));
    }

    #[test]
    fn test_empty_lines_use_unknown() {
        let rules = [rule(
            "manual",
            RuleField::ShippingDescription,
            RuleOperator::Equals,
            "unknown",
        )];
        assert_eq!(classify(&[], &rules, None).unwrap(), "manual");
    }

    #[test]
    fn test_incomplete_rule_is_invalid() {
        let lines = [line("flat", "Flat Rate")];
        let rules = [ShippingRule {
            shipping_method: Some("standard".to_string()),
            ..ShippingRule::default()
        }];
        assert!(matches!(
            classify(&lines, &rules, None),
            Err(RuleError::InvalidRule { index: 0 })
        ));
    }

    #[test]
    fn test_unknown_operator_is_invalid() {
        let lines = [line("flat", "Flat Rate")];
        let rules = [ShippingRule {
            shipping_method: Some("standard".to_string()),
            field: Some("shipping_method".to_string()),
            operator: Some("~".to_string()),
            pattern: Some("flat".to_string()),
        }];
        assert!(matches!(
            classify(&lines, &rules, None),
            Err(RuleError::InvalidRule { index: 0 })
        ));
    }

    #[test]
    fn test_bad_regex_is_invalid_pattern() {
        let lines = [line("flat", "Flat Rate")];
        let rules = [rule(
            "standard",
            RuleField::ShippingMethod,
            RuleOperator::RegexMatch,
            "(unclosed",
        )];
        assert!(matches!(
            classify(&lines, &rules, None),
            Err(RuleError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_no_rules_uses_order_level_method() {
        let remote: RemoteOrderRecord = serde_json::from_value(serde_json::json!({
            "increment_id": "1001",
            "shipping_method": "flat_rate",
            "shipping_lines": [{"shipping_method": "other", "shipping_description": "Other"}]
        }))
        .unwrap();
        assert_eq!(shipping_method(&remote, &[]).unwrap(), "flat_rate");
    }
}
