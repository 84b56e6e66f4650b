//! Status values exchanged with the storefront.

use serde::{Deserialize, Serialize};

/// Status reported back to the storefront alongside an order comment.
///
/// The storefront's sync extension moves the order into the matching state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackStatus {
    /// The order exists in the warehouse.
    Submitted,
    /// The import was attempted and failed.
    FailedToSubmit,
}

impl FeedbackStatus {
    /// Wire value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::FailedToSubmit => "failed_to_submit",
        }
    }

    /// Storefront order statuses from which a packed shipment may be reported.
    pub const SHIPPABLE: [Self; 2] = [Self::Submitted, Self::FailedToSubmit];
}

impl core::fmt::Display for FeedbackStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which storefront order statuses the incremental pull picks up.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StatusFilter {
    /// Automatic fulfillment disabled; the cursor does nothing.
    #[default]
    Disabled,
    /// A fixed list of statuses.
    Statuses(Vec<String>),
}

impl StatusFilter {
    /// Build the filter from the `auto_fulfill_status` setting and, when that
    /// is `custom`, the comma-separated `auto_fulfill_custom` list.
    #[must_use]
    pub fn from_settings(status: Option<&str>, custom: Option<&str>) -> Self {
        let status = status.map(str::trim).unwrap_or_default();
        let statuses: Vec<String> = match status {
            "" | "none" | "0" => Vec::new(),
            "custom" => custom
                .unwrap_or_default()
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            single => vec![single.to_string()],
        };

        if statuses.is_empty() {
            Self::Disabled
        } else {
            Self::Statuses(statuses)
        }
    }

    /// The statuses to poll for (empty when disabled).
    #[must_use]
    pub fn statuses(&self) -> &[String] {
        match self {
            Self::Disabled => &[],
            Self::Statuses(statuses) => statuses,
        }
    }
}
