//! Persisted sync state records.
//!
//! Three keys make up the whole of the connector's mutable shared state: the
//! order pull watermark, the import lock record, and the fulfillment-service
//! registration flag.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Keys of the sync state store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateKey {
    /// Timestamp up to which incremental polling has completed.
    OrderLastSyncAt,
    /// Advisory lock guarding the import critical section.
    LockOrderPull,
    /// Whether the warehouse is registered as the storefront's fulfillment service.
    FulfillmentServiceRegistered,
}

impl StateKey {
    /// All state keys, in a stable order.
    pub const ALL: [Self; 3] = [
        Self::OrderLastSyncAt,
        Self::LockOrderPull,
        Self::FulfillmentServiceRegistered,
    ];

    /// Storage key.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OrderLastSyncAt => "order_last_sync_at",
            Self::LockOrderPull => "lock_order_pull",
            Self::FulfillmentServiceRegistered => "fulfillment_service_registered",
        }
    }
}

impl core::fmt::Display for StateKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lock record state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockValue {
    Locked,
    Unlocked,
}

/// The advisory import lock record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub value: LockValue,
    #[serde(with = "lock_timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl LockRecord {
    /// A held lock stamped at `now`.
    #[must_use]
    pub const fn locked(now: DateTime<Utc>) -> Self {
        Self {
            value: LockValue::Locked,
            updated_at: now,
        }
    }

    /// A released lock stamped at `now`.
    #[must_use]
    pub const fn unlocked(now: DateTime<Utc>) -> Self {
        Self {
            value: LockValue::Unlocked,
            updated_at: now,
        }
    }

    /// Whether the record is held and younger than `stale_after`.
    ///
    /// A held record whose `updated_at` is older than the staleness threshold
    /// is presumed abandoned by a crashed holder and may be reclaimed.
    #[must_use]
    pub fn is_held(&self, now: DateTime<Utc>, stale_after: Duration) -> bool {
        self.value == LockValue::Locked && now - self.updated_at <= stale_after
    }
}

mod lock_timestamp {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&crate::types::timestamp::format_timestamp(*value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        crate::types::timestamp::parse_timestamp(&raw)
            .ok_or_else(|| D::Error::custom(format!("invalid lock timestamp: {raw}")))
    }
}
