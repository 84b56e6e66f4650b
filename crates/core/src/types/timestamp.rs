//! Timestamp formats exchanged with the storefront and stored in sync state.
//!
//! The storefront reports modification times as `YYYY-MM-DD HH:MM:SS` (UTC),
//! sometimes in ISO-8601 form with a `T` separator and optional offset. The
//! watermark is always written back in the space-separated form.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Format used for watermarks and storefront date filters.
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format accepted for the "sync orders since" override.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Format a timestamp the way the storefront and the state store expect it.
#[must_use]
pub fn format_timestamp(value: DateTime<Utc>) -> String {
    value.format(DATE_TIME_FORMAT).to_string()
}

/// Parse a timestamp in any of the accepted storefront forms.
///
/// Accepts `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS`, RFC 3339 (with
/// offset), and a bare `YYYY-MM-DD` (midnight UTC). Returns `None` for
/// anything else.
#[must_use]
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }

    for format in [DATE_TIME_FORMAT, "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }

    parse_date(value).and_then(|date| date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc()))
}

/// Parse a strict `YYYY-MM-DD` date.
///
/// Rejects anything with extra characters, including times.
#[must_use]
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let bytes = value.as_bytes();
    let shape_ok = bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        });
    if !shape_ok {
        return None;
    }
    NaiveDate::parse_from_str(value, DATE_FORMAT).ok()
}

/// Serde adapter for optional storefront timestamps.
///
/// Unparseable or empty values deserialize to `None` rather than failing the
/// whole record.
pub mod lenient {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize as the watermark format.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(value) => serializer.serialize_str(&super::format_timestamp(*value)),
            None => serializer.serialize_none(),
        }
    }

    /// Deserialize any accepted storefront form.
    ///
    /// # Errors
    ///
    /// Propagates deserializer errors for non-string, non-null input.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().and_then(super::parse_timestamp))
    }
}
