// Module name shadows the `serde` crate; use `::serde` for the external crate.
use ::serde::Serializer;
use chrono::{DateTime, SecondsFormat, Utc};

/// Format as RFC 3339 with 3-digit fractional seconds and a `Z` suffix.
pub fn rfc3339_ms(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Serialize `DateTime<Utc>` with [`rfc3339_ms`]. Use with `#[serde(serialize_with)]`.
pub fn to_rfc3339_ms<S>(dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    s.serialize_str(&rfc3339_ms(dt))
}
