//! Epoch-millisecond time helpers
//!
//! The KV namespace (spec.md §4.1) requires all time inputs to be epoch-ms
//! integers; everywhere else in the core we keep `chrono::DateTime<Utc>` the
//! way the teacher's models do, and convert at the KV boundary.

use chrono::{DateTime, TimeZone, Utc};

/// Current time in epoch milliseconds
#[must_use]
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Convert a `DateTime<Utc>` to epoch milliseconds
#[must_use]
pub fn to_ms(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

/// Convert epoch milliseconds back to a `DateTime<Utc>`, clamping to the
/// epoch if the value is out of range rather than panicking
#[must_use]
pub fn from_ms(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or(Utc.timestamp_opt(0, 0).single().unwrap())
}
