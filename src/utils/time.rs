//! Time and timestamp utilities

use chrono::Utc;

/// Current Unix timestamp in milliseconds.
///
/// Every document stamp and event timestamp in the store uses this
/// resolution.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
