//! Millisecond timestamps.
//!
//! Metadata entries carry `ctime`/`mtime` as signed unix milliseconds, the
//! same representation the remote database stores.

use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current unix time in milliseconds.
///
/// A clock before the epoch yields 0 rather than panicking.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
