//! Timestamp helpers.
//!
//! Every timestamp on the wire (chat lines, join/leave notices, roster,
//! history) uses server local time at minute precision.

use chrono::{DateTime, Local};

/// Wire format for timestamps: `yyyy-MM-dd HH:mm`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Timestamp type used throughout linechat.
pub type Timestamp = DateTime<Local>;

/// Returns the current server-local time.
pub fn now() -> Timestamp {
    Local::now()
}

/// Formats a timestamp for the wire.
pub fn format_timestamp(ts: &Timestamp) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}
