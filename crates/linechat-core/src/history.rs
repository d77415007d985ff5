//! Persisted chat history records.

use std::fmt;

use crate::time::{format_timestamp, Timestamp};

/// One stored chat message as returned by the history store.
///
/// `username` is a plain string: server notices are recorded under
/// [`SERVER_AUTHOR`](crate::SERVER_AUTHOR), and stores may hold names that
/// predate current validation rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRecord {
    pub timestamp: Timestamp,
    pub username: String,
    pub text: String,
}

impl HistoryRecord {
    pub fn new(timestamp: Timestamp, username: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            timestamp,
            username: username.into(),
            text: text.into(),
        }
    }
}

/// Formats as `[yyyy-MM-dd HH:mm] username: message`.
impl fmt::Display for HistoryRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            format_timestamp(&self.timestamp),
            self.username,
            self.text
        )
    }
}
