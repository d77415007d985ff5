//! Roster entries: who is connected and since when.

use std::fmt;

use crate::identity::{Identity, Username};

/// One line of the live roster.
///
/// Derived from a session's [`Identity`]; never stored on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub username: Username,
    /// Connection time, already in wire format (`yyyy-MM-dd HH:mm`)
    pub connected_at: String,
}

impl RosterEntry {
    pub fn new(username: Username, connected_at: impl Into<String>) -> Self {
        Self {
            username,
            connected_at: connected_at.into(),
        }
    }
}

impl From<&Identity> for RosterEntry {
    fn from(identity: &Identity) -> Self {
        Self::new(identity.username.clone(), identity.connected_at_display())
    }
}

impl fmt::Display for RosterEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.username, self.connected_at)
    }
}
