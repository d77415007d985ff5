//! Identity values: usernames, connection ids and authenticated identities.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::time::{format_timestamp, Timestamp};

/// Longest username accepted, in characters.
pub const MAX_USERNAME_LEN: usize = 32;

/// Author recorded in the store for server-generated notices.
pub const SERVER_AUTHOR: &str = "Server";

// ============================================================================
// Username
// ============================================================================

/// A validated username.
///
/// Usernames are trimmed, non-blank, at most [`MAX_USERNAME_LEN`] characters
/// and never contain whitespace, `|` or `,` (the roster separators).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Username(String);

impl Username {
    /// Parses and validates a raw username line.
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let name = raw.trim();

        if name.is_empty() {
            return Err(DomainError::Blank { field: "username" });
        }

        if name.chars().count() > MAX_USERNAME_LEN {
            return Err(DomainError::InvalidFieldValue {
                field: "username",
                value: name.to_string(),
                expected: "at most 32 characters",
            });
        }

        if name
            .chars()
            .any(|c| c.is_whitespace() || c == '|' || c == ',')
        {
            return Err(DomainError::InvalidFieldValue {
                field: "username",
                value: name.to_string(),
                expected: "no whitespace, '|' or ','",
            });
        }

        Ok(Self(name.to_string()))
    }

    /// Returns the underlying string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Username {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Username> for String {
    fn from(name: Username) -> Self {
        name.0
    }
}

impl AsRef<str> for Username {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Connection Id
// ============================================================================

/// Server-assigned identifier of one accepted connection.
///
/// This, not the username, is the identity of a session inside the registry:
/// two connections may authenticate as the same user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub const fn new(n: u64) -> Self {
        Self(n)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

// ============================================================================
// Identity
// ============================================================================

/// Who a session authenticated as, and when.
///
/// Set exactly once, at the moment authentication succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub username: Username,
    pub connected_at: Timestamp,
}

impl Identity {
    pub fn new(username: Username, connected_at: Timestamp) -> Self {
        Self {
            username,
            connected_at,
        }
    }

    /// Connection time in wire format.
    pub fn connected_at_display(&self) -> String {
        format_timestamp(&self.connected_at)
    }
}
