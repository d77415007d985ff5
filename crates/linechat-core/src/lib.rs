//! linechat core - shared domain types for the chat daemon
//!
//! This crate provides the values shared between the wire protocol
//! (`linechat-protocol`) and the daemon (`linechatd`).
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod error;
pub mod history;
pub mod identity;
pub mod roster;
pub mod time;

// Re-exports for convenience
pub use error::{DomainError, DomainResult};
pub use history::HistoryRecord;
pub use identity::{ConnectionId, Identity, Username, MAX_USERNAME_LEN, SERVER_AUTHOR};
pub use roster::RosterEntry;
pub use time::{format_timestamp, now, Timestamp, TIMESTAMP_FORMAT};
