//! linechat protocol - line-based wire protocol
//!
//! Newline-delimited UTF-8 text in both directions. This crate provides:
//! - `message` - every line the server sends ([`ServerLine`])
//! - `roster` - the `CLIENT_LIST:` roster encoding
//! - `command` - parsing of `/verb args` client lines into [`Command`]
//!
//! Transport (plain TCP or TLS) is negotiated before this protocol starts
//! and is invisible here.

pub mod command;
pub mod message;
pub mod roster;

pub use command::{Attachment, Command, CommandError, COMMAND_PREFIX};
pub use message::{ServerLine, AUTH_SUCCESS_PREFIX, HELP_LINES};
pub use roster::{encode_roster, parse_roster, ROSTER_PREFIX};
