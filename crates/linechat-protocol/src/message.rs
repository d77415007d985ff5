//! Server to client lines.
//!
//! Clients match several of these by prefix, so the text is part of the
//! protocol contract. Change wording only together with the clients.

use std::fmt;

use linechat_core::{format_timestamp, HistoryRecord, RosterEntry, Timestamp, Username};

use crate::roster::encode_roster;

/// Prefix of the authentication success line. Clients detect login by it.
pub const AUTH_SUCCESS_PREFIX: &str = "Authentication succeeded";

/// Reply to `/help`, one entry per line.
pub const HELP_LINES: &[&str] = &[
    "Available commands:",
    "/quit - Leave the chat",
    "/help - Show this help",
    "/register - Register a new user",
    "/history [n] - Show the last n messages",
    "/file <filename> <base64> - Send an encoded file",
];

/// A line sent by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerLine {
    // ------------------------------------------------------------------
    // Authentication
    // ------------------------------------------------------------------
    Greeting,
    UsernamePrompt,
    PasswordPrompt,
    InvalidUsername,
    InvalidPassword,
    AuthSucceeded { username: Username },
    AuthFailed,
    ServerFull,

    // ------------------------------------------------------------------
    // Chat traffic
    // ------------------------------------------------------------------
    Chat {
        at: Timestamp,
        username: Username,
        text: String,
    },
    Joined { at: Timestamp, username: Username },
    Left { at: Timestamp, username: Username },
    Roster(Vec<RosterEntry>),
    File {
        sender: Username,
        file_name: String,
        payload: String,
    },

    // ------------------------------------------------------------------
    // Disconnection
    // ------------------------------------------------------------------
    Goodbye,
    ShuttingDown,

    // ------------------------------------------------------------------
    // Command replies
    // ------------------------------------------------------------------
    RegisterUsernamePrompt,
    RegisterPasswordPrompt,
    RegisterInvalidUsername,
    RegisterInvalidPassword,
    Registered { username: Username },
    UsernameTaken { username: Username },
    RegistrationFailed { reason: String },
    HistoryUsage,
    HistoryEmpty,
    HistoryHeader { count: usize },
    History(HistoryRecord),
    FileUsage,
    InvalidAttachment { file_name: String },
    FileReceived { file_name: String },
    UnknownCommand,
}

impl ServerLine {
    /// Text stored in the history log for a join, without timestamp.
    pub fn joined_record(username: &Username) -> String {
        format!("{username} joined the chat.")
    }

    /// Text stored in the history log for a departure, without timestamp.
    pub fn left_record(username: &Username) -> String {
        format!("{username} left the chat.")
    }
}

impl fmt::Display for ServerLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Greeting => f.write_str("Welcome! Please authenticate."),
            Self::UsernamePrompt => f.write_str("Username:"),
            Self::PasswordPrompt => f.write_str("Password:"),
            Self::InvalidUsername => f.write_str("Invalid username. Connection closed."),
            Self::InvalidPassword => f.write_str("Invalid password. Connection closed."),
            Self::AuthSucceeded { username } => {
                write!(f, "{AUTH_SUCCESS_PREFIX}. Welcome {username}!")
            }
            Self::AuthFailed => f.write_str("Authentication failed. Connection closed."),
            Self::ServerFull => f.write_str("Server is full. Connection closed."),

            Self::Chat { at, username, text } => {
                write!(f, "[{}] {username}: {text}", format_timestamp(at))
            }
            Self::Joined { at, username } => write!(
                f,
                "[{}] {}",
                format_timestamp(at),
                Self::joined_record(username)
            ),
            Self::Left { at, username } => write!(
                f,
                "[{}] {}",
                format_timestamp(at),
                Self::left_record(username)
            ),
            Self::Roster(entries) => f.write_str(&encode_roster(entries)),
            Self::File {
                sender,
                file_name,
                payload,
            } => write!(f, "{sender}: /file {file_name} {payload}"),

            Self::Goodbye => f.write_str("Disconnecting..."),
            Self::ShuttingDown => {
                f.write_str("Server is shutting down. You will be disconnected...")
            }

            Self::RegisterUsernamePrompt => f.write_str("Enter a username to register:"),
            Self::RegisterPasswordPrompt => f.write_str("Enter a password:"),
            Self::RegisterInvalidUsername => {
                f.write_str("Invalid username. Registration cancelled.")
            }
            Self::RegisterInvalidPassword => {
                f.write_str("Invalid password. Registration cancelled.")
            }
            Self::Registered { username } => write!(
                f,
                "Registration succeeded. You can now log in as {username}."
            ),
            Self::UsernameTaken { username } => write!(
                f,
                "Registration failed: username {username} is already taken."
            ),
            Self::RegistrationFailed { reason } => write!(f, "Registration failed: {reason}."),
            Self::HistoryUsage => f.write_str("Invalid format. Usage: /history [n]"),
            Self::HistoryEmpty => f.write_str("No messages in history."),
            Self::HistoryHeader { count } => write!(f, "Last {count} messages:"),
            Self::History(record) => write!(f, "{record}"),
            Self::FileUsage => f.write_str("Invalid format. Usage: /file <filename> <base64>"),
            Self::InvalidAttachment { file_name } => {
                write!(f, "Invalid base64 content for {file_name}")
            }
            Self::FileReceived { file_name } => {
                write!(f, "File {file_name} received and broadcast.")
            }
            Self::UnknownCommand => {
                f.write_str("Unknown command. Type /help for the list of commands.")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};

    fn alice() -> Username {
        Username::parse("alice").unwrap()
    }

    #[test]
    fn test_auth_success_keeps_prefix() {
        let line = ServerLine::AuthSucceeded { username: alice() }.to_string();
        assert!(line.starts_with(AUTH_SUCCESS_PREFIX));
        assert_eq!(line, "Authentication succeeded. Welcome alice!");
    }

    #[test]
    fn test_chat_line_format() {
        let at = Local.with_ymd_and_hms(2025, 6, 1, 14, 30, 12).unwrap();
        let line = ServerLine::Chat {
            at,
            username: alice(),
            text: "hello".to_string(),
        };
        assert_eq!(line.to_string(), "[2025-06-01 14:30] alice: hello");
    }

    #[test]
    fn test_join_and_leave_lines() {
        let at = Local.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap();
        assert_eq!(
            ServerLine::Joined { at, username: alice() }.to_string(),
            "[2025-06-01 09:00] alice joined the chat."
        );
        assert_eq!(
            ServerLine::Left { at, username: alice() }.to_string(),
            "[2025-06-01 09:00] alice left the chat."
        );
    }

    #[test]
    fn test_file_line_is_canonical_command() {
        let line = ServerLine::File {
            sender: alice(),
            file_name: "report.txt".to_string(),
            payload: "aGVsbG8=".to_string(),
        };
        assert_eq!(line.to_string(), "alice: /file report.txt aGVsbG8=");
    }

    #[test]
    fn test_file_errors_name_the_file() {
        let line = ServerLine::InvalidAttachment {
            file_name: "report.txt".to_string(),
        };
        assert!(line.to_string().contains("report.txt"));
    }

    #[test]
    fn test_help_lists_every_command() {
        for verb in ["/quit", "/help", "/register", "/history", "/file"] {
            assert!(
                HELP_LINES.iter().any(|l| l.starts_with(verb)),
                "help is missing {verb}"
            );
        }
    }
}
