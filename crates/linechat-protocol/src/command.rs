//! Client command parsing.
//!
//! A client line starting with [`COMMAND_PREFIX`] is a command. The verb is
//! matched case-insensitively; everything after the first space is the raw
//! argument remainder.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use thiserror::Error;

/// Lines starting with this character are commands, not chat.
pub const COMMAND_PREFIX: char = '/';

/// Standard alphabet, padding optional, non-zero trailing bits accepted.
const ATTACHMENT_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// A parsed client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/quit`
    Quit,
    /// `/help`
    Help,
    /// `/register` - prompts for the new account interactively
    Register,
    /// `/history [n]` - `None` means the server default
    History { limit: Option<usize> },
    /// `/file <name> <base64>`
    File(Attachment),
    /// Any other verb
    Unknown { verb: String },
}

/// A validated file attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    /// Base64 text exactly as received
    pub payload: String,
    /// Size of the decoded content in bytes
    pub decoded_len: usize,
}

impl Attachment {
    /// Validates that `payload` is well-formed base64.
    pub fn new(file_name: &str, payload: &str) -> Result<Self, CommandError> {
        let decoded = ATTACHMENT_ENGINE
            .decode(payload)
            .map_err(|_| CommandError::InvalidAttachment {
                file_name: file_name.to_string(),
            })?;

        Ok(Self {
            file_name: file_name.to_string(),
            payload: payload.to_string(),
            decoded_len: decoded.len(),
        })
    }
}

/// Malformed command arguments. Recovered locally with one reply line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("line is not a command")]
    NotACommand,

    #[error("history limit must be a non-negative integer")]
    HistoryUsage,

    #[error("file command needs a name and a payload")]
    FileUsage,

    #[error("invalid base64 content for {file_name}")]
    InvalidAttachment { file_name: String },
}

impl Command {
    /// Returns true if the line should be routed to the command interpreter.
    pub fn is_command(line: &str) -> bool {
        line.starts_with(COMMAND_PREFIX)
    }

    /// Parses a command line.
    ///
    /// # Errors
    ///
    /// - `CommandError::NotACommand` if the line lacks the prefix
    /// - `CommandError::HistoryUsage` for a non-integer history limit
    /// - `CommandError::FileUsage` if the name or payload is missing
    /// - `CommandError::InvalidAttachment` if the payload is not base64
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let body = line
            .strip_prefix(COMMAND_PREFIX)
            .ok_or(CommandError::NotACommand)?;

        let (verb, rest) = body.split_once(' ').unwrap_or((body, ""));

        match verb.to_ascii_lowercase().as_str() {
            "quit" => Ok(Self::Quit),
            "help" => Ok(Self::Help),
            "register" => Ok(Self::Register),
            "history" => Self::parse_history(rest),
            "file" => Self::parse_file(rest),
            _ => Ok(Self::Unknown {
                verb: verb.to_string(),
            }),
        }
    }

    fn parse_history(rest: &str) -> Result<Self, CommandError> {
        match rest.split_whitespace().next() {
            None => Ok(Self::History { limit: None }),
            Some(raw) => raw
                .parse::<usize>()
                .map(|n| Self::History { limit: Some(n) })
                .map_err(|_| CommandError::HistoryUsage),
        }
    }

    fn parse_file(rest: &str) -> Result<Self, CommandError> {
        let (name, payload) = rest.split_once(' ').ok_or(CommandError::FileUsage)?;

        if name.is_empty() || payload.is_empty() {
            return Err(CommandError::FileUsage);
        }

        Attachment::new(name, payload).map(Self::File)
    }
}
