//! Command interpreter for `/` lines.
//!
//! Every command replies to the requesting session only, except `/file`,
//! which goes through the broadcast engine. Malformed arguments are answered
//! with a single usage line and the connection stays open.

use tracing::{debug, info, warn};

use linechat_core::Username;
use linechat_protocol::{Attachment, Command, CommandError, ServerLine, HELP_LINES};

use crate::store::StoreError;

use super::connection::{ConnectionError, ConnectionHandler};

/// What the serving loop should do after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

impl ConnectionHandler {
    /// Parses and executes one command line.
    pub(super) async fn dispatch_command(&mut self, line: &str) -> Result<Flow, ConnectionError> {
        let command = match Command::parse(line) {
            Ok(command) => command,
            Err(e) => {
                debug!(conn = %self.session.id(), error = %e, "Malformed command");
                self.session.send(&usage_reply(e)).await?;
                return Ok(Flow::Continue);
            }
        };

        match command {
            Command::Quit => self.handle_quit().await,
            Command::Help => self.handle_help().await,
            Command::Register => self.handle_register().await,
            Command::History { limit } => self.handle_history(limit).await,
            Command::File(attachment) => self.handle_file(attachment).await,
            Command::Unknown { verb } => {
                debug!(conn = %self.session.id(), verb = %verb, "Unknown command");
                self.session.send(&ServerLine::UnknownCommand).await?;
                Ok(Flow::Continue)
            }
        }
    }

    async fn handle_quit(&mut self) -> Result<Flow, ConnectionError> {
        self.session.send(&ServerLine::Goodbye).await?;
        Ok(Flow::Quit)
    }

    async fn handle_help(&mut self) -> Result<Flow, ConnectionError> {
        for line in HELP_LINES {
            self.session.send_line(line).await?;
        }
        Ok(Flow::Continue)
    }

    /// Creates a new account. The current session keeps its identity.
    async fn handle_register(&mut self) -> Result<Flow, ConnectionError> {
        let Some(raw_name) = self.prompt(&ServerLine::RegisterUsernamePrompt).await? else {
            return Ok(Flow::Quit);
        };

        let username = match Username::parse(&raw_name) {
            Ok(name) => name,
            Err(e) => {
                debug!(conn = %self.session.id(), error = %e, "Rejected registration username");
                self.session.send(&ServerLine::RegisterInvalidUsername).await?;
                return Ok(Flow::Continue);
            }
        };

        let Some(raw_password) = self.prompt(&ServerLine::RegisterPasswordPrompt).await? else {
            return Ok(Flow::Quit);
        };

        let password = raw_password.trim();
        if password.is_empty() {
            self.session.send(&ServerLine::RegisterInvalidPassword).await?;
            return Ok(Flow::Continue);
        }

        let reply = match self.store.create_account(&username, password).await {
            Ok(()) => {
                info!(user = %username, "Account registered");
                ServerLine::Registered { username }
            }
            Err(StoreError::AccountExists(username)) => ServerLine::UsernameTaken { username },
            Err(e) => {
                warn!(user = %username, error = %e, "Account registration failed");
                ServerLine::RegistrationFailed {
                    reason: "account store unavailable".to_string(),
                }
            }
        };

        self.session.send(&reply).await?;
        Ok(Flow::Continue)
    }

    /// Sends the most recent records, newest first.
    async fn handle_history(&mut self, limit: Option<usize>) -> Result<Flow, ConnectionError> {
        let limit = limit
            .unwrap_or(self.settings.history_default)
            .min(self.settings.history_max);

        let records = if limit == 0 {
            Vec::new()
        } else {
            match self.store.fetch_recent_messages(limit).await {
                Ok(records) => records,
                Err(e) => {
                    warn!(error = %e, "History lookup failed");
                    Vec::new()
                }
            }
        };

        if records.is_empty() {
            self.session.send(&ServerLine::HistoryEmpty).await?;
            return Ok(Flow::Continue);
        }

        self.session
            .send(&ServerLine::HistoryHeader {
                count: records.len(),
            })
            .await?;

        for record in records {
            self.session.send(&ServerLine::History(record)).await?;
        }

        Ok(Flow::Continue)
    }

    /// Relays an attachment to every registered session, sender included.
    async fn handle_file(&mut self, attachment: Attachment) -> Result<Flow, ConnectionError> {
        let Some(sender) = self.session.username().cloned() else {
            return Ok(Flow::Continue);
        };

        let delivered = self
            .registry
            .broadcast(&ServerLine::File {
                sender: sender.clone(),
                file_name: attachment.file_name.clone(),
                payload: attachment.payload,
            })
            .await;

        info!(
            user = %sender,
            file = %attachment.file_name,
            bytes = attachment.decoded_len,
            recipients = delivered,
            "File broadcast"
        );

        self.session
            .send(&ServerLine::FileReceived {
                file_name: attachment.file_name,
            })
            .await?;

        Ok(Flow::Continue)
    }
}

/// Maps a parse failure to its one-line reply.
fn usage_reply(error: CommandError) -> ServerLine {
    match error {
        CommandError::HistoryUsage => ServerLine::HistoryUsage,
        CommandError::FileUsage => ServerLine::FileUsage,
        CommandError::InvalidAttachment { file_name } => {
            ServerLine::InvalidAttachment { file_name }
        }
        CommandError::NotACommand => ServerLine::UnknownCommand,
    }
}
