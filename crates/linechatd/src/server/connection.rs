//! Connection handler for individual client connections.
//!
//! Each accepted connection gets its own `ConnectionHandler` that:
//! - Runs the login exchange (greeting, username, password, validation)
//! - Joins the registry and announces the user
//! - Reads lines until the stream ends, routing `/` lines to the command
//!   interpreter and everything else to the broadcast engine
//! - Runs the session teardown on every exit path
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Connection errors are logged and result in graceful disconnect

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tracing::{debug, info, warn};

use linechat_core::{now, Identity, Username, SERVER_AUTHOR};
use linechat_protocol::{Command, ServerLine};

use crate::config::{
    ServerConfig, DEFAULT_HISTORY_LIMIT, DEFAULT_HISTORY_MAX, DEFAULT_MAX_LINE_BYTES,
};
use crate::registry::{RegistryError, RegistryHandle};
use crate::store::ChatStore;

use super::commands::Flow;
use super::session::SessionHandle;

/// Type-erased read half of a client stream (plain TCP or TLS).
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Per-session limits and defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// Longest accepted input line in bytes
    pub max_line_bytes: usize,
    /// `/history` limit when none is given
    pub history_default: usize,
    /// Upper bound for `/history n`
    pub history_max: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            history_default: DEFAULT_HISTORY_LIMIT,
            history_max: DEFAULT_HISTORY_MAX,
        }
    }
}

impl From<&ServerConfig> for SessionSettings {
    fn from(config: &ServerConfig) -> Self {
        Self {
            max_line_bytes: config.max_line_bytes,
            history_default: config.history_default,
            history_max: config.history_max,
        }
    }
}

/// Connection handler for a single client.
pub struct ConnectionHandler {
    /// Buffered reader for incoming lines
    reader: BufReader<BoxedReader>,

    /// Shared session state and write half
    pub(super) session: SessionHandle,

    /// Registry and broadcast engine
    pub(super) registry: RegistryHandle,

    /// Persistence collaborator
    pub(super) store: Arc<dyn ChatStore>,

    pub(super) settings: SessionSettings,
}

impl ConnectionHandler {
    pub fn new(
        reader: BoxedReader,
        session: SessionHandle,
        registry: RegistryHandle,
        store: Arc<dyn ChatStore>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            reader: BufReader::new(reader),
            session,
            registry,
            store,
            settings,
        }
    }

    /// Runs the connection to completion.
    ///
    /// Always ends with the session torn down and its stream released.
    pub async fn run(mut self) {
        debug!(conn = %self.session.id(), peer = %self.session.peer(), "New client connected");

        match self.serve().await {
            Ok(()) => {}
            Err(ConnectionError::Shutdown) => {
                debug!(conn = %self.session.id(), "Closing session for server shutdown");
                if let Err(e) = self.session.send(&ServerLine::ShuttingDown).await {
                    debug!(conn = %self.session.id(), error = %e, "Could not send shutdown notice");
                }
            }
            Err(e) => {
                debug!(
                    conn = %self.session.id(),
                    user = ?self.session.username(),
                    error = %e,
                    "Connection closed"
                );
            }
        }

        self.session
            .teardown(&self.registry, self.store.as_ref())
            .await;

        info!(
            conn = %self.session.id(),
            user = ?self.session.username(),
            "Client disconnected"
        );
    }

    async fn serve(&mut self) -> Result<(), ConnectionError> {
        let Some(identity) = self.authenticate().await? else {
            return Ok(());
        };

        self.join(identity).await?;
        self.process_lines().await
    }

    // ------------------------------------------------------------------------
    // Authentication
    // ------------------------------------------------------------------------

    /// Runs the login exchange.
    ///
    /// Returns `Ok(None)` when the client was rejected; the rejection line
    /// has already been sent. There is no retry: a rejected client must
    /// reconnect.
    async fn authenticate(&mut self) -> Result<Option<Identity>, ConnectionError> {
        self.session.send(&ServerLine::Greeting).await?;

        let username = match self.prompt(&ServerLine::UsernamePrompt).await? {
            Some(raw) => match Username::parse(&raw) {
                Ok(name) => name,
                Err(e) => {
                    debug!(conn = %self.session.id(), error = %e, "Rejected username");
                    self.reject(ServerLine::InvalidUsername).await;
                    return Ok(None);
                }
            },
            None => {
                self.reject(ServerLine::InvalidUsername).await;
                return Ok(None);
            }
        };

        let password = match self.prompt(&ServerLine::PasswordPrompt).await? {
            Some(raw) if !raw.trim().is_empty() => raw.trim().to_string(),
            _ => {
                self.reject(ServerLine::InvalidPassword).await;
                return Ok(None);
            }
        };

        let valid = match self
            .store
            .validate_credentials(username.as_str(), &password)
            .await
        {
            Ok(valid) => valid,
            Err(e) => {
                warn!(user = %username, error = %e, "Credential check failed");
                false
            }
        };

        if !valid {
            info!(conn = %self.session.id(), user = %username, "Authentication failed");
            self.reject(ServerLine::AuthFailed).await;
            return Ok(None);
        }

        info!(
            conn = %self.session.id(),
            user = %username,
            peer = %self.session.peer(),
            "Credentials accepted"
        );

        Ok(Some(Identity::new(username, now())))
    }

    /// Sends a rejection line; the peer may already be gone.
    async fn reject(&mut self, line: ServerLine) {
        if let Err(e) = self.session.send(&line).await {
            debug!(conn = %self.session.id(), error = %e, "Could not send rejection");
        }
    }

    /// Registers the session, confirms the login and announces it.
    ///
    /// The success line is only sent once the registry accepted the session,
    /// so a client that sees it is really a member. The write half stays
    /// locked across the registry call; broadcasts that already include this
    /// session queue behind the success line.
    async fn join(&mut self, identity: Identity) -> Result<(), ConnectionError> {
        let username = identity.username.clone();
        self.session.authenticate(identity);

        {
            let mut writer = self.session.lock_writer().await;

            match self.registry.add(self.session.clone()).await {
                Ok(()) => {
                    writer
                        .send(&ServerLine::AuthSucceeded {
                            username: username.clone(),
                        })
                        .await?;
                }
                Err(RegistryError::RegistryFull { max }) => {
                    if let Err(e) = writer.send(&ServerLine::ServerFull).await {
                        debug!(conn = %self.session.id(), error = %e, "Could not send rejection");
                    }
                    return Err(ConnectionError::Rejected(format!(
                        "registry full (max: {max})"
                    )));
                }
                Err(e) => return Err(ConnectionError::RegistryError(e.to_string())),
            }
        }

        info!(
            conn = %self.session.id(),
            user = %username,
            peer = %self.session.peer(),
            "Client authenticated"
        );

        self.registry
            .broadcast(&ServerLine::Joined {
                at: now(),
                username: username.clone(),
            })
            .await;

        if let Err(e) = self
            .store
            .record_message(SERVER_AUTHOR, &ServerLine::joined_record(&username))
            .await
        {
            warn!(user = %username, error = %e, "Failed to record join");
        }

        self.registry.broadcast_roster().await;

        info!(conn = %self.session.id(), user = %username, "User joined the chat");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Serving loop
    // ------------------------------------------------------------------------

    /// Reads lines until the stream ends or the client quits.
    async fn process_lines(&mut self) -> Result<(), ConnectionError> {
        loop {
            let Some(line) = self.read_line().await? else {
                debug!(conn = %self.session.id(), "Client sent EOF");
                return Ok(());
            };

            if Command::is_command(&line) {
                if let Flow::Quit = self.dispatch_command(&line).await? {
                    return Ok(());
                }
            } else if !line.is_empty() {
                self.publish_chat(line).await;
            }
        }
    }

    /// Stamps, broadcasts and records one chat message.
    async fn publish_chat(&mut self, text: String) {
        let Some(username) = self.session.username().cloned() else {
            return;
        };

        let delivered = self
            .registry
            .broadcast(&ServerLine::Chat {
                at: now(),
                username: username.clone(),
                text: text.clone(),
            })
            .await;

        debug!(user = %username, recipients = delivered, "Chat message broadcast");

        if let Err(e) = self.store.record_message(username.as_str(), &text).await {
            warn!(user = %username, error = %e, "Failed to record message");
        }
    }

    // ------------------------------------------------------------------------
    // Line I/O
    // ------------------------------------------------------------------------

    /// Sends a prompt and reads the answer.
    pub(super) async fn prompt(
        &mut self,
        line: &ServerLine,
    ) -> Result<Option<String>, ConnectionError> {
        self.session.send(line).await?;
        self.read_line().await
    }

    /// Reads one line without its terminator.
    ///
    /// Returns `Ok(None)` at end of stream and `Err(Shutdown)` if the server
    /// is stopping.
    pub(super) async fn read_line(&mut self) -> Result<Option<String>, ConnectionError> {
        let max = self.settings.max_line_bytes;
        let cancel = self.session.cancel_token().clone();
        let mut line = String::new();
        let mut limited = (&mut self.reader).take(max as u64 + 1);

        let bytes_read = tokio::select! {
            biased;

            _ = cancel.cancelled() => return Err(ConnectionError::Shutdown),

            result = limited.read_line(&mut line) => {
                result.map_err(|e| ConnectionError::Io(e.to_string()))?
            }
        };

        if bytes_read == 0 {
            return Ok(None);
        }

        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        } else if line.len() > max {
            return Err(ConnectionError::LineTooLong { max });
        }

        Ok(Some(line))
    }
}

/// Errors that can occur during connection handling.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Write timeout")]
    WriteTimeout,

    #[error("Line too long (max: {max} bytes)")]
    LineTooLong { max: usize },

    #[error("Server shutting down")]
    Shutdown,

    #[error("Connection rejected: {0}")]
    Rejected(String),

    #[error("Registry error: {0}")]
    RegistryError(String),
}
