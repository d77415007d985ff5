//! Registry actor - owns the set of live sessions and processes commands.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Reply failures (caller went away) are ignored

use std::collections::BTreeMap;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use linechat_core::ConnectionId;

use crate::server::SessionHandle;

use super::commands::{RegistryCommand, RegistryError};

/// Default maximum number of concurrently registered sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 100;

/// The registry actor.
///
/// Receives commands via mpsc channel and processes them sequentially, so
/// membership changes never interleave. Sessions are keyed by connection id:
/// two connections logged in as the same user are distinct members.
///
/// Connection ids are assigned in accept order, so iteration order of the
/// map is join order for practical purposes.
pub struct RegistryActor {
    /// Command receiver
    receiver: mpsc::Receiver<RegistryCommand>,

    /// Live members
    sessions: BTreeMap<ConnectionId, SessionHandle>,

    /// Capacity limit
    max_sessions: usize,
}

impl RegistryActor {
    pub fn new(receiver: mpsc::Receiver<RegistryCommand>, max_sessions: usize) -> Self {
        Self {
            receiver,
            sessions: BTreeMap::new(),
            max_sessions,
        }
    }

    /// Runs the actor event loop until all handles are dropped.
    pub async fn run(mut self) {
        info!(max_sessions = self.max_sessions, "Registry actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!(
            "Registry actor stopped (sessions: {})",
            self.sessions.len()
        );
    }

    /// Dispatches a command to the appropriate handler.
    fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::Add {
                session,
                respond_to,
            } => {
                let result = self.handle_add(session);
                let _ = respond_to.send(result);
            }

            RegistryCommand::Remove { id, respond_to } => {
                let removed = self.handle_remove(id);
                let _ = respond_to.send(removed);
            }

            RegistryCommand::Snapshot { respond_to } => {
                let _ = respond_to.send(self.sessions.values().cloned().collect());
            }
        }
    }

    fn handle_add(&mut self, session: SessionHandle) -> Result<(), RegistryError> {
        let id = session.id();

        let Some(username) = session.username().cloned() else {
            warn!(conn = %id, "Refusing to register unauthenticated session");
            return Err(RegistryError::Unauthenticated(id));
        };

        if self.sessions.contains_key(&id) {
            debug!(conn = %id, "Session already registered");
            return Err(RegistryError::AlreadyRegistered(id));
        }

        if self.sessions.len() >= self.max_sessions {
            warn!(
                conn = %id,
                user = %username,
                max = self.max_sessions,
                "Registry is full"
            );
            return Err(RegistryError::RegistryFull {
                max: self.max_sessions,
            });
        }

        self.sessions.insert(id, session);

        info!(
            conn = %id,
            user = %username,
            total_sessions = self.sessions.len(),
            "Session registered"
        );

        Ok(())
    }

    fn handle_remove(&mut self, id: ConnectionId) -> Option<SessionHandle> {
        let removed = self.sessions.remove(&id);

        if removed.is_some() {
            info!(
                conn = %id,
                remaining_sessions = self.sessions.len(),
                "Session removed"
            );
        } else {
            debug!(conn = %id, "Remove for unknown session");
        }

        removed
    }

    #[cfg(test)]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
