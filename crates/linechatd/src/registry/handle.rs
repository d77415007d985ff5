//! Client interface for the registry actor, plus the broadcast engine.
//!
//! Sessions hold exactly one collaborator: a `RegistryHandle`. It covers
//! membership (add/remove/snapshot) and delivery (broadcast/roster).
//!
//! # Panic-Free Guarantees
//!
//! - Channel errors are mapped to `RegistryError::ChannelClosed`, or to an
//!   empty result for queries
//! - Per-recipient delivery failures are logged, never returned

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use linechat_core::{ConnectionId, RosterEntry};
use linechat_protocol::ServerLine;

use crate::server::SessionHandle;

use super::commands::{RegistryCommand, RegistryError};

// ============================================================================
// Registry Handle
// ============================================================================

/// Handle for interacting with the registry actor.
///
/// Cheap to clone; share one per serving task.
///
/// # Usage
///
/// ```ignore
/// handle.add(session.clone()).await?;
/// handle.broadcast(&ServerLine::Joined { at, username }).await;
/// handle.broadcast_roster().await;
/// ```
#[derive(Clone)]
pub struct RegistryHandle {
    /// Command sender to the actor
    sender: mpsc::Sender<RegistryCommand>,
}

impl RegistryHandle {
    pub fn new(sender: mpsc::Sender<RegistryCommand>) -> Self {
        Self { sender }
    }

    /// Add an authenticated session.
    ///
    /// # Errors
    ///
    /// - `RegistryError::Unauthenticated` if the session has no identity
    /// - `RegistryError::AlreadyRegistered` if already a member
    /// - `RegistryError::RegistryFull` if at capacity
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn add(&self, session: SessionHandle) -> Result<(), RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Add {
                session,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)?
    }

    /// Remove a session.
    ///
    /// Returns the removed handle, or `None` if it was not a member (or the
    /// actor is gone). Exactly one of several concurrent removals of the
    /// same session observes `Some`.
    pub async fn remove(&self, id: ConnectionId) -> Option<SessionHandle> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Remove { id, respond_to: tx })
            .await
            .ok()?;

        rx.await.ok()?
    }

    /// Current members, in connection order.
    ///
    /// Returns an empty vector if the actor is gone.
    pub async fn snapshot(&self) -> Vec<SessionHandle> {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::Snapshot { respond_to: tx })
            .await
            .is_err()
        {
            return Vec::new();
        }

        rx.await.unwrap_or_default()
    }

    /// Number of current members.
    pub async fn len(&self) -> usize {
        self.snapshot().await.len()
    }

    /// Returns true if there are no members.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Current roster entries.
    pub async fn roster(&self) -> Vec<RosterEntry> {
        Self::roster_of(&self.snapshot().await)
    }

    /// Checks if the actor is still running.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }

    // ------------------------------------------------------------------------
    // Broadcast engine
    // ------------------------------------------------------------------------

    /// Delivers a line to every current member.
    ///
    /// Best effort: a failed or departed recipient does not stop delivery to
    /// the others and is not reported to the caller. Returns the number of
    /// successful deliveries.
    pub async fn broadcast(&self, line: &ServerLine) -> usize {
        let recipients = self.snapshot().await;
        deliver(&recipients, &line.to_string()).await
    }

    /// Broadcasts the full roster as one `CLIENT_LIST:` line.
    ///
    /// The roster and the recipients come from the same snapshot.
    pub async fn broadcast_roster(&self) -> usize {
        let recipients = self.snapshot().await;
        let line = ServerLine::Roster(Self::roster_of(&recipients)).to_string();
        deliver(&recipients, &line).await
    }

    fn roster_of(sessions: &[SessionHandle]) -> Vec<RosterEntry> {
        sessions.iter().filter_map(SessionHandle::roster_entry).collect()
    }
}

/// Writes `line` to each recipient in turn.
async fn deliver(recipients: &[SessionHandle], line: &str) -> usize {
    let mut delivered = 0;

    for session in recipients {
        match session.send_line(line).await {
            Ok(()) => delivered += 1,
            Err(e) => {
                debug!(
                    conn = %session.id(),
                    error = %e,
                    "Failed to deliver broadcast"
                );
            }
        }
    }

    delivered
}
