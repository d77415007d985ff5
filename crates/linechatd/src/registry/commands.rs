//! Registry actor commands and errors.

use linechat_core::ConnectionId;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::server::SessionHandle;

// ============================================================================
// Registry Commands
// ============================================================================

/// Commands sent to the registry actor.
///
/// Each command carries a oneshot channel for the response.
#[derive(Debug)]
pub enum RegistryCommand {
    /// Add an authenticated session.
    ///
    /// # Errors
    /// - `RegistryError::Unauthenticated` if the session has no identity
    /// - `RegistryError::AlreadyRegistered` if the connection is present
    /// - `RegistryError::RegistryFull` if at maximum capacity
    Add {
        session: SessionHandle,
        respond_to: oneshot::Sender<Result<(), RegistryError>>,
    },

    /// Remove a session. Replies with the removed handle, if it was present.
    Remove {
        id: ConnectionId,
        respond_to: oneshot::Sender<Option<SessionHandle>>,
    },

    /// Current members in join order.
    Snapshot {
        respond_to: oneshot::Sender<Vec<SessionHandle>>,
    },
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Errors that can occur during registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Session {0} is not authenticated")]
    Unauthenticated(ConnectionId),

    #[error("Session {0} is already registered")]
    AlreadyRegistered(ConnectionId),

    #[error("Registry is full (max: {max})")]
    RegistryFull { max: usize },

    #[error("Registry channel closed")]
    ChannelClosed,
}
