//! Per-connection session state shared between tasks.
//!
//! A [`SessionHandle`] is what the registry stores and what the broadcast
//! engine writes to. The serving task owns the read half of the stream; the
//! write half lives behind the handle so any task can deliver lines to it.
//!
//! # Lifecycle
//!
//! ```text
//! Unauthenticated ──authenticate()──▶ Authenticated
//!        │                                 │
//!        └────────────teardown()───────────┴──▶ Closed
//! ```
//!
//! `teardown()` is guarded by a one-shot flag, so it runs once no matter how
//! many exit paths (quit, read error, shutdown, panic) race to trigger it.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use linechat_core::{now, ConnectionId, Identity, RosterEntry, Username, SERVER_AUTHOR};
use linechat_protocol::ServerLine;

use crate::registry::RegistryHandle;
use crate::store::ChatStore;

use super::connection::ConnectionError;

/// Write timeout for a single line (10 seconds)
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Type-erased write half of a client stream (plain TCP or TLS).
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Observable session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
    Closed,
}

/// Cheap-to-clone handle to one connected client.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    id: ConnectionId,
    peer: String,
    identity: OnceLock<Identity>,
    writer: Mutex<BufWriter<BoxedWriter>>,
    cancel: CancellationToken,
    torn_down: AtomicBool,
}

impl SessionHandle {
    /// Creates a handle for a freshly accepted connection.
    ///
    /// `cancel` is cancelled when the session must stop reading, either
    /// because the server is shutting down or because teardown ran.
    pub fn new(
        id: ConnectionId,
        peer: impl Into<String>,
        writer: BoxedWriter,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                id,
                peer: peer.into(),
                identity: OnceLock::new(),
                writer: Mutex::new(BufWriter::new(writer)),
                cancel,
                torn_down: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    pub fn peer(&self) -> &str {
        &self.inner.peer
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.inner.identity.get()
    }

    pub fn username(&self) -> Option<&Username> {
        self.identity().map(|i| &i.username)
    }

    /// Roster entry for this session, if authenticated.
    pub fn roster_entry(&self) -> Option<RosterEntry> {
        self.identity().map(RosterEntry::from)
    }

    pub fn state(&self) -> SessionState {
        if self.is_closed() {
            SessionState::Closed
        } else if self.identity().is_some() {
            SessionState::Authenticated
        } else {
            SessionState::Unauthenticated
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.torn_down.load(Ordering::Acquire)
    }

    /// Token the serving task watches while blocked on reads.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.inner.cancel
    }

    /// Records the authenticated identity.
    ///
    /// Returns `false` if the session already had one; the identity is
    /// immutable once set.
    pub fn authenticate(&self, identity: Identity) -> bool {
        self.inner.identity.set(identity).is_ok()
    }

    /// Sends one protocol line.
    pub async fn send(&self, line: &ServerLine) -> Result<(), ConnectionError> {
        self.send_line(&line.to_string()).await
    }

    /// Sends raw text followed by a newline.
    pub async fn send_line(&self, line: &str) -> Result<(), ConnectionError> {
        let mut writer = self.inner.writer.lock().await;
        write_line(&mut writer, line).await
    }

    /// Takes exclusive use of the write half.
    ///
    /// Every other send to this session waits until the returned writer is
    /// dropped.
    pub async fn lock_writer(&self) -> SessionWriter<'_> {
        SessionWriter {
            guard: self.inner.writer.lock().await,
        }
    }

    /// Runs the standard teardown exactly once.
    ///
    /// In order: remove from the registry, broadcast the departure, record
    /// it, push the new roster, release the stream. Departure notices are
    /// only sent if this session was actually registered.
    ///
    /// Returns `true` for the call that performed the teardown and `false`
    /// for every later call.
    pub async fn teardown(&self, registry: &RegistryHandle, store: &dyn ChatStore) -> bool {
        if self
            .inner
            .torn_down
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(conn = %self.id(), "Teardown already ran");
            return false;
        }

        if let Some(identity) = self.identity() {
            if registry.remove(self.id()).await.is_some() {
                let username = &identity.username;

                registry
                    .broadcast(&ServerLine::Left {
                        at: now(),
                        username: username.clone(),
                    })
                    .await;

                if let Err(e) = store
                    .record_message(SERVER_AUTHOR, &ServerLine::left_record(username))
                    .await
                {
                    warn!(user = %username, error = %e, "Failed to record departure");
                }

                registry.broadcast_roster().await;

                info!(conn = %self.id(), user = %username, "User left the chat");
            }
        }

        self.close_stream().await;
        true
    }

    /// Stops the reader and shuts down the write half.
    async fn close_stream(&self) {
        self.inner.cancel.cancel();

        let mut writer = self.inner.writer.lock().await;
        match timeout(WRITE_TIMEOUT, writer.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(conn = %self.id(), error = %e, "Stream shutdown failed"),
            Err(_) => debug!(conn = %self.id(), "Stream shutdown timed out"),
        }
    }
}

/// Exclusive access to a session's write half.
pub struct SessionWriter<'a> {
    guard: MutexGuard<'a, BufWriter<BoxedWriter>>,
}

impl SessionWriter<'_> {
    pub async fn send(&mut self, line: &ServerLine) -> Result<(), ConnectionError> {
        write_line(&mut self.guard, &line.to_string()).await
    }
}

/// Writes one line and flushes, bounded by [`WRITE_TIMEOUT`].
async fn write_line(writer: &mut BufWriter<BoxedWriter>, line: &str) -> Result<(), ConnectionError> {
    match timeout(WRITE_TIMEOUT, async {
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok::<(), std::io::Error>(())
    })
    .await
    {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ConnectionError::Io(e.to_string())),
        Err(_) => Err(ConnectionError::WriteTimeout),
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id())
            .field("peer", &self.peer())
            .field("username", &self.username())
            .field("state", &self.state())
            .finish()
    }
}
