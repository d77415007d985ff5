//! TCP listener and acceptor for the chat daemon.
//!
//! The server:
//! - Listens on a TCP socket, optionally wrapping each stream in TLS
//! - Spawns a ConnectionHandler for each client
//! - Supervises every handler so a panic still tears its session down
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   ChatServer    │
//! │                 │
//! │  TcpListener    │
//! └───────┬─────────┘
//!         │ accept() (+ TLS handshake)
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ConnectionHandler│────▶│  RegistryHandle │
//! │  (per client)   │     │                 │
//! └───────┬─────────┘     └────────┬────────┘
//!         │                        │ broadcast
//!         ▼                        ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │   ChatStore     │     │ SessionHandles  │
//! └─────────────────┘     └─────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Accept errors are logged and allow continued operation

mod commands;
mod connection;
mod session;

pub use commands::Flow;
pub use connection::{BoxedReader, ConnectionError, ConnectionHandler, SessionSettings};
pub use session::{BoxedWriter, SessionHandle, SessionState, SessionWriter};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use linechat_core::ConnectionId;

use crate::config::Config;
use crate::registry::RegistryHandle;
use crate::store::ChatStore;
use crate::tls::{load_tls_acceptor, TlsError};

/// Time allowed for a client to finish the TLS handshake
const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// TCP chat server.
///
/// Owns the listener and the set of running session tasks.
pub struct ChatServer {
    /// Bound listener
    listener: TcpListener,

    /// Present when TLS is configured
    tls: Option<TlsAcceptor>,

    /// Handle to the session registry
    registry: RegistryHandle,

    /// Credential and message store
    store: Arc<dyn ChatStore>,

    settings: SessionSettings,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,

    /// Connection counter for generating connection IDs
    connection_counter: AtomicU64,

    /// Tracks every session task so shutdown can wait for them
    tracker: TaskTracker,

    shutdown_grace: Duration,
}

impl ChatServer {
    /// Binds the listener and loads TLS material.
    ///
    /// # Errors
    ///
    /// - `ServerError::Bind` if the address cannot be bound
    /// - `ServerError::Tls` if the certificate or key cannot be loaded
    pub async fn bind(
        config: &Config,
        registry: RegistryHandle,
        store: Arc<dyn ChatStore>,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        let tls = config.tls.as_ref().map(load_tls_acceptor).transpose()?;

        let addr = config.server.listen;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr,
                error: e.to_string(),
            })?;

        Ok(Self {
            listener,
            tls,
            registry,
            store,
            settings: SessionSettings::from(&config.server),
            cancel_token,
            connection_counter: AtomicU64::new(0),
            tracker: TaskTracker::new(),
            shutdown_grace: config.server.shutdown_grace(),
        })
    }

    /// Returns the bound address.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener
            .local_addr()
            .map_err(|e| ServerError::Io(e.to_string()))
    }

    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    /// Runs the server.
    ///
    /// Accepts connections until the cancellation token is triggered, then
    /// waits up to the shutdown grace period for sessions to finish their
    /// teardown. This method does not return until shutdown.
    pub async fn run(self) -> Result<(), ServerError> {
        info!(
            addr = %self.local_addr()?,
            tls = self.is_tls(),
            "Chat server listening"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let n = self.connection_counter.fetch_add(1, Ordering::Relaxed);
                            self.handle_connection(stream, addr, ConnectionId::new(n));
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Spawns a supervised task for one accepted stream.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr, id: ConnectionId) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(conn = %id, error = %e, "Failed to set TCP_NODELAY");
        }

        let tls = self.tls.clone();
        let registry = self.registry.clone();
        let store = Arc::clone(&self.store);
        let settings = self.settings;
        let cancel = self.cancel_token.child_token();

        self.tracker.spawn(async move {
            let (reader, writer) = match tls {
                Some(acceptor) => {
                    match timeout(TLS_HANDSHAKE_TIMEOUT, acceptor.accept(stream)).await {
                        Ok(Ok(tls_stream)) => split_boxed(tls_stream),
                        Ok(Err(e)) => {
                            warn!(conn = %id, peer = %addr, error = %e, "TLS handshake failed");
                            return;
                        }
                        Err(_) => {
                            warn!(conn = %id, peer = %addr, "TLS handshake timed out");
                            return;
                        }
                    }
                }
                None => split_boxed(stream),
            };

            let session = SessionHandle::new(id, addr.to_string(), writer, cancel);
            let handler = ConnectionHandler::new(
                reader,
                session.clone(),
                registry.clone(),
                Arc::clone(&store),
                settings,
            );

            // A panic inside the handler must not skip teardown
            if let Err(e) = tokio::spawn(handler.run()).await {
                if e.is_panic() {
                    error!(conn = %id, peer = %addr, "Session task panicked");
                } else {
                    warn!(conn = %id, error = %e, "Session task aborted");
                }
                session.teardown(&registry, store.as_ref()).await;
            }
        });
    }

    /// Waits for the sessions to close, then releases the listener.
    ///
    /// No accepts are issued once this runs; the socket stays bound until
    /// every session finished its teardown or the grace period expired.
    async fn shutdown(self) {
        self.tracker.close();

        let remaining = self.tracker.len();
        if remaining > 0 {
            info!(sessions = remaining, "Waiting for sessions to close");
        }

        if timeout(self.shutdown_grace, self.tracker.wait()).await.is_err() {
            warn!(
                sessions = self.tracker.len(),
                grace_secs = self.shutdown_grace.as_secs(),
                "Sessions still open after shutdown grace period"
            );
        }

        drop(self.listener);
        info!("Server shutdown complete");
    }
}

/// Splits any stream into boxed read and write halves.
fn split_boxed<S>(stream: S) -> (BoxedReader, BoxedWriter)
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    (Box::new(reader), Box::new(writer))
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {error}")]
    Bind { addr: SocketAddr, error: String },

    #[error("TLS setup failed: {0}")]
    Tls(#[from] TlsError),

    #[error("I/O error: {0}")]
    Io(String),
}
