//! Session registry using Actor pattern.
//!
//! The registry is the process-wide set of authenticated, connected
//! sessions. A single actor task owns the set; every serving task and the
//! shutdown path talk to it through a cloneable [`RegistryHandle`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐  RegistryCommand   ┌─────────────────┐
//! │  serving tasks   │───(mpsc channel)──▶│  RegistryActor  │
//! │ (RegistryHandle) │◀──(oneshot reply)──│ BTreeMap<Conn,  │
//! └────────┬─────────┘                    │  SessionHandle> │
//!          │ snapshot()                   └─────────────────┘
//!          ▼
//! ┌──────────────────┐
//! │ broadcast engine │  writes to every session in the snapshot,
//! │  (handle side)   │  outside the actor
//! └──────────────────┘
//! ```
//!
//! The actor never performs network I/O, so a slow client can delay a
//! broadcast but never a membership change.
//!
//! # Panic-Free Guarantees
//!
//! All operations in this module follow the panic-free policy:
//! - No `.unwrap()` or `.expect()` in production code
//! - Channel operations handle closure gracefully

use tokio::sync::mpsc;

mod actor;
mod commands;
mod handle;

pub use actor::{RegistryActor, DEFAULT_MAX_SESSIONS};
pub use commands::{RegistryCommand, RegistryError};
pub use handle::RegistryHandle;

/// Channel buffer size
const COMMAND_BUFFER: usize = 100;

/// Spawn the registry actor and return a handle for interaction.
///
/// The actor stops once every handle has been dropped.
///
/// # Example
///
/// ```no_run
/// use linechatd::registry::spawn_registry;
///
/// #[tokio::main]
/// async fn main() {
///     let handle = spawn_registry(100);
///     let members = handle.snapshot().await;
///     assert!(members.is_empty());
/// }
/// ```
pub fn spawn_registry(max_sessions: usize) -> RegistryHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);

    let actor = RegistryActor::new(cmd_rx, max_sessions);
    tokio::spawn(actor.run());

    RegistryHandle::new(cmd_tx)
}
