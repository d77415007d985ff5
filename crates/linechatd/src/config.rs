//! Configuration loading.
//!
//! The daemon reads a TOML file; every section is optional.
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:12345"
//! max_sessions = 100
//!
//! [tls]
//! cert_path = "/etc/linechat/cert.pem"
//! key_path = "/etc/linechat/key.pem"
//!
//! [[accounts]]
//! username = "alice"
//! password = "changeme"
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use linechat_core::Username;

use crate::registry::DEFAULT_MAX_SESSIONS;
use crate::store::MemoryStore;

/// Default listen address
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:12345";

/// Default maximum line length (8 MiB, room for base64 attachments)
pub const DEFAULT_MAX_LINE_BYTES: usize = 8 * 1024 * 1024;

/// Default `/history` limit when no argument is given
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// Largest `/history` limit honoured
pub const DEFAULT_HISTORY_MAX: usize = 500;

/// Default time to wait for sessions to finish on shutdown
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 5;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Daemon configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Listener and session settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Optional TLS. When present every connection is TLS-wrapped.
    pub tls: Option<TlsConfig>,
    /// Accounts seeded into the in-memory store.
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Builds an in-memory store holding the configured accounts.
    pub fn seeded_store(&self) -> MemoryStore {
        MemoryStore::with_accounts(
            self.accounts
                .iter()
                .map(|a| (a.username.clone(), a.password.clone())),
        )
    }
}

/// Listener and per-session settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind.
    pub listen: SocketAddr,
    /// Maximum number of logged-in sessions.
    pub max_sessions: usize,
    /// Longest accepted input line in bytes.
    pub max_line_bytes: usize,
    /// `/history` limit when none is given.
    pub history_default: usize,
    /// Upper bound applied to `/history n`.
    pub history_max: usize,
    /// Seconds to wait for sessions to close during shutdown.
    pub shutdown_grace_secs: u64,
}

impl ServerConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 12345)),
            max_sessions: DEFAULT_MAX_SESSIONS,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            history_default: DEFAULT_HISTORY_LIMIT,
            history_max: DEFAULT_HISTORY_MAX,
            shutdown_grace_secs: DEFAULT_SHUTDOWN_GRACE_SECS,
        }
    }
}

/// TLS certificate and key (PEM files).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// A seed account.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccountConfig {
    pub username: Username,
    pub password: String,
}
