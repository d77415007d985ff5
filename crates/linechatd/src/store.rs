//! Credential and message store collaborator.
//!
//! The server never talks to a database directly. Everything it needs from
//! persistence goes through [`ChatStore`]:
//! - credential validation during login
//! - account creation for `/register`
//! - fire-and-forget message recording
//! - recent history for `/history`
//!
//! [`MemoryStore`] is the in-process implementation used by the daemon
//! binary and by the tests.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use linechat_core::{now, HistoryRecord, Username};

/// Number of messages kept by [`MemoryStore`] before the oldest are dropped.
pub const MAX_STORED_MESSAGES: usize = 10_000;

/// Errors reported by a store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("username {0} is already taken")]
    AccountExists(Username),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence interface consumed by the server.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Returns `Ok(true)` if the credentials match an account.
    async fn validate_credentials(&self, username: &str, password: &str)
        -> Result<bool, StoreError>;

    /// Creates an account.
    ///
    /// # Errors
    ///
    /// - `StoreError::AccountExists` if the username is taken
    /// - `StoreError::Unavailable` if the store cannot be reached
    async fn create_account(&self, username: &Username, password: &str) -> Result<(), StoreError>;

    /// Records a chat line. Callers ignore failures beyond logging.
    async fn record_message(&self, username: &str, text: &str) -> Result<(), StoreError>;

    /// Returns up to `limit` records, most recent first.
    async fn fetch_recent_messages(&self, limit: usize) -> Result<Vec<HistoryRecord>, StoreError>;
}

// ============================================================================
// In-memory store
// ============================================================================

/// Store kept entirely in process memory.
#[derive(Default)]
pub struct MemoryStore {
    accounts: RwLock<HashMap<Username, String>>,
    messages: RwLock<VecDeque<HistoryRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with accounts.
    pub fn with_accounts<I>(accounts: I) -> Self
    where
        I: IntoIterator<Item = (Username, String)>,
    {
        Self {
            accounts: RwLock::new(accounts.into_iter().collect()),
            messages: RwLock::new(VecDeque::new()),
        }
    }

    /// Number of registered accounts.
    pub async fn account_count(&self) -> usize {
        self.accounts.read().await.len()
    }

    /// Number of stored messages.
    pub async fn message_count(&self) -> usize {
        self.messages.read().await.len()
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn validate_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<bool, StoreError> {
        let Ok(name) = Username::parse(username) else {
            return Ok(false);
        };

        let accounts = self.accounts.read().await;
        Ok(accounts.get(&name).is_some_and(|stored| stored == password))
    }

    async fn create_account(&self, username: &Username, password: &str) -> Result<(), StoreError> {
        let mut accounts = self.accounts.write().await;

        if accounts.contains_key(username) {
            return Err(StoreError::AccountExists(username.clone()));
        }

        accounts.insert(username.clone(), password.to_string());
        debug!(user = %username, total = accounts.len(), "Account created");
        Ok(())
    }

    async fn record_message(&self, username: &str, text: &str) -> Result<(), StoreError> {
        let mut messages = self.messages.write().await;

        if messages.len() >= MAX_STORED_MESSAGES {
            messages.pop_front();
        }

        messages.push_back(HistoryRecord::new(now(), username, text));
        Ok(())
    }

    async fn fetch_recent_messages(&self, limit: usize) -> Result<Vec<HistoryRecord>, StoreError> {
        let messages = self.messages.read().await;
        Ok(messages.iter().rev().take(limit).cloned().collect())
    }
}
