//! Account model representing a registered Gmail account

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered Gmail account tracked by the sync engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Unique integer identifier (database primary key)
    pub id: i64,
    /// Email address (unique)
    pub email: String,
    /// Last-observed position in the account's change stream.
    /// None means the account has no cursor and the next round backfills.
    pub history_id: Option<String>,
    /// When the current push watch lapses, if one is registered
    pub watch_expiration: Option<DateTime<Utc>>,
    /// When the last discovery round completed for this account
    pub last_synced_at: Option<DateTime<Utc>>,
    /// When the account was added
    pub added_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account (id will be assigned by the store)
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            id: 0,
            email: email.into(),
            history_id: None,
            watch_expiration: None,
            last_synced_at: None,
            added_at: Utc::now(),
        }
    }

    /// Create an account with a known ID (loaded from the store)
    pub fn with_id(id: i64, email: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
            history_id: None,
            watch_expiration: None,
            last_synced_at: None,
            added_at: Utc::now(),
        }
    }

    /// Set the sync cursor
    pub fn with_history_id(mut self, history_id: impl Into<String>) -> Self {
        self.history_id = Some(history_id.into());
        self
    }

    /// Set the last completed round timestamp
    pub fn with_last_synced_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_synced_at = Some(at);
        self
    }

    /// Whether the account has a usable cursor
    pub fn has_cursor(&self) -> bool {
        self.history_id.is_some()
    }

    /// Whether the account has never completed a discovery round
    pub fn is_initial_sync(&self) -> bool {
        self.last_synced_at.is_none()
    }
}
