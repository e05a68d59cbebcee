//! Sync engine for archiving mail and mirroring attachments
//!
//! Provides idempotent sync rounds that can be safely retried. The engine
//! is written against the `MailApi` seam so every control path is testable
//! without a network.

mod cursor;
mod pipeline;

#[cfg(test)]
pub(crate) mod fakes;

pub use cursor::{RoundStats, SyncOptions, run_account_sync};
pub use pipeline::{IngestOutcome, ingest_message};

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::gmail::api::{GmailMessage, ProfileResponse};

/// Error indicating the stored sync cursor has expired
#[derive(Debug, thiserror::Error)]
#[error("History cursor expired or invalid")]
pub struct HistoryExpiredError;

/// Changes since a cursor
#[derive(Debug, Clone)]
pub struct HistoryDelta {
    /// IDs of messages added since the cursor, in listing order
    pub message_ids: Vec<String>,
    /// Cursor to persist once the listed changes are processed
    pub new_cursor: String,
}

/// Result of registering a push watch
#[derive(Debug, Clone)]
pub struct WatchRegistration {
    /// Cursor the watch starts from
    pub cursor: String,
    /// When the watch lapses and must be re-registered
    pub expiration: Option<DateTime<Utc>>,
}

/// Mail service seam the sync engine is written against
pub trait MailApi: Send + Sync {
    /// List up to `max` message IDs, newest first
    fn list_message_ids(&self, max: u32) -> Result<Vec<String>>;

    /// List messages added since `cursor`
    ///
    /// # Errors
    /// Fails with [`HistoryExpiredError`] when the provider no longer
    /// honors the cursor.
    fn list_added_since(&self, cursor: &str) -> Result<HistoryDelta>;

    /// Fetch one message in full
    fn fetch_message(&self, id: &str) -> Result<GmailMessage>;

    /// Fetch one attachment's raw bytes
    fn fetch_attachment(&self, message_id: &str, attachment_id: &str) -> Result<Vec<u8>>;

    /// Register a push watch routing changes to the given topic
    fn register_watch(&self, topic: &str) -> Result<WatchRegistration>;

    /// Fetch the account profile; its cursor seeds first-time syncs
    fn profile(&self) -> Result<ProfileResponse>;
}
