//! Storage trait definitions

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::models::{Account, Attachment, AttachmentParent, Message, MessageId, NewAttachment};

/// Trait for archive storage operations
///
/// Abstracts over storage backends (SQLite in the daemon, in-memory for
/// tests). The message identifier's uniqueness constraint is the engine's
/// only mutual-exclusion primitive; see `insert_message`.
pub trait StashStore: Send + Sync {
    /// Register a new account by email
    fn add_account(&self, email: &str) -> Result<Account>;

    /// Get an account by ID
    fn get_account(&self, id: i64) -> Result<Option<Account>>;

    /// List all accounts, oldest first
    fn list_accounts(&self) -> Result<Vec<Account>>;

    /// Count accounts
    fn count_accounts(&self) -> Result<u64>;

    /// Persist a new sync cursor for an account
    fn advance_cursor(&self, account_id: i64, cursor: &str) -> Result<()>;

    /// Persist the cursor and expiration returned by a watch registration
    fn record_watch(
        &self,
        account_id: i64,
        cursor: &str,
        expiration: Option<DateTime<Utc>>,
    ) -> Result<()>;

    /// Record when an account last completed a sync round
    fn mark_synced(&self, account_id: i64, at: DateTime<Utc>) -> Result<()>;

    /// Insert a message, returning false when the ID is already stored
    ///
    /// Messages are immutable once archived; there is no upsert. A
    /// duplicate insert is a concurrent worker losing the race, not an
    /// error.
    fn insert_message(&self, message: &Message) -> Result<bool>;

    /// Check if a message exists
    fn message_exists(&self, id: &MessageId) -> Result<bool>;

    /// Get a message by ID
    fn get_message(&self, id: &MessageId) -> Result<Option<Message>>;

    /// List messages, newest first
    fn list_messages(&self, limit: u32, offset: u32) -> Result<Vec<Message>>;

    /// Count messages
    fn count_messages(&self) -> Result<u64>;

    /// Delete a message and its attachments, returning false if absent
    fn delete_message(&self, id: &MessageId) -> Result<bool>;

    /// Record a successfully uploaded attachment
    ///
    /// Fails when the owning message does not exist.
    fn insert_attachment(&self, attachment: &NewAttachment) -> Result<Attachment>;

    /// List one message's attachments in insertion order
    fn attachments_for_message(&self, id: &MessageId) -> Result<Vec<Attachment>>;

    /// List attachments joined with their parent message, newest first
    fn list_attachments(&self, limit: u32, offset: u32)
        -> Result<Vec<(Attachment, AttachmentParent)>>;

    /// Count attachments
    fn count_attachments(&self) -> Result<u64>;
}
