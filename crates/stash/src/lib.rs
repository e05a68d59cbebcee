//! Stash crate - Business logic for mail archiving
//!
//! This crate provides the headless archiving engine:
//! - Domain models (Account, Message, Attachment)
//! - Gmail API client and OAuth authentication
//! - Google Drive object store adapter for attachment bytes
//! - Storage trait abstractions
//! - Idempotent sync engine with per-account cursor tracking
//! - Read-only query projections for the HTTP surface
//!
//! The daemon binary wires this up; the crate itself has no server
//! dependencies.

pub mod config;
pub mod drive;
pub mod gmail;
pub mod models;
pub mod query;
pub mod storage;
pub mod sync;

pub use config::GoogleCredentials;
pub use drive::{DriveClient, ObjectStore, StoredObject, UploadError};
pub use gmail::{api::ProfileResponse, AuthError, GmailClient, GoogleAuth};
pub use models::{Account, Attachment, AttachmentParent, Message, MessageId, NewAttachment};
pub use query::{
    ArchiveStats, AttachmentEntry, AttachmentPage, MessageDetail, MessagePage, PageParams,
    archive_stats, get_message_detail, list_attachments, list_messages,
};
pub use storage::{InMemoryStashStore, SqliteStashStore, StashStore};
pub use sync::{
    HistoryDelta, HistoryExpiredError, IngestOutcome, MailApi, RoundStats, SyncOptions,
    WatchRegistration, ingest_message, run_account_sync,
};
