//! Gmail API integration
//!
//! This module provides:
//! - OAuth2 token management for headless accounts
//! - Gmail API client implementing the sync engine's mail seam
//! - MIME part tree inspection (flattening and classification)
//! - Response normalization to domain models

mod auth;
mod client;
mod normalize;
mod parts;

pub use auth::{AuthError, GoogleAuth};
pub use client::GmailClient;
pub use normalize::normalize_message;
pub use parts::{classify_part, flatten_parts, PartClass};

pub(crate) use normalize::decode_base64_bytes;

/// Gmail API response types
pub mod api {
    use serde::{Deserialize, Serialize};

    /// Response from listing messages
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ListMessagesResponse {
        pub messages: Option<Vec<MessageRef>>,
        pub next_page_token: Option<String>,
        pub result_size_estimate: Option<u32>,
    }

    /// Reference to a message (just ID and thread ID)
    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessageRef {
        pub id: String,
        pub thread_id: Option<String>,
    }

    /// Full message from Gmail API (format=full)
    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct GmailMessage {
        pub id: String,
        pub thread_id: Option<String>,
        pub internal_date: Option<String>,
        pub payload: Option<MessagePart>,
    }

    /// Email header (name-value pair)
    #[derive(Debug, Clone, Deserialize, Serialize)]
    pub struct Header {
        pub name: String,
        pub value: String,
    }

    /// Body of a message part
    ///
    /// True attachments carry `attachment_id` and no inline `data`; inline
    /// parts carry base64url `data` directly.
    #[derive(Debug, Clone, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessageBody {
        pub size: Option<u32>,
        pub data: Option<String>,
        pub attachment_id: Option<String>,
    }

    /// One node of the MIME part tree
    ///
    /// The message payload itself is the root part; nodes with children
    /// are containers (multipart/*) and leaves carry content.
    #[derive(Debug, Clone, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessagePart {
        pub part_id: Option<String>,
        pub mime_type: Option<String>,
        pub filename: Option<String>,
        pub headers: Option<Vec<Header>>,
        pub body: Option<MessageBody>,
        pub parts: Option<Vec<MessagePart>>,
    }

    /// Response from fetching a single attachment's content
    #[derive(Debug, Deserialize)]
    pub struct AttachmentData {
        pub size: Option<u32>,
        pub data: Option<String>,
    }

    /// Response from the history listing
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct HistoryResponse {
        pub history: Option<Vec<HistoryRecord>>,
        pub history_id: Option<String>,
        pub next_page_token: Option<String>,
    }

    /// One change-log record
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct HistoryRecord {
        pub id: Option<String>,
        pub messages_added: Option<Vec<MessageAdded>>,
    }

    /// A "message added" event inside a history record
    #[derive(Debug, Deserialize)]
    pub struct MessageAdded {
        pub message: MessageRef,
    }

    /// Response from registering a push watch
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct WatchResponse {
        pub history_id: Option<String>,
        /// Expiration as milliseconds since epoch, serialized as a string
        pub expiration: Option<String>,
    }

    /// Response from the profile endpoint
    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ProfileResponse {
        pub email_address: Option<String>,
        pub history_id: Option<String>,
    }
}
