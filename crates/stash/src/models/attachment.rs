//! Attachment model representing an uploaded attachment record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::MessageId;

/// A stored attachment record
///
/// A row exists only after the bytes were successfully uploaded to the
/// object store; the `link` is the public locator returned by the upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    /// Unique integer identifier (database primary key)
    pub id: i64,
    /// Owning message; deleting the message cascades to its attachments
    pub message_id: MessageId,
    /// Original filename from the MIME part
    pub filename: String,
    /// MIME content type
    pub mime_type: String,
    /// Public link to the uploaded object
    pub link: String,
    /// When the record was created
    pub created_at: DateTime<Utc>,
}

/// A new attachment record awaiting its store-assigned id
#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub message_id: MessageId,
    pub filename: String,
    pub mime_type: String,
    pub link: String,
}

impl NewAttachment {
    pub fn new(
        message_id: MessageId,
        filename: impl Into<String>,
        mime_type: impl Into<String>,
        link: impl Into<String>,
    ) -> Self {
        Self {
            message_id,
            filename: filename.into(),
            mime_type: mime_type.into(),
            link: link.into(),
        }
    }
}

/// Minimal parent-message fields joined onto attachment listings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentParent {
    pub message_id: MessageId,
    pub subject: String,
    pub sender: String,
    pub timestamp: DateTime<Utc>,
}
