//! Message model representing an archived Gmail message

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a message (the provider-issued Gmail message ID)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An archived email message
///
/// Created exactly once per provider message ID and never updated afterwards.
/// Recipient lists are kept as the raw address-list header strings; nothing
/// downstream queries them structurally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Gmail message ID (globally unique, primary key in the store)
    pub id: MessageId,
    /// Owning account
    pub account_id: i64,
    /// Gmail thread ID
    pub thread_id: Option<String>,
    /// Subject line (empty string when the header is missing)
    pub subject: String,
    /// Raw From header value
    pub sender: String,
    /// Raw To header value
    pub to: Option<String>,
    /// Raw Cc header value
    pub cc: Option<String>,
    /// Raw Bcc header value
    pub bcc: Option<String>,
    /// When the message was received (Gmail internalDate)
    pub timestamp: DateTime<Utc>,
    /// Plain text body, if any part carried one
    pub body_text: Option<String>,
    /// HTML body, if any part carried one
    pub body_html: Option<String>,
    /// When the record was created locally
    pub created_at: DateTime<Utc>,
}
