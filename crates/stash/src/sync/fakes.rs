//! Scripted seam doubles for sync engine tests

use anyhow::{Result, anyhow};
use base64::prelude::*;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use super::{HistoryDelta, HistoryExpiredError, MailApi, WatchRegistration};
use crate::drive::{ObjectStore, StoredObject, UploadError};
use crate::gmail::api::{GmailMessage, Header, MessageBody, MessagePart, ProfileResponse};

enum HistoryScript {
    Delta(HistoryDelta),
    Expired,
    Fail,
}

enum WatchScript {
    Grant {
        cursor: String,
        expiration: Option<DateTime<Utc>>,
    },
    Fail,
}

/// Scripted MailApi double with call recording
pub struct FakeApi {
    messages: HashMap<String, GmailMessage>,
    attachment_bytes: HashMap<(String, String), Vec<u8>>,
    listing: Vec<String>,
    history: HistoryScript,
    watch: WatchScript,
    profile_cursor: Option<String>,
    /// Caps passed to list_message_ids
    pub listed_caps: Mutex<Vec<u32>>,
    /// Message IDs fetched in full
    pub fetched: Mutex<Vec<String>>,
    /// Topics passed to register_watch
    pub watch_calls: Mutex<Vec<String>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self {
            messages: HashMap::new(),
            attachment_bytes: HashMap::new(),
            listing: Vec::new(),
            history: HistoryScript::Delta(HistoryDelta {
                message_ids: Vec::new(),
                new_cursor: "0".to_string(),
            }),
            watch: WatchScript::Fail,
            profile_cursor: None,
            listed_caps: Mutex::new(Vec::new()),
            fetched: Mutex::new(Vec::new()),
            watch_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_message(mut self, message: GmailMessage) -> Self {
        self.messages.insert(message.id.clone(), message);
        self
    }

    /// Add a full message carrying the given attachments, with bytes served
    /// for each via fetch_attachment
    pub fn with_attachment_message(mut self, id: &str, subject: &str, filenames: &[&str]) -> Self {
        for name in filenames {
            self.attachment_bytes.insert(
                (id.to_string(), format!("att-{}", name)),
                format!("{} bytes", name).into_bytes(),
            );
        }
        self.messages
            .insert(id.to_string(), message_with_attachments(id, subject, filenames));
        self
    }

    pub fn with_attachment_bytes(mut self, message_id: &str, attachment_id: &str, bytes: &[u8]) -> Self {
        self.attachment_bytes.insert(
            (message_id.to_string(), attachment_id.to_string()),
            bytes.to_vec(),
        );
        self
    }

    pub fn with_listing(mut self, ids: &[&str]) -> Self {
        self.listing = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_history(mut self, ids: &[&str], new_cursor: &str) -> Self {
        self.history = HistoryScript::Delta(HistoryDelta {
            message_ids: ids.iter().map(|s| s.to_string()).collect(),
            new_cursor: new_cursor.to_string(),
        });
        self
    }

    pub fn with_expired_history(mut self) -> Self {
        self.history = HistoryScript::Expired;
        self
    }

    pub fn with_failing_history(mut self) -> Self {
        self.history = HistoryScript::Fail;
        self
    }

    pub fn with_watch(mut self, cursor: &str, expiration: Option<DateTime<Utc>>) -> Self {
        self.watch = WatchScript::Grant {
            cursor: cursor.to_string(),
            expiration,
        };
        self
    }

    pub fn with_profile_cursor(mut self, cursor: &str) -> Self {
        self.profile_cursor = Some(cursor.to_string());
        self
    }
}

impl MailApi for FakeApi {
    fn list_message_ids(&self, max: u32) -> Result<Vec<String>> {
        self.listed_caps.lock().unwrap().push(max);
        Ok(self.listing.iter().take(max as usize).cloned().collect())
    }

    fn list_added_since(&self, _cursor: &str) -> Result<HistoryDelta> {
        match &self.history {
            HistoryScript::Delta(delta) => Ok(delta.clone()),
            HistoryScript::Expired => Err(HistoryExpiredError.into()),
            HistoryScript::Fail => Err(anyhow!("history listing unavailable")),
        }
    }

    fn fetch_message(&self, id: &str) -> Result<GmailMessage> {
        self.fetched.lock().unwrap().push(id.to_string());
        self.messages
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow!("no scripted message {}", id))
    }

    fn fetch_attachment(&self, message_id: &str, attachment_id: &str) -> Result<Vec<u8>> {
        self.attachment_bytes
            .get(&(message_id.to_string(), attachment_id.to_string()))
            .cloned()
            .ok_or_else(|| anyhow!("no scripted bytes for {}/{}", message_id, attachment_id))
    }

    fn register_watch(&self, topic: &str) -> Result<WatchRegistration> {
        self.watch_calls.lock().unwrap().push(topic.to_string());
        match &self.watch {
            WatchScript::Grant { cursor, expiration } => Ok(WatchRegistration {
                cursor: cursor.clone(),
                expiration: *expiration,
            }),
            WatchScript::Fail => Err(anyhow!("watch registration refused")),
        }
    }

    fn profile(&self) -> Result<ProfileResponse> {
        Ok(ProfileResponse {
            email_address: Some("fake@example.com".to_string()),
            history_id: self.profile_cursor.clone(),
        })
    }
}

/// One recorded upload
pub struct UploadRecord {
    pub folder: String,
    pub filename: String,
    pub content_type: String,
    pub size: usize,
}

/// Recording ObjectStore double
pub struct FakeObjects {
    fail_filenames: Vec<String>,
    /// How often the root folder was resolved
    pub root_calls: Mutex<usize>,
    /// Subfolder names requested
    pub subfolders: Mutex<Vec<String>>,
    /// Uploads in call order
    pub uploads: Mutex<Vec<UploadRecord>>,
}

impl FakeObjects {
    pub fn new() -> Self {
        Self {
            fail_filenames: Vec::new(),
            root_calls: Mutex::new(0),
            subfolders: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
        }
    }

    /// Make uploads of the given filenames fail with an UploadError
    pub fn failing(filenames: &[&str]) -> Self {
        let mut objects = Self::new();
        objects.fail_filenames = filenames.iter().map(|s| s.to_string()).collect();
        objects
    }
}

impl ObjectStore for FakeObjects {
    fn ensure_root_folder(&self) -> Result<String> {
        *self.root_calls.lock().unwrap() += 1;
        Ok("root".to_string())
    }

    fn create_subfolder(&self, _parent: &str, name: &str) -> Result<String> {
        self.subfolders.lock().unwrap().push(name.to_string());
        Ok(format!("sub:{}", name))
    }

    fn upload(
        &self,
        folder: &str,
        filename: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<StoredObject> {
        if self.fail_filenames.iter().any(|f| f == filename) {
            return Err(UploadError {
                filename: filename.to_string(),
                reason: "scripted failure".to_string(),
            }
            .into());
        }

        self.uploads.lock().unwrap().push(UploadRecord {
            folder: folder.to_string(),
            filename: filename.to_string(),
            content_type: content_type.to_string(),
            size: bytes.len(),
        });

        Ok(StoredObject {
            id: format!("obj-{}", filename),
            link: format!("https://drive.example/{}", filename),
        })
    }
}

/// A leaf part carrying base64url text content
pub fn text_part(mime: &str, content: &str) -> MessagePart {
    MessagePart {
        mime_type: Some(mime.to_string()),
        body: Some(MessageBody {
            size: Some(content.len() as u32),
            data: Some(BASE64_URL_SAFE_NO_PAD.encode(content)),
            attachment_id: None,
        }),
        ..Default::default()
    }
}

/// A leaf part referencing attachment content by ID
pub fn attachment_part(part_id: &str, filename: &str, attachment_id: &str) -> MessagePart {
    MessagePart {
        part_id: Some(part_id.to_string()),
        mime_type: Some("application/pdf".to_string()),
        filename: Some(filename.to_string()),
        body: Some(MessageBody {
            size: Some(4096),
            data: None,
            attachment_id: Some(attachment_id.to_string()),
        }),
        ..Default::default()
    }
}

/// A format=full message whose payload groups the given parts
pub fn full_message(id: &str, subject: &str, parts: Vec<MessagePart>) -> GmailMessage {
    GmailMessage {
        id: id.to_string(),
        thread_id: Some(format!("thread-{}", id)),
        internal_date: Some("1700000000000".to_string()),
        payload: Some(MessagePart {
            mime_type: Some("multipart/mixed".to_string()),
            headers: Some(vec![
                Header {
                    name: "Subject".to_string(),
                    value: subject.to_string(),
                },
                Header {
                    name: "From".to_string(),
                    value: "sender@example.com".to_string(),
                },
            ]),
            parts: Some(parts),
            ..Default::default()
        }),
    }
}

/// A message with just a plain-text body
pub fn text_message(id: &str, subject: &str) -> GmailMessage {
    full_message(id, subject, vec![text_part("text/plain", "message body")])
}

/// A message with a text body plus one attachment part per filename
///
/// Attachment IDs follow the `att-<filename>` convention used by
/// `FakeApi::with_attachment_message`.
pub fn message_with_attachments(id: &str, subject: &str, filenames: &[&str]) -> GmailMessage {
    let mut parts = vec![text_part("text/plain", "message body")];
    for (i, name) in filenames.iter().enumerate() {
        parts.push(attachment_part(
            &format!("{}", i + 1),
            name,
            &format!("att-{}", name),
        ));
    }
    full_message(id, subject, parts)
}
