//! Gmail API HTTP client
//!
//! Implements the sync engine's mail seam over the Gmail REST API.
//! Uses synchronous HTTP (ureq) to be executor-agnostic.

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use std::time::Duration;

use super::api::{
    AttachmentData, GmailMessage, HistoryResponse, ListMessagesResponse, ProfileResponse,
    WatchResponse,
};
use super::{decode_base64_bytes, AuthError, GoogleAuth};
use crate::sync::{HistoryDelta, HistoryExpiredError, MailApi, WatchRegistration};

/// Gmail API client for one account
pub struct GmailClient {
    auth: GoogleAuth,
}

impl GmailClient {
    /// Gmail API base URL
    const BASE_URL: &'static str = "https://gmail.googleapis.com/gmail/v1";

    /// Attempts for message and attachment fetches
    const MAX_FETCH_RETRIES: u32 = 3;

    /// Create a new Gmail client
    pub fn new(auth: GoogleAuth) -> Self {
        Self { auth }
    }

    /// List one page of message IDs from the mailbox
    fn list_messages(
        &self,
        max_results: u32,
        page_token: Option<&str>,
    ) -> Result<ListMessagesResponse> {
        let access_token = self.auth.get_access_token()?;

        let mut url = format!(
            "{}/users/me/messages?maxResults={}",
            Self::BASE_URL,
            max_results.min(500)
        );

        if let Some(token) = page_token {
            url.push_str(&format!("&pageToken={}", token));
        }

        let mut response = ureq::get(&url)
            .header("Authorization", &format!("Bearer {}", access_token))
            .call()
            .context("Failed to send list messages request")?;

        let list: ListMessagesResponse = response
            .body_mut()
            .read_json()
            .context("Failed to parse list messages response")?;

        Ok(list)
    }

    /// List one page of history records since a cursor
    ///
    /// # Errors
    /// Returns `HistoryExpiredError` if the cursor is too old (404 from Gmail)
    fn list_history(
        &self,
        start_history_id: &str,
        page_token: Option<&str>,
    ) -> Result<HistoryResponse> {
        let access_token = self.auth.get_access_token()?;

        let mut url = format!(
            "{}/users/me/history?startHistoryId={}&historyTypes=messageAdded",
            Self::BASE_URL,
            start_history_id
        );

        if let Some(token) = page_token {
            url.push_str(&format!("&pageToken={}", token));
        }

        let response = ureq::get(&url)
            .header("Authorization", &format!("Bearer {}", access_token))
            .call();

        match response {
            Ok(mut resp) => {
                let history: HistoryResponse = resp
                    .body_mut()
                    .read_json()
                    .context("Failed to parse history response")?;
                Ok(history)
            }
            Err(ureq::Error::StatusCode(404)) => {
                // Cursor expired or invalid
                Err(HistoryExpiredError.into())
            }
            Err(e) => Err(anyhow::anyhow!("Failed to fetch history: {}", e)),
        }
    }

    /// Get full message details by ID
    fn get_message(&self, id: &str) -> Result<GmailMessage> {
        let access_token = self.auth.get_access_token()?;

        let url = format!("{}/users/me/messages/{}?format=full", Self::BASE_URL, id);

        let mut response = ureq::get(&url)
            .header("Authorization", &format!("Bearer {}", access_token))
            .call()
            .context("Failed to send get message request")?;

        let message: GmailMessage = response
            .body_mut()
            .read_json()
            .context("Failed to parse message response")?;

        Ok(message)
    }

    /// Get one attachment's raw bytes by ID
    fn get_attachment(&self, message_id: &str, attachment_id: &str) -> Result<Vec<u8>> {
        let access_token = self.auth.get_access_token()?;

        let url = format!(
            "{}/users/me/messages/{}/attachments/{}",
            Self::BASE_URL,
            message_id,
            attachment_id
        );

        let mut response = ureq::get(&url)
            .header("Authorization", &format!("Bearer {}", access_token))
            .call()
            .context("Failed to send get attachment request")?;

        let attachment: AttachmentData = response
            .body_mut()
            .read_json()
            .context("Failed to parse attachment response")?;

        let data = attachment
            .data
            .context("Attachment response has no data")?;
        decode_base64_bytes(&data).context("Attachment data is not valid base64")
    }

    /// Run an operation with exponential backoff retry
    ///
    /// Auth failures are returned immediately; retrying cannot fix them.
    fn with_retries<T>(&self, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let mut last_error = None;
        let mut delay = Duration::from_millis(100);

        for attempt in 0..Self::MAX_FETCH_RETRIES {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if e.downcast_ref::<AuthError>().is_some() {
                        return Err(e);
                    }
                    last_error = Some(e);
                    if attempt < Self::MAX_FETCH_RETRIES - 1 {
                        // Add jitter to the delay
                        let jitter = Duration::from_millis(rand_jitter());
                        std::thread::sleep(delay + jitter);
                        delay *= 2;
                    }
                }
            }
        }

        Err(last_error.unwrap())
    }
}

impl MailApi for GmailClient {
    /// List up to `max` message IDs, newest first, handling pagination
    fn list_message_ids(&self, max: u32) -> Result<Vec<String>> {
        let mut ids: Vec<String> = Vec::new();
        let mut page_token = None;

        loop {
            let remaining = (max as usize).saturating_sub(ids.len());
            if remaining == 0 {
                break;
            }

            let response = self.list_messages(remaining as u32, page_token.as_deref())?;

            if let Some(messages) = response.messages {
                ids.extend(messages.into_iter().map(|m| m.id));
            }

            match response.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        ids.truncate(max as usize);
        Ok(ids)
    }

    /// Collect all "message added" IDs since the cursor, handling pagination
    fn list_added_since(&self, cursor: &str) -> Result<HistoryDelta> {
        let mut message_ids = Vec::new();
        let mut final_history_id = None;
        let mut page_token = None;

        loop {
            let response = self.list_history(cursor, page_token.as_deref())?;

            if let Some(records) = response.history {
                for record in records {
                    if let Some(added) = record.messages_added {
                        message_ids.extend(added.into_iter().map(|a| a.message.id));
                    }
                }
            }

            if response.history_id.is_some() {
                final_history_id = response.history_id;
            }

            match response.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(HistoryDelta {
            message_ids,
            new_cursor: final_history_id.unwrap_or_else(|| cursor.to_string()),
        })
    }

    fn fetch_message(&self, id: &str) -> Result<GmailMessage> {
        self.with_retries(|| self.get_message(id))
    }

    fn fetch_attachment(&self, message_id: &str, attachment_id: &str) -> Result<Vec<u8>> {
        self.with_retries(|| self.get_attachment(message_id, attachment_id))
    }

    /// Register a push watch routing mailbox changes to a Pub/Sub topic
    fn register_watch(&self, topic: &str) -> Result<WatchRegistration> {
        let access_token = self.auth.get_access_token()?;

        let url = format!("{}/users/me/watch", Self::BASE_URL);

        let mut response = ureq::post(&url)
            .header("Authorization", &format!("Bearer {}", access_token))
            .send_json(serde_json::json!({ "topicName": topic }))
            .context("Failed to send watch request")?;

        let watch: WatchResponse = response
            .body_mut()
            .read_json()
            .context("Failed to parse watch response")?;

        let cursor = watch
            .history_id
            .context("Watch response has no historyId")?;
        let expiration = watch
            .expiration
            .and_then(|ms| ms.parse::<i64>().ok())
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single());

        Ok(WatchRegistration { cursor, expiration })
    }

    fn profile(&self) -> Result<ProfileResponse> {
        let access_token = self.auth.get_access_token()?;

        let url = format!("{}/users/me/profile", Self::BASE_URL);

        let mut response = ureq::get(&url)
            .header("Authorization", &format!("Bearer {}", access_token))
            .call()
            .context("Failed to send profile request")?;

        response
            .body_mut()
            .read_json()
            .context("Failed to parse profile response")
    }
}

/// Generate a random jitter value (0-100ms)
fn rand_jitter() -> u64 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let hasher = RandomState::new().build_hasher();
    hasher.finish() % 100
}
