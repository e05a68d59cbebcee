//! Per-message ingestion pipeline

use anyhow::{Context, Result};
use log::{debug, warn};

use super::MailApi;
use crate::drive::{pick_target_folder, ObjectStore};
use crate::gmail::api::MessagePart;
use crate::gmail::{classify_part, decode_base64_bytes, flatten_parts, normalize_message, PartClass};
use crate::models::{Account, MessageId, NewAttachment};
use crate::storage::StashStore;

/// Outcome of archiving a single message
#[derive(Debug, Default, Clone)]
pub struct IngestOutcome {
    /// Whether this call stored the message row
    pub stored: bool,
    /// Attachments uploaded and recorded
    pub attachments_saved: usize,
    /// Attachments that could not be downloaded, uploaded, or recorded
    pub attachments_failed: usize,
}

/// Attachment bytes pulled down and waiting for upload
struct FetchedAttachment {
    filename: String,
    content_type: String,
    bytes: Vec<u8>,
}

/// Archive one message end to end
///
/// Idempotent: an already-stored message is skipped before any network
/// traffic. The insert itself is the race guard; when two workers chase
/// the same message the loser backs off without touching the object
/// store. Attachment failures are tolerated per item and reported in the
/// outcome; the message row stays either way.
pub fn ingest_message(
    api: &dyn MailApi,
    objects: &dyn ObjectStore,
    store: &dyn StashStore,
    account: &Account,
    provider_id: &str,
) -> Result<IngestOutcome> {
    let mut outcome = IngestOutcome::default();

    // 1. Skip messages that are already archived
    if store.message_exists(&MessageId::new(provider_id))? {
        return Ok(outcome);
    }

    // 2. Fetch the full message
    let gmail_msg = api.fetch_message(provider_id)?;

    // 3. Normalize to the archive model
    let message = normalize_message(&gmail_msg, account.id)?;

    // 4. Insert the row; a concurrent worker may have won the race
    if !store.insert_message(&message)? {
        debug!("Message {} was stored by another worker, skipping", provider_id);
        return Ok(outcome);
    }
    outcome.stored = true;

    // 5. Download the bytes of every attachment part
    let payload = match &gmail_msg.payload {
        Some(payload) => payload,
        None => return Ok(outcome),
    };

    let mut downloads: Vec<FetchedAttachment> = Vec::new();
    for part in flatten_parts(payload) {
        if classify_part(part) != PartClass::Attachment {
            continue;
        }

        let filename = match part.filename.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("attachment-{}", part.part_id.as_deref().unwrap_or("0")),
        };
        let content_type = part
            .mime_type
            .clone()
            .unwrap_or_else(|| "application/octet-stream".to_string());

        match download_part_bytes(api, provider_id, part) {
            Ok(bytes) => downloads.push(FetchedAttachment {
                filename,
                content_type,
                bytes,
            }),
            Err(e) => {
                warn!(
                    "Skipping attachment {} of message {}: {}",
                    filename, provider_id, e
                );
                outcome.attachments_failed += 1;
            }
        }
    }

    if downloads.is_empty() {
        return Ok(outcome);
    }

    // 6. Upload into the destination folder and record each attachment.
    //    Only attachments that actually downloaded count toward the
    //    folder decision.
    let folder = pick_target_folder(objects, &message.subject, downloads.len())?;
    for attachment in &downloads {
        let result = objects
            .upload(
                &folder,
                &attachment.filename,
                &attachment.content_type,
                &attachment.bytes,
            )
            .and_then(|uploaded| {
                store.insert_attachment(&NewAttachment::new(
                    message.id.clone(),
                    attachment.filename.clone(),
                    attachment.content_type.clone(),
                    uploaded.link,
                ))
            });
        match result {
            Ok(_) => outcome.attachments_saved += 1,
            Err(e) => {
                warn!(
                    "Failed to archive attachment {} of message {}: {}",
                    attachment.filename, provider_id, e
                );
                outcome.attachments_failed += 1;
            }
        }
    }

    Ok(outcome)
}

/// Resolve the raw bytes for one attachment part
///
/// Large attachments carry a reference ID and need a second fetch; small
/// ones arrive inline as base64 data.
fn download_part_bytes(
    api: &dyn MailApi,
    message_id: &str,
    part: &MessagePart,
) -> Result<Vec<u8>> {
    let body = part.body.as_ref().context("Attachment part has no body")?;

    if let Some(attachment_id) = body.attachment_id.as_deref().filter(|id| !id.is_empty()) {
        return api.fetch_attachment(message_id, attachment_id);
    }

    let data = body.data.as_deref().context("Attachment part has no content")?;
    decode_base64_bytes(data).context("Attachment data is not valid base64")
}
