//! Gmail API response normalization
//!
//! Converts Gmail API messages to domain models.

use anyhow::{Context, Result};
use base64::prelude::*;
use chrono::{TimeZone, Utc};

use super::api::GmailMessage;
use super::parts::{classify_part, extract_header, flatten_parts, PartClass};
use crate::models::{Message, MessageId};

/// Normalize a Gmail API message to a stash Message
///
/// Headers are looked up case-insensitively, first match wins. Bodies come
/// from the leaf parts; when several parts share a subtype the last one
/// wins.
pub fn normalize_message(gmail_msg: &GmailMessage, account_id: i64) -> Result<Message> {
    let payload = gmail_msg
        .payload
        .as_ref()
        .context("Message has no payload")?;

    let subject = extract_header(payload, "Subject").unwrap_or_default();
    let sender = extract_header(payload, "From").unwrap_or_default();
    let to = extract_header(payload, "To");
    let cc = extract_header(payload, "Cc");
    let bcc = extract_header(payload, "Bcc");

    // internalDate is milliseconds since epoch, serialized as a string
    let internal_date: i64 = gmail_msg
        .internal_date
        .as_deref()
        .and_then(|d| d.parse().ok())
        .unwrap_or(0);
    let timestamp = Utc
        .timestamp_millis_opt(internal_date)
        .single()
        .unwrap_or_else(Utc::now);

    let mut body_text = None;
    let mut body_html = None;
    for part in flatten_parts(payload) {
        let decoded = part
            .body
            .as_ref()
            .and_then(|b| b.data.as_deref())
            .and_then(decode_base64_body);
        if decoded.is_none() {
            continue;
        }
        match classify_part(part) {
            PartClass::BodyText => body_text = decoded,
            PartClass::BodyHtml => body_html = decoded,
            _ => {}
        }
    }

    Ok(Message {
        id: MessageId::new(&gmail_msg.id),
        account_id,
        thread_id: gmail_msg.thread_id.clone(),
        subject,
        sender,
        to,
        cc,
        bcc,
        timestamp,
        body_text,
        body_html,
        created_at: Utc::now(),
    })
}

/// Decode base64-encoded part data to raw bytes
///
/// Gmail uses URL-safe base64 but padding can vary, so we try multiple
/// decoders.
pub(crate) fn decode_base64_bytes(data: &str) -> Option<Vec<u8>> {
    use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE};

    let decoders: &[&base64::engine::GeneralPurpose] =
        &[&BASE64_URL_SAFE_NO_PAD, &URL_SAFE, &STANDARD, &STANDARD_NO_PAD];

    for decoder in decoders {
        if let Ok(decoded) = decoder.decode(data) {
            return Some(decoded);
        }
    }

    None
}

/// Decode base64-encoded body data to text
fn decode_base64_body(data: &str) -> Option<String> {
    decode_base64_bytes(data).and_then(|bytes| String::from_utf8(bytes).ok())
}
