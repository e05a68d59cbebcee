//! MIME part tree inspection
//!
//! Gmail delivers a message body as a nested tree of MIME parts. The
//! ingestion pipeline only cares about leaves: container parts
//! (multipart/*) group children and carry no content of their own.

use super::api::MessagePart;

/// How a leaf part should be treated by the ingestion pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartClass {
    /// A user attachment to download and mirror to the object store
    Attachment,
    /// Inline plain-text body content
    BodyText,
    /// Inline HTML body content
    BodyHtml,
    /// Anything else (inline images, signatures, unknown types)
    Other,
}

/// Flatten a part tree into its leaf parts, depth-first, left-to-right
///
/// A part with children is a container and is not itself emitted. A part
/// without children is a leaf even when it also has no body.
pub fn flatten_parts(root: &MessagePart) -> Vec<&MessagePart> {
    let mut leaves = Vec::new();
    collect_leaves(root, &mut leaves);
    leaves
}

fn collect_leaves<'a>(part: &'a MessagePart, leaves: &mut Vec<&'a MessagePart>) {
    match &part.parts {
        Some(children) if !children.is_empty() => {
            for child in children {
                collect_leaves(child, leaves);
            }
        }
        _ => leaves.push(part),
    }
}

/// Classify one leaf part; the first matching rule wins
///
/// 1. A provider-issued attachment reference always means attachment.
///    Gmail sets it for every true attachment even when disposition
///    headers are missing, so it outranks the heuristics below.
/// 2. An explicit `Content-Disposition: attachment` header.
/// 3. A filename plus a positive declared size, as a fallback for
///    malformed messages.
/// 4. Otherwise inline; text/plain and text/html feed the message bodies.
pub fn classify_part(part: &MessagePart) -> PartClass {
    if part
        .body
        .as_ref()
        .and_then(|b| b.attachment_id.as_deref())
        .is_some_and(|id| !id.is_empty())
    {
        return PartClass::Attachment;
    }

    if extract_header(part, "Content-Disposition")
        .is_some_and(|v| v.trim_start().to_ascii_lowercase().starts_with("attachment"))
    {
        return PartClass::Attachment;
    }

    let has_filename = part.filename.as_deref().is_some_and(|f| !f.is_empty());
    let positive_size = part
        .body
        .as_ref()
        .and_then(|b| b.size)
        .is_some_and(|s| s > 0);
    if has_filename && positive_size {
        return PartClass::Attachment;
    }

    match part.mime_type.as_deref() {
        Some(m) if m.starts_with("text/plain") => PartClass::BodyText,
        Some(m) if m.starts_with("text/html") => PartClass::BodyHtml,
        _ => PartClass::Other,
    }
}

/// Extract a header value from a part by name (case-insensitive, first match wins)
pub(crate) fn extract_header(part: &MessagePart, name: &str) -> Option<String> {
    part.headers.as_ref()?.iter().find_map(|h| {
        if h.name.eq_ignore_ascii_case(name) {
            Some(h.value.clone())
        } else {
            None
        }
    })
}
