//! Read-only projections over the archive
//!
//! These back the daemon's HTTP query surface. They are pure reads over
//! persisted state; no sync logic lives here.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::models::{Attachment, AttachmentParent, Message, MessageId};
use crate::storage::StashStore;

/// Page size used when the caller does not ask for one
const DEFAULT_PAGE_LIMIT: u32 = 20;

/// Hard ceiling on a requested page size
const MAX_PAGE_LIMIT: u32 = 100;

/// Pagination parameters as they arrive from a query string
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl PageParams {
    /// Resolve to a 1-based page and a clamped limit
    fn resolve(self) -> (u32, u32) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self
            .limit
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .clamp(1, MAX_PAGE_LIMIT);
        (page, limit)
    }
}

/// One page of messages, newest first
#[derive(Debug, Serialize)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
}

/// A message together with its archived attachments
#[derive(Debug, Serialize)]
pub struct MessageDetail {
    pub message: Message,
    pub attachments: Vec<Attachment>,
}

/// An attachment with minimal fields of the owning message
#[derive(Debug, Serialize)]
pub struct AttachmentEntry {
    pub attachment: Attachment,
    pub message: AttachmentParent,
}

/// One page of attachments, newest first
#[derive(Debug, Serialize)]
pub struct AttachmentPage {
    pub attachments: Vec<AttachmentEntry>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
}

/// Aggregate row counts
#[derive(Debug, Serialize)]
pub struct ArchiveStats {
    pub accounts: u64,
    pub messages: u64,
    pub attachments: u64,
}

/// List messages newest-first with page metadata
pub fn list_messages(store: &dyn StashStore, params: PageParams) -> Result<MessagePage> {
    let (page, limit) = params.resolve();
    let offset = (page - 1).saturating_mul(limit);

    let messages = store.list_messages(limit, offset)?;
    let total = store.count_messages()?;

    Ok(MessagePage {
        messages,
        page,
        limit,
        total,
    })
}

/// Fetch one message with its attachments
pub fn get_message_detail(
    store: &dyn StashStore,
    id: &MessageId,
) -> Result<Option<MessageDetail>> {
    let Some(message) = store.get_message(id)? else {
        return Ok(None);
    };
    let attachments = store.attachments_for_message(id)?;

    Ok(Some(MessageDetail {
        message,
        attachments,
    }))
}

/// List attachments newest-first, each joined with its parent message
pub fn list_attachments(store: &dyn StashStore, params: PageParams) -> Result<AttachmentPage> {
    let (page, limit) = params.resolve();
    let offset = (page - 1).saturating_mul(limit);

    let attachments = store
        .list_attachments(limit, offset)?
        .into_iter()
        .map(|(attachment, message)| AttachmentEntry {
            attachment,
            message,
        })
        .collect();
    let total = store.count_attachments()?;

    Ok(AttachmentPage {
        attachments,
        page,
        limit,
        total,
    })
}

/// Count accounts, messages, and attachments
pub fn archive_stats(store: &dyn StashStore) -> Result<ArchiveStats> {
    Ok(ArchiveStats {
        accounts: store.count_accounts()?,
        messages: store.count_messages()?,
        attachments: store.count_attachments()?,
    })
}
