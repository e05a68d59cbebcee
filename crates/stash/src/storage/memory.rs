//! In-memory storage implementation
//!
//! Used for tests; mirrors the SQLite store's semantics, including the
//! duplicate-insert contract and cascade deletes.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicI64, Ordering};

use super::traits::StashStore;
use crate::models::{Account, Attachment, AttachmentParent, Message, MessageId, NewAttachment};

/// In-memory implementation of StashStore
///
/// Uses HashMaps protected by RwLocks for thread-safe access. Lock order
/// is accounts, then messages, then attachments.
pub struct InMemoryStashStore {
    accounts: RwLock<HashMap<i64, Account>>,
    messages: RwLock<HashMap<String, Message>>,
    attachments: RwLock<Vec<Attachment>>,
    next_account_id: AtomicI64,
    next_attachment_id: AtomicI64,
}

impl InMemoryStashStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            messages: RwLock::new(HashMap::new()),
            attachments: RwLock::new(Vec::new()),
            next_account_id: AtomicI64::new(1),
            next_attachment_id: AtomicI64::new(1),
        }
    }
}

impl Default for InMemoryStashStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StashStore for InMemoryStashStore {
    fn add_account(&self, email: &str) -> Result<Account> {
        let mut accounts = self.accounts.write().unwrap();

        if accounts.values().any(|a| a.email == email) {
            anyhow::bail!("Account {} already exists", email);
        }

        let id = self.next_account_id.fetch_add(1, Ordering::SeqCst);
        let account = Account::with_id(id, email);
        accounts.insert(id, account.clone());

        Ok(account)
    }

    fn get_account(&self, id: i64) -> Result<Option<Account>> {
        let accounts = self.accounts.read().unwrap();
        Ok(accounts.get(&id).cloned())
    }

    fn list_accounts(&self) -> Result<Vec<Account>> {
        let accounts = self.accounts.read().unwrap();
        let mut all: Vec<Account> = accounts.values().cloned().collect();
        all.sort_by_key(|a| a.id);
        Ok(all)
    }

    fn count_accounts(&self) -> Result<u64> {
        Ok(self.accounts.read().unwrap().len() as u64)
    }

    fn advance_cursor(&self, account_id: i64, cursor: &str) -> Result<()> {
        let mut accounts = self.accounts.write().unwrap();
        let account = accounts
            .get_mut(&account_id)
            .ok_or_else(|| anyhow::anyhow!("No account with id {}", account_id))?;

        account.history_id = Some(cursor.to_string());
        Ok(())
    }

    fn record_watch(
        &self,
        account_id: i64,
        cursor: &str,
        expiration: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut accounts = self.accounts.write().unwrap();
        let account = accounts
            .get_mut(&account_id)
            .ok_or_else(|| anyhow::anyhow!("No account with id {}", account_id))?;

        account.history_id = Some(cursor.to_string());
        account.watch_expiration = expiration;
        Ok(())
    }

    fn mark_synced(&self, account_id: i64, at: DateTime<Utc>) -> Result<()> {
        let mut accounts = self.accounts.write().unwrap();
        let account = accounts
            .get_mut(&account_id)
            .ok_or_else(|| anyhow::anyhow!("No account with id {}", account_id))?;

        account.last_synced_at = Some(at);
        Ok(())
    }

    fn insert_message(&self, message: &Message) -> Result<bool> {
        {
            let accounts = self.accounts.read().unwrap();
            if !accounts.contains_key(&message.account_id) {
                anyhow::bail!("No account with id {}", message.account_id);
            }
        }

        let mut messages = self.messages.write().unwrap();
        if messages.contains_key(message.id.as_str()) {
            return Ok(false);
        }

        messages.insert(message.id.as_str().to_string(), message.clone());
        Ok(true)
    }

    fn message_exists(&self, id: &MessageId) -> Result<bool> {
        let messages = self.messages.read().unwrap();
        Ok(messages.contains_key(id.as_str()))
    }

    fn get_message(&self, id: &MessageId) -> Result<Option<Message>> {
        let messages = self.messages.read().unwrap();
        Ok(messages.get(id.as_str()).cloned())
    }

    fn list_messages(&self, limit: u32, offset: u32) -> Result<Vec<Message>> {
        let messages = self.messages.read().unwrap();

        let mut all: Vec<Message> = messages.values().cloned().collect();
        all.sort_by_key(|m| Reverse(m.timestamp));

        Ok(all
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    fn count_messages(&self) -> Result<u64> {
        Ok(self.messages.read().unwrap().len() as u64)
    }

    fn delete_message(&self, id: &MessageId) -> Result<bool> {
        let mut messages = self.messages.write().unwrap();

        if messages.remove(id.as_str()).is_none() {
            return Ok(false);
        }

        // Cascade to attachments
        let mut attachments = self.attachments.write().unwrap();
        attachments.retain(|a| a.message_id != *id);

        Ok(true)
    }

    fn insert_attachment(&self, attachment: &NewAttachment) -> Result<Attachment> {
        let messages = self.messages.read().unwrap();
        if !messages.contains_key(attachment.message_id.as_str()) {
            anyhow::bail!("No message with id {}", attachment.message_id);
        }

        let record = Attachment {
            id: self.next_attachment_id.fetch_add(1, Ordering::SeqCst),
            message_id: attachment.message_id.clone(),
            filename: attachment.filename.clone(),
            mime_type: attachment.mime_type.clone(),
            link: attachment.link.clone(),
            created_at: Utc::now(),
        };

        let mut attachments = self.attachments.write().unwrap();
        attachments.push(record.clone());

        Ok(record)
    }

    fn attachments_for_message(&self, id: &MessageId) -> Result<Vec<Attachment>> {
        let attachments = self.attachments.read().unwrap();
        Ok(attachments
            .iter()
            .filter(|a| a.message_id == *id)
            .cloned()
            .collect())
    }

    fn list_attachments(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<(Attachment, AttachmentParent)>> {
        let messages = self.messages.read().unwrap();
        let attachments = self.attachments.read().unwrap();

        let mut all: Vec<Attachment> = attachments.clone();
        all.sort_by_key(|a| Reverse((a.created_at, a.id)));

        Ok(all
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .filter_map(|a| {
                let parent = messages.get(a.message_id.as_str()).map(|m| AttachmentParent {
                    message_id: m.id.clone(),
                    subject: m.subject.clone(),
                    sender: m.sender.clone(),
                    timestamp: m.timestamp,
                })?;
                Some((a, parent))
            })
            .collect())
    }

    fn count_attachments(&self) -> Result<u64> {
        Ok(self.attachments.read().unwrap().len() as u64)
    }
}
