//! SQLite-based archive storage with zstd-compressed message bodies

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use rusqlite_migration::{M, Migrations};

use super::traits::StashStore;
use crate::models::{Account, Attachment, AttachmentParent, Message, MessageId, NewAttachment};

/// Database migrations
///
/// Each migration is applied in order. The user_version pragma tracks which
/// migrations have been applied.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: accounts and messages
        M::up(
            r#"
            -- Synced accounts and their sync cursors
            CREATE TABLE accounts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL UNIQUE,
                history_id TEXT,
                watch_expiration TEXT,
                last_synced_at TEXT,
                added_at TEXT NOT NULL
            );

            -- Archived messages; bodies are zstd compressed
            CREATE TABLE messages (
                id TEXT PRIMARY KEY,
                account_id INTEGER NOT NULL,
                thread_id TEXT,
                subject TEXT NOT NULL DEFAULT '',
                sender TEXT NOT NULL DEFAULT '',
                to_recipients TEXT,
                cc_recipients TEXT,
                bcc_recipients TEXT,
                timestamp TEXT NOT NULL,
                body_text BLOB,  -- zstd compressed
                body_html BLOB,  -- zstd compressed
                created_at TEXT NOT NULL,
                FOREIGN KEY (account_id) REFERENCES accounts(id) ON DELETE CASCADE
            );

            CREATE INDEX idx_messages_timestamp ON messages(timestamp DESC);
            CREATE INDEX idx_messages_account ON messages(account_id);
            "#,
        ),
        // Migration 2: attachment records
        M::up(
            r#"
            -- One row per successfully uploaded attachment
            CREATE TABLE attachments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id TEXT NOT NULL,
                filename TEXT NOT NULL,
                mime_type TEXT NOT NULL,
                link TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (message_id) REFERENCES messages(id) ON DELETE CASCADE
            );

            CREATE INDEX idx_attachments_message ON attachments(message_id);
            CREATE INDEX idx_attachments_created ON attachments(created_at DESC);
            "#,
        ),
    ])
}

/// SQLite-based archive storage
pub struct SqliteStashStore {
    conn: Mutex<Connection>,
}

/// Raw message row; bodies still compressed
struct MessageRow {
    id: String,
    account_id: i64,
    thread_id: Option<String>,
    subject: String,
    sender: String,
    to: Option<String>,
    cc: Option<String>,
    bcc: Option<String>,
    timestamp: String,
    body_text: Option<Vec<u8>>,
    body_html: Option<Vec<u8>>,
    created_at: String,
}

const MESSAGE_COLUMNS: &str = "id, account_id, thread_id, subject, sender, to_recipients, \
     cc_recipients, bcc_recipients, timestamp, body_text, body_html, created_at";

impl SqliteStashStore {
    /// Create a new SQLite store, running migrations as needed
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;

        // WAL allows readers during writes, and NORMAL sync is safe under
        // WAL. foreign_keys must be ON for ON DELETE CASCADE to work.
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;
            PRAGMA temp_store = MEMORY;
            PRAGMA mmap_size = 268435456;
            PRAGMA foreign_keys = ON;
            "#,
        )?;

        // Run migrations
        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn read_message_row(row: &rusqlite::Row) -> rusqlite::Result<MessageRow> {
        Ok(MessageRow {
            id: row.get(0)?,
            account_id: row.get(1)?,
            thread_id: row.get(2)?,
            subject: row.get(3)?,
            sender: row.get(4)?,
            to: row.get(5)?,
            cc: row.get(6)?,
            bcc: row.get(7)?,
            timestamp: row.get(8)?,
            body_text: row.get(9)?,
            body_html: row.get(10)?,
            created_at: row.get(11)?,
        })
    }

    fn hydrate_message(row: MessageRow) -> Result<Message> {
        let body_text = row
            .body_text
            .as_deref()
            .map(decompress_body)
            .transpose()
            .context("Failed to decompress body_text")?;
        let body_html = row
            .body_html
            .as_deref()
            .map(decompress_body)
            .transpose()
            .context("Failed to decompress body_html")?;

        Ok(Message {
            id: MessageId::new(row.id),
            account_id: row.account_id,
            thread_id: row.thread_id,
            subject: row.subject,
            sender: row.sender,
            to: row.to,
            cc: row.cc,
            bcc: row.bcc,
            timestamp: parse_ts(&row.timestamp),
            body_text,
            body_html,
            created_at: parse_ts(&row.created_at),
        })
    }

    fn read_account_row(row: &rusqlite::Row) -> rusqlite::Result<Account> {
        Ok(Account {
            id: row.get(0)?,
            email: row.get(1)?,
            history_id: row.get(2)?,
            watch_expiration: parse_ts_opt(row.get(3)?),
            last_synced_at: parse_ts_opt(row.get(4)?),
            added_at: parse_ts(&row.get::<_, String>(5)?),
        })
    }

    fn read_attachment_row(row: &rusqlite::Row) -> rusqlite::Result<Attachment> {
        Ok(Attachment {
            id: row.get(0)?,
            message_id: MessageId::new(row.get::<_, String>(1)?),
            filename: row.get(2)?,
            mime_type: row.get(3)?,
            link: row.get(4)?,
            created_at: parse_ts(&row.get::<_, String>(5)?),
        })
    }
}

impl StashStore for SqliteStashStore {
    fn add_account(&self, email: &str) -> Result<Account> {
        let added_at = Utc::now();
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "INSERT INTO accounts (email, added_at) VALUES (?, ?)",
            params![email, added_at.to_rfc3339()],
        )
        .with_context(|| format!("Failed to add account {}", email))?;

        let mut account = Account::new(email);
        account.id = conn.last_insert_rowid();
        account.added_at = added_at;
        Ok(account)
    }

    fn get_account(&self, id: i64) -> Result<Option<Account>> {
        let conn = self.conn.lock().unwrap();

        let account = conn
            .query_row(
                "SELECT id, email, history_id, watch_expiration, last_synced_at, added_at
                 FROM accounts WHERE id = ?",
                [id],
                Self::read_account_row,
            )
            .optional()?;

        Ok(account)
    }

    fn list_accounts(&self) -> Result<Vec<Account>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT id, email, history_id, watch_expiration, last_synced_at, added_at
             FROM accounts ORDER BY id ASC",
        )?;

        let accounts = stmt
            .query_map([], Self::read_account_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(accounts)
    }

    fn count_accounts(&self) -> Result<u64> {
        let conn = self.conn.lock().unwrap();

        let count: i64 = conn.query_row("SELECT COUNT(*) FROM accounts", [], |row| row.get(0))?;

        Ok(count as u64)
    }

    fn advance_cursor(&self, account_id: i64, cursor: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        let updated = conn.execute(
            "UPDATE accounts SET history_id = ? WHERE id = ?",
            params![cursor, account_id],
        )?;
        if updated == 0 {
            anyhow::bail!("No account with id {}", account_id);
        }

        Ok(())
    }

    fn record_watch(
        &self,
        account_id: i64,
        cursor: &str,
        expiration: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        let updated = conn.execute(
            "UPDATE accounts SET history_id = ?, watch_expiration = ? WHERE id = ?",
            params![cursor, expiration.map(|e| e.to_rfc3339()), account_id],
        )?;
        if updated == 0 {
            anyhow::bail!("No account with id {}", account_id);
        }

        Ok(())
    }

    fn mark_synced(&self, account_id: i64, at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        let updated = conn.execute(
            "UPDATE accounts SET last_synced_at = ? WHERE id = ?",
            params![at.to_rfc3339(), account_id],
        )?;
        if updated == 0 {
            anyhow::bail!("No account with id {}", account_id);
        }

        Ok(())
    }

    fn insert_message(&self, message: &Message) -> Result<bool> {
        // Compress bodies with zstd (level 3 = good balance of speed vs size)
        let body_text_compressed = message
            .body_text
            .as_ref()
            .map(|text| zstd::encode_all(text.as_bytes(), 3))
            .transpose()
            .context("Failed to compress body_text")?;

        let body_html_compressed = message
            .body_html
            .as_ref()
            .map(|html| zstd::encode_all(html.as_bytes(), 3))
            .transpose()
            .context("Failed to compress body_html")?;

        let conn = self.conn.lock().unwrap();

        let result = conn.execute(
            "INSERT INTO messages
             (id, account_id, thread_id, subject, sender, to_recipients,
              cc_recipients, bcc_recipients, timestamp, body_text, body_html, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                message.id.as_str(),
                message.account_id,
                message.thread_id,
                message.subject,
                message.sender,
                message.to,
                message.cc,
                message.bcc,
                message.timestamp.to_rfc3339(),
                body_text_compressed,
                body_html_compressed,
                message.created_at.to_rfc3339(),
            ],
        );

        match result {
            Ok(_) => Ok(true),
            // A concurrent insert of the same ID already won; the stored row stays
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
            {
                Ok(false)
            }
            Err(e) => Err(e).context("Failed to insert message"),
        }
    }

    fn message_exists(&self, id: &MessageId) -> Result<bool> {
        let conn = self.conn.lock().unwrap();

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE id = ?",
            [id.as_str()],
            |row| row.get(0),
        )?;

        Ok(count > 0)
    }

    fn get_message(&self, id: &MessageId) -> Result<Option<Message>> {
        let conn = self.conn.lock().unwrap();

        let row = conn
            .query_row(
                &format!("SELECT {} FROM messages WHERE id = ?", MESSAGE_COLUMNS),
                [id.as_str()],
                Self::read_message_row,
            )
            .optional()?;

        row.map(Self::hydrate_message).transpose()
    }

    fn list_messages(&self, limit: u32, offset: u32) -> Result<Vec<Message>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM messages ORDER BY timestamp DESC LIMIT ? OFFSET ?",
            MESSAGE_COLUMNS
        ))?;

        let rows = stmt
            .query_map([limit, offset], Self::read_message_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(Self::hydrate_message).collect()
    }

    fn count_messages(&self) -> Result<u64> {
        let conn = self.conn.lock().unwrap();

        let count: i64 = conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;

        Ok(count as u64)
    }

    fn delete_message(&self, id: &MessageId) -> Result<bool> {
        let conn = self.conn.lock().unwrap();

        // Attachments go with it via ON DELETE CASCADE
        let deleted = conn.execute("DELETE FROM messages WHERE id = ?", [id.as_str()])?;

        Ok(deleted > 0)
    }

    fn insert_attachment(&self, attachment: &NewAttachment) -> Result<Attachment> {
        let created_at = Utc::now();
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "INSERT INTO attachments (message_id, filename, mime_type, link, created_at)
             VALUES (?, ?, ?, ?, ?)",
            params![
                attachment.message_id.as_str(),
                attachment.filename,
                attachment.mime_type,
                attachment.link,
                created_at.to_rfc3339(),
            ],
        )
        .with_context(|| {
            format!(
                "Failed to insert attachment {} for message {}",
                attachment.filename, attachment.message_id
            )
        })?;

        Ok(Attachment {
            id: conn.last_insert_rowid(),
            message_id: attachment.message_id.clone(),
            filename: attachment.filename.clone(),
            mime_type: attachment.mime_type.clone(),
            link: attachment.link.clone(),
            created_at,
        })
    }

    fn attachments_for_message(&self, id: &MessageId) -> Result<Vec<Attachment>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT id, message_id, filename, mime_type, link, created_at
             FROM attachments WHERE message_id = ? ORDER BY id ASC",
        )?;

        let attachments = stmt
            .query_map([id.as_str()], Self::read_attachment_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(attachments)
    }

    fn list_attachments(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<(Attachment, AttachmentParent)>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT a.id, a.message_id, a.filename, a.mime_type, a.link, a.created_at,
                    m.subject, m.sender, m.timestamp
             FROM attachments a
             JOIN messages m ON m.id = a.message_id
             ORDER BY a.created_at DESC, a.id DESC
             LIMIT ? OFFSET ?",
        )?;

        let rows = stmt
            .query_map([limit, offset], |row| {
                let attachment = Self::read_attachment_row(row)?;
                let parent = AttachmentParent {
                    message_id: attachment.message_id.clone(),
                    subject: row.get(6)?,
                    sender: row.get(7)?,
                    timestamp: parse_ts(&row.get::<_, String>(8)?),
                };
                Ok((attachment, parent))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    fn count_attachments(&self) -> Result<u64> {
        let conn = self.conn.lock().unwrap();

        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM attachments", [], |row| row.get(0))?;

        Ok(count as u64)
    }
}

/// Parse a stored RFC 3339 timestamp, defaulting to now on corruption
fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_ts_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    })
}

/// Decompress a zstd body blob back to text
fn decompress_body(blob: &[u8]) -> Result<String> {
    let bytes = zstd::decode_all(blob).context("Failed to decompress body")?;
    String::from_utf8(bytes).context("Body is not valid UTF-8")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    fn create_test_store() -> (SqliteStashStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        // Use .test.sqlite extension to clearly distinguish from production databases
        let db_path = dir.path().join("stash.test.sqlite");

        let store = SqliteStashStore::new(&db_path).unwrap();

        (store, dir)
    }

    fn make_test_message(id: &str, account_id: i64, age_hours: i64) -> Message {
        let timestamp = Utc::now() - Duration::hours(age_hours);
        Message {
            id: MessageId::new(id),
            account_id,
            thread_id: Some("t1".to_string()),
            subject: format!("Subject {}", id),
            sender: "alice@example.com".to_string(),
            to: Some("bob@example.com".to_string()),
            cc: None,
            bcc: None,
            timestamp,
            body_text: Some(format!("Body for {}", id)),
            body_html: Some("<p>Hello</p>".to_string()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_account_lifecycle() {
        let (store, _dir) = create_test_store();

        let account = store.add_account("alice@example.com").unwrap();
        assert!(account.id > 0);
        assert!(!account.has_cursor());

        store.advance_cursor(account.id, "12345").unwrap();
        let reloaded = store.get_account(account.id).unwrap().unwrap();
        assert_eq!(reloaded.history_id.as_deref(), Some("12345"));
        assert!(reloaded.has_cursor());

        let expiration = Utc::now() + Duration::days(7);
        store
            .record_watch(account.id, "12400", Some(expiration))
            .unwrap();
        let reloaded = store.get_account(account.id).unwrap().unwrap();
        assert_eq!(reloaded.history_id.as_deref(), Some("12400"));
        assert_eq!(
            reloaded.watch_expiration.unwrap().timestamp(),
            expiration.timestamp()
        );

        let synced_at = Utc::now();
        store.mark_synced(account.id, synced_at).unwrap();
        let reloaded = store.get_account(account.id).unwrap().unwrap();
        assert_eq!(
            reloaded.last_synced_at.unwrap().timestamp(),
            synced_at.timestamp()
        );

        assert_eq!(store.count_accounts().unwrap(), 1);
        assert_eq!(store.list_accounts().unwrap()[0].email, "alice@example.com");
    }

    #[test]
    fn test_add_account_duplicate_email_errors() {
        let (store, _dir) = create_test_store();

        store.add_account("same@example.com").unwrap();
        assert!(store.add_account("same@example.com").is_err());
    }

    #[test]
    fn test_cursor_update_unknown_account_errors() {
        let (store, _dir) = create_test_store();
        assert!(store.advance_cursor(42, "100").is_err());
    }

    #[test]
    fn test_message_roundtrip() {
        let (store, _dir) = create_test_store();
        let account = store.add_account("a@example.com").unwrap();

        let message = make_test_message("m1", account.id, 1);
        assert!(store.insert_message(&message).unwrap());

        let loaded = store.get_message(&MessageId::new("m1")).unwrap().unwrap();
        assert_eq!(loaded.subject, "Subject m1");
        assert_eq!(loaded.sender, "alice@example.com");
        assert_eq!(loaded.body_text.as_deref(), Some("Body for m1"));
        assert_eq!(loaded.body_html.as_deref(), Some("<p>Hello</p>"));
        assert_eq!(loaded.timestamp.timestamp(), message.timestamp.timestamp());

        assert!(store.message_exists(&MessageId::new("m1")).unwrap());
        assert!(!store.message_exists(&MessageId::new("m2")).unwrap());
    }

    #[test]
    fn test_message_without_bodies() {
        let (store, _dir) = create_test_store();
        let account = store.add_account("a@example.com").unwrap();

        let mut message = make_test_message("m1", account.id, 0);
        message.body_text = None;
        message.body_html = None;
        store.insert_message(&message).unwrap();

        let loaded = store.get_message(&MessageId::new("m1")).unwrap().unwrap();
        assert_eq!(loaded.body_text, None);
        assert_eq!(loaded.body_html, None);
    }

    #[test]
    fn test_insert_duplicate_returns_false_and_keeps_original() {
        let (store, _dir) = create_test_store();
        let account = store.add_account("a@example.com").unwrap();

        let first = make_test_message("m1", account.id, 2);
        assert!(store.insert_message(&first).unwrap());

        let mut second = make_test_message("m1", account.id, 1);
        second.subject = "Different".to_string();
        assert!(!store.insert_message(&second).unwrap());

        let loaded = store.get_message(&MessageId::new("m1")).unwrap().unwrap();
        assert_eq!(loaded.subject, "Subject m1");
        assert_eq!(store.count_messages().unwrap(), 1);
    }

    #[test]
    fn test_insert_message_unknown_account_errors() {
        let (store, _dir) = create_test_store();

        let message = make_test_message("m1", 99, 0);
        assert!(store.insert_message(&message).is_err());
    }

    #[test]
    fn test_list_messages_newest_first_with_pagination() {
        let (store, _dir) = create_test_store();
        let account = store.add_account("a@example.com").unwrap();

        for i in 0..5 {
            let message = make_test_message(&format!("m{}", i), account.id, i);
            store.insert_message(&message).unwrap();
        }

        let all = store.list_messages(10, 0).unwrap();
        assert_eq!(all.len(), 5);
        // m0 is the youngest
        assert_eq!(all[0].id.as_str(), "m0");
        assert_eq!(all[4].id.as_str(), "m4");

        let page = store.list_messages(2, 2).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id.as_str(), "m2");
    }

    #[test]
    fn test_attachment_roundtrip_and_join() {
        let (store, _dir) = create_test_store();
        let account = store.add_account("a@example.com").unwrap();
        let message = make_test_message("m1", account.id, 0);
        store.insert_message(&message).unwrap();

        let first = store
            .insert_attachment(&NewAttachment::new(
                MessageId::new("m1"),
                "report.pdf",
                "application/pdf",
                "https://drive.google.com/file/d/abc/view",
            ))
            .unwrap();
        let second = store
            .insert_attachment(&NewAttachment::new(
                MessageId::new("m1"),
                "data.csv",
                "text/csv",
                "https://drive.google.com/file/d/def/view",
            ))
            .unwrap();
        assert!(second.id > first.id);

        let attachments = store.attachments_for_message(&MessageId::new("m1")).unwrap();
        assert_eq!(attachments.len(), 2);
        assert_eq!(attachments[0].filename, "report.pdf");
        assert_eq!(attachments[1].filename, "data.csv");

        let listed = store.list_attachments(10, 0).unwrap();
        assert_eq!(listed.len(), 2);
        let (_, parent) = &listed[0];
        assert_eq!(parent.subject, "Subject m1");
        assert_eq!(parent.sender, "alice@example.com");

        assert_eq!(store.count_attachments().unwrap(), 2);
    }

    #[test]
    fn test_attachment_requires_message() {
        let (store, _dir) = create_test_store();

        let result = store.insert_attachment(&NewAttachment::new(
            MessageId::new("ghost"),
            "x.bin",
            "application/octet-stream",
            "https://example.com/x",
        ));
        assert!(result.is_err());
    }

    #[test]
    fn test_delete_message_cascades_to_attachments() {
        let (store, _dir) = create_test_store();
        let account = store.add_account("a@example.com").unwrap();
        let message = make_test_message("m1", account.id, 0);
        store.insert_message(&message).unwrap();
        store
            .insert_attachment(&NewAttachment::new(
                MessageId::new("m1"),
                "a.txt",
                "text/plain",
                "https://example.com/a",
            ))
            .unwrap();

        assert!(store.delete_message(&MessageId::new("m1")).unwrap());
        assert_eq!(store.get_message(&MessageId::new("m1")).unwrap(), None);
        assert_eq!(store.count_attachments().unwrap(), 0);

        // Second delete is a no-op
        assert!(!store.delete_message(&MessageId::new("m1")).unwrap());
    }
}
