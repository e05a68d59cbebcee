//! Daemon settings loaded from the config directory

use anyhow::Result;
use serde::Deserialize;
use stash::SyncOptions;

/// Settings file name inside the config directory
const SETTINGS_FILE: &str = "stashd.json";

/// Daemon configuration
///
/// Every field has a default, so a partial (or absent) settings file is
/// fine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Address the HTTP surface binds to
    pub bind_addr: String,
    /// Seconds between scheduled discovery rounds
    pub poll_interval_secs: u64,
    /// Listing cap for an account's first sync
    pub initial_backfill_cap: u32,
    /// Listing cap when re-listing without a cursor
    pub routine_backfill_cap: u32,
    /// Pub/Sub topic for Gmail push notifications
    pub push_topic: Option<String>,
    /// Name of the Drive folder that receives attachments
    pub root_folder: String,
    /// SQLite database file name inside the config directory
    pub db_file: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            poll_interval_secs: 300,
            initial_backfill_cap: 500,
            routine_backfill_cap: 100,
            push_topic: None,
            root_folder: "MailStash".to_string(),
            db_file: "stash.db".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from the config directory, falling back to defaults
    /// when no file exists
    pub fn load() -> Result<Self> {
        if config::config_exists(SETTINGS_FILE) {
            config::load_json(SETTINGS_FILE)
        } else {
            Ok(Self::default())
        }
    }

    /// Sync engine options derived from these settings
    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            initial_backfill_cap: self.initial_backfill_cap,
            routine_backfill_cap: self.routine_backfill_cap,
            push_topic: self.push_topic.clone(),
        }
    }
}
