//! stashd - Gmail attachment archiving daemon
//!
//! Watches registered Gmail accounts, mirrors their messages into a
//! local archive, and uploads attachments to Google Drive. Serves a
//! read-only HTTP query surface plus a Pub/Sub push endpoint.

use anyhow::{Context, Result};
use log::{error, info, warn};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use stash::{GoogleAuth, GoogleCredentials, SqliteStashStore, StashStore};

mod server;
mod settings;
mod worker;

use server::AppState;
use settings::Settings;
use worker::Job;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    // Bootstrap config directory
    if let Err(e) = config::init() {
        error!("Failed to initialize config directory: {}", e);
    }

    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 && args[1] == "add-account" {
        return add_account(&args[2..]);
    }

    run_daemon().await
}

/// Register an account and seed its OAuth token from a file
///
/// Usage: stashd add-account <email> <token.json>
///
/// The token file must carry a refresh_token, e.g. the output of an
/// OAuth playground exchange or another tool's token store.
fn add_account(args: &[String]) -> Result<()> {
    let [email, token_file] = args else {
        anyhow::bail!("Usage: stashd add-account <email> <token.json>");
    };

    let credentials = load_credentials()?;
    let settings = Settings::load()?;
    let store = open_store(&settings)?;

    let account = store.add_account(email)?;
    let auth = GoogleAuth::for_account(&credentials, account.id)?;
    auth.import_token_file(Path::new(token_file))?;

    println!("Added account {} with id {}", account.email, account.id);
    println!("It will be picked up on the next discovery round.");
    Ok(())
}

async fn run_daemon() -> Result<()> {
    let settings = Settings::load()?;
    let credentials = load_credentials()?;
    let store: Arc<dyn StashStore> = Arc::new(open_store(&settings)?);

    let (jobs, job_rx) = tokio::sync::mpsc::unbounded_channel();
    worker::spawn(
        store.clone(),
        credentials,
        settings.sync_options(),
        settings.root_folder.clone(),
        job_rx,
    );

    // Scheduled rounds; the first tick fires immediately on startup
    let scheduler_jobs = jobs.clone();
    let poll_interval = Duration::from_secs(settings.poll_interval_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(poll_interval);
        loop {
            ticker.tick().await;
            if scheduler_jobs.send(Job::SyncAll).is_err() {
                break;
            }
        }
    });

    let state = AppState { store, jobs };
    server::serve(state, &settings.bind_addr).await
}

fn load_credentials() -> Result<GoogleCredentials> {
    match GoogleCredentials::load() {
        Ok(creds) => Ok(creds),
        Err(e) => {
            warn!("Google credentials not found: {}", e);
            if let Some(path) = GoogleCredentials::default_credentials_path() {
                warn!(
                    "To configure Google API access, either:\n\
                     1. Place your Google OAuth credentials at: {}\n\
                     2. Or set environment variables: GMAIL_CLIENT_ID and GMAIL_CLIENT_SECRET",
                    path.display()
                );
            }
            Err(e)
        }
    }
}

fn open_store(settings: &Settings) -> Result<SqliteStashStore> {
    let db_path = config::config_path(&settings.db_file)
        .context("Could not determine config directory")?;
    let store = SqliteStashStore::new(&db_path)?;
    info!("Archive database at {}", db_path.display());
    Ok(store)
}
