//! Background sync worker

use log::{error, info};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::mpsc::UnboundedReceiver;

use stash::{
    run_account_sync, DriveClient, GmailClient, GoogleAuth, GoogleCredentials, StashStore,
    SyncOptions,
};

/// Work items for the sync worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    /// Run a discovery round over every account
    SyncAll,
}

/// Run the sync worker loop on a dedicated OS thread
///
/// Sync rounds are blocking HTTP plus SQLite work, so they stay off the
/// async runtime. A burst of queued triggers collapses into one round; a
/// push arriving mid-round runs next, never concurrently.
pub fn spawn(
    store: Arc<dyn StashStore>,
    credentials: GoogleCredentials,
    options: SyncOptions,
    root_folder: String,
    mut jobs: UnboundedReceiver<Job>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        while let Some(job) = jobs.blocking_recv() {
            while jobs.try_recv().is_ok() {}
            match job {
                Job::SyncAll => sync_all(store.as_ref(), &credentials, &options, &root_folder),
            }
        }
    })
}

/// One discovery round across all accounts
///
/// Accounts are processed sequentially and independently; one account's
/// failure never blocks another's round.
fn sync_all(
    store: &dyn StashStore,
    credentials: &GoogleCredentials,
    options: &SyncOptions,
    root_folder: &str,
) {
    let accounts = match store.list_accounts() {
        Ok(accounts) => accounts,
        Err(e) => {
            error!("Could not list accounts: {}", e);
            return;
        }
    };
    if accounts.is_empty() {
        info!("No accounts registered, nothing to sync");
        return;
    }

    for account in accounts {
        let auth = match GoogleAuth::for_account(credentials, account.id) {
            Ok(auth) => auth,
            Err(e) => {
                error!("Could not build auth for {}: {}", account.email, e);
                continue;
            }
        };
        let api = GmailClient::new(auth.clone());
        let objects = DriveClient::new(auth, root_folder);

        match run_account_sync(&api, &objects, store, &account, options) {
            Ok(stats) => info!(
                "Synced {}: {} discovered, {} ingested, {} skipped, {} attachments ({} failed), {} errors in {}ms",
                account.email,
                stats.discovered,
                stats.ingested,
                stats.skipped,
                stats.attachments_saved,
                stats.attachments_failed,
                stats.errors,
                stats.duration_ms
            ),
            Err(e) => error!("Sync failed for {}: {}", account.email, e),
        }
    }
}
