//! Per-account discovery rounds and cursor state

use anyhow::Result;
use chrono::{Duration, Utc};
use log::{error, info, warn};
use std::collections::HashSet;

use super::{ingest_message, HistoryExpiredError, MailApi};
use crate::drive::ObjectStore;
use crate::models::Account;
use crate::storage::StashStore;

/// Renew a push watch when it lapses within this many hours
const RENEWAL_WINDOW_HOURS: i64 = 24;

/// Tunables for a discovery round
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Listing cap for an account's first-ever round
    pub initial_backfill_cap: u32,
    /// Listing cap when a warm account has to re-list without a cursor
    pub routine_backfill_cap: u32,
    /// Pub/Sub topic for push notifications; None disables watch upkeep
    pub push_topic: Option<String>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            initial_backfill_cap: 500,
            routine_backfill_cap: 100,
            push_topic: None,
        }
    }
}

/// Statistics from one discovery round
#[derive(Debug, Default, Clone)]
pub struct RoundStats {
    /// Candidate message IDs discovered (after dedup)
    pub discovered: usize,
    /// Messages newly stored
    pub ingested: usize,
    /// Messages skipped (already stored)
    pub skipped: usize,
    /// Attachments uploaded and recorded
    pub attachments_saved: usize,
    /// Attachments that failed to download, upload, or record
    pub attachments_failed: usize,
    /// Messages whose pipeline failed
    pub errors: usize,
    /// Duration of the round
    pub duration_ms: u64,
}

/// Run one discovery round for an account
///
/// With a stored cursor the round lists only changes since that cursor;
/// without one it backfills a capped recent window. An expired cursor
/// falls back to the capped listing but stays persisted until a
/// successful watch registration supplies a replacement, so an
/// interrupted recovery retries instead of losing its place.
///
/// This operation is idempotent - running it multiple times will not
/// create duplicate messages.
///
/// # Arguments
/// * `api` - Mail provider client
/// * `objects` - Attachment object store
/// * `store` - Archive storage backend
/// * `account` - Account to sync, as loaded from the store
/// * `options` - Backfill caps and push topic
pub fn run_account_sync(
    api: &dyn MailApi,
    objects: &dyn ObjectStore,
    store: &dyn StashStore,
    account: &Account,
    options: &SyncOptions,
) -> Result<RoundStats> {
    let start = std::time::Instant::now();
    let mut stats = RoundStats::default();

    // 1. Discover candidate message IDs. listing_cursor is set only when
    //    the history listing succeeded and handed us its replacement.
    let mut listing_cursor: Option<String> = None;
    let mut needs_fresh_watch = false;

    let candidates = match &account.history_id {
        Some(cursor) => match api.list_added_since(cursor) {
            Ok(delta) => {
                listing_cursor = Some(delta.new_cursor);
                delta.message_ids
            }
            Err(e) if e.downcast_ref::<HistoryExpiredError>().is_some() => {
                warn!(
                    "History cursor for {} expired, falling back to a capped listing",
                    account.email
                );
                needs_fresh_watch = true;
                api.list_message_ids(options.routine_backfill_cap)?
            }
            Err(e) => return Err(e),
        },
        None => {
            let cap = if account.is_initial_sync() {
                options.initial_backfill_cap
            } else {
                options.routine_backfill_cap
            };
            needs_fresh_watch = true;
            api.list_message_ids(cap)?
        }
    };

    // History records can repeat a message; keep the first occurrence
    let mut seen = HashSet::new();
    let candidates: Vec<String> = candidates
        .into_iter()
        .filter(|id| seen.insert(id.clone()))
        .collect();
    stats.discovered = candidates.len();

    // 2. Ingest each candidate; one bad message never aborts the round
    for id in &candidates {
        match ingest_message(api, objects, store, account, id) {
            Ok(outcome) => {
                if outcome.stored {
                    stats.ingested += 1;
                } else {
                    stats.skipped += 1;
                }
                stats.attachments_saved += outcome.attachments_saved;
                stats.attachments_failed += outcome.attachments_failed;
            }
            Err(e) => {
                error!(
                    "Failed to ingest message {} for {}: {}",
                    id, account.email, e
                );
                stats.errors += 1;
            }
        }
    }

    // 3. Advance the cursor only when the history listing supplied one
    if let Some(cursor) = &listing_cursor {
        store.advance_cursor(account.id, cursor)?;
    }

    // 4. Watch bookkeeping
    if needs_fresh_watch {
        let mut adopted = false;
        if let Some(topic) = &options.push_topic {
            match api.register_watch(topic) {
                Ok(watch) => {
                    store.record_watch(account.id, &watch.cursor, watch.expiration)?;
                    info!("Registered watch for {}", account.email);
                    adopted = true;
                }
                Err(e) => warn!("Watch registration failed for {}: {}", account.email, e),
            }
        }
        // Without a watch grant, a cold account bootstraps its first
        // cursor from the profile so the next round can go incremental.
        // An expired cursor stays in place for the next attempt.
        if !adopted && account.history_id.is_none() {
            match api.profile() {
                Ok(profile) => {
                    if let Some(cursor) = profile.history_id {
                        store.advance_cursor(account.id, &cursor)?;
                    }
                }
                Err(e) => warn!("Could not read profile for {}: {}", account.email, e),
            }
        }
    } else if let Some(topic) = &options.push_topic {
        // Renew the watch shortly before it lapses. The listing cursor is
        // already ahead of the watch's snapshot, so it stays; only the
        // expiration is taken from the grant.
        let expiring = account
            .watch_expiration
            .is_none_or(|exp| exp < Utc::now() + Duration::hours(RENEWAL_WINDOW_HOURS));
        if expiring {
            if let Some(cursor) = &listing_cursor {
                match api.register_watch(topic) {
                    Ok(watch) => store.record_watch(account.id, cursor, watch.expiration)?,
                    Err(e) => warn!("Watch renewal failed for {}: {}", account.email, e),
                }
            }
        }
    }

    store.mark_synced(account.id, Utc::now())?;

    stats.duration_ms = start.elapsed().as_millis() as u64;
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStashStore;
    use crate::sync::fakes::{text_message, FakeApi, FakeObjects};

    fn push_options(topic: &str) -> SyncOptions {
        SyncOptions {
            push_topic: Some(topic.to_string()),
            ..SyncOptions::default()
        }
    }

    fn cold_account(store: &dyn StashStore) -> Account {
        store.add_account("user@example.com").unwrap()
    }

    /// Account with a stored cursor, reloaded so the struct matches the store
    fn warm_account(store: &dyn StashStore, cursor: &str) -> Account {
        let account = store.add_account("user@example.com").unwrap();
        store.advance_cursor(account.id, cursor).unwrap();
        store.mark_synced(account.id, Utc::now()).unwrap();
        store.get_account(account.id).unwrap().unwrap()
    }

    #[test]
    fn test_first_round_backfills_and_adopts_watch_cursor() {
        let api = FakeApi::new()
            .with_listing(&["m1", "m2"])
            .with_message(text_message("m1", "One"))
            .with_message(text_message("m2", "Two"))
            .with_watch("900", Some(Utc::now() + Duration::days(7)));
        let objects = FakeObjects::new();
        let store = InMemoryStashStore::new();
        let account = cold_account(&store);

        let stats =
            run_account_sync(&api, &objects, &store, &account, &push_options("topic-a")).unwrap();

        assert_eq!(stats.discovered, 2);
        assert_eq!(stats.ingested, 2);
        assert_eq!(stats.errors, 0);
        assert_eq!(*api.listed_caps.lock().unwrap(), vec![500]);
        assert_eq!(*api.watch_calls.lock().unwrap(), vec!["topic-a"]);

        let account = store.get_account(account.id).unwrap().unwrap();
        assert_eq!(account.history_id.as_deref(), Some("900"));
        assert!(account.watch_expiration.is_some());
        assert!(account.last_synced_at.is_some());
    }

    #[test]
    fn test_warm_account_without_cursor_uses_routine_cap() {
        let store = InMemoryStashStore::new();
        let account = store.add_account("user@example.com").unwrap();
        store.mark_synced(account.id, Utc::now()).unwrap();
        let account = store.get_account(account.id).unwrap().unwrap();

        let api = FakeApi::new().with_listing(&[]);
        run_account_sync(
            &api,
            &FakeObjects::new(),
            &store,
            &account,
            &SyncOptions::default(),
        )
        .unwrap();

        assert_eq!(*api.listed_caps.lock().unwrap(), vec![100]);
    }

    #[test]
    fn test_incremental_round_advances_cursor() {
        let store = InMemoryStashStore::new();
        let account = warm_account(&store, "100");
        let api = FakeApi::new()
            .with_history(&["m5"], "160")
            .with_message(text_message("m5", "Five"));

        let stats = run_account_sync(
            &api,
            &FakeObjects::new(),
            &store,
            &account,
            &SyncOptions::default(),
        )
        .unwrap();

        assert_eq!(stats.discovered, 1);
        assert_eq!(stats.ingested, 1);
        assert!(api.listed_caps.lock().unwrap().is_empty());
        assert!(api.watch_calls.lock().unwrap().is_empty());

        let account = store.get_account(account.id).unwrap().unwrap();
        assert_eq!(account.history_id.as_deref(), Some("160"));
    }

    #[test]
    fn test_expired_cursor_falls_back_without_clearing() {
        let store = InMemoryStashStore::new();
        let account = warm_account(&store, "100");
        // Watch refusal plus a profile cursor that must not be adopted
        let api = FakeApi::new()
            .with_expired_history()
            .with_listing(&["m1"])
            .with_message(text_message("m1", "One"))
            .with_profile_cursor("999");

        let stats =
            run_account_sync(&api, &FakeObjects::new(), &store, &account, &push_options("t"))
                .unwrap();

        assert_eq!(stats.ingested, 1);
        // Fallback lists with the routine cap, not the initial one
        assert_eq!(*api.listed_caps.lock().unwrap(), vec![100]);
        assert_eq!(api.watch_calls.lock().unwrap().len(), 1);

        // The stale cursor survives until a watch grant replaces it
        let account = store.get_account(account.id).unwrap().unwrap();
        assert_eq!(account.history_id.as_deref(), Some("100"));
    }

    #[test]
    fn test_expired_cursor_replaced_by_watch_grant() {
        let store = InMemoryStashStore::new();
        let account = warm_account(&store, "100");
        let api = FakeApi::new()
            .with_expired_history()
            .with_listing(&[])
            .with_watch("205", Some(Utc::now() + Duration::days(7)));

        run_account_sync(&api, &FakeObjects::new(), &store, &account, &push_options("t"))
            .unwrap();

        let account = store.get_account(account.id).unwrap().unwrap();
        assert_eq!(account.history_id.as_deref(), Some("205"));
        assert!(account.watch_expiration.is_some());
    }

    #[test]
    fn test_first_round_without_topic_bootstraps_from_profile() {
        let store = InMemoryStashStore::new();
        let account = cold_account(&store);
        let api = FakeApi::new().with_listing(&[]).with_profile_cursor("42");

        run_account_sync(
            &api,
            &FakeObjects::new(),
            &store,
            &account,
            &SyncOptions::default(),
        )
        .unwrap();

        assert!(api.watch_calls.lock().unwrap().is_empty());
        let account = store.get_account(account.id).unwrap().unwrap();
        assert_eq!(account.history_id.as_deref(), Some("42"));
    }

    #[test]
    fn test_first_round_watch_failure_bootstraps_from_profile() {
        let store = InMemoryStashStore::new();
        let account = cold_account(&store);
        let api = FakeApi::new().with_listing(&[]).with_profile_cursor("42");

        run_account_sync(&api, &FakeObjects::new(), &store, &account, &push_options("t"))
            .unwrap();

        assert_eq!(api.watch_calls.lock().unwrap().len(), 1);
        let account = store.get_account(account.id).unwrap().unwrap();
        assert_eq!(account.history_id.as_deref(), Some("42"));
    }

    #[test]
    fn test_expiring_watch_renews_but_keeps_listing_cursor() {
        let store = InMemoryStashStore::new();
        let account = store.add_account("user@example.com").unwrap();
        store.advance_cursor(account.id, "100").unwrap();
        store
            .record_watch(account.id, "100", Some(Utc::now() + Duration::hours(2)))
            .unwrap();
        store.mark_synced(account.id, Utc::now()).unwrap();
        let account = store.get_account(account.id).unwrap().unwrap();

        let api = FakeApi::new()
            .with_history(&[], "150")
            .with_watch("175", Some(Utc::now() + Duration::days(6)));

        run_account_sync(&api, &FakeObjects::new(), &store, &account, &push_options("t"))
            .unwrap();

        assert_eq!(api.watch_calls.lock().unwrap().len(), 1);
        let account = store.get_account(account.id).unwrap().unwrap();
        // The history listing's cursor wins over the watch snapshot
        assert_eq!(account.history_id.as_deref(), Some("150"));
        let expiration = account.watch_expiration.unwrap();
        assert!(expiration > Utc::now() + Duration::days(5));
    }

    #[test]
    fn test_fresh_watch_is_left_alone() {
        let store = InMemoryStashStore::new();
        let account = store.add_account("user@example.com").unwrap();
        store.advance_cursor(account.id, "100").unwrap();
        store
            .record_watch(account.id, "100", Some(Utc::now() + Duration::days(6)))
            .unwrap();
        store.mark_synced(account.id, Utc::now()).unwrap();
        let account = store.get_account(account.id).unwrap().unwrap();

        let api = FakeApi::new().with_history(&[], "150");

        run_account_sync(&api, &FakeObjects::new(), &store, &account, &push_options("t"))
            .unwrap();

        assert!(api.watch_calls.lock().unwrap().is_empty());
        let account = store.get_account(account.id).unwrap().unwrap();
        assert_eq!(account.history_id.as_deref(), Some("150"));
    }

    #[test]
    fn test_repeated_history_ids_collapse() {
        let store = InMemoryStashStore::new();
        let account = warm_account(&store, "100");
        let api = FakeApi::new()
            .with_history(&["m1", "m1", "m2"], "160")
            .with_message(text_message("m1", "One"))
            .with_message(text_message("m2", "Two"));

        let stats = run_account_sync(
            &api,
            &FakeObjects::new(),
            &store,
            &account,
            &SyncOptions::default(),
        )
        .unwrap();

        assert_eq!(stats.discovered, 2);
        assert_eq!(stats.ingested, 2);
        assert_eq!(*api.fetched.lock().unwrap(), vec!["m1", "m2"]);
    }

    #[test]
    fn test_one_bad_message_does_not_abort_the_round() {
        let store = InMemoryStashStore::new();
        let account = warm_account(&store, "100");
        // "ghost" has no scripted content, so its fetch fails
        let api = FakeApi::new()
            .with_history(&["ghost", "m2"], "160")
            .with_message(text_message("m2", "Two"));

        let stats = run_account_sync(
            &api,
            &FakeObjects::new(),
            &store,
            &account,
            &SyncOptions::default(),
        )
        .unwrap();

        assert_eq!(stats.errors, 1);
        assert_eq!(stats.ingested, 1);
        let account = store.get_account(account.id).unwrap().unwrap();
        assert_eq!(account.history_id.as_deref(), Some("160"));
    }

    #[test]
    fn test_history_outage_aborts_the_round() {
        let store = InMemoryStashStore::new();
        let account = warm_account(&store, "100");
        let api = FakeApi::new().with_failing_history();

        let result = run_account_sync(
            &api,
            &FakeObjects::new(),
            &store,
            &account,
            &SyncOptions::default(),
        );

        assert!(result.is_err());
        let account = store.get_account(account.id).unwrap().unwrap();
        assert_eq!(account.history_id.as_deref(), Some("100"));
    }
}
