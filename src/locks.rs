use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info, warn};

use crate::error::StorageError;
use crate::storage::{DocumentStore, EXCUSED_KEY, LOCKS_KEY, LOCK_SOURCES_KEY};

/// Store handle shared by the monitor and the lifecycle guard.
pub type SharedStore = Arc<Mutex<Box<dyn DocumentStore>>>;

pub fn shared_store<S: DocumentStore + 'static>(store: S) -> SharedStore {
    let boxed: Box<dyn DocumentStore> = Box::new(store);
    Arc::new(Mutex::new(boxed))
}

/// Value written to the lock document for a lock without expiry.
pub const INDEFINITE: i64 = -1;

// Ten years; keeps `now + duration` inside chrono's range.
const MAX_LOCK_MINUTES: i64 = 60 * 24 * 366 * 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockSource {
    User,
    Schedule,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockEntry {
    /// `None` means locked until explicitly removed.
    pub expires_at: Option<DateTime<Utc>>,
    pub source: LockSource,
}

impl LockEntry {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            None => true,
            Some(expires_at) => now < expires_at,
        }
    }

    fn to_document_value(&self) -> i64 {
        self.expires_at
            .map(|at| at.timestamp_millis())
            .unwrap_or(INDEFINITE)
    }
}

/// Persisted set of locked applications.
///
/// Every mutation writes the whole mapping back through the shared store
/// before returning. A failed write is logged and leaves the store dirty so
/// the next mutation (or [`LockStore::flush_if_dirty`]) writes it again.
///
/// Also holds the apps the user unlocked while a schedule covered them.
/// Schedules leave those alone until no active schedule covers them, and
/// that has to survive a restart inside the window.
pub struct LockStore {
    entries: BTreeMap<String, LockEntry>,
    excused: BTreeSet<String>,
    store: SharedStore,
    dirty: bool,
}

impl LockStore {
    pub fn new(store: SharedStore) -> Self {
        Self {
            entries: BTreeMap::new(),
            excused: BTreeSet::new(),
            store,
            dirty: false,
        }
    }

    /// Builds a store and replaces its contents with the persisted documents.
    pub fn open(store: SharedStore) -> Self {
        let mut locks = Self::new(store);
        if let Err(err) = locks.load() {
            error!("Failed to load locked apps, starting empty: {err}");
        }
        locks
    }

    /// Replaces the in-memory mapping with the persisted one. No merge.
    pub fn load(&mut self) -> Result<(), StorageError> {
        let (locks_doc, sources_doc, excused_doc) = {
            let store = self.store.lock().unwrap_or_else(|p| p.into_inner());
            (
                store.load(LOCKS_KEY)?,
                store.load(LOCK_SOURCES_KEY)?,
                store.load(EXCUSED_KEY)?,
            )
        };

        self.entries.clear();
        self.dirty = false;
        self.excused = match excused_doc {
            Some(doc) => serde_json::from_str(&doc)?,
            None => BTreeSet::new(),
        };

        let Some(locks_doc) = locks_doc else {
            debug!("No locked apps found in storage.");
            return Ok(());
        };

        let raw: BTreeMap<String, i64> = serde_json::from_str(&locks_doc)?;
        let schedule_sourced: BTreeSet<String> = match sources_doc {
            Some(doc) => serde_json::from_str(&doc)?,
            None => BTreeSet::new(),
        };

        for (app_id, value) in raw {
            let expires_at = if value == INDEFINITE {
                None
            } else {
                match DateTime::from_timestamp_millis(value) {
                    Some(at) => Some(at),
                    None => {
                        warn!("Dropping lock for {app_id}: expiry {value} out of range");
                        continue;
                    }
                }
            };
            let source = if schedule_sourced.contains(&app_id) {
                LockSource::Schedule
            } else {
                LockSource::User
            };
            self.entries.insert(app_id, LockEntry { expires_at, source });
        }

        info!("Loaded {} locked apps from storage.", self.entries.len());
        Ok(())
    }

    /// Writes the lock document, its provenance sidecar and the excused apps.
    pub fn persist(&mut self) -> Result<(), StorageError> {
        let locks: BTreeMap<&str, i64> = self
            .entries
            .iter()
            .map(|(app_id, entry)| (app_id.as_str(), entry.to_document_value()))
            .collect();
        let sources: Vec<&str> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.source == LockSource::Schedule)
            .map(|(app_id, _)| app_id.as_str())
            .collect();

        let locks_doc = serde_json::to_string(&locks)?;
        let sources_doc = serde_json::to_string(&sources)?;
        let excused_doc = serde_json::to_string(&self.excused)?;

        {
            let mut store = self.store.lock().unwrap_or_else(|p| p.into_inner());
            store.save(LOCKS_KEY, &locks_doc)?;
            store.save(LOCK_SOURCES_KEY, &sources_doc)?;
            store.save(EXCUSED_KEY, &excused_doc)?;
        }
        self.dirty = false;
        debug!("Saved locked apps: {locks_doc}");
        Ok(())
    }

    /// Retries a write that failed earlier. Returns whether the store is clean.
    pub fn flush_if_dirty(&mut self) -> bool {
        if self.dirty {
            self.commit();
        }
        !self.dirty
    }

    fn commit(&mut self) {
        self.dirty = true;
        if let Err(err) = self.persist() {
            error!("Failed to persist locked apps, will retry: {err}");
        }
    }

    /// Locks `app_id` for `duration_minutes`, or indefinitely when the
    /// duration is absent or not positive. Overwrites any existing entry.
    pub fn lock(&mut self, app_id: &str, duration_minutes: Option<i64>, now: DateTime<Utc>) {
        let expires_at = match duration_minutes {
            Some(minutes) if minutes > 0 => {
                now.checked_add_signed(Duration::minutes(minutes.min(MAX_LOCK_MINUTES)))
            }
            _ => None,
        };
        self.insert(app_id, LockEntry {
            expires_at,
            source: LockSource::User,
        });
        match expires_at {
            Some(at) => info!("Locked {app_id} until {at}"),
            None => info!("Locked {app_id} indefinitely"),
        }
    }

    /// Indefinite lock owned by a schedule.
    pub fn lock_for_schedule(&mut self, app_id: &str) {
        self.insert(app_id, LockEntry {
            expires_at: None,
            source: LockSource::Schedule,
        });
        info!("Locked {app_id} by schedule");
    }

    fn insert(&mut self, app_id: &str, entry: LockEntry) {
        self.entries.insert(app_id.to_owned(), entry);
        self.commit();
    }

    /// Removes the entry for `app_id`; absent entries are not an error.
    pub fn unlock(&mut self, app_id: &str) -> Option<LockEntry> {
        let removed = self.entries.remove(app_id);
        if removed.is_some() {
            info!("Unlocked {app_id}");
        }
        self.commit();
        removed
    }

    pub fn is_locked(&self, app_id: &str, now: DateTime<Utc>) -> bool {
        self.entries
            .get(app_id)
            .map(|entry| entry.is_active(now))
            .unwrap_or(false)
    }

    /// Removes every timed entry whose expiry is at or before `now`.
    /// Indefinite entries are never swept.
    pub fn sweep_expired(&mut self, now: DateTime<Utc>) -> Vec<String> {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| matches!(entry.expires_at, Some(at) if at <= now))
            .map(|(app_id, _)| app_id.clone())
            .collect();

        if !expired.is_empty() {
            for app_id in &expired {
                self.entries.remove(app_id);
            }
            info!("Lock expired for {}", expired.join(", "));
            self.commit();
        }
        expired
    }

    /// Keeps schedules from re-locking `app_id` while they still cover it.
    pub fn excuse(&mut self, app_id: &str) {
        if self.excused.insert(app_id.to_owned()) {
            info!("{app_id} excused from schedule locking");
            self.commit();
        }
    }

    pub fn is_excused(&self, app_id: &str) -> bool {
        self.excused.contains(app_id)
    }

    /// Drops every excuse for which `covered` is false.
    pub fn retain_excused<F: Fn(&str) -> bool>(&mut self, covered: F) {
        let before = self.excused.len();
        self.excused.retain(|app_id| covered(app_id));
        if self.excused.len() != before {
            self.commit();
        }
    }

    /// Clears the excuse for `app_id`, returning whether it had one.
    pub fn clear_excuse(&mut self, app_id: &str) -> bool {
        let removed = self.excused.remove(app_id);
        if removed {
            self.commit();
        }
        removed
    }

    pub fn get(&self, app_id: &str) -> Option<&LockEntry> {
        self.entries.get(app_id)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &LockEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 5, 12, 0, 0).unwrap()
    }

    fn stored(store: &SharedStore, key: &str) -> Option<String> {
        store.lock().unwrap().load(key).unwrap()
    }

    #[test]
    fn test_timed_lock_stops_holding_at_expiry() {
        let mut locks = LockStore::new(shared_store(MemoryStore::new()));
        locks.lock("com.x", Some(5), t0());

        assert!(locks.is_locked("com.x", t0() + Duration::minutes(4)));
        assert!(!locks.is_locked("com.x", t0() + Duration::minutes(5)));
        for minutes in [6, 60, 6000] {
            assert!(!locks.is_locked("com.x", t0() + Duration::minutes(minutes)));
        }
    }

    #[test]
    fn test_non_positive_duration_is_indefinite() {
        let mut locks = LockStore::new(shared_store(MemoryStore::new()));
        locks.lock("com.a", Some(0), t0());
        locks.lock("com.b", Some(-3), t0());
        locks.lock("com.c", None, t0());

        for app in ["com.a", "com.b", "com.c"] {
            assert_eq!(locks.get(app).unwrap().expires_at, None);
        }
    }

    #[test]
    fn test_sweep_never_removes_indefinite_locks() {
        let mut locks = LockStore::new(shared_store(MemoryStore::new()));
        locks.lock("com.forever", None, t0());
        locks.lock_for_schedule("com.schedule");
        locks.lock("com.timed", Some(1), t0());

        let far_future = t0() + Duration::days(3650);
        assert_eq!(locks.sweep_expired(far_future), vec!["com.timed".to_string()]);
        assert!(locks.is_locked("com.forever", far_future));
        assert!(locks.is_locked("com.schedule", far_future));
        assert!(locks.sweep_expired(far_future).is_empty());
    }

    #[test]
    fn test_sweep_boundary_is_inclusive() {
        let mut locks = LockStore::new(shared_store(MemoryStore::new()));
        locks.lock("com.x", Some(5), t0());

        assert!(locks.sweep_expired(t0() + Duration::minutes(5) - Duration::milliseconds(1)).is_empty());
        assert_eq!(locks.sweep_expired(t0() + Duration::minutes(5)), vec!["com.x".to_string()]);
    }

    #[test]
    fn test_lock_overwrites_existing_entry() {
        let mut locks = LockStore::new(shared_store(MemoryStore::new()));
        locks.lock_for_schedule("com.x");
        locks.lock("com.x", Some(10), t0());

        let entry = locks.get("com.x").unwrap();
        assert_eq!(entry.source, LockSource::User);
        assert_eq!(entry.expires_at, Some(t0() + Duration::minutes(10)));
    }

    #[test]
    fn test_unlock_absent_app_is_not_an_error() {
        let mut locks = LockStore::new(shared_store(MemoryStore::new()));
        assert_eq!(locks.unlock("com.none"), None);
        assert!(locks.is_empty());
    }

    #[test]
    fn test_every_mutation_is_persisted() {
        let store = shared_store(MemoryStore::new());
        let mut locks = LockStore::new(store.clone());

        locks.lock("com.a", None, t0());
        assert_eq!(stored(&store, LOCKS_KEY).as_deref(), Some(r#"{"com.a":-1}"#));

        locks.lock("com.b", Some(1), t0());
        let expiry = (t0() + Duration::minutes(1)).timestamp_millis();
        assert_eq!(
            stored(&store, LOCKS_KEY),
            Some(format!(r#"{{"com.a":-1,"com.b":{expiry}}}"#))
        );

        locks.sweep_expired(t0() + Duration::minutes(2));
        locks.unlock("com.a");
        assert_eq!(stored(&store, LOCKS_KEY).as_deref(), Some("{}"));
    }

    #[test]
    fn test_load_replaces_memory_and_keeps_provenance() {
        let store = shared_store(MemoryStore::new());
        {
            let mut writer = LockStore::new(store.clone());
            writer.lock("com.user", None, t0());
            writer.lock_for_schedule("com.sched");
        }

        // In-memory only: a committed mutation would overwrite the documents.
        let mut locks = LockStore::new(store);
        locks.entries.insert(
            "com.stale".to_owned(),
            LockEntry {
                expires_at: None,
                source: LockSource::Schedule,
            },
        );
        locks.load().unwrap();

        assert_eq!(locks.len(), 2);
        assert!(locks.get("com.stale").is_none());
        assert_eq!(locks.get("com.user").unwrap().source, LockSource::User);
        assert_eq!(locks.get("com.sched").unwrap().source, LockSource::Schedule);
    }

    #[test]
    fn test_failed_write_keeps_memory_and_retries() {
        let mut memory = MemoryStore::new();
        memory.set_reject_writes(true);
        let store = shared_store(memory);
        let mut locks = LockStore::new(store.clone());

        locks.lock("com.x", None, t0());
        assert!(locks.is_locked("com.x", t0()));
        assert!(!locks.flush_if_dirty());
        assert_eq!(stored(&store, LOCKS_KEY), None);

        // Writes are allowed again: the next flush writes the full mapping.
        *store.lock().unwrap() = Box::new(MemoryStore::new());
        assert!(locks.flush_if_dirty());
        assert_eq!(stored(&store, LOCKS_KEY).as_deref(), Some(r#"{"com.x":-1}"#));
    }

    #[test]
    fn test_excused_apps_survive_reload() {
        let store = shared_store(MemoryStore::new());
        {
            let mut writer = LockStore::new(store.clone());
            writer.excuse("com.a");
            writer.excuse("com.b");
            writer.retain_excused(|app_id| app_id == "com.a");
        }

        let locks = LockStore::open(store);
        assert!(locks.is_excused("com.a"));
        assert!(!locks.is_excused("com.b"));
    }
}
