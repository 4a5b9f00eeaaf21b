use chrono::{Local, TimeZone};
use log::{error, info, warn};

use super::{parse_document_in, ScheduleSet};
use crate::error::{GuardError, ScheduleError, StorageError};
use crate::locks::SharedStore;
use crate::storage::SCHEDULES_KEY;

/// The enabled schedules plus the document they were parsed from.
pub struct ScheduleStore {
    schedules: ScheduleSet,
    document: Option<String>,
    store: SharedStore,
    dirty: bool,
}

impl ScheduleStore {
    pub fn new(store: SharedStore) -> Self {
        Self {
            schedules: ScheduleSet::default(),
            document: None,
            store,
            dirty: false,
        }
    }

    /// Loads the persisted document; an unreadable one leaves the set empty.
    pub fn open(store: SharedStore) -> Self {
        Self::open_in(store, &Local)
    }

    pub fn open_in<Tz: TimeZone>(store: SharedStore, tz: &Tz) -> Self {
        let mut schedules = Self::new(store);
        if let Err(err) = schedules.load_in(tz) {
            error!("Failed to load schedules, starting with none: {err}");
        }
        schedules
    }

    fn load_in<Tz: TimeZone>(&mut self, tz: &Tz) -> Result<(), GuardError> {
        let document = {
            let store = self.store.lock().unwrap_or_else(|p| p.into_inner());
            store.load(SCHEDULES_KEY)?
        };
        let Some(document) = document else {
            return Ok(());
        };
        self.schedules = parse_document_in(&document, tz)?;
        self.document = Some(document);
        info!("Loaded {} enabled schedules from storage.", self.schedules.len());
        Ok(())
    }

    /// Full replace from a new document, resolved against `tz`. A document
    /// that fails to parse is discarded and the previous schedules stay in
    /// force.
    pub fn replace_in<Tz: TimeZone>(
        &mut self,
        document: &str,
        tz: &Tz,
    ) -> Result<usize, ScheduleError> {
        let schedules = parse_document_in(document, tz).inspect_err(|err| {
            warn!("Rejected schedule document, keeping previous schedules: {err}");
        })?;

        self.schedules = schedules;
        self.document = Some(document.to_owned());
        self.dirty = true;
        self.flush_if_dirty();
        info!("Schedules replaced: {} enabled", self.schedules.len());
        Ok(self.schedules.len())
    }

    pub fn flush_if_dirty(&mut self) -> bool {
        if self.dirty {
            match self.persist() {
                Ok(()) => self.dirty = false,
                Err(err) => error!("Failed to persist schedules, will retry: {err}"),
            }
        }
        !self.dirty
    }

    fn persist(&self) -> Result<(), StorageError> {
        let Some(document) = &self.document else {
            return Ok(());
        };
        let mut store = self.store.lock().unwrap_or_else(|p| p.into_inner());
        store.save(SCHEDULES_KEY, document)
    }

    pub fn schedules(&self) -> &ScheduleSet {
        &self.schedules
    }

    pub fn is_empty(&self) -> bool {
        self.schedules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locks::shared_store;
    use crate::storage::MemoryStore;
    use chrono::Utc;

    const WEEKDAY_EVENINGS: &str = r#"[{
        "id": "evenings",
        "isEnabled": true,
        "appPackageNames": ["com.x"],
        "scheduleConfig": {
            "startTime": "2024-05-01T18:00:00Z",
            "endTime": "2024-05-01T22:00:00Z",
            "selectedDays": [true, true, true, true, true, false, false]
        }
    }]"#;

    #[test]
    fn test_replace_persists_document() {
        let store = shared_store(MemoryStore::new());
        let mut schedules = ScheduleStore::new(store.clone());

        assert_eq!(schedules.replace_in(WEEKDAY_EVENINGS, &Utc).unwrap(), 1);

        let reopened = ScheduleStore::open_in(store, &Utc);
        assert_eq!(reopened.schedules(), schedules.schedules());
    }

    #[test]
    fn test_malformed_document_keeps_previous_set() {
        let mut schedules = ScheduleStore::new(shared_store(MemoryStore::new()));
        schedules.replace_in(WEEKDAY_EVENINGS, &Utc).unwrap();
        let before = schedules.schedules().clone();

        assert!(schedules.replace_in(r#"[{"id": "broken"}]"#, &Utc).is_err());
        assert!(schedules.replace_in("not json", &Utc).is_err());
        assert_eq!(schedules.schedules(), &before);
    }

    #[test]
    fn test_failed_write_keeps_new_schedules_in_force() {
        let mut memory = MemoryStore::new();
        memory.set_reject_writes(true);
        let store = shared_store(memory);
        let mut schedules = ScheduleStore::new(store.clone());

        assert_eq!(schedules.replace_in(WEEKDAY_EVENINGS, &Utc).unwrap(), 1);
        assert!(!schedules.flush_if_dirty());

        *store.lock().unwrap() = Box::new(MemoryStore::new());
        assert!(schedules.flush_if_dirty());
        assert!(store.lock().unwrap().load(SCHEDULES_KEY).unwrap().is_some());
    }
}
