use std::collections::HashMap;

use crate::error::StorageError;

pub mod sqlite;

pub use sqlite::SqliteStore;

pub const LOCKS_KEY: &str = "locks";
pub const LOCK_SOURCES_KEY: &str = "lock_sources";
pub const SCHEDULES_KEY: &str = "schedules";
pub const EMERGENCY_KEY: &str = "emergency_unlocks";
pub const EXCUSED_KEY: &str = "excused_apps";

/// Keyed storage for whole JSON documents. Every save replaces the
/// previous body for that key.
pub trait DocumentStore: Send {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn save(&mut self, key: &str, body: &str) -> Result<(), StorageError>;
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    documents: HashMap<String, String>,
    reject_writes: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following `save` fail until switched back.
    pub fn set_reject_writes(&mut self, reject: bool) {
        self.reject_writes = reject;
    }
}

impl DocumentStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.documents.get(key).cloned())
    }

    fn save(&mut self, key: &str, body: &str) -> Result<(), StorageError> {
        if self.reject_writes {
            return Err(StorageError::Rejected(format!("{key} is read-only")));
        }
        self.documents.insert(key.to_owned(), body.to_owned());
        Ok(())
    }
}
