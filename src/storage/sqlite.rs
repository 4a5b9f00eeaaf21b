use std::path::Path;

use chrono::Local;
use log::debug;
use rusqlite::{params, Connection, OptionalExtension};

use super::DocumentStore;
use crate::error::StorageError;

const CREATE_DOCUMENTS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS documents (
        key TEXT PRIMARY KEY NOT NULL,
        body TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
"#;

const DOCUMENT_UPSERT_QUERY: &str = r#"
    INSERT INTO documents (key, body, updated_at)
    VALUES (?1, ?2, ?3)
    ON CONFLICT(key) DO UPDATE SET
        body = excluded.body,
        updated_at = excluded.updated_at
"#;

const DOCUMENT_SELECT_QUERY: &str = "SELECT body FROM documents WHERE key = ?1";

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StorageError::Rejected(format!("{}: {e}", parent.display())))?;
            }
        }
        Self::with_connection(Connection::open(path)?)
    }

    pub fn with_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.execute(CREATE_DOCUMENTS_TABLE, [])?;
        Ok(Self { conn })
    }
}

impl DocumentStore for SqliteStore {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        let body = self
            .conn
            .query_row(DOCUMENT_SELECT_QUERY, params![key], |row| row.get(0))
            .optional()?;
        Ok(body)
    }

    fn save(&mut self, key: &str, body: &str) -> Result<(), StorageError> {
        let updated_at = Local::now().naive_local().to_string();
        self.conn
            .execute(DOCUMENT_UPSERT_QUERY, params![key, body, updated_at])?;
        debug!("Saved document {key} ({} bytes)", body.len());
        Ok(())
    }
}
