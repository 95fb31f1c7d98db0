use std::{path::Path, sync::Mutex};

use rusqlite::OptionalExtension;

use super::{Store, StoreError};

/// A store persisted to a single SQLite table.
#[derive(Debug)]
pub struct SqliteStore(Mutex<rusqlite::Connection>);

impl SqliteStore {
    /// Opens (or creates) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = rusqlite::Connection::open(path)?;

        // Set WAL mode for better concurrency
        db.execute_batch("PRAGMA journal_mode = WAL;")?;
        db.execute(
            "CREATE TABLE IF NOT EXISTS storage (key TEXT PRIMARY KEY, value TEXT NOT NULL);",
            [],
        )?;

        Ok(SqliteStore(Mutex::new(db)))
    }

    fn connection(&self) -> std::sync::MutexGuard<'_, rusqlite::Connection> {
        self.0.lock().expect("Mutex should not be poisoned")
    }
}

impl Store for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let value = self
            .connection()
            .query_row(
                "SELECT value FROM storage WHERE key = ?1",
                rusqlite::params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        let mut conn = self.connection();
        let transaction = conn.transaction()?;

        transaction.execute(
            "INSERT OR REPLACE INTO storage (key, value) VALUES (?1, ?2)",
            rusqlite::params![key, value],
        )?;

        transaction.commit()?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.connection();
        let transaction = conn.transaction()?;

        transaction.execute("DELETE FROM storage WHERE key = ?1", rusqlite::params![key])?;

        transaction.commit()?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.connection().execute("DELETE FROM storage", [])?;
        Ok(())
    }

    fn len(&self) -> Result<usize, StoreError> {
        let count: i64 =
            self.connection()
                .query_row("SELECT COUNT(*) FROM storage", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    fn entries(&self) -> Result<Vec<(String, String)>, StoreError> {
        let conn = self.connection();
        let mut stmt = conn.prepare("SELECT key, value FROM storage ORDER BY key")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }

        Ok(results)
    }
}
