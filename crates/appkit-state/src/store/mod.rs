use thiserror::Error;

mod configuration;
mod durable;
mod memory;
mod sqlite;

pub use configuration::StoreConfiguration;
pub use durable::{DurableStore, StorageEvent, StorageEventReceiver};
pub(crate) use durable::DurableArea;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// An error raised by a storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An error reported by the SQLite backend.
    #[error(transparent)]
    Database(#[from] rusqlite::Error),
}

/// A string key/value store.
///
/// Values are opaque text to the store; callers are responsible for encoding them. Stores are
/// shared between the storage manager and its change listener, so they must be usable from any
/// thread.
pub trait Store: Send + Sync {
    /// Retrieves the value stored under `key`.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: String) -> Result<(), StoreError>;
    /// Removes `key`. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
    /// Removes every key.
    fn clear(&self) -> Result<(), StoreError>;
    /// Number of stored keys.
    fn len(&self) -> Result<usize, StoreError>;
    /// All stored key/value pairs.
    fn entries(&self) -> Result<Vec<(String, String)>, StoreError>;

    /// Returns `true` if a value is stored under `key`.
    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.get(key)?.is_some())
    }

    /// Returns `true` if nothing is stored.
    fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}
