use std::{collections::BTreeMap, sync::RwLock};

use super::{Store, StoreError};

/// A store kept entirely in memory. Used for ephemeral storage and for in-memory durable storage.
#[derive(Debug, Default)]
pub struct MemoryStore(RwLock<BTreeMap<String, String>>);

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .0
            .read()
            .expect("RwLock should not be poisoned")
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.0
            .write()
            .expect("RwLock should not be poisoned")
            .insert(key.to_owned(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.0
            .write()
            .expect("RwLock should not be poisoned")
            .remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.0.write().expect("RwLock should not be poisoned").clear();
        Ok(())
    }

    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.0.read().expect("RwLock should not be poisoned").len())
    }

    fn entries(&self) -> Result<Vec<(String, String)>, StoreError> {
        Ok(self
            .0
            .read()
            .expect("RwLock should not be poisoned")
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}
