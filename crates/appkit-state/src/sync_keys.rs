use crate::{
    json,
    keys::DBKEY_SYNC_KEYS,
    store::{Store, StoreError},
    StorageError,
};

/// The keys whose session entries are mirrored into every context of the origin.
///
/// This is the in-memory cache of one storage manager. Mutations only touch the cache; the
/// persisted copy under [DBKEY_SYNC_KEYS] is maintained separately by the storage manager.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncKeyRegistry {
    keys: Vec<String>,
}

impl SyncKeyRegistry {
    /// Populate the cache from durable storage, unless it already holds keys.
    pub fn load(&mut self, durable: &dyn Store) -> Result<(), StoreError> {
        if !self.keys.is_empty() {
            return Ok(());
        }
        self.keys = read_persisted(durable)?;
        Ok(())
    }

    /// Returns `true` if `key` is synced.
    pub fn contains(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }

    /// Add `key`, unless it is already present.
    pub fn add(&mut self, key: &str) {
        if !self.contains(key) {
            self.keys.push(key.to_owned());
        }
    }

    /// Remove `key`, if present.
    pub fn remove(&mut self, key: &str) {
        self.keys.retain(|k| k != key);
    }

    /// Forget every key.
    pub fn clear(&mut self) {
        self.keys.clear();
    }

    /// The synced keys, in the order they were added.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Returns `true` if no key is synced.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Read the persisted registry. A missing or unreadable registry is treated as empty.
pub(crate) fn read_persisted(durable: &dyn Store) -> Result<Vec<String>, StoreError> {
    let Some(text) = durable.get(DBKEY_SYNC_KEYS)? else {
        return Ok(Vec::new());
    };

    match serde_json::from_value(json::try_parse(&text)) {
        Ok(keys) => Ok(keys),
        Err(e) => {
            log::warn!("Ignoring malformed persisted sync keys: {e}");
            Ok(Vec::new())
        }
    }
}

/// Write the persisted registry.
pub(crate) fn write_persisted(durable: &dyn Store, keys: &[String]) -> Result<(), StorageError> {
    let text = serde_json::to_string(keys)?;
    Ok(durable.set(DBKEY_SYNC_KEYS, text)?)
}
