use std::sync::{Arc, Mutex, RwLock, RwLockWriteGuard, Weak};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{broadcast::error::RecvError, watch};
use tokio_util::sync::DropGuard;

use crate::{
    broadcast::Broadcaster,
    json,
    keys::{validate_key, InvalidKeyError, Signal, DBKEY_SYNC_KEYS, DUMMY_PAYLOAD},
    listener::{InitEvent, ListenerGuard},
    store::{DurableStore, Store, StoreError},
    sync_keys::{self, SyncKeyRegistry},
};

/// An error resulting from a storage manager operation.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The key is empty or reserved for the sync protocol.
    #[error(transparent)]
    InvalidKey(#[from] InvalidKeyError),

    /// The underlying store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A value could not be serialized or deserialized.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// A value could not be interpreted as a date.
    #[error("Value cannot be interpreted as a date: {0}")]
    InvalidDate(String),
}

/// Payload of [Signal::AddToSessionStorage].
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct SessionEntry<T> {
    pub(crate) key: String,
    pub(crate) data: T,
}

/// Stores application data in the session (ephemeral) or permanent (durable) storage of a
/// browsing context, and keeps synced session data identical across every context of the origin.
///
/// A key lives in exactly one of the two tiers: saving it in one tier removes it from the other.
/// Cloning the manager yields a handle to the same state.
#[derive(Clone)]
pub struct LocalStoreManager {
    pub(crate) inner: Arc<ManagerState>,
}

pub(crate) struct ManagerState {
    pub(crate) ephemeral: Arc<dyn Store>,
    pub(crate) durable: DurableStore,
    pub(crate) broadcaster: Broadcaster,
    pub(crate) sync_keys: RwLock<SyncKeyRegistry>,
    pub(crate) listener: Arc<ListenerGuard>,
    pub(crate) init: watch::Sender<bool>,
    /// Stops the listener started by this manager once the last handle to it is dropped.
    pub(crate) listener_task: Mutex<Option<DropGuard>>,
}

impl std::fmt::Debug for LocalStoreManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStoreManager")
            .field("context_id", &self.inner.durable.context_id())
            .finish()
    }
}

impl LocalStoreManager {
    /// Create a manager over the given stores. `listener` is the page's listener slot.
    pub(crate) fn new(
        ephemeral: Arc<dyn Store>,
        durable: DurableStore,
        listener: Arc<ListenerGuard>,
    ) -> Self {
        let (init, _) = watch::channel(false);
        Self {
            inner: Arc::new(ManagerState {
                ephemeral,
                broadcaster: Broadcaster::new(durable.clone()),
                durable,
                sync_keys: RwLock::new(SyncKeyRegistry::default()),
                listener,
                init,
                listener_task: Mutex::new(None),
            }),
        }
    }

    /// Start reacting to the signals of the other contexts, and ask them for their synced session
    /// data. Does nothing if a listener is already registered for this page.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn initialise_storage_sync_listener(&self) -> Result<(), StorageError> {
        let Some(cancellation) = self.inner.listener.register() else {
            return Ok(());
        };

        let mut events = self.inner.durable.subscribe();
        let state = Arc::downgrade(&self.inner);
        *self
            .inner
            .listener_task
            .lock()
            .expect("Mutex should not be poisoned") = Some(cancellation.clone().drop_guard());

        tokio::spawn(async move {
            log::debug!("Storage sync listener started");
            loop {
                tokio::select! {
                    _ = cancellation.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(event) => {
                            let Some(manager) = upgrade(&state) else {
                                break;
                            };
                            if let Err(e) = manager.handle_storage_event(&event) {
                                log::error!("Failed to handle storage event {:?}: {e}", event.key);
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            log::warn!("Storage sync listener missed {skipped} events");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
            log::debug!("Storage sync listener stopped");
        });

        self.sync_session_storage()
    }

    /// Stop the page's storage sync listener.
    pub fn deinitialise_storage_sync_listener(&self) {
        self.inner.listener.unregister();
    }

    /// Returns `true` if a storage sync listener is registered for this page.
    pub fn is_listening(&self) -> bool {
        self.inner.listener.is_registered()
    }

    /// An event fired once the first session snapshot pushed by another context has been merged.
    pub fn init_event(&self) -> InitEvent {
        InitEvent::new(self.inner.init.subscribe())
    }

    /// Clear the session storage of every context, and the permanent storage.
    pub fn clear_all_storage(&self) -> Result<(), StorageError> {
        self.clear_all_sessions_storage()?;
        self.clear_local_storage()
    }

    /// Clear the session storage and sync keys of every context of the origin.
    pub fn clear_all_sessions_storage(&self) -> Result<(), StorageError> {
        self.clear_instance_session_storage()?;
        self.inner.durable.remove(DBKEY_SYNC_KEYS)?;
        self.publish(Signal::ClearAllSessionsStorage, DUMMY_PAYLOAD)
    }

    /// Clear the session storage and sync keys of this context only.
    pub fn clear_instance_session_storage(&self) -> Result<(), StorageError> {
        self.inner.ephemeral.clear()?;
        self.registry().clear();
        Ok(())
    }

    /// Clear the permanent storage of the origin.
    ///
    /// Other contexts keep their session storage and sync keys.
    pub fn clear_local_storage(&self) -> Result<(), StorageError> {
        Ok(self.inner.durable.clear()?)
    }

    /// Save `data` in this context's session storage only.
    pub fn save_session_data<T: Serialize + ?Sized>(
        &self,
        key: &str,
        data: &T,
    ) -> Result<(), StorageError> {
        validate_key(key)?;
        let text = serde_json::to_string(data)?;

        self.remove_from_sync_keys(key)?;
        self.inner.durable.remove(key)?;
        self.inner.ephemeral.set(key, text)?;
        Ok(())
    }

    /// Save `data` in the session storage of every context of the origin.
    pub fn save_synced_session_data<T: Serialize + ?Sized>(
        &self,
        key: &str,
        data: &T,
    ) -> Result<(), StorageError> {
        validate_key(key)?;
        let data = serde_json::to_value(data)?;

        self.inner.durable.remove(key)?;
        self.add_to_session_storage(key, data)
    }

    /// Save `data` in the permanent storage of the origin.
    pub fn save_permanent_data<T: Serialize + ?Sized>(
        &self,
        key: &str,
        data: &T,
    ) -> Result<(), StorageError> {
        validate_key(key)?;
        let text = serde_json::to_string(data)?;

        self.remove_from_session_storage(key)?;
        self.inner.durable.set(key, text)?;
        Ok(())
    }

    /// Move the value stored under `key` to this context's session storage.
    pub fn move_data_to_session_storage(&self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        match self.get_data(key)? {
            Some(data) => self.save_session_data(key, &data),
            None => Ok(()),
        }
    }

    /// Move the value stored under `key` to the synced session storage.
    pub fn move_data_to_synced_session_storage(&self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        match self.get_data(key)? {
            Some(data) => self.save_synced_session_data(key, &data),
            None => Ok(()),
        }
    }

    /// Move the value stored under `key` to the permanent storage.
    pub fn move_data_to_permanent_storage(&self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        match self.get_data(key)? {
            Some(data) => self.save_permanent_data(key, &data),
            None => Ok(()),
        }
    }

    /// Returns `true` if a value is stored under `key` in either tier.
    pub fn exists(&self, key: &str) -> Result<bool, StorageError> {
        validate_key(key)?;
        Ok(self.inner.ephemeral.exists(key)? || self.inner.durable.exists(key)?)
    }

    /// The value stored under `key`, looking in session storage first.
    ///
    /// Stored text that is not valid JSON is returned as a JSON string.
    pub fn get_data(&self, key: &str) -> Result<Option<Value>, StorageError> {
        validate_key(key)?;

        let text = match self.inner.ephemeral.get(key)? {
            Some(text) => Some(text),
            None => self.inner.durable.get(key)?,
        };
        Ok(text.as_deref().map(json::try_parse))
    }

    /// The value stored under `key`, decoded as `T`.
    ///
    /// With `is_date_type`, the stored value is first interpreted as a date: an RFC 3339 date-time,
    /// a date-time without offset (taken as UTC), a `YYYY-MM-DD` date or a number of milliseconds
    /// since the Unix epoch. Use `T = DateTime<Utc>` to retrieve it.
    pub fn get_data_object<T: DeserializeOwned>(
        &self,
        key: &str,
        is_date_type: bool,
    ) -> Result<Option<T>, StorageError> {
        let Some(mut data) = self.get_data(key)? else {
            return Ok(None);
        };
        if is_date_type {
            data = coerce_date(data)?;
        }
        Ok(Some(serde_json::from_value(data)?))
    }

    /// Delete the value stored under `key` from both tiers.
    pub fn delete_data(&self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;

        self.remove_from_session_storage(key)?;
        self.inner.durable.remove(key)?;
        Ok(())
    }

    /// Sync `key` across contexts without touching its value.
    pub fn add_to_sync_keys(&self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;

        self.registry().add(key);
        self.add_to_sync_keys_backup(key)?;
        self.publish(Signal::AddToSyncKeys, key)
    }

    /// Stop syncing `key` across contexts without touching its value.
    pub fn remove_from_sync_keys(&self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;

        self.registry().remove(key);
        self.remove_from_sync_keys_backup(key)?;
        self.publish(Signal::RemoveFromSyncKeys, key)
    }

    /// A copy of this manager's sync keys, loading them from permanent storage if needed.
    pub fn sync_keys(&self) -> Result<SyncKeyRegistry, StorageError> {
        let mut registry = self.registry();
        registry.load(&self.inner.durable)?;
        Ok(registry.clone())
    }

    fn sync_session_storage(&self) -> Result<(), StorageError> {
        self.publish(Signal::GetSessionStorage, DUMMY_PAYLOAD)
    }

    fn add_to_session_storage(&self, key: &str, data: Value) -> Result<(), StorageError> {
        self.add_to_session_storage_helper(key, &data)?;
        self.add_to_sync_keys_backup(key)?;
        self.inner.broadcaster.publish_json(
            Signal::AddToSessionStorage,
            &SessionEntry {
                key: key.to_owned(),
                data,
            },
        )
    }

    pub(crate) fn add_to_session_storage_helper(
        &self,
        key: &str,
        data: &Value,
    ) -> Result<(), StorageError> {
        self.registry().add(key);
        self.inner.ephemeral.set(key, serde_json::to_string(data)?)?;
        Ok(())
    }

    fn remove_from_session_storage(&self, key: &str) -> Result<(), StorageError> {
        self.remove_from_session_storage_helper(key)?;
        self.remove_from_sync_keys_backup(key)?;
        self.publish(Signal::RemoveFromSessionStorage, key)
    }

    pub(crate) fn remove_from_session_storage_helper(&self, key: &str) -> Result<(), StorageError> {
        self.inner.ephemeral.remove(key)?;
        self.registry().remove(key);
        Ok(())
    }

    fn add_to_sync_keys_backup(&self, key: &str) -> Result<(), StorageError> {
        let mut stored = sync_keys::read_persisted(&self.inner.durable)?;
        if !stored.iter().any(|k| k == key) {
            stored.push(key.to_owned());
            sync_keys::write_persisted(&self.inner.durable, &stored)?;
        }
        Ok(())
    }

    fn remove_from_sync_keys_backup(&self, key: &str) -> Result<(), StorageError> {
        let mut stored = sync_keys::read_persisted(&self.inner.durable)?;
        if let Some(index) = stored.iter().position(|k| k == key) {
            stored.remove(index);
            sync_keys::write_persisted(&self.inner.durable, &stored)?;
        }
        Ok(())
    }

    pub(crate) fn publish(&self, signal: Signal, payload: &str) -> Result<(), StorageError> {
        Ok(self.inner.broadcaster.publish(signal, payload)?)
    }

    pub(crate) fn registry(&self) -> RwLockWriteGuard<'_, SyncKeyRegistry> {
        self.inner
            .sync_keys
            .write()
            .expect("RwLock should not be poisoned")
    }
}

fn upgrade(state: &Weak<ManagerState>) -> Option<LocalStoreManager> {
    state.upgrade().map(|inner| LocalStoreManager { inner })
}

fn coerce_date(value: Value) -> Result<Value, StorageError> {
    let date = match &value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|millis| millis as i64))
            .and_then(DateTime::from_timestamp_millis),
        Value::String(text) => parse_date(text),
        _ => None,
    };

    match date {
        Some(date) => Ok(serde_json::to_value(date)?),
        None => Err(StorageError::InvalidDate(value.to_string())),
    }
}

fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc3339(text) {
        return Some(date.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(DateTime::from_naive_utc_and_offset(date, Utc));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|date| DateTime::from_naive_utc_and_offset(date, Utc))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{Origin, StoreConfiguration};

    fn manager() -> LocalStoreManager {
        Origin::open(StoreConfiguration::InMemory)
            .unwrap()
            .open_context()
            .storage_manager()
    }

    #[test]
    fn permanent_data_round_trips() {
        let storage = manager();

        storage
            .save_permanent_data("user", &json!({ "name": "alice", "id": 7 }))
            .unwrap();

        assert!(storage.exists("user").unwrap());
        assert_eq!(
            storage.get_data("user").unwrap(),
            Some(json!({ "name": "alice", "id": 7 }))
        );

        storage.delete_data("user").unwrap();
        assert!(!storage.exists("user").unwrap());
        assert_eq!(storage.get_data("user").unwrap(), None);
    }

    #[test]
    fn reserved_keys_are_rejected_everywhere() {
        let storage = manager();
        let key = "getSessionStorage";

        let results = [
            storage.save_session_data(key, &1).err(),
            storage.save_synced_session_data(key, &1).err(),
            storage.save_permanent_data(key, &1).err(),
            storage.move_data_to_session_storage(key).err(),
            storage.move_data_to_synced_session_storage(key).err(),
            storage.move_data_to_permanent_storage(key).err(),
            storage.exists(key).err(),
            storage.get_data(key).err(),
            storage.get_data_object::<i32>(key, false).err(),
            storage.delete_data(key).err(),
            storage.add_to_sync_keys(key).err(),
            storage.remove_from_sync_keys(key).err(),
        ];

        for result in results {
            assert!(matches!(
                result,
                Some(StorageError::InvalidKey(InvalidKeyError::Reserved(_)))
            ));
        }
        assert!(matches!(
            storage.get_data(""),
            Err(StorageError::InvalidKey(InvalidKeyError::Empty))
        ));
        assert!(matches!(
            storage.save_permanent_data("sync_keys", &Vec::<String>::new()),
            Err(StorageError::InvalidKey(InvalidKeyError::Reserved(_)))
        ));
    }

    #[test]
    fn saving_permanently_removes_the_session_copy() {
        let origin = Origin::open(StoreConfiguration::InMemory).unwrap();
        let context = origin.open_context();
        let storage = context.storage_manager();

        storage.save_session_data("draft", &"v1").unwrap();
        assert!(context.ephemeral().exists("draft").unwrap());

        storage.save_permanent_data("draft", &"v2").unwrap();

        assert!(!context.ephemeral().exists("draft").unwrap());
        assert_eq!(
            context.durable().get("draft").unwrap().as_deref(),
            Some("\"v2\"")
        );
        assert_eq!(storage.get_data("draft").unwrap(), Some(json!("v2")));
    }

    #[test]
    fn saving_to_session_removes_the_permanent_copy_and_sync_key() {
        let origin = Origin::open(StoreConfiguration::InMemory).unwrap();
        let context = origin.open_context();
        let storage = context.storage_manager();

        storage.save_synced_session_data("theme", &2).unwrap();
        storage.save_permanent_data("token", &"abc").unwrap();
        storage.save_session_data("theme", &3).unwrap();
        storage.save_session_data("token", &"def").unwrap();

        assert!(!storage.sync_keys().unwrap().contains("theme"));
        assert_eq!(
            context.durable().get(DBKEY_SYNC_KEYS).unwrap().as_deref(),
            Some("[]")
        );
        assert!(!context.durable().exists("token").unwrap());
        assert_eq!(storage.get_data("token").unwrap(), Some(json!("def")));
    }

    #[test]
    fn synced_session_data_is_registered_and_backed_up() {
        let origin = Origin::open(StoreConfiguration::InMemory).unwrap();
        let context = origin.open_context();
        let storage = context.storage_manager();
        storage.save_permanent_data("theme", &1).unwrap();

        storage
            .save_synced_session_data("theme", &json!({ "id": 2 }))
            .unwrap();

        assert!(!context.durable().exists("theme").unwrap());
        assert_eq!(
            context.ephemeral().get("theme").unwrap().as_deref(),
            Some(r#"{"id":2}"#)
        );
        assert_eq!(storage.sync_keys().unwrap().keys(), ["theme"]);
        assert_eq!(
            context.durable().get(DBKEY_SYNC_KEYS).unwrap().as_deref(),
            Some(r#"["theme"]"#)
        );
    }

    #[test]
    fn moving_data_between_tiers() {
        let origin = Origin::open(StoreConfiguration::InMemory).unwrap();
        let context = origin.open_context();
        let storage = context.storage_manager();
        storage.save_permanent_data("cart", &[1, 2, 3]).unwrap();

        storage.move_data_to_synced_session_storage("cart").unwrap();
        assert!(!context.durable().exists("cart").unwrap());
        assert!(storage.sync_keys().unwrap().contains("cart"));

        storage.move_data_to_session_storage("cart").unwrap();
        assert!(!storage.sync_keys().unwrap().contains("cart"));
        assert!(context.ephemeral().exists("cart").unwrap());

        storage.move_data_to_permanent_storage("cart").unwrap();
        assert!(!context.ephemeral().exists("cart").unwrap());
        assert_eq!(storage.get_data("cart").unwrap(), Some(json!([1, 2, 3])));

        storage.move_data_to_session_storage("missing").unwrap();
        assert!(!storage.exists("missing").unwrap());
    }

    #[test]
    fn sync_keys_are_not_duplicated() {
        let origin = Origin::open(StoreConfiguration::InMemory).unwrap();
        let context = origin.open_context();
        let storage = context.storage_manager();

        storage.add_to_sync_keys("x").unwrap();
        storage.add_to_sync_keys("x").unwrap();

        assert_eq!(storage.sync_keys().unwrap().keys(), ["x"]);
        assert_eq!(
            context.durable().get(DBKEY_SYNC_KEYS).unwrap().as_deref(),
            Some(r#"["x"]"#)
        );

        storage.remove_from_sync_keys("x").unwrap();
        assert!(storage.sync_keys().unwrap().is_empty());
    }

    #[test]
    fn clearing_all_sessions_removes_the_persisted_registry() {
        let origin = Origin::open(StoreConfiguration::InMemory).unwrap();
        let context = origin.open_context();
        let storage = context.storage_manager();
        storage.save_synced_session_data("theme", &2).unwrap();
        storage.save_permanent_data("language", &"fr").unwrap();

        storage.clear_all_sessions_storage().unwrap();

        assert!(context.ephemeral().is_empty().unwrap());
        assert!(!context.durable().exists(DBKEY_SYNC_KEYS).unwrap());
        assert!(storage.sync_keys().unwrap().is_empty());
        assert!(storage.exists("language").unwrap());

        storage.clear_all_storage().unwrap();
        assert!(!storage.exists("language").unwrap());
    }

    #[test]
    fn malformed_stored_text_is_returned_raw() {
        let origin = Origin::open(StoreConfiguration::InMemory).unwrap();
        let context = origin.open_context();
        context
            .durable()
            .set("legacy", "plain text".to_owned())
            .unwrap();

        let storage = context.storage_manager();
        assert_eq!(storage.get_data("legacy").unwrap(), Some(json!("plain text")));
    }

    #[test]
    fn date_values_are_coerced() {
        let storage = manager();
        storage
            .save_permanent_data("iso", &"2024-03-01T10:20:30Z")
            .unwrap();
        storage.save_permanent_data("day", &"2024-03-01").unwrap();
        storage
            .save_permanent_data("millis", &1_709_288_430_000_i64)
            .unwrap();
        storage.save_permanent_data("junk", &"tomorrow").unwrap();

        let iso: DateTime<Utc> = storage.get_data_object("iso", true).unwrap().unwrap();
        assert_eq!(iso.to_rfc3339(), "2024-03-01T10:20:30+00:00");

        let day: DateTime<Utc> = storage.get_data_object("day", true).unwrap().unwrap();
        assert_eq!(day.to_rfc3339(), "2024-03-01T00:00:00+00:00");

        let millis: DateTime<Utc> = storage.get_data_object("millis", true).unwrap().unwrap();
        assert_eq!(millis, iso);

        assert!(matches!(
            storage.get_data_object::<DateTime<Utc>>("junk", true),
            Err(StorageError::InvalidDate(_))
        ));
        assert_eq!(
            storage
                .get_data_object::<DateTime<Utc>>("missing", true)
                .unwrap(),
            None
        );
    }
}
