//! Receiving side of the cross-context sync protocol.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::{
    json,
    keys::Signal,
    manager::{LocalStoreManager, SessionEntry, StorageError},
    store::{StorageEvent, Store},
};

impl LocalStoreManager {
    /// React to a durable storage change made by another context.
    ///
    /// Only writes to signal keys are acted upon. Removals, clears and writes to any other key
    /// are ignored.
    pub fn handle_storage_event(&self, event: &StorageEvent) -> Result<(), StorageError> {
        let Some(value) = event.new_value.as_deref().filter(|value| !value.is_empty()) else {
            return Ok(());
        };
        let Some(signal) = event.key.as_deref().and_then(Signal::from_name) else {
            return Ok(());
        };
        log::debug!("Received {signal} signal from {}", event.source);

        match signal {
            Signal::GetSessionStorage => self.push_session_storage(),
            Signal::SetSessionStorage => self.merge_session_storage(value),
            Signal::AddToSessionStorage => {
                let entry: SessionEntry<Value> = serde_json::from_str(value)?;
                self.add_to_session_storage_helper(&entry.key, &entry.data)
            }
            Signal::RemoveFromSessionStorage => self.remove_from_session_storage_helper(value),
            Signal::ClearAllSessionsStorage => {
                if !self.inner.ephemeral.is_empty()? {
                    self.clear_instance_session_storage()?;
                }
                Ok(())
            }
            Signal::AddToSyncKeys => {
                self.registry().add(value);
                Ok(())
            }
            Signal::RemoveFromSyncKeys => {
                self.registry().remove(value);
                Ok(())
            }
        }
    }

    /// Answer a snapshot request with the whole session storage of this context.
    fn push_session_storage(&self) -> Result<(), StorageError> {
        let entries = self.inner.ephemeral.entries()?;
        if entries.is_empty() {
            return Ok(());
        }

        let snapshot: BTreeMap<String, String> = entries.into_iter().collect();
        self.inner
            .broadcaster
            .publish_json(Signal::SetSessionStorage, &snapshot)
    }

    /// Copy the synced entries of a snapshot pushed by another context into session storage.
    fn merge_session_storage(&self, value: &str) -> Result<(), StorageError> {
        let snapshot: BTreeMap<String, String> = serde_json::from_str(value)?;

        {
            let mut registry = self.registry();
            if registry.is_empty() {
                registry.load(&self.inner.durable)?;
            }

            for (key, text) in snapshot {
                if registry.contains(&key) {
                    let data = json::try_parse(&text);
                    self.inner.ephemeral.set(&key, serde_json::to_string(&data)?)?;
                }
            }
        }

        self.fire_init();
        Ok(())
    }

    fn fire_init(&self) {
        self.inner.init.send_if_modified(|fired| {
            let first = !*fired;
            *fired = true;
            first
        });
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use uuid::Uuid;

    use super::*;
    use crate::{BrowsingContext, Origin, StoreConfiguration, DBKEY_SYNC_KEYS};

    fn event(key: &str, new_value: Option<&str>) -> StorageEvent {
        StorageEvent {
            key: Some(key.to_owned()),
            old_value: None,
            new_value: new_value.map(ToOwned::to_owned),
            source: Uuid::new_v4(),
        }
    }

    fn context() -> BrowsingContext {
        Origin::open(StoreConfiguration::InMemory)
            .unwrap()
            .open_context()
    }

    #[test]
    fn snapshot_is_merged_for_registered_keys() {
        let origin = Origin::open(StoreConfiguration::InMemory).unwrap();
        let tab_a = origin.open_context();
        tab_a
            .storage_manager()
            .save_synced_session_data("theme", &json!({ "id": 2 }))
            .unwrap();

        let tab_b = origin.open_context();
        let storage = tab_b.storage_manager();
        storage.add_to_sync_keys("theme").unwrap();

        storage
            .handle_storage_event(&event(
                "setSessionStorage",
                Some(r#"{"theme":"{\"id\":2}","private":"1"}"#),
            ))
            .unwrap();

        assert_eq!(storage.get_data("theme").unwrap(), Some(json!({ "id": 2 })));
        assert!(!tab_b.ephemeral().exists("private").unwrap());
        assert!(storage.init_event().has_fired());
    }

    #[test]
    fn snapshot_loads_the_persisted_registry_when_empty() {
        let tab = context();
        tab.durable()
            .set(DBKEY_SYNC_KEYS, r#"["user"]"#.to_owned())
            .unwrap();
        let storage = tab.storage_manager();

        storage
            .handle_storage_event(&event("setSessionStorage", Some(r#"{"user":"\"alice\""}"#)))
            .unwrap();

        assert_eq!(storage.get_data("user").unwrap(), Some(json!("alice")));
    }

    #[test]
    fn mirrored_entries_are_registered_and_removed() {
        let tab = context();
        let storage = tab.storage_manager();

        storage
            .handle_storage_event(&event(
                "addToSessionStorage",
                Some(r#"{"key":"cart","data":[1,2]}"#),
            ))
            .unwrap();
        assert_eq!(storage.get_data("cart").unwrap(), Some(json!([1, 2])));
        assert!(storage.sync_keys().unwrap().contains("cart"));

        storage
            .handle_storage_event(&event("removeFromSessionStorage", Some("cart")))
            .unwrap();
        assert!(!storage.exists("cart").unwrap());
        assert!(!storage.sync_keys().unwrap().contains("cart"));
    }

    #[test]
    fn sync_key_signals_only_touch_the_in_memory_registry() {
        let tab = context();
        let storage = tab.storage_manager();

        storage
            .handle_storage_event(&event("addToSyncKeys", Some("x")))
            .unwrap();
        storage
            .handle_storage_event(&event("addToSyncKeys", Some("x")))
            .unwrap();
        assert_eq!(storage.sync_keys().unwrap().keys(), ["x"]);
        assert!(!tab.durable().exists(DBKEY_SYNC_KEYS).unwrap());

        storage
            .handle_storage_event(&event("removeFromSyncKeys", Some("x")))
            .unwrap();
        assert!(storage.sync_keys().unwrap().is_empty());
    }

    #[test]
    fn clear_signal_empties_session_storage() {
        let tab = context();
        let storage = tab.storage_manager();
        storage.save_session_data("draft", &"text").unwrap();

        storage
            .handle_storage_event(&event("clearAllSessionsStorage", Some("_dummy")))
            .unwrap();

        assert!(tab.ephemeral().is_empty().unwrap());
    }

    #[test]
    fn removals_and_unknown_keys_are_ignored() {
        let tab = context();
        let storage = tab.storage_manager();
        storage.save_session_data("draft", &"text").unwrap();

        for ignored in [
            event("clearAllSessionsStorage", None),
            event("clearAllSessionsStorage", Some("")),
            event("draft", Some("\"changed\"")),
            StorageEvent {
                key: None,
                old_value: None,
                new_value: None,
                source: Uuid::new_v4(),
            },
        ] {
            storage.handle_storage_event(&ignored).unwrap();
        }

        assert_eq!(storage.get_data("draft").unwrap(), Some(json!("text")));
    }

    #[tokio::test]
    async fn snapshot_request_is_answered_with_session_storage() {
        let origin = Origin::open(StoreConfiguration::InMemory).unwrap();
        let tab_a = origin.open_context();
        let tab_b = origin.open_context();
        let storage = tab_a.storage_manager();
        storage.save_session_data("draft", &"text").unwrap();

        let mut events = tab_b.durable().subscribe();
        storage
            .handle_storage_event(&event("getSessionStorage", Some("_dummy")))
            .unwrap();

        let pushed = events.recv().await.unwrap();
        assert_eq!(pushed.key.as_deref(), Some("setSessionStorage"));
        assert_eq!(
            pushed.new_value.as_deref(),
            Some(r#"{"draft":"\"text\""}"#)
        );
    }

    #[tokio::test]
    async fn empty_session_storage_does_not_answer_snapshot_requests() {
        let origin = Origin::open(StoreConfiguration::InMemory).unwrap();
        let tab_a = origin.open_context();
        let tab_b = origin.open_context();
        let mut events = tab_b.durable().subscribe();

        tab_a
            .storage_manager()
            .handle_storage_event(&event("getSessionStorage", Some("_dummy")))
            .unwrap();

        let next =
            tokio::time::timeout(std::time::Duration::from_millis(50), events.recv()).await;
        assert!(next.is_err());
    }
}
