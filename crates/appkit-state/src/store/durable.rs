use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use uuid::Uuid;

use super::{Store, StoreError};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A change notification for the durable storage of an origin.
///
/// Notifications are only delivered to the contexts that did not make the change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    /// The changed key, or `None` when the whole storage was cleared.
    pub key: Option<String>,
    /// The value before the change.
    pub old_value: Option<String>,
    /// The value after the change, `None` when the key was removed.
    pub new_value: Option<String>,
    /// The context that made the change.
    pub source: Uuid,
}

/// The durable storage shared by every context of an origin, together with its change channel.
pub(crate) struct DurableArea {
    backend: Box<dyn Store>,
    events: broadcast::Sender<StorageEvent>,
    // Serializes mutations so notifications are sent in the order the changes were applied.
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for DurableArea {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableArea").finish()
    }
}

impl DurableArea {
    pub(crate) fn new(backend: Box<dyn Store>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            backend,
            events,
            write_lock: Mutex::new(()),
        }
    }
}

/// One context's view of the durable storage of its origin.
///
/// Every mutation that actually changes the stored data notifies the other contexts of the
/// origin. Writing a value identical to the current one, removing an absent key or clearing an
/// empty storage does not notify anyone.
#[derive(Debug, Clone)]
pub struct DurableStore {
    area: Arc<DurableArea>,
    context_id: Uuid,
}

impl DurableStore {
    pub(crate) fn new(area: Arc<DurableArea>, context_id: Uuid) -> Self {
        Self { area, context_id }
    }

    /// The id of the context this view belongs to.
    pub fn context_id(&self) -> Uuid {
        self.context_id
    }

    /// Subscribe to changes made by the other contexts of the origin.
    ///
    /// The receiver buffers notifications from its creation onwards.
    pub fn subscribe(&self) -> StorageEventReceiver {
        StorageEventReceiver {
            receiver: self.area.events.subscribe(),
            context_id: self.context_id,
        }
    }

    fn notify(&self, key: Option<&str>, old_value: Option<String>, new_value: Option<String>) {
        // Sending only fails when no context is listening.
        let _ = self.area.events.send(StorageEvent {
            key: key.map(ToOwned::to_owned),
            old_value,
            new_value,
            source: self.context_id,
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.area
            .write_lock
            .lock()
            .expect("Mutex should not be poisoned")
    }
}

impl Store for DurableStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.area.backend.get(key)
    }

    fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        let _guard = self.lock();
        let old_value = self.area.backend.get(key)?;
        if old_value.as_deref() == Some(value.as_str()) {
            return Ok(());
        }

        self.area.backend.set(key, value.clone())?;
        self.notify(Some(key), old_value, Some(value));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let _guard = self.lock();
        let Some(old_value) = self.area.backend.get(key)? else {
            return Ok(());
        };

        self.area.backend.remove(key)?;
        self.notify(Some(key), Some(old_value), None);
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let _guard = self.lock();
        if self.area.backend.is_empty()? {
            return Ok(());
        }

        self.area.backend.clear()?;
        self.notify(None, None, None);
        Ok(())
    }

    fn len(&self) -> Result<usize, StoreError> {
        self.area.backend.len()
    }

    fn entries(&self) -> Result<Vec<(String, String)>, StoreError> {
        self.area.backend.entries()
    }
}

/// Receives the durable storage changes made by the other contexts of an origin.
#[derive(Debug)]
pub struct StorageEventReceiver {
    receiver: broadcast::Receiver<StorageEvent>,
    context_id: Uuid,
}

impl StorageEventReceiver {
    /// Wait for the next change made by another context.
    pub async fn recv(&mut self) -> Result<StorageEvent, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if event.source != self.context_id {
                return Ok(event);
            }
        }
    }
}
