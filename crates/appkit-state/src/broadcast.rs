use serde::Serialize;

use crate::{
    keys::Signal,
    store::{DurableStore, Store, StoreError},
};

/// Sends signals to the other contexts of an origin over durable storage.
///
/// A signal is a write of the payload to the signal's reserved key, immediately followed by the
/// removal of that key. Both changes are observed by the other contexts only; receivers act on the
/// write and ignore the removal since it carries no value.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    durable: DurableStore,
}

impl Broadcaster {
    /// Create a broadcaster sending through `durable`.
    pub fn new(durable: DurableStore) -> Self {
        Self { durable }
    }

    /// Send `signal` with a plain text payload.
    pub fn publish(&self, signal: Signal, payload: &str) -> Result<(), StoreError> {
        log::debug!("Sending {signal} signal");
        // A key left behind by an interrupted signal would swallow an identical write.
        self.durable.remove(signal.name())?;
        self.durable.set(signal.name(), payload.to_owned())?;
        self.durable.remove(signal.name())
    }

    /// Send `signal` with a JSON encoded payload.
    pub fn publish_json<T: Serialize + ?Sized>(
        &self,
        signal: Signal,
        payload: &T,
    ) -> Result<(), crate::StorageError> {
        let payload = serde_json::to_string(payload)?;
        Ok(self.publish(signal, &payload)?)
    }
}
