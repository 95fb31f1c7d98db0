#![doc = include_str!("../README.md")]

/// Key/value stores backing both storage tiers.
pub mod store;

mod broadcast;
mod context;
mod json;
mod keys;
mod listener;
mod manager;
mod sync;
mod sync_keys;

pub use broadcast::Broadcaster;
pub use context::{BrowsingContext, Origin};
pub use keys::{validate_key, InvalidKeyError, Signal, DBKEY_SYNC_KEYS};
pub use listener::InitEvent;
pub use manager::{LocalStoreManager, StorageError};
pub use store::{StorageEvent, Store, StoreConfiguration, StoreError};
pub use sync_keys::SyncKeyRegistry;
