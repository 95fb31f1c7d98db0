use std::sync::Arc;

use uuid::Uuid;

use crate::{
    listener::ListenerGuard,
    manager::LocalStoreManager,
    store::{
        DurableArea, DurableStore, MemoryStore, SqliteStore, Store, StoreConfiguration, StoreError,
    },
};

/// The scope shared by a set of browsing contexts: they all see the same durable storage.
#[derive(Debug, Clone)]
pub struct Origin {
    area: Arc<DurableArea>,
}

impl Origin {
    /// Open the durable storage described by `configuration`.
    pub fn open(configuration: StoreConfiguration) -> Result<Self, StoreError> {
        let backend: Box<dyn Store> = match configuration {
            StoreConfiguration::InMemory => Box::new(MemoryStore::new()),
            StoreConfiguration::Sqlite { file_path } => Box::new(SqliteStore::open(&file_path)?),
        };
        log::debug!("Opened origin storage");

        Ok(Self {
            area: Arc::new(DurableArea::new(backend)),
        })
    }

    /// Open a new browsing context with empty session storage.
    pub fn open_context(&self) -> BrowsingContext {
        let id = Uuid::new_v4();
        BrowsingContext {
            id,
            ephemeral: Arc::new(MemoryStore::new()),
            durable: DurableStore::new(self.area.clone(), id),
            listener: Arc::new(ListenerGuard::default()),
        }
    }
}

/// A single page (tab or window) of an origin.
///
/// A context owns its session storage and its storage sync listener slot. Every storage manager
/// created from the same context shares both.
#[derive(Debug, Clone)]
pub struct BrowsingContext {
    id: Uuid,
    ephemeral: Arc<MemoryStore>,
    durable: DurableStore,
    listener: Arc<ListenerGuard>,
}

impl BrowsingContext {
    /// The unique id of this context.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// This context's session storage.
    pub fn ephemeral(&self) -> &MemoryStore {
        &self.ephemeral
    }

    /// This context's view of the origin's durable storage.
    pub fn durable(&self) -> &DurableStore {
        &self.durable
    }

    /// Create a storage manager for this context.
    pub fn storage_manager(&self) -> LocalStoreManager {
        LocalStoreManager::new(
            self.ephemeral.clone(),
            self.durable.clone(),
            self.listener.clone(),
        )
    }
}
