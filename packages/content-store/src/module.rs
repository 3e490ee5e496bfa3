//! The store module.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use jump_module::{Module, ModuleConfig, ModuleError, ModuleFactory, ModuleKind};

use crate::error::{Result, StoreError};
use crate::handle::{HandleState, StoreHandle};
use crate::local::FileContentStore;
use crate::memory::InMemoryContentStore;
use crate::store::ContentStore;

/// Configuration key for the on-disk store root. Without it the module
/// keeps its store in memory.
pub const ROOT_PROPERTY: &str = "store.root";

/// Module that owns a content store and hands out handles to it.
pub struct StoreModule {
    preset: Option<Arc<dyn ContentStore>>,
    store: Mutex<Option<Arc<dyn ContentStore>>>,
    handles: Mutex<Vec<Weak<HandleState>>>,
}

impl StoreModule {
    /// A module whose backend is chosen from its configuration at load time.
    pub fn new() -> Self {
        Self {
            preset: None,
            store: Mutex::new(None),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// A module that always serves `store`, whatever its configuration says.
    pub fn with_store(store: Arc<dyn ContentStore>) -> Self {
        Self {
            preset: Some(store),
            ..Self::new()
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.store().is_some()
    }

    /// Open a handle on the store; `exclusive` handles may mutate.
    pub fn open_store(&self, exclusive: bool) -> Result<StoreHandle> {
        let store = self.store().clone().ok_or(StoreError::NotLoaded)?;
        let handle = StoreHandle::new(store, exclusive);

        let mut handles = self.handles();
        handles.retain(|h| h.strong_count() > 0);
        handles.push(Arc::downgrade(handle.state()));
        Ok(handle)
    }

    /// Number of handles opened through this module that are still open.
    pub fn open_handles(&self) -> usize {
        let mut handles = self.handles();
        handles.retain(|h| h.strong_count() > 0);
        handles.len()
    }

    fn store(&self) -> MutexGuard<'_, Option<Arc<dyn ContentStore>>> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handles(&self) -> MutexGuard<'_, Vec<Weak<HandleState>>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for StoreModule {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for StoreModule {
    fn load(&self, config: &ModuleConfig) -> jump_module::Result<()> {
        let store: Arc<dyn ContentStore> = match (&self.preset, config.get(ROOT_PROPERTY)) {
            (Some(store), _) => Arc::clone(store),
            (None, Some(root)) => {
                let store = FileContentStore::open(root)
                    .map_err(|e| ModuleError::load(ModuleKind::Store, e.to_string()))?;
                tracing::info!(root, "content store opened");
                Arc::new(store)
            }
            (None, None) => {
                tracing::info!("content store kept in memory");
                Arc::new(InMemoryContentStore::new())
            }
        };
        *self.store() = Some(store);
        Ok(())
    }

    fn unload(&self) {
        if self.store().take().is_none() {
            return;
        }
        let handles = std::mem::take(&mut *self.handles());
        let closed = handles
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|state| state.close())
            .count();
        tracing::debug!(closed, "store module unloaded");
    }
}

pub fn store_factory(config: ModuleConfig) -> ModuleFactory<StoreModule> {
    ModuleFactory::new(ModuleKind::Store, config, |_, _| Ok(StoreModule::new()))
}
