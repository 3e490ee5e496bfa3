//! Module factories.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::ModuleConfig;
use crate::error::Result;
use crate::module::{Module, ModuleKey, ModuleKind};

type Constructor<M> = Box<dyn Fn(&ModuleKey, &ModuleConfig) -> Result<M> + Send + Sync>;

/// Produces and caches the module instances of one kind.
///
/// Each key maps to at most one live instance. A missing instance is
/// constructed and loaded on first request; an instance that fails to load
/// is unloaded again and never cached.
pub struct ModuleFactory<M: Module> {
    kind: ModuleKind,
    config: ModuleConfig,
    constructor: Constructor<M>,
    modules: Mutex<BTreeMap<ModuleKey, Arc<M>>>,
}

impl<M: Module> ModuleFactory<M> {
    /// Create a factory. `constructor` builds a fresh, unloaded module for a
    /// key; the factory then loads it with `config`.
    pub fn new<F>(kind: ModuleKind, config: ModuleConfig, constructor: F) -> Self
    where
        F: Fn(&ModuleKey, &ModuleConfig) -> Result<M> + Send + Sync + 'static,
    {
        Self {
            kind,
            config,
            constructor: Box::new(constructor),
            modules: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn kind(&self) -> ModuleKind {
        self.kind
    }

    pub fn config(&self) -> &ModuleConfig {
        &self.config
    }

    /// Get the module for `key`, creating and loading it if needed.
    pub fn get_module(&self, key: &ModuleKey) -> Result<Arc<M>> {
        let mut modules = self.modules();
        if let Some(module) = modules.get(key) {
            return Ok(Arc::clone(module));
        }

        let module = (self.constructor)(key, &self.config)?;
        if let Err(e) = module.load(&self.config) {
            module.unload();
            tracing::warn!(kind = %self.kind, %key, error = %e, "module failed to load");
            return Err(e);
        }

        let module = Arc::new(module);
        modules.insert(key.clone(), Arc::clone(&module));
        tracing::debug!(kind = %self.kind, %key, "module loaded");
        Ok(module)
    }

    /// Shorthand for the [`ModuleKey::Default`] instance.
    pub fn get_default(&self) -> Result<Arc<M>> {
        self.get_module(&ModuleKey::Default)
    }

    /// The cached module for `key`, without creating one.
    pub fn cached(&self, key: &ModuleKey) -> Option<Arc<M>> {
        self.modules().get(key).cloned()
    }

    /// Unload and forget the module for `key`. Returns `false` if there was
    /// none.
    pub fn unload_module(&self, key: &ModuleKey) -> bool {
        let removed = self.modules().remove(key);
        match removed {
            Some(module) => {
                module.unload();
                tracing::debug!(kind = %self.kind, %key, "module unloaded");
                true
            }
            None => false,
        }
    }

    /// Unload every cached module.
    pub fn unload_all(&self) {
        let modules = std::mem::take(&mut *self.modules());
        for (key, module) in modules {
            module.unload();
            tracing::debug!(kind = %self.kind, %key, "module unloaded");
        }
    }

    pub fn loaded_keys(&self) -> Vec<ModuleKey> {
        self.modules().keys().cloned().collect()
    }

    fn modules(&self) -> MutexGuard<'_, BTreeMap<ModuleKey, Arc<M>>> {
        self.modules.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
