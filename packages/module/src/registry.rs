//! The process-wide module registry.
//!
//! Instead of one static singleton per factory, startup code builds a single
//! [`ModuleRegistry`] and passes it to whoever needs modules. The registry
//! holds at most one factory per [`ModuleKind`]; the slot is filled lazily
//! and the first caller to fill it wins.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::ModuleConfig;
use crate::error::{ModuleError, Result};
use crate::factory::ModuleFactory;
use crate::module::{Module, ModuleKind};

/// Type-erased view of a factory, so the registry can hold factories of
/// different module types.
trait ErasedFactory: Send + Sync {
    fn unload_all(&self);
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<M: Module> ErasedFactory for ModuleFactory<M> {
    fn unload_all(&self) {
        ModuleFactory::unload_all(self)
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Registry of module factories, one per kind.
pub struct ModuleRegistry {
    config: ModuleConfig,
    factories: Mutex<BTreeMap<ModuleKind, Arc<dyn ErasedFactory>>>,
}

impl ModuleRegistry {
    /// Create an empty registry. `config` is the property map handed to
    /// factory initializers.
    pub fn new(config: ModuleConfig) -> Self {
        Self {
            config,
            factories: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn config(&self) -> &ModuleConfig {
        &self.config
    }

    /// Get the factory for `kind`, creating it with `init` if the slot is
    /// empty.
    ///
    /// Creation happens under the registry lock, so concurrent callers all
    /// receive the same factory and `init` runs at most once per kind.
    pub fn get_or_init<M, F>(&self, kind: ModuleKind, init: F) -> Result<Arc<ModuleFactory<M>>>
    where
        M: Module,
        F: FnOnce(&ModuleConfig) -> ModuleFactory<M>,
    {
        let mut factories = self.factories();
        if let Some(existing) = factories.get(&kind) {
            return downcast(kind, Arc::clone(existing));
        }

        let factory = Arc::new(init(&self.config));
        factories.insert(kind, Arc::clone(&factory) as Arc<dyn ErasedFactory>);
        tracing::debug!(%kind, "factory installed");
        Ok(factory)
    }

    /// Install a ready-made factory. If the slot is already taken the new
    /// factory is dropped and the existing one is returned.
    pub fn install<M: Module>(&self, factory: ModuleFactory<M>) -> Result<Arc<ModuleFactory<M>>> {
        let kind = factory.kind();
        self.get_or_init(kind, move |_| factory)
    }

    /// The factory for `kind`, if one has been installed.
    pub fn factory<M: Module>(&self, kind: ModuleKind) -> Result<Arc<ModuleFactory<M>>> {
        let existing = self
            .factories()
            .get(&kind)
            .cloned()
            .ok_or(ModuleError::NotInstalled(kind))?;
        downcast(kind, existing)
    }

    pub fn is_installed(&self, kind: ModuleKind) -> bool {
        self.factories().contains_key(&kind)
    }

    pub fn installed(&self) -> Vec<ModuleKind> {
        self.factories().keys().copied().collect()
    }

    /// Unload the modules of every factory, in reverse kind order.
    pub fn unload_all(&self) {
        let factories: Vec<_> = self.factories().values().cloned().collect();
        for factory in factories.iter().rev() {
            factory.unload_all();
        }
    }

    fn factories(&self) -> MutexGuard<'_, BTreeMap<ModuleKind, Arc<dyn ErasedFactory>>> {
        self.factories.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn downcast<M: Module>(
    kind: ModuleKind,
    factory: Arc<dyn ErasedFactory>,
) -> Result<Arc<ModuleFactory<M>>> {
    factory
        .into_any()
        .downcast::<ModuleFactory<M>>()
        .map_err(|_| ModuleError::FactoryTypeMismatch(kind))
}
