//! Service registry module.
//!
//! Maps service names to the isolate that provides them.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use jump_messaging::IsolateId;

use crate::config::ModuleConfig;
use crate::error::{ModuleError, Result};
use crate::factory::ModuleFactory;
use crate::module::{Module, ModuleKind};

pub const PORT_PROPERTY: &str = "service-registry.port";
pub const DEFAULT_PORT: u16 = 1099;

/// Registry of named services.
pub struct ServiceRegistryModule {
    // u32 so that "unset" fits next to every valid port.
    port: AtomicU32,
    loaded: AtomicBool,
    services: Mutex<BTreeMap<String, IsolateId>>,
}

const NO_PORT: u32 = u32::MAX;

impl ServiceRegistryModule {
    pub fn new() -> Self {
        Self {
            port: AtomicU32::new(NO_PORT),
            loaded: AtomicBool::new(false),
            services: Mutex::new(BTreeMap::new()),
        }
    }

    /// The configured port, once loaded.
    pub fn port(&self) -> Option<u16> {
        match self.port.load(Ordering::Acquire) {
            NO_PORT => None,
            port => u16::try_from(port).ok(),
        }
    }

    /// Bind `name` to `provider`.
    pub fn register(&self, name: impl Into<String>, provider: IsolateId) -> Result<()> {
        let name = name.into();
        let mut services = self.table();
        if services.contains_key(&name) {
            return Err(ModuleError::DuplicateService(name));
        }
        tracing::debug!(service = %name, %provider, "service registered");
        services.insert(name, provider);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<IsolateId> {
        self.table().get(name).copied()
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.table().remove(name).is_some()
    }

    /// Drop every service provided by `isolate`. Returns how many were
    /// removed.
    pub fn unregister_isolate(&self, isolate: IsolateId) -> usize {
        let mut services = self.table();
        let before = services.len();
        services.retain(|_, provider| *provider != isolate);
        before - services.len()
    }

    /// Snapshot of every registered service, sorted by name.
    pub fn services(&self) -> Vec<(String, IsolateId)> {
        self.table()
            .iter()
            .map(|(name, provider)| (name.clone(), *provider))
            .collect()
    }

    fn table(&self) -> MutexGuard<'_, BTreeMap<String, IsolateId>> {
        self.services.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ServiceRegistryModule {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for ServiceRegistryModule {
    fn load(&self, config: &ModuleConfig) -> Result<()> {
        let port: u16 = config.parse_or(PORT_PROPERTY, DEFAULT_PORT)?;
        self.port.store(u32::from(port), Ordering::Release);
        self.loaded.store(true, Ordering::Release);
        tracing::debug!(port, "service registry loaded");
        Ok(())
    }

    fn unload(&self) {
        if self.loaded.swap(false, Ordering::AcqRel) {
            self.table().clear();
            self.port.store(NO_PORT, Ordering::Release);
        }
    }
}

pub fn service_registry_factory(config: ModuleConfig) -> ModuleFactory<ServiceRegistryModule> {
    ModuleFactory::new(ModuleKind::ServiceRegistry, config, |_, _| {
        Ok(ServiceRegistryModule::new())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_comes_from_config() {
        let factory =
            service_registry_factory(ModuleConfig::new().with(PORT_PROPERTY, "4321"));
        let module = factory.get_default().unwrap();
        assert_eq!(module.port(), Some(4321));
    }

    #[test]
    fn default_port() {
        let factory = service_registry_factory(ModuleConfig::new());
        assert_eq!(factory.get_default().unwrap().port(), Some(DEFAULT_PORT));
    }

    #[test]
    fn bad_port_fails_load() {
        let factory = service_registry_factory(ModuleConfig::new().with(PORT_PROPERTY, "99999"));
        assert!(matches!(
            factory.get_default(),
            Err(ModuleError::InvalidProperty { .. })
        ));
    }

    #[test]
    fn register_lookup_unregister() {
        let registry = ServiceRegistryModule::new();
        registry.register("clock", IsolateId::new(2)).unwrap();
        assert!(matches!(
            registry.register("clock", IsolateId::new(3)),
            Err(ModuleError::DuplicateService(_))
        ));
        assert_eq!(registry.lookup("clock"), Some(IsolateId::new(2)));
        assert!(registry.unregister("clock"));
        assert!(!registry.unregister("clock"));
        assert_eq!(registry.lookup("clock"), None);
    }

    #[test]
    fn isolate_teardown_drops_its_services() {
        let registry = ServiceRegistryModule::new();
        registry.register("a", IsolateId::new(2)).unwrap();
        registry.register("b", IsolateId::new(2)).unwrap();
        registry.register("c", IsolateId::new(3)).unwrap();
        assert_eq!(registry.unregister_isolate(IsolateId::new(2)), 2);
        assert_eq!(registry.services(), vec![("c".to_string(), IsolateId::new(3))]);
    }

    #[test]
    fn listing_does_not_hold_the_registry() {
        let registry = ServiceRegistryModule::new();
        registry.register("a", IsolateId::new(2)).unwrap();
        let listed = registry.services();
        registry.register("b", IsolateId::new(3)).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(registry.services().len(), 2);
    }

    #[test]
    fn unload_clears_and_is_idempotent() {
        let registry = ServiceRegistryModule::new();
        registry.load(&ModuleConfig::new()).unwrap();
        registry.register("a", IsolateId::new(2)).unwrap();
        registry.unload();
        registry.unload();
        assert!(registry.services().is_empty());
        assert_eq!(registry.port(), None);
    }
}
