//! The push-registry module.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use jump_content_store::StoreModule;
use jump_module::{Module, ModuleConfig, ModuleError, ModuleFactory, ModuleKind};
use tokio::runtime::Handle;

use crate::alarms::AlarmRegistry;
use crate::connections::{ConnectionRegistry, ReservationFactory};
use crate::error::{PushError, Result};
use crate::store::PushStore;
use crate::suite::LifecycleAdapter;

/// Whether loading the module re-enables persisted connections and alarms.
/// Defaults to `true`.
pub const RESTORE_PROPERTY: &str = "push.restore-on-load";

struct Registries {
    store: Arc<PushStore>,
    connections: Arc<ConnectionRegistry>,
    alarms: Arc<AlarmRegistry>,
}

/// Owns the push store and both registries.
///
/// Loading opens an exclusive handle on the content store module's store
/// and must happen within a Tokio runtime. Launches and alarms run on that
/// runtime.
pub struct PushRegistryModule {
    store: Arc<StoreModule>,
    reservations: Arc<dyn ReservationFactory>,
    lifecycle: Arc<dyn LifecycleAdapter>,
    loaded: Mutex<Option<Registries>>,
}

impl PushRegistryModule {
    pub fn new(
        store: Arc<StoreModule>,
        reservations: Arc<dyn ReservationFactory>,
        lifecycle: Arc<dyn LifecycleAdapter>,
    ) -> Self {
        Self {
            store,
            reservations,
            lifecycle,
            loaded: Mutex::new(None),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded().is_some()
    }

    pub fn connections(&self) -> Result<Arc<ConnectionRegistry>> {
        self.loaded()
            .as_ref()
            .map(|r| Arc::clone(&r.connections))
            .ok_or(PushError::NotLoaded)
    }

    pub fn alarms(&self) -> Result<Arc<AlarmRegistry>> {
        self.loaded()
            .as_ref()
            .map(|r| Arc::clone(&r.alarms))
            .ok_or(PushError::NotLoaded)
    }

    pub fn push_store(&self) -> Result<Arc<PushStore>> {
        self.loaded()
            .as_ref()
            .map(|r| Arc::clone(&r.store))
            .ok_or(PushError::NotLoaded)
    }

    fn open(&self, restore: bool, runtime: Handle) -> Result<Registries> {
        let handle = self.store.open_store(true)?;
        let store = Arc::new(PushStore::open(handle)?);
        let connections = Arc::new(ConnectionRegistry::new(
            Arc::clone(&store),
            Arc::clone(&self.reservations),
            Arc::clone(&self.lifecycle),
            runtime,
        ));
        let alarms = Arc::new(AlarmRegistry::new(
            Arc::clone(&store),
            Arc::clone(&self.lifecycle),
        ));
        if restore {
            let enabled = connections.enable_all();
            let scheduled = alarms.read_alarms()?;
            tracing::info!(enabled, scheduled, "push registrations restored");
        }
        Ok(Registries {
            store,
            connections,
            alarms,
        })
    }

    fn loaded(&self) -> MutexGuard<'_, Option<Registries>> {
        self.loaded.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Module for PushRegistryModule {
    fn load(&self, config: &ModuleConfig) -> jump_module::Result<()> {
        let restore: bool = config.parse_or(RESTORE_PROPERTY, true)?;
        let runtime = Handle::try_current().map_err(|_| {
            ModuleError::load(ModuleKind::PushRegistry, "no Tokio runtime to launch on")
        })?;
        let registries = self
            .open(restore, runtime)
            .map_err(|e| ModuleError::load(ModuleKind::PushRegistry, e.to_string()))?;
        *self.loaded() = Some(registries);
        Ok(())
    }

    fn unload(&self) {
        let Some(registries) = self.loaded().take() else {
            return;
        };
        registries.alarms.dispose();
        registries.connections.dispose();
        registries.store.close();
        tracing::debug!("push registry module unloaded");
    }
}

pub fn push_registry_factory(
    config: ModuleConfig,
    store: Arc<StoreModule>,
    reservations: Arc<dyn ReservationFactory>,
    lifecycle: Arc<dyn LifecycleAdapter>,
) -> ModuleFactory<PushRegistryModule> {
    ModuleFactory::new(ModuleKind::PushRegistry, config, move |_, _| {
        Ok(PushRegistryModule::new(
            Arc::clone(&store),
            Arc::clone(&reservations),
            Arc::clone(&lifecycle),
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suite::{ConnectionInfo, SuiteId};
    use crate::testing::{Launches, MockFactory};

    fn loaded_store() -> Arc<StoreModule> {
        let store = Arc::new(StoreModule::new());
        store.load(&ModuleConfig::new()).unwrap();
        store
    }

    #[tokio::test]
    async fn unloaded_module_has_no_registries() {
        let module = PushRegistryModule::new(
            loaded_store(),
            Arc::new(MockFactory::default()),
            Arc::new(Launches::default()),
        );
        assert!(matches!(module.connections(), Err(PushError::NotLoaded)));
        assert!(!module.is_loaded());
    }

    #[tokio::test]
    async fn reload_restores_connections() {
        let store = loaded_store();
        let factory = Arc::new(MockFactory::default());
        let push = push_registry_factory(
            ModuleConfig::new(),
            Arc::clone(&store),
            factory.clone(),
            Arc::new(Launches::default()),
        );

        let module = push.get_default().unwrap();
        module
            .connections()
            .unwrap()
            .register_connection(SuiteId::new(1), ConnectionInfo::new("socket://:79", "A", "*"))
            .unwrap();
        let first = factory.reservation("socket://:79").unwrap();

        push.unload_all();
        assert!(first.is_cancelled());
        assert!(!module.is_loaded());

        let module = push.get_default().unwrap();
        assert_eq!(
            module.connections().unwrap().list_connections(SuiteId::new(1), false),
            vec!["socket://:79"]
        );
        assert!(!factory.reservation("socket://:79").unwrap().is_cancelled());
    }

    #[tokio::test]
    async fn restore_can_be_disabled() {
        let store = loaded_store();
        {
            let handle = store.open_store(true).unwrap();
            let push = PushStore::open(handle).unwrap();
            push.add_connection(SuiteId::new(1), ConnectionInfo::new("socket://:79", "A", "*"))
                .unwrap();
        }

        let module = PushRegistryModule::new(
            store,
            Arc::new(MockFactory::default()),
            Arc::new(Launches::default()),
        );
        module
            .load(&ModuleConfig::new().with(RESTORE_PROPERTY, "false"))
            .unwrap();
        let connections = module.connections().unwrap();
        assert!(connections.list_connections(SuiteId::new(1), false).is_empty());
        assert_eq!(connections.enable_connections(SuiteId::new(1)), 1);
    }

    #[test]
    fn loading_outside_a_runtime_fails() {
        let module = PushRegistryModule::new(
            loaded_store(),
            Arc::new(MockFactory::default()),
            Arc::new(Launches::default()),
        );
        assert!(matches!(
            module.load(&ModuleConfig::new()),
            Err(ModuleError::Load {
                kind: ModuleKind::PushRegistry,
                ..
            })
        ));
    }
}
