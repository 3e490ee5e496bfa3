//! Booting the executive.

use std::sync::Arc;

use jump_content_store::{store_factory, StoreModule};
use jump_isolate::{
    lifecycle_factory, AppId, AppLoader, Application, ContainerKind, LifecycleModule,
};
use jump_messaging::{InProcessTransport, IsolateId, DEFAULT_QUEUE_CAPACITY};
use jump_module::{
    presentation_factory, service_registry_factory, AppHandle, Module, ModuleRegistry,
    PresentationModes, PresentationModule, ServiceRegistryModule, WindowId,
};
use jump_push_registry::{push_registry_factory, PushRegistryModule};

use crate::config::{ExecutiveConfig, QUEUE_CAPACITY_PROPERTY};
use crate::connections::SimulatedConnections;
use crate::demo::DemoLoader;
use crate::error::Result;
use crate::launcher::IsolateLauncher;

/// The running executive: one loaded module of every kind.
pub struct Executive {
    config: ExecutiveConfig,
    registry: ModuleRegistry,
    transport: Arc<InProcessTransport>,
    connections: Arc<SimulatedConnections>,
    launcher: Arc<IsolateLauncher>,
    store: Arc<StoreModule>,
    lifecycle: Arc<LifecycleModule>,
    presentation: Arc<PresentationModule>,
    services: Arc<ServiceRegistryModule>,
    push: Arc<PushRegistryModule>,
}

impl Executive {
    /// Boot with the built-in demo applications.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn boot(config: ExecutiveConfig) -> Result<Self> {
        Self::boot_with(config, |presentation| {
            Arc::new(DemoLoader::with_presentation(presentation))
        })
    }

    /// Boot with the application loader built by `loader`.
    pub fn boot_with<F>(config: ExecutiveConfig, loader: F) -> Result<Self>
    where
        F: FnOnce(Arc<PresentationModule>) -> Arc<dyn AppLoader>,
    {
        config.validate()?;
        let registry = ModuleRegistry::new(config.module_config());
        let properties = registry.config().clone();
        let capacity = properties.parse_or(QUEUE_CAPACITY_PROPERTY, DEFAULT_QUEUE_CAPACITY)?;
        let transport = Arc::new(InProcessTransport::new(capacity));

        let store = registry
            .install(store_factory(properties.clone()))?
            .get_default()?;
        let presentation = registry
            .install(presentation_factory(
                PresentationModes::builtin(),
                properties.clone(),
            ))?
            .get_default()?;
        let services = registry
            .install(service_registry_factory(properties.clone()))?
            .get_default()?;
        let lifecycle = registry
            .install(lifecycle_factory(
                properties.clone(),
                transport.clone(),
                loader(Arc::clone(&presentation)),
            ))?
            .get_default()?;

        let launcher = Arc::new(IsolateLauncher::new(Arc::clone(&lifecycle)));
        let connections = Arc::new(SimulatedConnections::new());
        let push = registry
            .install(push_registry_factory(
                properties,
                Arc::clone(&store),
                connections.clone(),
                launcher.clone(),
            ))?
            .get_default()?;

        tracing::info!(
            modules = registry.installed().len(),
            presentation = presentation.presentation().mode(),
            container = %lifecycle.default_container(),
            "executive booted"
        );
        Ok(Self {
            config,
            registry,
            transport,
            connections,
            launcher,
            store,
            lifecycle,
            presentation,
            services,
            push,
        })
    }

    pub fn config(&self) -> &ExecutiveConfig {
        &self.config
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn transport(&self) -> &Arc<InProcessTransport> {
        &self.transport
    }

    pub fn store(&self) -> &Arc<StoreModule> {
        &self.store
    }

    pub fn lifecycle(&self) -> &Arc<LifecycleModule> {
        &self.lifecycle
    }

    pub fn presentation(&self) -> &Arc<PresentationModule> {
        &self.presentation
    }

    pub fn services(&self) -> &Arc<ServiceRegistryModule> {
        &self.services
    }

    pub fn push(&self) -> &Arc<PushRegistryModule> {
        &self.push
    }

    /// The simulated connection layer behind the push registry.
    pub fn connections(&self) -> &Arc<SimulatedConnections> {
        &self.connections
    }

    /// Applications launched by push events.
    pub fn launcher(&self) -> &Arc<IsolateLauncher> {
        &self.launcher
    }

    /// Start `app` in a new isolate.
    pub async fn launch(
        &self,
        app: Application,
        args: Vec<String>,
        container: Option<ContainerKind>,
    ) -> Result<(IsolateId, AppId)> {
        let isolate = self.lifecycle.new_isolate(container)?;
        let app_id = self.lifecycle.client().start_app(isolate, app, args).await?;
        Ok((isolate, app_id))
    }

    /// The windows `app_id` in `isolate` has open.
    pub fn get_app_windows(&self, isolate: IsolateId, app_id: AppId) -> Vec<WindowId> {
        self.presentation.presentation().app_windows(AppHandle {
            isolate,
            app_id: app_id.as_u32(),
        })
    }

    /// Terminate every isolate and unload every module.
    pub async fn shutdown(self) {
        self.push.unload();
        for isolate in self.lifecycle.isolates() {
            let live = self
                .lifecycle
                .isolate_state(isolate)
                .is_some_and(|state| !state.is_terminal());
            if live {
                if let Err(e) = self.lifecycle.terminate_isolate(isolate).await {
                    tracing::warn!(%isolate, error = %e, "isolate not terminated");
                }
            }
            self.services.unregister_isolate(isolate);
        }
        self.registry.unload_all();
        tracing::info!("executive shut down");
    }
}
