//! The lifecycle module.
//!
//! Owns the isolate arena: every isolate gets a stable integer id, a message
//! queue, a container, and a runner. Entries are removed explicitly, never
//! by drop order.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use jump_messaging::{IsolateId, MessageQueue, Transport};
use jump_module::{Module, ModuleConfig, ModuleFactory, ModuleKind};

use crate::app::AppLoader;
use crate::client::LifecycleClient;
use crate::container::ContainerKind;
use crate::error::{IsolateError, Result};
use crate::runner::IsolateRunner;
use crate::state::IsolateState;

pub const CONTAINER_PROPERTY: &str = "lifecycle.container";
pub const TIMEOUT_PROPERTY: &str = "lifecycle.timeout-ms";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum number of live isolates.
pub const MAX_ISOLATES: usize = 256;

#[derive(Debug, Clone, Copy)]
struct Settings {
    container: ContainerKind,
    timeout: Duration,
}

struct IsolateEntry {
    kind: ContainerKind,
    runner: Arc<IsolateRunner>,
}

struct IsolateArena {
    next: u32,
    entries: BTreeMap<IsolateId, IsolateEntry>,
}

/// Creates, tracks, and terminates isolates.
pub struct LifecycleModule {
    transport: Arc<dyn Transport>,
    loader: Arc<dyn AppLoader>,
    executive: Arc<MessageQueue>,
    settings: Mutex<Settings>,
    arena: Mutex<IsolateArena>,
}

impl LifecycleModule {
    pub fn new(transport: Arc<dyn Transport>, loader: Arc<dyn AppLoader>) -> Self {
        let executive = Arc::new(MessageQueue::new(IsolateId::EXECUTIVE, Arc::clone(&transport)));
        Self {
            transport,
            loader,
            executive,
            settings: Mutex::new(Settings {
                container: ContainerKind::default(),
                timeout: DEFAULT_TIMEOUT,
            }),
            arena: Mutex::new(IsolateArena {
                next: 1,
                entries: BTreeMap::new(),
            }),
        }
    }

    /// The container kind new isolates get by default.
    pub fn default_container(&self) -> ContainerKind {
        self.settings().container
    }

    pub fn timeout(&self) -> Duration {
        self.settings().timeout
    }

    /// A client for driving applications from the executive.
    pub fn client(&self) -> LifecycleClient {
        LifecycleClient::new(Arc::clone(&self.executive), self.timeout())
    }

    /// Allocate an isolate and start its runner.
    ///
    /// `container` overrides the configured container kind. Must be called
    /// from within a Tokio runtime.
    pub fn new_isolate(&self, container: Option<ContainerKind>) -> Result<IsolateId> {
        let kind = container.unwrap_or_else(|| self.default_container());
        let mut arena = self.arena();

        let live = arena
            .entries
            .values()
            .filter(|e| !e.runner.state().is_terminal())
            .count();
        if live >= MAX_ISOLATES {
            return Err(IsolateError::ArenaFull(live));
        }

        let id = IsolateId::new(arena.next);
        let queue = Arc::new(MessageQueue::new(id, Arc::clone(&self.transport)));
        let runner = IsolateRunner::start(queue, kind.create(id, Arc::clone(&self.loader)))?;
        arena.next += 1;
        arena.entries.insert(
            id,
            IsolateEntry {
                kind,
                runner: Arc::new(runner),
            },
        );
        tracing::info!(isolate = %id, container = %kind, "isolate created");
        Ok(id)
    }

    /// Destroy every application in the isolate and stop its runner.
    pub async fn terminate_isolate(&self, id: IsolateId) -> Result<()> {
        let runner = self.runner(id)?;
        runner.shutdown().await;
        Ok(())
    }

    pub fn isolate_state(&self, id: IsolateId) -> Option<IsolateState> {
        self.arena().entries.get(&id).map(|e| e.runner.state())
    }

    pub fn container_kind(&self, id: IsolateId) -> Option<ContainerKind> {
        self.arena().entries.get(&id).map(|e| e.kind)
    }

    /// Ids of every isolate in the arena, including destroyed ones not yet
    /// reaped.
    pub fn isolates(&self) -> Vec<IsolateId> {
        self.arena().entries.keys().copied().collect()
    }

    pub fn runner(&self, id: IsolateId) -> Result<Arc<IsolateRunner>> {
        self.arena()
            .entries
            .get(&id)
            .map(|e| Arc::clone(&e.runner))
            .ok_or(IsolateError::NoSuchIsolate(id))
    }

    /// Drop destroyed isolates from the arena. Returns how many were
    /// removed.
    pub fn reap(&self) -> usize {
        let mut arena = self.arena();
        let before = arena.entries.len();
        arena
            .entries
            .retain(|_, e| !e.runner.state().is_terminal());
        before - arena.entries.len()
    }

    fn settings(&self) -> MutexGuard<'_, Settings> {
        self.settings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn arena(&self) -> MutexGuard<'_, IsolateArena> {
        self.arena.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Module for LifecycleModule {
    fn load(&self, config: &ModuleConfig) -> jump_module::Result<()> {
        let container = config.parse_or(CONTAINER_PROPERTY, ContainerKind::default())?;
        let timeout_ms: u64 = config.parse_or(
            TIMEOUT_PROPERTY,
            u64::try_from(DEFAULT_TIMEOUT.as_millis()).unwrap_or(u64::MAX),
        )?;
        *self.settings() = Settings {
            container,
            timeout: Duration::from_millis(timeout_ms),
        };
        tracing::debug!(%container, timeout_ms, "lifecycle module loaded");
        Ok(())
    }

    fn unload(&self) {
        let entries = std::mem::take(&mut self.arena().entries);
        for (id, entry) in entries {
            entry.runner.abort();
            tracing::debug!(isolate = %id, "isolate dropped on unload");
        }
    }
}

pub fn lifecycle_factory(
    config: ModuleConfig,
    transport: Arc<dyn Transport>,
    loader: Arc<dyn AppLoader>,
) -> ModuleFactory<LifecycleModule> {
    ModuleFactory::new(ModuleKind::Lifecycle, config, move |_, _| {
        Ok(LifecycleModule::new(
            Arc::clone(&transport),
            Arc::clone(&loader),
        ))
    })
}
