//! Application containers.
//!
//! A container owns the applications running in one isolate and drives them
//! through their lifecycle. [`SingleAppContainer`] hosts exactly one
//! application and finishes when that application is destroyed;
//! [`MultiAppContainer`] hosts any number.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use jump_messaging::{IsolateId, Message};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::app::{AppContext, AppId, AppInstance, AppLoader, AppState, Application};
use crate::error::{IsolateError, Result};
use crate::protocol::{self, AppRequest, DestroyRequest, LifecycleReply, StartRequest};

/// The four-operation lifecycle contract shared by every container.
#[async_trait]
pub trait AppContainer: Send {
    fn isolate(&self) -> IsolateId;

    /// Load and start `app`. On failure nothing of the application is left
    /// behind.
    async fn start_app(&mut self, app: Application, args: Vec<String>) -> Result<AppId>;

    /// Active -> Paused.
    async fn pause_app(&mut self, app_id: AppId) -> Result<()>;

    /// Paused -> Active.
    async fn resume_app(&mut self, app_id: AppId) -> Result<()>;

    /// Any state -> Destroyed. Destroying a destroyed application is a
    /// no-op.
    async fn destroy_app(&mut self, app_id: AppId, force: bool) -> Result<()>;

    fn app_state(&self, app_id: AppId) -> Option<AppState>;

    /// The live applications.
    fn apps(&self) -> Vec<(AppId, AppState)>;

    /// Whether the hosting isolate should terminate.
    fn is_finished(&self) -> bool;

    /// Destroy every application unconditionally.
    async fn shutdown(&mut self);

    /// Route a lifecycle message to the matching operation.
    ///
    /// Returns `None` for message types that are not lifecycle requests.
    async fn handle_message(&mut self, message: &Message) -> Option<LifecycleReply> {
        let result = match message.message_type().as_str() {
            protocol::START => match decode::<StartRequest>(message) {
                Ok(request) => self
                    .start_app(request.app, request.args)
                    .await
                    .map(|app_id| LifecycleReply::Started { app_id }),
                Err(e) => Err(e),
            },
            protocol::PAUSE => match decode::<AppRequest>(message) {
                Ok(request) => match self.pause_app(request.app_id).await {
                    Ok(()) => Ok(self.state_reply(request.app_id)),
                    Err(e) => Err(e),
                },
                Err(e) => Err(e),
            },
            protocol::RESUME => match decode::<AppRequest>(message) {
                Ok(request) => match self.resume_app(request.app_id).await {
                    Ok(()) => Ok(self.state_reply(request.app_id)),
                    Err(e) => Err(e),
                },
                Err(e) => Err(e),
            },
            protocol::DESTROY => match decode::<DestroyRequest>(message) {
                Ok(request) => match self.destroy_app(request.app_id, request.force).await {
                    Ok(()) => Ok(self.state_reply(request.app_id)),
                    Err(e) => Err(e),
                },
                Err(e) => Err(e),
            },
            other => {
                tracing::warn!(isolate = %self.isolate(), message_type = other, "ignoring message");
                return None;
            }
        };

        Some(match result {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(isolate = %self.isolate(), error = %e, "lifecycle request failed");
                LifecycleReply::failed(&e)
            }
        })
    }

    fn state_reply(&self, app_id: AppId) -> LifecycleReply {
        LifecycleReply::State {
            app_id,
            state: self.app_state(app_id).unwrap_or(AppState::Destroyed),
        }
    }
}

fn decode<T: DeserializeOwned>(message: &Message) -> Result<T> {
    Ok(message.decode()?)
}

/// Which container an isolate runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContainerKind {
    #[default]
    Single,
    Multi,
}

impl ContainerKind {
    pub fn create(self, isolate: IsolateId, loader: Arc<dyn AppLoader>) -> Box<dyn AppContainer> {
        match self {
            ContainerKind::Single => Box::new(SingleAppContainer::new(isolate, loader)),
            ContainerKind::Multi => Box::new(MultiAppContainer::new(isolate, loader)),
        }
    }
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ContainerKind::Single => "single",
            ContainerKind::Multi => "multi",
        })
    }
}

impl FromStr for ContainerKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "single" => Ok(ContainerKind::Single),
            "multi" => Ok(ContainerKind::Multi),
            other => Err(format!("expected \"single\" or \"multi\", got {other:?}")),
        }
    }
}

struct AppSlot {
    app: Application,
    state: AppState,
    instance: Box<dyn AppInstance>,
}

/// Application bookkeeping shared by both containers.
///
/// Only live applications keep a slot. Ids are handed out in order and only
/// to successful starts, so an id below `next_id` without a slot belongs to
/// a destroyed application.
struct AppTable {
    isolate: IsolateId,
    loader: Arc<dyn AppLoader>,
    next_id: u32,
    apps: BTreeMap<AppId, AppSlot>,
}

impl AppTable {
    fn new(isolate: IsolateId, loader: Arc<dyn AppLoader>) -> Self {
        Self {
            isolate,
            loader,
            next_id: 1,
            apps: BTreeMap::new(),
        }
    }

    fn has_started(&self) -> bool {
        self.next_id > 1
    }

    fn is_destroyed(&self, app_id: AppId) -> bool {
        (1..self.next_id).contains(&app_id.as_u32()) && !self.apps.contains_key(&app_id)
    }

    fn slot_mut(&mut self, app_id: AppId, operation: &'static str) -> Result<&mut AppSlot> {
        if self.is_destroyed(app_id) {
            return Err(IsolateError::InvalidTransition {
                app: app_id,
                from: AppState::Destroyed,
                operation,
            });
        }
        self.apps
            .get_mut(&app_id)
            .ok_or(IsolateError::NoSuchApp(app_id))
    }

    async fn start(&mut self, app: Application, args: Vec<String>) -> Result<AppId> {
        let app_id = AppId::new(self.next_id);

        let load_error = |e: IsolateError| IsolateError::Load {
            class_name: app.class_name.clone(),
            message: e.to_string(),
        };

        let context = AppContext::new(self.isolate, app_id, &args);
        let mut instance = self.loader.load(&app, context).map_err(load_error)?;
        tracing::debug!(isolate = %self.isolate, %app_id, %app, state = %AppState::Starting, "application loaded");

        if let Err(e) = instance.start().await {
            if let Err(cleanup) = instance.destroy(true).await {
                tracing::warn!(isolate = %self.isolate, %app_id, error = %cleanup, "cleanup after failed start failed");
            }
            return Err(load_error(e));
        }

        tracing::info!(isolate = %self.isolate, %app_id, %app, "application started");
        self.next_id += 1;
        self.apps.insert(
            app_id,
            AppSlot {
                app,
                state: AppState::Active,
                instance,
            },
        );
        Ok(app_id)
    }

    async fn pause(&mut self, app_id: AppId) -> Result<()> {
        let slot = self.slot_mut(app_id, "pause")?;
        if slot.state != AppState::Active {
            return Err(IsolateError::InvalidTransition {
                app: app_id,
                from: slot.state,
                operation: "pause",
            });
        }
        slot.instance.pause().await.map_err(|e| IsolateError::App {
            app: app_id,
            message: e.to_string(),
        })?;
        slot.state = AppState::Paused;
        tracing::debug!(%app_id, "application paused");
        Ok(())
    }

    async fn resume(&mut self, app_id: AppId) -> Result<()> {
        let slot = self.slot_mut(app_id, "resume")?;
        if slot.state != AppState::Paused {
            return Err(IsolateError::InvalidTransition {
                app: app_id,
                from: slot.state,
                operation: "resume",
            });
        }
        slot.instance.resume().await.map_err(|e| IsolateError::App {
            app: app_id,
            message: e.to_string(),
        })?;
        slot.state = AppState::Active;
        tracing::debug!(%app_id, "application resumed");
        Ok(())
    }

    async fn destroy(&mut self, app_id: AppId, force: bool) -> Result<()> {
        if self.is_destroyed(app_id) {
            return Ok(());
        }
        let mut slot = self
            .apps
            .remove(&app_id)
            .ok_or(IsolateError::NoSuchApp(app_id))?;
        if let Err(e) = slot.instance.destroy(force).await {
            tracing::warn!(%app_id, force, error = %e, "application cleanup failed");
        }
        tracing::info!(%app_id, app = %slot.app, force, "application destroyed");
        Ok(())
    }

    async fn destroy_all(&mut self) {
        let ids: Vec<AppId> = self.apps.keys().copied().collect();
        for app_id in ids {
            // Only NoSuchApp can come back, and the ids were just listed.
            let _ = self.destroy(app_id, true).await;
        }
    }

    fn state(&self, app_id: AppId) -> Option<AppState> {
        match self.apps.get(&app_id) {
            Some(slot) => Some(slot.state),
            None if self.is_destroyed(app_id) => Some(AppState::Destroyed),
            None => None,
        }
    }

    fn states(&self) -> Vec<(AppId, AppState)> {
        self.apps.iter().map(|(id, slot)| (*id, slot.state)).collect()
    }
}

/// Container for the one-application-per-isolate model.
pub struct SingleAppContainer {
    table: AppTable,
}

impl SingleAppContainer {
    pub fn new(isolate: IsolateId, loader: Arc<dyn AppLoader>) -> Self {
        Self {
            table: AppTable::new(isolate, loader),
        }
    }
}

#[async_trait]
impl AppContainer for SingleAppContainer {
    fn isolate(&self) -> IsolateId {
        self.table.isolate
    }

    async fn start_app(&mut self, app: Application, args: Vec<String>) -> Result<AppId> {
        if self.table.has_started() {
            return Err(IsolateError::ContainerBusy(self.table.isolate));
        }
        self.table.start(app, args).await
    }

    async fn pause_app(&mut self, app_id: AppId) -> Result<()> {
        self.table.pause(app_id).await
    }

    async fn resume_app(&mut self, app_id: AppId) -> Result<()> {
        self.table.resume(app_id).await
    }

    async fn destroy_app(&mut self, app_id: AppId, force: bool) -> Result<()> {
        self.table.destroy(app_id, force).await
    }

    fn app_state(&self, app_id: AppId) -> Option<AppState> {
        self.table.state(app_id)
    }

    fn apps(&self) -> Vec<(AppId, AppState)> {
        self.table.states()
    }

    fn is_finished(&self) -> bool {
        self.table.has_started() && self.table.apps.is_empty()
    }

    async fn shutdown(&mut self) {
        self.table.destroy_all().await
    }
}

/// Container hosting any number of applications in one isolate.
pub struct MultiAppContainer {
    table: AppTable,
}

impl MultiAppContainer {
    pub fn new(isolate: IsolateId, loader: Arc<dyn AppLoader>) -> Self {
        Self {
            table: AppTable::new(isolate, loader),
        }
    }
}

#[async_trait]
impl AppContainer for MultiAppContainer {
    fn isolate(&self) -> IsolateId {
        self.table.isolate
    }

    async fn start_app(&mut self, app: Application, args: Vec<String>) -> Result<AppId> {
        self.table.start(app, args).await
    }

    async fn pause_app(&mut self, app_id: AppId) -> Result<()> {
        self.table.pause(app_id).await
    }

    async fn resume_app(&mut self, app_id: AppId) -> Result<()> {
        self.table.resume(app_id).await
    }

    async fn destroy_app(&mut self, app_id: AppId, force: bool) -> Result<()> {
        self.table.destroy(app_id, force).await
    }

    fn app_state(&self, app_id: AppId) -> Option<AppState> {
        self.table.state(app_id)
    }

    fn apps(&self) -> Vec<(AppId, AppState)> {
        self.table.states()
    }

    fn is_finished(&self) -> bool {
        false
    }

    async fn shutdown(&mut self) {
        self.table.destroy_all().await
    }
}
