//! # JUMP Isolates
//!
//! Isolates are the process-like execution contexts applications run in.
//! The [`LifecycleModule`] allocates isolates, gives each one a message
//! queue and an application container, and starts an [`IsolateRunner`] that
//! serves lifecycle requests. The executive drives applications through a
//! [`LifecycleClient`]:
//!
//! ```rust,ignore
//! let lifecycle = LifecycleModule::new(transport, loader);
//! let isolate = lifecycle.new_isolate(None)?;
//! let client = lifecycle.client();
//!
//! let app = client.start_app(isolate, Application::new(1, "Hello"), vec![]).await?;
//! client.pause_app(isolate, app).await?;
//! client.destroy_app(isolate, app, false).await?;
//! ```

mod app;
mod client;
mod container;
mod error;
mod lifecycle;
pub mod protocol;
mod runner;
mod state;

#[cfg(test)]
mod testing;

pub use app::{AppContext, AppId, AppInstance, AppLoader, AppState, Application};
pub use client::LifecycleClient;
pub use container::{AppContainer, ContainerKind, MultiAppContainer, SingleAppContainer};
pub use error::{FailureKind, IsolateError, Result};
pub use lifecycle::{
    lifecycle_factory, LifecycleModule, CONTAINER_PROPERTY, DEFAULT_TIMEOUT, MAX_ISOLATES,
    TIMEOUT_PROPERTY,
};
pub use runner::IsolateRunner;
pub use state::IsolateState;
