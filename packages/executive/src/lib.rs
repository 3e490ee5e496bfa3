//! # JUMP Executive
//!
//! Wires the JUMP modules together. [`Executive::boot`] builds a
//! [`jump_module::ModuleRegistry`], installs one factory per module kind,
//! and loads the default instance of each:
//!
//! ```rust,ignore
//! let executive = Executive::boot(ExecutiveConfig::in_memory())?;
//! let (isolate, app) = executive
//!     .launch(Application::new(1, "demo.Hello"), vec![], None)
//!     .await?;
//! assert_eq!(executive.get_app_windows(isolate, app).len(), 1);
//! executive.shutdown().await;
//! ```

mod config;
mod connections;
mod demo;
mod error;
mod executive;
mod launcher;

pub use config::{default_store_dir, ExecutiveConfig, StoreConfig, QUEUE_CAPACITY_PROPERTY};
pub use connections::SimulatedConnections;
pub use demo::{DemoApp, DemoLoader};
pub use error::{ExecutiveError, Result};
pub use executive::Executive;
pub use launcher::IsolateLauncher;
