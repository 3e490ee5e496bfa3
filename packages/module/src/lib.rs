//! # JUMP Modules
//!
//! A module is a pluggable capability: the content store, the lifecycle
//! manager, the presentation, the push registry, or the service registry.
//! Every module kind has one [`ModuleFactory`] that creates, loads, caches,
//! and unloads its instances.
//!
//! Factories live in a [`ModuleRegistry`] owned by startup code and passed
//! down explicitly:
//!
//! ```rust
//! use jump_module::{service_registry_factory, ModuleConfig, ModuleKind, ModuleRegistry};
//!
//! let registry = ModuleRegistry::new(ModuleConfig::new());
//! let factory = registry
//!     .get_or_init(ModuleKind::ServiceRegistry, |config| {
//!         service_registry_factory(config.clone())
//!     })
//!     .unwrap();
//! let services = factory.get_default().unwrap();
//! assert!(services.port().is_some());
//! ```

mod config;
mod error;
mod factory;
mod module;
pub mod presentation;
mod registry;
pub mod service_registry;

pub use config::ModuleConfig;
pub use error::{ModuleError, Result};
pub use factory::ModuleFactory;
pub use module::{LoaderId, Module, ModuleKey, ModuleKind};
pub use presentation::{
    presentation_factory, AppHandle, HeadlessPresentation, Presentation, PresentationModes,
    PresentationModule, WindowId,
};
pub use registry::ModuleRegistry;
pub use service_registry::{service_registry_factory, ServiceRegistryModule};
