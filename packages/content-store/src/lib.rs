//! # JUMP Content Store
//!
//! A hierarchical tree of nodes addressed by `.`-rooted URIs. Data nodes hold
//! opaque blobs; list nodes hold children. Two backends implement
//! [`ContentStore`]: [`InMemoryContentStore`] and [`FileContentStore`].
//!
//! Mutation goes through a [`StoreHandle`] opened exclusive; handles opened
//! shared are read-only.

mod error;
mod handle;
mod local;
mod memory;
mod module;
mod node;
mod store;
mod uri;

pub use error::{Result, StoreError};
pub use handle::StoreHandle;
pub use local::FileContentStore;
pub use memory::InMemoryContentStore;
pub use module::{store_factory, StoreModule, ROOT_PROPERTY};
pub use node::{Node, NodeKind};
pub use store::ContentStore;
pub use uri::StoreUri;
