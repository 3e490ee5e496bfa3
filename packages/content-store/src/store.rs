//! The content store interface.

use bytes::Bytes;

use crate::error::Result;
use crate::node::Node;
use crate::uri::StoreUri;

/// A hierarchical tree of data and list nodes.
///
/// The root `.` always exists and is always a list node. Every other node
/// needs all of its ancestors to exist as list nodes before it can be
/// created.
///
/// Stores are shared between handles, so every method takes `&self`.
/// Callers normally go through a [`StoreHandle`](crate::StoreHandle) rather
/// than using a store directly.
///
/// # Object Safety
///
/// This trait is object-safe: you can use `Arc<dyn ContentStore>`.
pub trait ContentStore: Send + Sync {
    /// Bind `uri` to a data node holding `data`.
    ///
    /// An existing data node at `uri` is overwritten. Fails if `uri` is bound
    /// to a list node or if an ancestor is missing or is a data node; the
    /// store is left unchanged on failure.
    fn create_data_node(&self, uri: &StoreUri, data: Bytes) -> Result<()>;

    /// Bind `uri` to an empty list node.
    ///
    /// Creating a list node that already exists is a no-op. Fails if `uri`
    /// is bound to a data node, or on the same ancestor conditions as
    /// [`ContentStore::create_data_node`].
    fn create_node(&self, uri: &StoreUri) -> Result<()>;

    /// Replace the blob of the existing data node at `uri`.
    fn update_data_node(&self, uri: &StoreUri, data: Bytes) -> Result<()>;

    /// The node bound to `uri`.
    ///
    /// # Returns
    ///
    /// * `Ok(None)` - Nothing is bound to `uri`.
    /// * `Ok(Some(node))` - A snapshot of the node.
    /// * `Err(StoreError)` - The backing storage failed.
    fn get_node(&self, uri: &StoreUri) -> Result<Option<Node>>;

    /// Remove the node at `uri` and all of its descendants.
    ///
    /// Returns `Ok(false)` if nothing was bound to `uri`. Errors are reserved
    /// for damaged storage and for attempts to delete the root.
    fn delete_node(&self, uri: &StoreUri) -> Result<bool>;
}
