//! Store handles.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;

use crate::error::{Result, StoreError};
use crate::node::Node;
use crate::store::ContentStore;
use crate::uri::StoreUri;

#[derive(Debug)]
pub(crate) struct HandleState {
    open: AtomicBool,
}

impl HandleState {
    pub(crate) fn close(&self) -> bool {
        self.open.swap(false, Ordering::AcqRel)
    }
}

/// An open session on a store.
///
/// Exclusive handles may read and write. Shared handles may only read: a
/// mutating call fails with [`StoreError::ReadOnly`] without reaching the
/// store. Once closed, every call fails with [`StoreError::Closed`].
pub struct StoreHandle {
    store: Arc<dyn ContentStore>,
    exclusive: bool,
    state: Arc<HandleState>,
}

impl StoreHandle {
    pub fn new(store: Arc<dyn ContentStore>, exclusive: bool) -> Self {
        Self {
            store,
            exclusive,
            state: Arc::new(HandleState {
                open: AtomicBool::new(true),
            }),
        }
    }

    pub(crate) fn state(&self) -> &Arc<HandleState> {
        &self.state
    }

    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    pub fn is_open(&self) -> bool {
        self.state.open.load(Ordering::Acquire)
    }

    /// Close the handle. Idempotent.
    pub fn close(&self) {
        if self.state.close() {
            tracing::trace!(exclusive = self.exclusive, "store handle closed");
        }
    }

    fn readable(&self) -> Result<&dyn ContentStore> {
        if !self.is_open() {
            return Err(StoreError::Closed);
        }
        Ok(self.store.as_ref())
    }

    fn writable(&self) -> Result<&dyn ContentStore> {
        let store = self.readable()?;
        if !self.exclusive {
            return Err(StoreError::ReadOnly);
        }
        Ok(store)
    }

    pub fn create_data_node(&self, uri: &StoreUri, data: Bytes) -> Result<()> {
        self.writable()?.create_data_node(uri, data)
    }

    pub fn create_node(&self, uri: &StoreUri) -> Result<()> {
        self.writable()?.create_node(uri)
    }

    pub fn update_data_node(&self, uri: &StoreUri, data: Bytes) -> Result<()> {
        self.writable()?.update_data_node(uri, data)
    }

    pub fn delete_node(&self, uri: &StoreUri) -> Result<bool> {
        self.writable()?.delete_node(uri)
    }

    pub fn get_node(&self, uri: &StoreUri) -> Result<Option<Node>> {
        self.readable()?.get_node(uri)
    }

    /// The blob at `uri`, or `None` if `uri` is unbound or a list node.
    pub fn get_data(&self, uri: &StoreUri) -> Result<Option<Bytes>> {
        Ok(self.get_node(uri)?.and_then(Node::into_data))
    }

    /// Create `uri` and any missing ancestors as list nodes.
    pub fn create_nodes(&self, uri: &StoreUri) -> Result<()> {
        let store = self.writable()?;
        for ancestor in uri.ancestors().skip(1) {
            store.create_node(&ancestor)?;
        }
        store.create_node(uri)
    }
}

impl Drop for StoreHandle {
    fn drop(&mut self) {
        self.close();
    }
}
