//! In-memory content store.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::Bytes;

use crate::error::{Result, StoreError};
use crate::node::Node;
use crate::store::ContentStore;
use crate::uri::StoreUri;

enum Entry {
    Data(Bytes),
    List(Children),
}

type Children = BTreeMap<String, Entry>;

/// A content store that lives in memory and is lost with the process.
///
/// # Example
///
/// ```rust
/// use bytes::Bytes;
/// use jump_content_store::{ContentStore, InMemoryContentStore, StoreUri};
///
/// let store = InMemoryContentStore::new();
/// let apps = StoreUri::parse("./apps").unwrap();
/// let title = StoreUri::parse("./apps/title").unwrap();
///
/// store.create_node(&apps).unwrap();
/// store.create_data_node(&title, Bytes::from_static(b"Hello")).unwrap();
///
/// let node = store.get_node(&title).unwrap().unwrap();
/// assert_eq!(node.as_data().unwrap().as_ref(), b"Hello");
/// ```
#[derive(Default)]
pub struct InMemoryContentStore {
    root: Mutex<Children>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn root(&self) -> MutexGuard<'_, Children> {
        self.root.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Walk to the list node holding `uri`'s entry.
fn parent_mut<'a>(root: &'a mut Children, uri: &StoreUri) -> Result<&'a mut Children> {
    let mut children = root;
    let parents = uri.depth().saturating_sub(1);
    for (i, component) in uri.components()[..parents].iter().enumerate() {
        children = match children.get_mut(component) {
            Some(Entry::List(next)) => next,
            Some(Entry::Data(_)) => {
                return Err(StoreError::DataAncestor {
                    uri: uri.clone(),
                    ancestor: uri.prefix(i + 1),
                })
            }
            None => {
                return Err(StoreError::MissingAncestor {
                    uri: uri.clone(),
                    ancestor: uri.prefix(i + 1),
                })
            }
        };
    }
    Ok(children)
}

fn lookup<'a>(root: &'a Children, uri: &StoreUri) -> Option<&'a Entry> {
    let (last, parents) = uri.components().split_last()?;
    let mut children = root;
    for component in parents {
        match children.get(component) {
            Some(Entry::List(next)) => children = next,
            _ => return None,
        }
    }
    children.get(last)
}

fn leaf_name(uri: &StoreUri) -> &str {
    uri.name().unwrap_or_default()
}

impl ContentStore for InMemoryContentStore {
    fn create_data_node(&self, uri: &StoreUri, data: Bytes) -> Result<()> {
        if uri.is_root() {
            return Err(StoreError::TypeMismatch {
                uri: uri.clone(),
                expected: "data",
            });
        }
        let mut root = self.root();
        let parent = parent_mut(&mut root, uri)?;
        match parent.get_mut(leaf_name(uri)) {
            Some(Entry::List(_)) => Err(StoreError::TypeMismatch {
                uri: uri.clone(),
                expected: "data",
            }),
            Some(entry) => {
                *entry = Entry::Data(data);
                Ok(())
            }
            None => {
                parent.insert(leaf_name(uri).to_string(), Entry::Data(data));
                Ok(())
            }
        }
    }

    fn create_node(&self, uri: &StoreUri) -> Result<()> {
        if uri.is_root() {
            return Ok(());
        }
        let mut root = self.root();
        let parent = parent_mut(&mut root, uri)?;
        match parent.get(leaf_name(uri)) {
            Some(Entry::List(_)) => Ok(()),
            Some(Entry::Data(_)) => Err(StoreError::TypeMismatch {
                uri: uri.clone(),
                expected: "list",
            }),
            None => {
                parent.insert(leaf_name(uri).to_string(), Entry::List(Children::new()));
                Ok(())
            }
        }
    }

    fn update_data_node(&self, uri: &StoreUri, data: Bytes) -> Result<()> {
        if uri.is_root() {
            return Err(StoreError::TypeMismatch {
                uri: uri.clone(),
                expected: "data",
            });
        }
        let mut root = self.root();
        let parent = parent_mut(&mut root, uri).map_err(|_| StoreError::NotFound(uri.clone()))?;
        match parent.get_mut(leaf_name(uri)) {
            Some(Entry::Data(old)) => {
                *old = data;
                Ok(())
            }
            Some(Entry::List(_)) => Err(StoreError::TypeMismatch {
                uri: uri.clone(),
                expected: "data",
            }),
            None => Err(StoreError::NotFound(uri.clone())),
        }
    }

    fn get_node(&self, uri: &StoreUri) -> Result<Option<Node>> {
        let root = self.root();
        if uri.is_root() {
            return Ok(Some(Node::list(uri.clone(), root.keys().cloned().collect())));
        }
        Ok(lookup(&root, uri).map(|entry| match entry {
            Entry::Data(data) => Node::data(uri.clone(), data.clone()),
            Entry::List(children) => Node::list(uri.clone(), children.keys().cloned().collect()),
        }))
    }

    fn delete_node(&self, uri: &StoreUri) -> Result<bool> {
        if uri.is_root() {
            return Err(StoreError::Root("deleted"));
        }
        let mut root = self.root();
        match parent_mut(&mut root, uri) {
            Ok(parent) => Ok(parent.remove(leaf_name(uri)).is_some()),
            Err(_) => Ok(false),
        }
    }
}
