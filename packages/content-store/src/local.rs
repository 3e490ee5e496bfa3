//! On-disk content store.
//!
//! List nodes are directories and data nodes are regular files below a root
//! directory. The tree is checked with `walkdir` when the store is opened so
//! that a damaged root is reported up front instead of halfway through an
//! operation.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::Bytes;

use crate::error::{Result, StoreError};
use crate::node::Node;
use crate::store::ContentStore;
use crate::uri::StoreUri;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    Data,
    List,
}

/// A content store persisted under a directory.
pub struct FileContentStore {
    root: PathBuf,
    // Serializes operations made through this process.
    lock: Mutex<()>,
}

impl FileContentStore {
    /// Open the store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|error| StoreError::RootPathInvalid {
            path: root.clone(),
            error,
        })?;

        let attr = fs::metadata(&root).map_err(|error| StoreError::RootPathInvalid {
            path: root.clone(),
            error,
        })?;
        if !attr.is_dir() {
            return Err(StoreError::RootPathInvalid {
                path: root,
                error: io::Error::other("root path must be a directory"),
            });
        }
        if attr.permissions().readonly() {
            return Err(StoreError::RootPathInvalid {
                path: root,
                error: io::Error::other("root directory must be writable"),
            });
        }

        let root = root
            .canonicalize()
            .map_err(|error| StoreError::RootPathInvalid {
                path: root.clone(),
                error,
            })?;
        let nodes = check_tree(&root)?;
        tracing::debug!(root = %root.display(), nodes, "file store opened");

        Ok(Self {
            root,
            lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_path(&self, uri: &StoreUri) -> PathBuf {
        let mut path = self.root.clone();
        path.extend(uri.components());
        path
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail unless every proper ancestor of `uri` is a directory.
    fn check_ancestors(&self, uri: &StoreUri) -> Result<()> {
        // The root itself is known to be a directory.
        for ancestor in uri.ancestors().skip(1) {
            match entry_kind(&self.file_path(&ancestor))? {
                Some(EntryKind::List) => {}
                Some(EntryKind::Data) => {
                    return Err(StoreError::DataAncestor {
                        uri: uri.clone(),
                        ancestor,
                    })
                }
                None => {
                    return Err(StoreError::MissingAncestor {
                        uri: uri.clone(),
                        ancestor,
                    })
                }
            }
        }
        Ok(())
    }

    /// The kind of the node at `uri`, or `None` if it or an ancestor is
    /// missing.
    fn kind_of(&self, uri: &StoreUri) -> Result<Option<EntryKind>> {
        match self.check_ancestors(uri) {
            Ok(()) => entry_kind(&self.file_path(uri)),
            Err(StoreError::MissingAncestor { .. } | StoreError::DataAncestor { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn entry_kind(path: &Path) -> Result<Option<EntryKind>> {
    let attr = match fs::symlink_metadata(path) {
        Ok(attr) => attr,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let file_type = attr.file_type();
    if file_type.is_dir() {
        Ok(Some(EntryKind::List))
    } else if file_type.is_file() {
        Ok(Some(EntryKind::Data))
    } else {
        Err(StoreError::Corrupt {
            path: path.to_path_buf(),
            message: "entry is neither a file nor a directory".to_string(),
        })
    }
}

/// Check that everything under `root` maps onto a node. Returns the number
/// of nodes found.
fn check_tree(root: &Path) -> Result<usize> {
    let mut nodes = 0;
    for entry in walkdir::WalkDir::new(root).min_depth(1).follow_links(false) {
        let entry = entry.map_err(|e| StoreError::Corrupt {
            path: e.path().unwrap_or(root).to_path_buf(),
            message: e.to_string(),
        })?;
        let file_type = entry.file_type();
        if !file_type.is_dir() && !file_type.is_file() {
            return Err(StoreError::Corrupt {
                path: entry.path().to_path_buf(),
                message: "entry is neither a file nor a directory".to_string(),
            });
        }
        if entry.file_name().to_str().is_none() {
            return Err(StoreError::Corrupt {
                path: entry.path().to_path_buf(),
                message: "entry name is not valid UTF-8".to_string(),
            });
        }
        nodes += 1;
    }
    Ok(nodes)
}

fn read_children(path: &Path) -> Result<Vec<String>> {
    let mut children = Vec::new();
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let name = entry
            .file_name()
            .into_string()
            .map_err(|_| StoreError::Corrupt {
                path: entry.path(),
                message: "entry name is not valid UTF-8".to_string(),
            })?;
        children.push(name);
    }
    Ok(children)
}

impl ContentStore for FileContentStore {
    fn create_data_node(&self, uri: &StoreUri, data: Bytes) -> Result<()> {
        let _guard = self.guard();
        self.check_ancestors(uri)?;
        let path = self.file_path(uri);
        match entry_kind(&path)? {
            Some(EntryKind::List) => Err(StoreError::TypeMismatch {
                uri: uri.clone(),
                expected: "data",
            }),
            _ => {
                tracing::trace!(path = %path.display(), len = data.len(), "writing data node");
                fs::write(&path, &data)?;
                Ok(())
            }
        }
    }

    fn create_node(&self, uri: &StoreUri) -> Result<()> {
        let _guard = self.guard();
        self.check_ancestors(uri)?;
        let path = self.file_path(uri);
        match entry_kind(&path)? {
            Some(EntryKind::List) => Ok(()),
            Some(EntryKind::Data) => Err(StoreError::TypeMismatch {
                uri: uri.clone(),
                expected: "list",
            }),
            None => {
                fs::create_dir(&path)?;
                Ok(())
            }
        }
    }

    fn update_data_node(&self, uri: &StoreUri, data: Bytes) -> Result<()> {
        let _guard = self.guard();
        match self.kind_of(uri)? {
            Some(EntryKind::Data) => {
                fs::write(self.file_path(uri), &data)?;
                Ok(())
            }
            Some(EntryKind::List) => Err(StoreError::TypeMismatch {
                uri: uri.clone(),
                expected: "data",
            }),
            None => Err(StoreError::NotFound(uri.clone())),
        }
    }

    fn get_node(&self, uri: &StoreUri) -> Result<Option<Node>> {
        let _guard = self.guard();
        let path = self.file_path(uri);
        match self.kind_of(uri)? {
            Some(EntryKind::Data) => {
                let data = fs::read(&path)?;
                Ok(Some(Node::data(uri.clone(), Bytes::from(data))))
            }
            Some(EntryKind::List) => Ok(Some(Node::list(uri.clone(), read_children(&path)?))),
            None => Ok(None),
        }
    }

    fn delete_node(&self, uri: &StoreUri) -> Result<bool> {
        if uri.is_root() {
            return Err(StoreError::Root("deleted"));
        }
        let _guard = self.guard();
        let path = self.file_path(uri);
        match self.kind_of(uri)? {
            Some(EntryKind::Data) => fs::remove_file(&path)?,
            Some(EntryKind::List) => fs::remove_dir_all(&path)?,
            None => return Ok(false),
        }
        tracing::trace!(path = %path.display(), "deleted node");
        Ok(true)
    }
}
