//! Error types for the content store.

use std::path::PathBuf;

use thiserror::Error;

use crate::uri::StoreUri;

/// Errors raised by stores and store handles.
///
/// Absence is never an error: `get_node` answers `None` and `delete_node`
/// answers `false`. `Corrupt` and `Io` mean the backing storage itself is in
/// a bad state.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid store uri {uri:?}: {message}")]
    InvalidUri { uri: String, message: String },

    /// An ancestor of the target node does not exist.
    #[error("missing ancestor {ancestor} of {uri}")]
    MissingAncestor { uri: StoreUri, ancestor: StoreUri },

    /// An ancestor of the target node is a data node and cannot have
    /// children.
    #[error("ancestor {ancestor} of {uri} is a data node")]
    DataAncestor { uri: StoreUri, ancestor: StoreUri },

    /// The uri is bound to a node of the other kind.
    #[error("{uri} is not a {expected} node")]
    TypeMismatch { uri: StoreUri, expected: &'static str },

    #[error("no node at {0}")]
    NotFound(StoreUri),

    #[error("the root node cannot be {0}")]
    Root(&'static str),

    /// A mutating call on a handle opened shared.
    #[error("store handle is read-only")]
    ReadOnly,

    #[error("store handle is closed")]
    Closed,

    #[error("store module is not loaded")]
    NotLoaded,

    #[error("store at {path} is corrupt: {message}")]
    Corrupt { path: PathBuf, message: String },

    #[error("store root {path} is unusable: {error}")]
    RootPathInvalid {
        path: PathBuf,
        error: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub(crate) fn invalid_uri(uri: &str, message: impl Into<String>) -> Self {
        StoreError::InvalidUri {
            uri: uri.to_string(),
            message: message.into(),
        }
    }

    /// Whether the error reflects damaged backing storage rather than a bad
    /// request.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            StoreError::Corrupt { .. } | StoreError::Io(_) | StoreError::RootPathInvalid { .. }
        )
    }
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
