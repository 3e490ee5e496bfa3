//! Error types for the push registries.

use jump_content_store::{StoreError, StoreUri};
use thiserror::Error;

use crate::suite::SuiteId;

#[derive(Debug, Error)]
pub enum PushError {
    /// The backing store failed.
    #[error("push store error: {0}")]
    Store(#[from] StoreError),

    /// A persisted record could not be parsed.
    #[error("corrupt push record at {uri}: {message}")]
    Corrupt { uri: StoreUri, message: String },

    /// The connection is registered by a different suite.
    #[error("connection {connection} is registered by suite {owner}")]
    ConnectionTaken { connection: String, owner: SuiteId },

    /// The connection layer refused to reserve the connection.
    #[error("cannot reserve connection {connection}: {message}")]
    Reservation { connection: String, message: String },

    /// The push-registry module is not loaded.
    #[error("push registry module is not loaded")]
    NotLoaded,

    /// The registry was disposed.
    #[error("push registry has been disposed")]
    Disposed,
}

impl PushError {
    pub fn reservation(connection: impl Into<String>, message: impl Into<String>) -> Self {
        PushError::Reservation {
            connection: connection.into(),
            message: message.into(),
        }
    }

    pub(crate) fn corrupt(uri: &StoreUri, message: impl Into<String>) -> Self {
        PushError::Corrupt {
            uri: uri.clone(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PushError>;
