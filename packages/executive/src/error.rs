//! Executive errors.

use std::path::PathBuf;

use jump_content_store::StoreError;
use jump_isolate::IsolateError;
use jump_messaging::MessagingError;
use jump_module::ModuleError;
use jump_push_registry::PushError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutiveError {
    #[error("cannot read config file {path}: {source}")]
    ConfigFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Config(String),

    #[error("invalid config file: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error(transparent)]
    Module(#[from] ModuleError),

    #[error(transparent)]
    Isolate(#[from] IsolateError),

    #[error(transparent)]
    Messaging(#[from] MessagingError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Push(#[from] PushError),
}

pub type Result<T> = std::result::Result<T, ExecutiveError>;
