//! Error types for isolates and application containers.

use jump_messaging::{IsolateId, MessagingError};
use jump_module::ModuleError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app::{AppId, AppState};
use crate::state::IsolateState;

/// Coarse classification of a failure, carried in lifecycle replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    NoSuchApp,
    InvalidTransition,
    ContainerBusy,
    Load,
    App,
    Other,
}

/// Errors that can occur in the isolate runtime.
#[derive(Debug, Error)]
pub enum IsolateError {
    #[error("isolate not found: {0}")]
    NoSuchIsolate(IsolateId),

    #[error("application not found: {0}")]
    NoSuchApp(AppId),

    /// A lifecycle operation is not legal from the application's state.
    #[error("cannot {operation} application {app} while {from}")]
    InvalidTransition {
        app: AppId,
        from: AppState,
        operation: &'static str,
    },

    #[error("isolate {isolate} cannot go from {from} to {to}")]
    IsolateTransition {
        isolate: IsolateId,
        from: IsolateState,
        to: IsolateState,
    },

    /// The container cannot host another application.
    #[error("isolate {0} already hosts an application")]
    ContainerBusy(IsolateId),

    #[error("failed to load {class_name}: {message}")]
    Load { class_name: String, message: String },

    /// An application's own lifecycle method failed.
    #[error("application {app} failed: {message}")]
    App { app: AppId, message: String },

    #[error("isolate arena is full ({0} isolates)")]
    ArenaFull(usize),

    /// The remote isolate rejected a lifecycle request.
    #[error("request rejected ({kind:?}): {message}")]
    Rejected { kind: FailureKind, message: String },

    #[error("messaging error: {0}")]
    Messaging(#[from] MessagingError),

    #[error("module error: {0}")]
    Module(#[from] ModuleError),
}

impl IsolateError {
    pub fn kind(&self) -> FailureKind {
        match self {
            IsolateError::NoSuchApp(_) => FailureKind::NoSuchApp,
            IsolateError::InvalidTransition { .. } => FailureKind::InvalidTransition,
            IsolateError::ContainerBusy(_) => FailureKind::ContainerBusy,
            IsolateError::Load { .. } => FailureKind::Load,
            IsolateError::App { .. } => FailureKind::App,
            IsolateError::Rejected { kind, .. } => *kind,
            _ => FailureKind::Other,
        }
    }

    /// Whether this is an invalid transition, locally or in a remote
    /// isolate.
    pub fn is_invalid_transition(&self) -> bool {
        self.kind() == FailureKind::InvalidTransition
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, IsolateError::Messaging(e) if e.is_timeout())
    }
}

/// Result type alias for isolate operations.
pub type Result<T> = std::result::Result<T, IsolateError>;
