//! Error types for modules and factories.

use thiserror::Error;

use crate::module::ModuleKind;

/// Errors raised while configuring, creating, or looking up modules.
#[derive(Debug, Error)]
pub enum ModuleError {
    /// A presentation mode name that no constructor is registered for.
    #[error("unknown presentation mode: {0}")]
    UnknownMode(String),

    /// A configuration property could not be parsed.
    #[error("invalid value {value:?} for property {key}: {message}")]
    InvalidProperty {
        key: String,
        value: String,
        message: String,
    },

    /// A required configuration property is missing.
    #[error("missing property: {0}")]
    MissingProperty(String),

    /// No factory has been installed for the module kind.
    #[error("no factory installed for {0} modules")]
    NotInstalled(ModuleKind),

    /// The installed factory produces a different module type.
    #[error("factory for {0} modules has a different module type")]
    FactoryTypeMismatch(ModuleKind),

    /// A module failed to load.
    #[error("failed to load {kind} module: {message}")]
    Load { kind: ModuleKind, message: String },

    /// A service name is already bound.
    #[error("service already registered: {0}")]
    DuplicateService(String),
}

impl ModuleError {
    /// Shorthand for a load failure.
    pub fn load(kind: ModuleKind, message: impl Into<String>) -> Self {
        ModuleError::Load {
            kind,
            message: message.into(),
        }
    }
}

/// Result type alias for module operations.
pub type Result<T> = std::result::Result<T, ModuleError>;
