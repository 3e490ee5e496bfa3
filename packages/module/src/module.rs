//! The module abstraction.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::ModuleConfig;
use crate::error::Result;

/// The categories of pluggable capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModuleKind {
    Store,
    Lifecycle,
    Presentation,
    PushRegistry,
    ServiceRegistry,
}

impl ModuleKind {
    pub const ALL: [ModuleKind; 5] = [
        ModuleKind::Store,
        ModuleKind::Lifecycle,
        ModuleKind::Presentation,
        ModuleKind::PushRegistry,
        ModuleKind::ServiceRegistry,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleKind::Store => "store",
            ModuleKind::Lifecycle => "lifecycle",
            ModuleKind::Presentation => "presentation",
            ModuleKind::PushRegistry => "push-registry",
            ModuleKind::ServiceRegistry => "service-registry",
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of the code-loading context a module instance belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoaderId(pub u64);

/// Cache key for module instances inside a factory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ModuleKey {
    /// The one process-wide instance.
    Default,
    /// An instance per loading context.
    Loader(LoaderId),
    /// An instance per named mode.
    Mode(String),
}

impl ModuleKey {
    pub fn mode(name: impl Into<String>) -> Self {
        ModuleKey::Mode(name.into())
    }
}

impl fmt::Display for ModuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleKey::Default => f.write_str("default"),
            ModuleKey::Loader(id) => write!(f, "loader:{}", id.0),
            ModuleKey::Mode(name) => write!(f, "mode:{}", name),
        }
    }
}

/// A pluggable capability instance.
///
/// Modules are shared behind `Arc`, so `load` and `unload` take `&self` and
/// implementations keep their state behind interior mutability.
pub trait Module: Send + Sync + 'static {
    /// Configure the module. Called once, right after construction.
    fn load(&self, config: &ModuleConfig) -> Result<()>;

    /// Tear the module down. Must be idempotent.
    fn unload(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_display_kebab_case() {
        let names: Vec<_> = ModuleKind::ALL.iter().map(|k| k.to_string()).collect();
        assert_eq!(
            names,
            vec![
                "store",
                "lifecycle",
                "presentation",
                "push-registry",
                "service-registry"
            ]
        );
    }

    #[test]
    fn key_display() {
        assert_eq!(ModuleKey::Default.to_string(), "default");
        assert_eq!(ModuleKey::Loader(LoaderId(3)).to_string(), "loader:3");
        assert_eq!(ModuleKey::mode("headless").to_string(), "mode:headless");
    }
}
