//! Executive configuration.
//!
//! Read from an optional JSON file; every field has a default. The typed
//! fields are flattened into the [`ModuleConfig`] property map the module
//! factories are built with.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use jump_content_store::ROOT_PROPERTY;
use jump_isolate::{ContainerKind, CONTAINER_PROPERTY, DEFAULT_TIMEOUT, TIMEOUT_PROPERTY};
use jump_messaging::DEFAULT_QUEUE_CAPACITY;
use jump_module::presentation::{HEADLESS_MODE, MODE_PROPERTY};
use jump_module::service_registry::{DEFAULT_PORT, PORT_PROPERTY};
use jump_module::ModuleConfig;
use serde::{Deserialize, Serialize};

use crate::error::{ExecutiveError, Result};

pub const QUEUE_CAPACITY_PROPERTY: &str = "messaging.queue-capacity";

/// Top-level executive configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutiveConfig {
    #[serde(default)]
    pub store: StoreConfig,

    /// Container for isolates that do not ask for one.
    #[serde(default)]
    pub container: ContainerKind,

    #[serde(default = "default_presentation")]
    pub presentation: String,

    /// Bound on every lifecycle request, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Messages a single queue buffers before senders see it as full.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default = "default_service_port")]
    pub service_port: u16,

    /// Extra module properties. Typed fields above take precedence.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl Default for ExecutiveConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            container: ContainerKind::default(),
            presentation: default_presentation(),
            timeout_ms: default_timeout_ms(),
            queue_capacity: default_queue_capacity(),
            service_port: default_service_port(),
            properties: BTreeMap::new(),
        }
    }
}

/// Where the content store lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
    /// Nothing survives the process.
    Memory,

    /// A directory tree on disk.
    Local {
        #[serde(default = "default_store_dir")]
        path: PathBuf,
    },
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Local {
            path: default_store_dir(),
        }
    }
}

fn default_presentation() -> String {
    HEADLESS_MODE.to_string()
}

fn default_timeout_ms() -> u64 {
    u64::try_from(DEFAULT_TIMEOUT.as_millis()).unwrap_or(u64::MAX)
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_service_port() -> u16 {
    DEFAULT_PORT
}

/// `<data dir>/jump/store`, or `./jump/store` where the platform has no
/// data directory.
pub fn default_store_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("jump")
        .join("store")
}

impl ExecutiveConfig {
    /// Load the configuration from `path`, or the defaults without one.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let text =
                    std::fs::read_to_string(path).map_err(|source| ExecutiveError::ConfigFile {
                        path: path.to_path_buf(),
                        source,
                    })?;
                serde_json::from_str(&text)?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// A configuration that keeps everything in memory.
    pub fn in_memory() -> Self {
        Self {
            store: StoreConfig::Memory,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(ExecutiveError::Config(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(ExecutiveError::Config(
                "timeout_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The property map handed to module factories.
    pub fn module_config(&self) -> ModuleConfig {
        let mut config = ModuleConfig::new();
        for (key, value) in &self.properties {
            config.set(key.as_str(), value.as_str());
        }
        if let StoreConfig::Local { path } = &self.store {
            config.set(ROOT_PROPERTY, path.to_string_lossy().into_owned());
        }
        config
            .set(CONTAINER_PROPERTY, self.container.to_string())
            .set(TIMEOUT_PROPERTY, self.timeout_ms.to_string())
            .set(QUEUE_CAPACITY_PROPERTY, self.queue_capacity.to_string())
            .set(MODE_PROPERTY, self.presentation.as_str())
            .set(PORT_PROPERTY, self.service_port.to_string());
        config
    }
}
