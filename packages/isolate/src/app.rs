//! Applications and the boundary to the code that runs them.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use jump_messaging::IsolateId;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Container-assigned identifier of a running application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppId(u32);

impl AppId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An installed application, identified by its suite and entry class.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Application {
    pub suite_id: u32,
    pub class_name: String,
}

impl Application {
    pub fn new(suite_id: u32, class_name: impl Into<String>) -> Self {
        Self {
            suite_id,
            class_name: class_name.into(),
        }
    }
}

impl fmt::Display for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.suite_id, self.class_name)
    }
}

/// Lifecycle state of an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AppState {
    Starting,
    Active,
    Paused,
    /// Terminal.
    Destroyed,
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AppState::Starting => "starting",
            AppState::Active => "active",
            AppState::Paused => "paused",
            AppState::Destroyed => "destroyed",
        })
    }
}

/// What an application sees of its environment when it is loaded.
///
/// Start arguments are exposed as the properties `arg-0`, `arg-1`, and so on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppContext {
    pub isolate: IsolateId,
    pub app_id: AppId,
    properties: BTreeMap<String, String>,
}

impl AppContext {
    pub fn new(isolate: IsolateId, app_id: AppId, args: &[String]) -> Self {
        let properties = args
            .iter()
            .enumerate()
            .map(|(i, arg)| (format!("arg-{i}"), arg.clone()))
            .collect();
        Self {
            isolate,
            app_id,
            properties,
        }
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// The start arguments, in order.
    pub fn args(&self) -> Vec<&str> {
        (0..)
            .map_while(|i| self.property(&format!("arg-{i}")))
            .collect()
    }
}

/// Turns an [`Application`] into a runnable instance.
pub trait AppLoader: Send + Sync {
    fn load(&self, app: &Application, context: AppContext) -> Result<Box<dyn AppInstance>>;
}

/// A loaded application.
///
/// The container calls these methods as the application moves through its
/// states; each is called at most once per transition.
#[async_trait]
pub trait AppInstance: Send {
    async fn start(&mut self) -> Result<()>;

    async fn pause(&mut self) -> Result<()>;

    async fn resume(&mut self) -> Result<()>;

    /// Release the application's resources. With `unconditional` set the
    /// application is going away no matter what it returns.
    async fn destroy(&mut self, unconditional: bool) -> Result<()>;
}
