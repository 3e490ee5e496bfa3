//! Suites, their push records, and the launch capability.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Identifier of an installed application suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SuiteId(u32);

impl SuiteId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// Name of the suite's node in the push store: the id in lowercase hex.
    pub fn node_name(&self) -> String {
        format!("{:x}", self.0)
    }

    /// Inverse of [`SuiteId::node_name`].
    pub fn from_node_name(name: &str) -> Option<Self> {
        u32::from_str_radix(name, 16).ok().map(Self)
    }
}

impl fmt::Display for SuiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A push connection registered by an application of a suite.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Connection string, e.g. `socket://:79`.
    pub connection: String,
    /// Class name of the application to launch.
    pub midlet: String,
    /// Sender filter.
    pub filter: String,
}

impl ConnectionInfo {
    pub fn new(
        connection: impl Into<String>,
        midlet: impl Into<String>,
        filter: impl Into<String>,
    ) -> Self {
        Self {
            connection: connection.into(),
            midlet: midlet.into(),
            filter: filter.into(),
        }
    }
}

/// Launches applications in response to push events.
#[async_trait]
pub trait LifecycleAdapter: Send + Sync {
    async fn launch(&self, suite: SuiteId, midlet: &str);
}
