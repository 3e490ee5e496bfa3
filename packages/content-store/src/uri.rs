//! Store URIs.
//!
//! A URI names a node by its path from the root. The root is `.`, and every
//! other node is written `./a/b/c`. Components are non-empty and may not be
//! `.` or `..`, nor contain a `/`, a backslash, or a NUL.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// A validated, `.`-rooted node address.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StoreUri {
    components: Vec<String>,
}

impl StoreUri {
    /// The root node, `.`.
    pub fn root() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    /// Parse a URI string.
    ///
    /// ```rust
    /// use jump_content_store::StoreUri;
    ///
    /// let uri = StoreUri::parse("./apps/App1").unwrap();
    /// assert_eq!(uri.components(), ["apps", "App1"]);
    /// assert_eq!(uri.parent().unwrap().to_string(), "./apps");
    ///
    /// assert!(StoreUri::parse("/etc/passwd").is_err());
    /// assert!(StoreUri::parse("./apps/../secret").is_err());
    /// ```
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(StoreError::invalid_uri(s, "empty uri"));
        }
        if s == "." || s == "./" {
            return Ok(Self::root());
        }
        let rest = s
            .strip_prefix("./")
            .ok_or_else(|| StoreError::invalid_uri(s, "uri must start with \"./\""))?;
        // A single trailing slash is tolerated.
        let rest = rest.strip_suffix('/').unwrap_or(rest);

        let components = rest
            .split('/')
            .map(|c| validate_component(s, c).map(str::to_string))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { components })
    }

    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    pub fn depth(&self) -> usize {
        self.components.len()
    }

    /// The last component, or `None` for the root.
    pub fn name(&self) -> Option<&str> {
        self.components.last().map(String::as_str)
    }

    /// The parent URI, or `None` for the root.
    pub fn parent(&self) -> Option<StoreUri> {
        let (_, init) = self.components.split_last()?;
        Some(Self {
            components: init.to_vec(),
        })
    }

    /// The URI of child `name`.
    pub fn child(&self, name: &str) -> Result<StoreUri> {
        validate_component(name, name)?;
        let mut components = self.components.clone();
        components.push(name.to_string());
        Ok(Self { components })
    }

    /// The ancestor made of the first `len` components.
    pub fn prefix(&self, len: usize) -> StoreUri {
        Self {
            components: self.components[..len.min(self.components.len())].to_vec(),
        }
    }

    /// Proper ancestors from the root down, excluding `self`.
    pub fn ancestors(&self) -> impl Iterator<Item = StoreUri> + '_ {
        (0..self.components.len()).map(|n| self.prefix(n))
    }

    /// Whether `self` is `other` or lies below it.
    pub fn starts_with(&self, other: &StoreUri) -> bool {
        self.components.starts_with(&other.components)
    }
}

fn validate_component<'a>(uri: &str, component: &'a str) -> Result<&'a str> {
    let problem = match component {
        "" => Some("empty component"),
        "." | ".." => Some("relative components are not allowed"),
        c if c.contains(['/', '\\', '\0']) => Some("component contains a reserved character"),
        _ => None,
    };
    match problem {
        Some(message) => Err(StoreError::invalid_uri(uri, message)),
        None => Ok(component),
    }
}

impl fmt::Display for StoreUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(".")?;
        for component in &self.components {
            write!(f, "/{}", component)?;
        }
        Ok(())
    }
}

impl FromStr for StoreUri {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for StoreUri {
    type Error = StoreError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl TryFrom<&str> for StoreUri {
    type Error = StoreError;

    fn try_from(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<StoreUri> for String {
    fn from(uri: StoreUri) -> Self {
        uri.to_string()
    }
}
