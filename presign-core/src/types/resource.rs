//! Resource identity types.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier for a resource whose signed URL is wanted
/// (e.g. a navigation-node id). Unique within one cache instance.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogicalKey(String);

impl LogicalKey {
    /// Creates a key from any string.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the key is empty or whitespace.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for LogicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for LogicalKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for LogicalKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for LogicalKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Backend-addressable path for a resource (e.g. a storage object path).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourcePath(String);

impl ResourcePath {
    /// Creates a path from any string.
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Returns the path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the path is empty or whitespace.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ResourcePath {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ResourcePath {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ResourcePath {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A resource the caller currently considers relevant.
///
/// `path` is `None` while the resource has not been populated yet; such
/// resources are never requested.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Caller-facing key
    pub key: LogicalKey,
    /// Backend path, if known
    #[serde(default)]
    pub path: Option<ResourcePath>,
}

impl ResourceDescriptor {
    /// Creates a descriptor with a known path.
    pub fn new(key: impl Into<LogicalKey>, path: impl Into<ResourcePath>) -> Self {
        Self {
            key: key.into(),
            path: Some(path.into()),
        }
    }

    /// Creates a descriptor whose path is not known yet.
    pub fn pending(key: impl Into<LogicalKey>) -> Self {
        Self {
            key: key.into(),
            path: None,
        }
    }
}
