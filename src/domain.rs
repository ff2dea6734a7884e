//! Domain values shared across the refresh engine.

use serde::{Deserialize, Serialize};

use crate::repos::StatsRefreshError;

/// Opaque identifier for one repository object (a work or file-like
/// entity). Unique within a type-filtered namespace; the engine never
/// inspects its contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ObjectId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ObjectId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Discriminator selecting which object model a page query targets.
///
/// The engine walks a fixed ordered list of these, one type-run at a
/// time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeFilter(String);

impl TypeFilter {
    pub fn new(filter: impl Into<String>) -> Self {
        Self(filter.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TypeFilter {
    fn from(filter: &str) -> Self {
        Self(filter.to_string())
    }
}

impl std::fmt::Display for TypeFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One bounded batch of identifiers from a single index fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdPage {
    pub ids: Vec<ObjectId>,
    /// Total number of objects matching the filter, independent of the
    /// requested window.
    pub total_matching: u64,
}

/// Terminal result of one invoker dispatch for one identifier.
#[derive(Debug)]
pub enum RefreshOutcome {
    /// The cache entry was recomputed.
    Refreshed,
    /// The target object no longer exists; nothing left to refresh, and
    /// that will never change.
    AlreadyGone,
    /// Every attempt failed; carries the final error for logging.
    Failed(StatsRefreshError),
}
