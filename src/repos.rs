//! Collaborator traits describing the engine's external adapters.
//!
//! The search index, the durable progress log, and the statistics
//! provider all live outside this crate; the engine only sees these
//! seams. Implementations decide wire formats, storage layouts, and
//! failure classification.

use std::collections::HashSet;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{IdPage, ObjectId, TypeFilter};

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index query failed: {0}")]
    Query(String),
}

impl IndexError {
    pub fn from_query(err: impl std::fmt::Display) -> Self {
        Self::Query(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("progress log read failed: {0}")]
    Read(String),
    #[error("progress log append failed: {0}")]
    Append(String),
}

impl ProgressError {
    pub fn from_read(err: impl std::fmt::Display) -> Self {
        Self::Read(err.to_string())
    }

    pub fn from_append(err: impl std::fmt::Display) -> Self {
        Self::Append(err.to_string())
    }
}

/// Failure classes reported by a [`UsageStatsCache`] implementation.
///
/// The provider enforces rate limits per provider, not per caller, so
/// the class drives how long the whole pool pauses. Classification is
/// the adapter's job; the engine never parses message text. Messages
/// are carried for logging only.
#[derive(Debug, Clone, Error)]
pub enum StatsRefreshError {
    /// The target object no longer exists in the repository.
    #[error("target object no longer exists")]
    Gone,
    /// The provider's daily request quota is spent; requests resume at
    /// the provider's fixed reset hour.
    #[error("daily quota exceeded: {message}")]
    QuotaExceeded { message: String },
    /// The provider blocked the caller for the remainder of the hour.
    #[error("hourly block: {message}")]
    HourlyBlocked { message: String },
    /// Any other transient provider failure.
    #[error("provider error: {message}")]
    Other { message: String },
}

impl StatsRefreshError {
    pub fn quota_exceeded(message: impl Into<String>) -> Self {
        Self::QuotaExceeded {
            message: message.into(),
        }
    }

    pub fn hourly_blocked(message: impl Into<String>) -> Self {
        Self::HourlyBlocked {
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

/// Paginated identifier lookup against the repository's search index.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Fetch up to `page_size` identifiers matching `filter`, starting
    /// at `offset`, together with the total number of matches.
    async fn fetch_ids(
        &self,
        filter: &TypeFilter,
        offset: u64,
        page_size: u64,
    ) -> Result<IdPage, IndexError>;
}

/// Durable, append-only record of permanently completed identifiers.
///
/// Appends must be idempotent: recording the same identifier twice (as
/// happens when a run crashes between the refresh and the append) is
/// not an error.
#[async_trait]
pub trait ProgressLog: Send + Sync {
    /// The full set of identifiers already completed, read once per
    /// type-run.
    async fn completed_set(&self) -> Result<HashSet<ObjectId>, ProgressError>;

    /// Mark one identifier permanently complete.
    async fn add_entry(&self, id: &ObjectId) -> Result<(), ProgressError>;
}

/// The external statistics provider's "recompute one cache entry"
/// operation. Must be idempotent: refreshing the same identifier twice
/// never corrupts the cache.
#[async_trait]
pub trait UsageStatsCache: Send + Sync {
    async fn refresh(&self, id: &ObjectId) -> Result<(), StatsRefreshError>;
}
