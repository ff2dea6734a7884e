//! # Rinfresco
//!
//! A resumable, rate-limit-aware refresh engine for repository
//! usage-statistics caches.
//!
//! The engine walks every object of a set of configured types through a
//! paginated search index, recomputes one cache entry per object via an
//! external statistics provider, and records durable per-object
//! progress so an interrupted run resumes exactly where it stopped.
//! Because the provider enforces its rate limits per provider rather
//! than per caller, one rate-limit signal pauses the whole worker pool
//! at once instead of letting each worker re-trip the same limit.
//!
//! ## Architecture
//!
//! - [`engine::IdSource`]: thread-safe paginated producer of object
//!   identifiers for one type filter; refills on demand behind a
//!   page-fetch lock so concurrent consumers never duplicate queries.
//! - [`engine::RefreshInvoker`]: per-identifier retrying wrapper
//!   around the provider call; a vanished target is a vacuous success.
//! - [`engine::BackoffGate`]: process-wide `OPEN -> LOCKED -> OPEN`
//!   pause gate; the first worker to hit a rate limit sleeps out the
//!   deadline, everyone else waits for the release notification.
//! - [`engine::RunReporter`]: synchronized counters plus periodic
//!   throughput logging.
//! - [`engine::RefreshEngine`]: composes the above into a fixed pool
//!   of parallel workers per type-run; filters run strictly in order.
//!
//! The search index, the statistics provider, and the durable progress
//! log are collaborator traits in [`repos`]; adapters own wire formats,
//! storage layouts, and failure classification.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::collections::HashSet;
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use rinfresco::config::EngineSettings;
//! use rinfresco::domain::{IdPage, ObjectId, TypeFilter};
//! use rinfresco::engine::RefreshEngine;
//! use rinfresco::repos::{
//!     IndexError, ProgressError, ProgressLog, SearchIndex, StatsRefreshError, UsageStatsCache,
//! };
//!
//! struct RepositoryIndex;
//!
//! #[async_trait]
//! impl SearchIndex for RepositoryIndex {
//!     async fn fetch_ids(
//!         &self,
//!         filter: &TypeFilter,
//!         offset: u64,
//!         page_size: u64,
//!     ) -> Result<IdPage, IndexError> {
//!         todo!("query the repository's search index")
//!     }
//! }
//!
//! struct AnalyticsProvider;
//!
//! #[async_trait]
//! impl UsageStatsCache for AnalyticsProvider {
//!     async fn refresh(&self, id: &ObjectId) -> Result<(), StatsRefreshError> {
//!         todo!("recompute one usage-statistics cache entry")
//!     }
//! }
//!
//! struct ProgressFile;
//!
//! #[async_trait]
//! impl ProgressLog for ProgressFile {
//!     async fn completed_set(&self) -> Result<HashSet<ObjectId>, ProgressError> {
//!         todo!("read the durable progress log")
//!     }
//!
//!     async fn add_entry(&self, id: &ObjectId) -> Result<(), ProgressError> {
//!         todo!("append one completed identifier")
//!     }
//! }
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = EngineSettings::load(None)?;
//! rinfresco::telemetry::init(&settings.logging)?;
//!
//! let engine = RefreshEngine::new(
//!     &settings,
//!     Arc::new(RepositoryIndex),
//!     Arc::new(AnalyticsProvider),
//!     Arc::new(ProgressFile),
//! );
//! engine.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod domain;
pub mod engine;
pub mod repos;
pub mod telemetry;
pub mod util;

pub use config::EngineSettings;
pub use domain::{IdPage, ObjectId, RefreshOutcome, TypeFilter};
pub use engine::{EngineError, RefreshEngine};
pub use repos::{ProgressLog, SearchIndex, StatsRefreshError, UsageStatsCache};
