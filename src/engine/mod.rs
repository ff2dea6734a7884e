//! Worker-pool orchestration.
//!
//! One engine run walks the configured type filters strictly in order.
//! Within a type-run, a fresh [`IdSource`] feeds a fixed pool of
//! parallel workers that share one [`BackoffGate`] and one
//! [`RefreshInvoker`]; the pool is joined before the next filter
//! starts.

mod backoff;
mod id_source;
mod invoker;
mod lock;
mod report;

pub use backoff::{BackoffGate, PauseKind};
pub use id_source::{IdSource, SourceSnapshot};
pub use invoker::RefreshInvoker;
pub use report::{RunReporter, RunTotals};

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::config::{BackoffSettings, EngineSettings, RefreshSettings};
use crate::domain::{ObjectId, RefreshOutcome, TypeFilter};
use crate::repos::{ProgressError, ProgressLog, SearchIndex, UsageStatsCache};

#[derive(Debug, Error)]
pub enum EngineError {
    /// The completed-set could not be loaded; without it the type-run
    /// would re-dispatch work a prior run already finished.
    #[error("cannot resume type-run for `{filter}`: {source}")]
    ProgressUnavailable {
        filter: TypeFilter,
        #[source]
        source: ProgressError,
    },
}

/// The refresh engine: walks every object of the configured types,
/// recomputes each one's usage-statistics cache entry, and records
/// durable progress so interrupted runs resume where they stopped.
pub struct RefreshEngine {
    index: Arc<dyn SearchIndex>,
    provider: Arc<dyn UsageStatsCache>,
    progress: Arc<dyn ProgressLog>,
    refresh: RefreshSettings,
    backoff: BackoffSettings,
    reporter: Arc<RunReporter>,
}

impl RefreshEngine {
    pub fn new(
        settings: &EngineSettings,
        index: Arc<dyn SearchIndex>,
        provider: Arc<dyn UsageStatsCache>,
        progress: Arc<dyn ProgressLog>,
    ) -> Self {
        let reporter = Arc::new(RunReporter::new(settings.refresh.report_interval.get()));
        Self {
            index,
            provider,
            progress,
            refresh: settings.refresh.clone(),
            backoff: settings.backoff.clone(),
            reporter,
        }
    }

    /// Process every configured type filter to completion, in order.
    ///
    /// Per-identifier failures are contained inside the worker loop;
    /// the only run-level failure is being unable to load the
    /// completed-set for a filter. There is no final report object:
    /// operators infer completeness by comparing the progress log with
    /// each filter's `total_matching`.
    pub async fn run(&self) -> Result<(), EngineError> {
        let run_started_at = Instant::now();
        for filter in self.refresh.type_filters.clone() {
            self.run_filter(filter).await?;
        }

        let totals = self.reporter.totals();
        info!(
            target = "rinfresco::engine",
            processed = totals.processed,
            skipped = totals.skipped,
            failed = totals.failed,
            elapsed_secs = run_started_at.elapsed().as_secs(),
            "refresh run complete"
        );
        Ok(())
    }

    /// Counter snapshot for the current run.
    pub fn totals(&self) -> RunTotals {
        self.reporter.totals()
    }

    async fn run_filter(&self, filter: TypeFilter) -> Result<(), EngineError> {
        let completed =
            self.progress
                .completed_set()
                .await
                .map_err(|source| EngineError::ProgressUnavailable {
                    filter: filter.clone(),
                    source,
                })?;
        info!(
            target = "rinfresco::engine",
            filter = %filter,
            already_completed = completed.len(),
            workers = self.refresh.worker_count.get(),
            "starting type-run"
        );

        let completed = Arc::new(completed);
        let source = Arc::new(IdSource::new(
            self.index.clone(),
            filter.clone(),
            self.refresh.page_size.get(),
        ));
        let gate = Arc::new(BackoffGate::new(self.backoff.clone()));
        let invoker = Arc::new(RefreshInvoker::new(
            self.provider.clone(),
            gate,
            self.refresh.max_tries.get(),
        ));

        let mut workers = JoinSet::new();
        for worker in 0..self.refresh.worker_count.get() {
            workers.spawn(worker_loop(
                worker,
                source.clone(),
                completed.clone(),
                invoker.clone(),
                self.progress.clone(),
                self.reporter.clone(),
            ));
        }
        while let Some(joined) = workers.join_next().await {
            if let Err(err) = joined {
                error!(
                    target = "rinfresco::engine",
                    filter = %filter,
                    error = %err,
                    "refresh worker aborted"
                );
            }
        }

        let snapshot = source.snapshot().await;
        let totals = self.reporter.totals();
        info!(
            target = "rinfresco::engine",
            filter = %filter,
            total_matching = ?snapshot.total_matching,
            pages_fetched = snapshot.pages_fetched,
            processed = totals.processed,
            skipped = totals.skipped,
            failed = totals.failed,
            "type-run drained"
        );
        Ok(())
    }
}

async fn worker_loop(
    worker: usize,
    source: Arc<IdSource>,
    completed: Arc<HashSet<ObjectId>>,
    invoker: Arc<RefreshInvoker>,
    progress: Arc<dyn ProgressLog>,
    reporter: Arc<RunReporter>,
) {
    while let Some(id) = source.pop().await {
        if completed.contains(&id) {
            reporter.record_skip();
            continue;
        }

        let item_started_at = Instant::now();
        match invoker.refresh(&id).await {
            RefreshOutcome::Refreshed | RefreshOutcome::AlreadyGone => {
                if let Err(err) = progress.add_entry(&id).await {
                    // The refresh itself stuck; losing the entry only
                    // costs one idempotent re-refresh on the next run.
                    error!(
                        target = "rinfresco::engine",
                        worker,
                        id = %id,
                        error = %err,
                        "failed to record completed identifier"
                    );
                }
                reporter.record_success(item_started_at.elapsed());
            }
            RefreshOutcome::Failed(err) => {
                reporter.record_failure();
                error!(
                    target = "rinfresco::engine",
                    worker,
                    id = %id,
                    error = %err,
                    "refresh abandoned for this run after exhausting retries"
                );
            }
        }
    }
}
