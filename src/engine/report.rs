//! Synchronized run counters and periodic throughput reporting.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use tracing::info;

use super::lock::mutex_lock;

const SOURCE: &str = "engine::report";
const METRIC_PROCESSED: &str = "rinfresco_refresh_processed_total";
const METRIC_SKIPPED: &str = "rinfresco_refresh_skipped_total";
const METRIC_FAILED: &str = "rinfresco_refresh_failed_total";
const METRIC_ITEM_MS: &str = "rinfresco_refresh_item_ms";
const METRIC_BATCH_MS: &str = "rinfresco_refresh_batch_ms";

/// Shared counters for one engine run.
///
/// Counts feed periodic logging and metrics only; control decisions
/// never read them.
pub struct RunReporter {
    report_interval: u64,
    state: Mutex<ReportState>,
}

struct ReportState {
    processed: u64,
    skipped: u64,
    failed: u64,
    cumulative_time: Duration,
    batch_started_at: Instant,
}

/// Point-in-time counter snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunTotals {
    pub processed: u64,
    pub skipped: u64,
    pub failed: u64,
    pub cumulative_time: Duration,
}

impl RunReporter {
    pub fn new(report_interval: u64) -> Self {
        Self {
            report_interval: report_interval.max(1),
            state: Mutex::new(ReportState {
                processed: 0,
                skipped: 0,
                failed: 0,
                cumulative_time: Duration::ZERO,
                batch_started_at: Instant::now(),
            }),
        }
    }

    /// Count one completed identifier.
    ///
    /// Every `report_interval` successes one aggregate throughput line
    /// is emitted. The interval check runs under the same lock as the
    /// increment, so report boundaries are never lost or duplicated by
    /// concurrent workers.
    pub fn record_success(&self, elapsed: Duration) {
        counter!(METRIC_PROCESSED).increment(1);
        histogram!(METRIC_ITEM_MS).record(elapsed.as_secs_f64() * 1000.0);

        let mut state = mutex_lock(&self.state, SOURCE, "record_success");
        state.processed += 1;
        state.cumulative_time += elapsed;

        if state.processed % self.report_interval == 0 {
            let batch_ms = state.batch_started_at.elapsed().as_secs_f64() * 1000.0;
            let mean_item_ms =
                state.cumulative_time.as_secs_f64() * 1000.0 / state.processed as f64;
            histogram!(METRIC_BATCH_MS).record(batch_ms);
            info!(
                target = "rinfresco::report",
                processed = state.processed,
                skipped = state.skipped,
                failed = state.failed,
                mean_item_ms,
                batch_ms,
                "refresh throughput"
            );
            state.batch_started_at = Instant::now();
        }
    }

    /// Count one identifier skipped because a prior run completed it.
    pub fn record_skip(&self) {
        counter!(METRIC_SKIPPED).increment(1);
        mutex_lock(&self.state, SOURCE, "record_skip").skipped += 1;
    }

    /// Count one identifier abandoned for this run.
    pub fn record_failure(&self) {
        counter!(METRIC_FAILED).increment(1);
        mutex_lock(&self.state, SOURCE, "record_failure").failed += 1;
    }

    pub fn totals(&self) -> RunTotals {
        let state = mutex_lock(&self.state, SOURCE, "totals");
        RunTotals {
            processed: state.processed,
            skipped: state.skipped,
            failed: state.failed,
            cumulative_time: state.cumulative_time,
        }
    }
}
