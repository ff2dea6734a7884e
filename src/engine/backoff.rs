//! Pool-wide backoff gate.
//!
//! The statistics provider enforces its limits per provider, not per
//! caller, so one rate-limit signal must pause every worker in the run
//! at once; independent per-worker retries would immediately trip the
//! same limit again. The gate is a single `OPEN -> LOCKED -> OPEN` state
//! machine shared by the whole pool: the first worker to observe a
//! transient failure takes the LOCKED transition and sleeps out the
//! deadline, everyone else waits for the release notification.

use std::time::Duration;

use metrics::counter;
use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::BackoffSettings;
use crate::repos::StatsRefreshError;
use crate::util::timezone::next_reference_hour;

const METRIC_BACKOFF_ENGAGED: &str = "rinfresco_backoff_engaged_total";

/// How long the pool pauses after a transient provider failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseKind {
    /// Generic transient failure: a short fixed delay.
    Fixed,
    /// The provider blocked the caller for the remainder of the hour.
    HourlyBlock,
    /// The daily quota is spent; nothing succeeds before the provider's
    /// reset hour.
    DailyQuota,
}

impl PauseKind {
    /// Map a provider failure class onto a pause length. `Gone` never
    /// reaches the gate; the invoker resolves it as a vacuous success
    /// first.
    pub fn classify(err: &StatsRefreshError) -> Self {
        match err {
            StatsRefreshError::QuotaExceeded { .. } => Self::DailyQuota,
            StatsRefreshError::HourlyBlocked { .. } => Self::HourlyBlock,
            StatsRefreshError::Gone | StatsRefreshError::Other { .. } => Self::Fixed,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::HourlyBlock => "hourly_block",
            Self::DailyQuota => "daily_quota",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum GateState {
    Open,
    Locked { until: OffsetDateTime },
}

pub struct BackoffGate {
    state: watch::Sender<GateState>,
    settings: BackoffSettings,
}

impl BackoffGate {
    pub fn new(settings: BackoffSettings) -> Self {
        let (state, _) = watch::channel(GateState::Open);
        Self { state, settings }
    }

    /// Wait until the gate is OPEN. Every path about to invoke the
    /// provider calls this first; while LOCKED it parks on the change
    /// notification instead of polling.
    pub async fn wait_until_open(&self) {
        let mut rx = self.state.subscribe();
        loop {
            if matches!(*rx.borrow_and_update(), GateState::Open) {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Pause the whole pool according to `pause`.
    ///
    /// The first caller to arrive while OPEN becomes the holder: it
    /// takes the LOCKED transition, sleeps until the computed deadline
    /// and reopens the gate. Callers arriving while LOCKED leave the
    /// deadline untouched and only wait for the release.
    pub async fn hold(&self, pause: PauseKind) {
        let now = OffsetDateTime::now_utc();
        let until = self.deadline(pause, now);
        let engaged = self.state.send_if_modified(|state| match state {
            GateState::Open => {
                *state = GateState::Locked { until };
                true
            }
            GateState::Locked { .. } => false,
        });

        if !engaged {
            self.wait_until_open().await;
            return;
        }

        counter!(METRIC_BACKOFF_ENGAGED, "pause" => pause.label()).increment(1);
        warn!(
            target = "rinfresco::backoff",
            pause = pause.label(),
            until = %until,
            "provider rate limit hit; pausing all workers"
        );

        // A deadline already in the past releases immediately.
        if let Ok(wait) = Duration::try_from(until - OffsetDateTime::now_utc()) {
            tokio::time::sleep(wait).await;
        }

        self.state.send_modify(|state| *state = GateState::Open);
        info!(target = "rinfresco::backoff", "backoff released");
    }

    pub fn is_locked(&self) -> bool {
        matches!(*self.state.borrow(), GateState::Locked { .. })
    }

    fn deadline(&self, pause: PauseKind, now: OffsetDateTime) -> OffsetDateTime {
        match pause {
            PauseKind::Fixed => now + self.settings.failure_delay(),
            PauseKind::HourlyBlock => now + self.settings.hourly_block(),
            PauseKind::DailyQuota => next_reference_hour(
                now,
                self.settings.quota_reset_zone,
                self.settings.quota_reset_hour,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use time::macros::datetime;

    use super::*;

    #[test]
    fn classification_covers_every_failure_class() {
        assert_eq!(
            PauseKind::classify(&StatsRefreshError::quota_exceeded("daily limit")),
            PauseKind::DailyQuota
        );
        assert_eq!(
            PauseKind::classify(&StatsRefreshError::hourly_blocked("hourly limit")),
            PauseKind::HourlyBlock
        );
        assert_eq!(
            PauseKind::classify(&StatsRefreshError::other("timeout")),
            PauseKind::Fixed
        );
    }

    #[test]
    fn fixed_and_hourly_deadlines_are_relative() {
        let gate = BackoffGate::new(BackoffSettings::default());
        let now = datetime!(2026-08-07 12:00 UTC);

        assert_eq!(
            gate.deadline(PauseKind::Fixed, now),
            datetime!(2026-08-07 12:01 UTC)
        );
        assert_eq!(
            gate.deadline(PauseKind::HourlyBlock, now),
            datetime!(2026-08-07 13:00 UTC)
        );
    }

    #[test]
    fn daily_quota_deadline_is_the_next_reference_hour() {
        let gate = BackoffGate::new(BackoffSettings::default());

        // Before the reset hour: same day.
        let now = datetime!(2026-08-07 01:00 UTC);
        assert_eq!(
            gate.deadline(PauseKind::DailyQuota, now),
            datetime!(2026-08-07 03:00 UTC)
        );

        // Past the reset hour: the following day, strictly after now.
        let now = datetime!(2026-08-07 03:00 UTC);
        assert_eq!(
            gate.deadline(PauseKind::DailyQuota, now),
            datetime!(2026-08-08 03:00 UTC)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn holder_sleeps_out_the_deadline_and_reopens() {
        let gate = Arc::new(BackoffGate::new(BackoffSettings::default()));

        let holder = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.hold(PauseKind::Fixed).await })
        };
        for _ in 0..100 {
            if gate.is_locked() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(gate.is_locked());

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.wait_until_open().await })
        };

        let started = tokio::time::Instant::now();
        holder.await.expect("holder completes");
        waiter.await.expect("waiter completes");
        assert!(!gate.is_locked());
        // Wall-clock deadlines are computed in real time while the test
        // clock is paused, so allow sub-second slack.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(59) && elapsed <= Duration::from_secs(61));
    }

    #[tokio::test(start_paused = true)]
    async fn second_hold_does_not_extend_the_deadline() {
        let gate = Arc::new(BackoffGate::new(BackoffSettings::default()));

        let first = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.hold(PauseKind::Fixed).await })
        };
        for _ in 0..100 {
            if gate.is_locked() {
                break;
            }
            tokio::task::yield_now().await;
        }

        // Arrives while LOCKED with a much longer classification; it
        // must wait for the existing deadline, not replace it.
        let second = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.hold(PauseKind::HourlyBlock).await })
        };

        let started = tokio::time::Instant::now();
        first.await.expect("first hold completes");
        second.await.expect("second hold completes");
        assert!(!gate.is_locked());
        // Both return at the fixed 60 s deadline, not after the hour
        // the second caller would have asked for.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(59) && elapsed < Duration::from_secs(3600));
    }
}
