//! Per-identifier retrying wrapper around the provider's recompute call.

use std::sync::Arc;

use tracing::warn;

use crate::domain::{ObjectId, RefreshOutcome};
use crate::repos::{StatsRefreshError, UsageStatsCache};

use super::backoff::{BackoffGate, PauseKind};

pub struct RefreshInvoker {
    provider: Arc<dyn UsageStatsCache>,
    gate: Arc<BackoffGate>,
    max_tries: u32,
}

impl RefreshInvoker {
    pub fn new(provider: Arc<dyn UsageStatsCache>, gate: Arc<BackoffGate>, max_tries: u32) -> Self {
        Self {
            provider,
            gate,
            max_tries,
        }
    }

    /// Recompute one cache entry, retrying up to `max_tries` attempts.
    ///
    /// Never propagates an error: a vanished target is a vacuous
    /// success, and exhausted retries come back as
    /// [`RefreshOutcome::Failed`] carrying the final error for the
    /// caller to log.
    pub async fn refresh(&self, id: &ObjectId) -> RefreshOutcome {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            self.gate.wait_until_open().await;

            let err = match self.provider.refresh(id).await {
                Ok(()) => return RefreshOutcome::Refreshed,
                Err(StatsRefreshError::Gone) => {
                    warn!(
                        target = "rinfresco::invoker",
                        id = %id,
                        "target object no longer exists; treating as complete"
                    );
                    return RefreshOutcome::AlreadyGone;
                }
                Err(err) => err,
            };

            if attempt >= self.max_tries {
                return RefreshOutcome::Failed(err);
            }

            warn!(
                target = "rinfresco::invoker",
                id = %id,
                attempt,
                max_tries = self.max_tries,
                error = %err,
                "refresh attempt failed; backing off before retry"
            );
            self.gate.hold(PauseKind::classify(&err)).await;
        }
    }
}
