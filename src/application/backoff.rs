//! Randomized inter-item delays keyed by the previous outcome.
//!
//! Blocks and network faults earn long waits, skips barely pause, and
//! everything else sits in between. The jitter keeps request timing from
//! forming a detectable rhythm.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::outcome::ScrapeStatus;
use crate::infrastructure::config::DelayConfig;

pub struct DelayPolicy {
    config: DelayConfig,
}

impl DelayPolicy {
    pub fn new(config: DelayConfig) -> Self {
        Self { config }
    }

    /// Delay bounds in seconds for the given outcome.
    pub fn range_for(&self, status: ScrapeStatus) -> (f64, f64) {
        let c = &self.config;
        match status {
            ScrapeStatus::Success => (c.success_min_s, c.success_max_s),
            ScrapeStatus::Skipped => (c.skip_min_s, c.skip_max_s),
            ScrapeStatus::ServerBlocked => (c.server_blocked_min_s, c.server_blocked_max_s),
            ScrapeStatus::NetworkError => (c.network_error_min_s, c.network_error_max_s),
            ScrapeStatus::NoData
            | ScrapeStatus::ParseError
            | ScrapeStatus::UnknownError
            | ScrapeStatus::Interrupted => (c.error_min_s, c.error_max_s),
        }
    }

    /// One jittered sample from the outcome's range.
    pub fn sample(&self, status: ScrapeStatus) -> Duration {
        let (min, max) = self.range_for(status);
        let seconds = min + fastrand::f64() * (max - min);
        Duration::from_secs_f64(seconds)
    }

    /// Sleep for a jittered delay, returning early if cancelled.
    pub async fn wait_after(&self, status: ScrapeStatus, cancel: &CancellationToken) {
        if cancel.is_cancelled() {
            return;
        }
        let delay = self.sample(status);
        debug!("Waiting {:.1}s after {}", delay.as_secs_f64(), status.as_str());
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
