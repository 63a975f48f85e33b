//! Outcome taxonomy for scrape attempts and run-level reporting.

use serde::{Deserialize, Serialize};

/// Classification of one scrape attempt. Exactly one is assigned per attempt;
/// it decides both whether persistence runs and which delay follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeStatus {
    /// Data scraped and at least one write committed.
    Success,
    /// Gated: already updated within the minimum re-scrape interval.
    Skipped,
    /// Page rendered but lacked the minimum fields, or nothing could be saved.
    NoData,
    /// Server denied, rate-limited, or silently blocked the request.
    ServerBlocked,
    /// Connectivity or timeout fault.
    NetworkError,
    /// Markup did not parse into a record.
    ParseError,
    /// Cancellation observed before the attempt began.
    Interrupted,
    /// Any other fault.
    UnknownError,
}

impl ScrapeStatus {
    /// Transient outcomes worth re-running the batch for.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::ServerBlocked | Self::NetworkError)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Skipped => "skipped",
            Self::NoData => "no_data",
            Self::ServerBlocked => "server_blocked",
            Self::NetworkError => "network_error",
            Self::ParseError => "parse_error",
            Self::Interrupted => "interrupted",
            Self::UnknownError => "unknown_error",
        }
    }
}

/// Result of one item's scrape attempt, including what actually committed.
#[derive(Debug, Clone, Serialize)]
pub struct ScrapeOutcome {
    pub asin: String,
    pub status: ScrapeStatus,
    /// Advisory text for the run report, not a structured error.
    pub message: String,
    pub details_saved: bool,
    pub price_saved: bool,
    pub reviews_added: u32,
}

impl ScrapeOutcome {
    pub fn new(asin: impl Into<String>, status: ScrapeStatus, message: impl Into<String>) -> Self {
        Self {
            asin: asin.into(),
            status,
            message: message.into(),
            details_saved: false,
            price_saved: false,
            reviews_added: 0,
        }
    }
}

/// Run-level summary produced by a batch, consumed by the CLI.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub total: u32,
    pub success: u32,
    pub skipped: u32,
    pub no_data: u32,
    pub server_blocked: u32,
    pub network_errors: u32,
    pub parse_errors: u32,
    pub unknown_errors: u32,
    /// Whether the run ended via cancellation.
    pub interrupted: bool,
    /// Advisory per-item trail, in processing order.
    pub items: Vec<ScrapeOutcome>,
}

impl RunSummary {
    pub fn record(&mut self, outcome: ScrapeOutcome) {
        match outcome.status {
            ScrapeStatus::Success => self.success += 1,
            ScrapeStatus::Skipped => self.skipped += 1,
            ScrapeStatus::NoData => self.no_data += 1,
            ScrapeStatus::ServerBlocked => self.server_blocked += 1,
            ScrapeStatus::NetworkError => self.network_errors += 1,
            ScrapeStatus::ParseError => self.parse_errors += 1,
            ScrapeStatus::Interrupted => self.interrupted = true,
            ScrapeStatus::UnknownError => self.unknown_errors += 1,
        }
        self.items.push(outcome);
    }

    /// Count of outcomes an external wrapper may re-run the batch for.
    pub fn retryable_failures(&self) -> u32 {
        self.server_blocked + self.network_errors
    }
}

/// Result of one listing-scrape run over a category's paginated pages.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ListingRunReport {
    pub category: String,
    pub products_scraped: u32,
    pub pages_processed: u32,
    pub rows_recorded: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_counts_by_status() {
        let mut summary = RunSummary::default();
        summary.total = 3;
        summary.record(ScrapeOutcome::new("a", ScrapeStatus::Success, ""));
        summary.record(ScrapeOutcome::new("b", ScrapeStatus::Skipped, ""));
        summary.record(ScrapeOutcome::new("c", ScrapeStatus::ServerBlocked, ""));
        assert_eq!(summary.success, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.server_blocked, 1);
        assert_eq!(summary.retryable_failures(), 1);
        assert!(!summary.interrupted);
    }

    #[test]
    fn interrupted_sets_flag_without_counting() {
        let mut summary = RunSummary::default();
        summary.record(ScrapeOutcome::new("a", ScrapeStatus::Interrupted, ""));
        assert!(summary.interrupted);
        assert_eq!(summary.retryable_failures(), 0);
    }
}
