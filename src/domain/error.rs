//! Fault taxonomy for one scrape attempt.
//!
//! Faults raised by the render surface or the extractor are converted to an
//! outcome at the orchestrator boundary; nothing propagates past one item.

use thiserror::Error;

/// Errors raised while driving a rendering session or extracting a record.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("script evaluation failed: {0}")]
    Script(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("browser session error: {0}")]
    Browser(String),

    #[error("parse error: {0}")]
    Parse(String),
}

impl ScrapeError {
    /// Connectivity-level faults, as opposed to faults in page content.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_))
    }
}
