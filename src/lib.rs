//! shelfwatch - incremental best-seller and product-detail scrape orchestration
//!
//! The crate harvests paginated listing pages and per-product detail pages from
//! a dynamically rendered retail site, extracts structured records, and persists
//! only new or changed data while pacing requests between items.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::orchestrator::{BatchSelection, ScrapeOrchestrator};
pub use domain::outcome::{RunSummary, ScrapeStatus};
