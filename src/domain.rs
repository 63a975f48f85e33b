//! Domain module - core entities and value objects
//!
//! Contains the work-item and extracted-record types, the outcome taxonomy
//! assigned to each scrape attempt, and the fault types raised at the
//! rendering/extraction boundary.

pub mod error;
pub mod outcome;
pub mod product;

pub use error::ScrapeError;
pub use outcome::{RunSummary, ScrapeOutcome, ScrapeStatus};
pub use product::{ListingProduct, PendingProduct, ProductDetails, Review, StarHistogram};
