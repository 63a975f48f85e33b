//! Application layer - outcome classification, delay policy, incremental
//! loading, and the batch orchestrator that ties them together.

pub mod backoff;
pub mod classifier;
pub mod loader;
pub mod orchestrator;

pub use backoff::DelayPolicy;
pub use classifier::classify;
pub use loader::{DeltaResult, IncrementalLoader};
pub use orchestrator::{BatchSelection, OrchestratorSettings, ScrapeOrchestrator};
