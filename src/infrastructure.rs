//! Infrastructure layer - configuration, logging, browser surface, scrolling,
//! pagination, markup extraction, locale text parsing, and the sqlite catalog.

pub mod browser;
pub mod config;
pub mod extract;
pub mod logging;
pub mod paginator;
pub mod repository;
pub mod scroller;
pub mod text_parse;

pub use browser::{ChromiumSurfaceFactory, RenderSurface, SurfaceFactory};
pub use config::AppConfig;
pub use extract::{DetailExtractor, ListingExtractor, SiteDetailExtractor, SiteListingExtractor};
pub use logging::init_logging;
pub use paginator::ListingPaginator;
pub use repository::{CatalogStore, SqliteCatalog};
pub use scroller::{ConvergenceScroller, ItemCounter, ScrollConfig};
