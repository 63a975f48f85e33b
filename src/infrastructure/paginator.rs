//! Listing pagination over a rendering surface.
//!
//! Walks a best-seller listing from its start URL, running a scroll pass on
//! each page so lazy rows are present before parsing, then follows the single
//! next-page link until none remains or cancellation is observed.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::domain::error::ScrapeError;
use crate::domain::product::ListingProduct;
use crate::infrastructure::browser::RenderSurface;
use crate::infrastructure::extract::ListingExtractor;
use crate::infrastructure::scroller::ConvergenceScroller;

/// Everything one pagination walk produced.
#[derive(Debug, Default)]
pub struct PageCollection {
    pub products: Vec<ListingProduct>,
    pub pages_processed: u32,
}

pub struct ListingPaginator {
    scroller: ConvergenceScroller,
    extractor: Arc<dyn ListingExtractor>,
    page_load_wait: Duration,
}

impl ListingPaginator {
    pub fn new(
        scroller: ConvergenceScroller,
        extractor: Arc<dyn ListingExtractor>,
        page_load_wait: Duration,
    ) -> Self {
        Self { scroller, extractor, page_load_wait }
    }

    /// Collect every product row reachable from `start_url`.
    ///
    /// Ranks continue across pages. A cancelled token stops the walk at the
    /// next page boundary; rows already collected are returned.
    pub async fn collect_all(
        &self,
        surface: &dyn RenderSurface,
        start_url: &str,
        cancel: &CancellationToken,
    ) -> Result<PageCollection, ScrapeError> {
        surface.navigate(start_url).await?;
        tokio::time::sleep(self.page_load_wait).await;

        let mut collection = PageCollection::default();
        loop {
            if cancel.is_cancelled() {
                info!("Cancellation observed, stopping pagination");
                break;
            }

            self.scroller
                .scroll_until_stable(surface, &*self.extractor)
                .await;
            let html = surface.content().await?;

            let start_rank = collection.products.len() as u32 + 1;
            let page_products = self.extractor.parse_products(&html, start_rank);
            collection.pages_processed += 1;
            info!(
                "Page {} yielded {} products ({} total)",
                collection.pages_processed,
                page_products.len(),
                collection.products.len() + page_products.len()
            );
            collection.products.extend(page_products);

            match self.extractor.next_page_url(&html) {
                Some(next_url) => {
                    debug!("Following next page link: {}", next_url);
                    surface.navigate(&next_url).await?;
                    tokio::time::sleep(self.page_load_wait).await;
                }
                None => {
                    debug!("No next page link, pagination complete");
                    break;
                }
            }
        }
        Ok(collection)
    }
}
