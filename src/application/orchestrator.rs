//! Batch orchestration of detail scrapes and listing runs.
//!
//! One item flows through: gate, acquire a fresh rendering surface, navigate,
//! scroll until the review list converges, extract, classify, persist, wait.
//! Per-item failures are isolated; only a catalog failure while selecting the
//! batch is fatal. Cancellation is observed at the top of the item loop, and
//! an extraction already in flight still gets persisted.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::backoff::DelayPolicy;
use crate::application::classifier::classify;
use crate::application::loader::IncrementalLoader;
use crate::domain::error::ScrapeError;
use crate::domain::outcome::{ListingRunReport, RunSummary, ScrapeOutcome, ScrapeStatus};
use crate::domain::product::{PendingProduct, ProductDetails};
use crate::infrastructure::browser::{RenderSurface, SurfaceFactory};
use crate::infrastructure::extract::{DetailExtractor, ListingExtractor};
use crate::infrastructure::paginator::ListingPaginator;
use crate::infrastructure::repository::CatalogStore;
use crate::infrastructure::scroller::{ConvergenceScroller, ScrollConfig};

/// Which products one detail batch covers.
#[derive(Debug, Clone, Copy)]
pub enum BatchSelection {
    /// One arbitrary product, for smoke tests.
    Single,
    /// Products from the most recent listing run.
    LatestBatch { limit: Option<u32> },
    /// The general pending queue.
    Pending { limit: Option<u32> },
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub stale_after_days: u32,
    /// Bypass the updated-today gate.
    pub force: bool,
    pub page_load_wait: Duration,
}

pub struct ScrapeOrchestrator {
    catalog: Arc<dyn CatalogStore>,
    surfaces: Arc<dyn SurfaceFactory>,
    extractor: Arc<dyn DetailExtractor>,
    scroller: ConvergenceScroller,
    paginator: ListingPaginator,
    loader: IncrementalLoader,
    delays: DelayPolicy,
    settings: OrchestratorSettings,
}

impl ScrapeOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        surfaces: Arc<dyn SurfaceFactory>,
        extractor: Arc<dyn DetailExtractor>,
        listing_extractor: Arc<dyn ListingExtractor>,
        scroll: ScrollConfig,
        delays: DelayPolicy,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            scroller: ConvergenceScroller::new(scroll.clone()),
            paginator: ListingPaginator::new(
                ConvergenceScroller::new(scroll),
                listing_extractor,
                settings.page_load_wait,
            ),
            loader: IncrementalLoader::new(Arc::clone(&catalog)),
            catalog,
            surfaces,
            extractor,
            delays,
            settings,
        }
    }

    /// Run one detail batch over the selected products.
    ///
    /// Only batch selection can fail; every item failure is recorded in the
    /// summary and the run continues.
    pub async fn run_batch(
        &self,
        selection: BatchSelection,
        cancel: &CancellationToken,
    ) -> Result<RunSummary> {
        let items = self.select_items(selection).await?;
        let mut summary = RunSummary {
            total: items.len() as u32,
            ..RunSummary::default()
        };
        info!("Starting detail batch over {} products", summary.total);

        let last_index = items.len().saturating_sub(1);
        for (index, item) in items.iter().enumerate() {
            if cancel.is_cancelled() {
                info!("Cancellation observed, ending batch at item {}", index + 1);
                summary.record(ScrapeOutcome::new(
                    &item.asin,
                    ScrapeStatus::Interrupted,
                    "cancelled before attempt",
                ));
                break;
            }

            let outcome = if self.is_gated(item).await {
                debug!("{} not yet due for another attempt, skipping", item.asin);
                ScrapeOutcome::new(&item.asin, ScrapeStatus::Skipped, "not yet due for another attempt")
            } else {
                self.process_item(item).await
            };
            info!(
                "[{}/{}] {} -> {} ({})",
                index + 1,
                summary.total,
                item.asin,
                outcome.status.as_str(),
                outcome.message
            );
            let status = outcome.status;
            summary.record(outcome);

            if index < last_index {
                self.delays.wait_after(status, cancel).await;
            }
        }
        Ok(summary)
    }

    /// Walk one category listing and record the snapshot.
    pub async fn run_listing(
        &self,
        category: &str,
        start_url: &str,
        cancel: &CancellationToken,
    ) -> Result<ListingRunReport> {
        let surface = self
            .surfaces
            .acquire()
            .await
            .context("failed to acquire a rendering surface for the listing run")?;
        let walked = self.paginator.collect_all(&*surface, start_url, cancel).await;
        surface.close().await;
        let collection = walked.context("listing pagination failed")?;

        let rows_recorded = self
            .catalog
            .record_listing(category, &collection.products)
            .await
            .context("failed to record the listing run")?;
        Ok(ListingRunReport {
            category: category.to_string(),
            products_scraped: collection.products.len() as u32,
            pages_processed: collection.pages_processed,
            rows_recorded,
        })
    }

    async fn select_items(&self, selection: BatchSelection) -> Result<Vec<PendingProduct>> {
        let items = match selection {
            BatchSelection::Single => {
                self.catalog.single_for_test().await?.into_iter().collect()
            }
            BatchSelection::LatestBatch { limit } => {
                self.catalog.list_from_latest_batch(limit).await?
            }
            BatchSelection::Pending { limit } => {
                let staleness = if self.settings.force {
                    0
                } else {
                    self.settings.stale_after_days
                };
                self.catalog.list_pending(limit, staleness).await?
            }
        };
        Ok(items)
    }

    async fn is_gated(&self, item: &PendingProduct) -> bool {
        if !item.is_eligible(self.settings.stale_after_days, self.settings.force, Utc::now()) {
            return true;
        }
        if self.settings.force {
            return false;
        }
        match self.catalog.was_updated_today(&item.asin).await {
            Ok(updated) => updated,
            Err(e) => {
                warn!("Gate check for {} failed, attempting anyway: {}", item.asin, e);
                false
            }
        }
    }

    async fn process_item(&self, item: &PendingProduct) -> ScrapeOutcome {
        let surface = match self.surfaces.acquire().await {
            Ok(surface) => surface,
            Err(e) => {
                let status = classify(Err(&e), false);
                return ScrapeOutcome::new(&item.asin, status, e.to_string());
            }
        };

        let extracted = self.attempt_extract(&*surface, &item.url).await;
        let status = classify(extracted.as_ref(), false);
        if status == ScrapeStatus::ServerBlocked {
            self.capture_block_evidence(&*surface, &item.asin).await;
        }
        surface.close().await;

        match (status, extracted) {
            (ScrapeStatus::Success, Ok(details)) => self.persist(item, &details).await,
            (status, Err(e)) => ScrapeOutcome::new(&item.asin, status, e.to_string()),
            (ScrapeStatus::ServerBlocked, Ok(_)) => ScrapeOutcome::new(
                &item.asin,
                ScrapeStatus::ServerBlocked,
                "page rendered with no extractable fields",
            ),
            (status, Ok(_)) => {
                ScrapeOutcome::new(&item.asin, status, "record lacks the minimum fields")
            }
        }
    }

    /// Best-effort page screenshot when a block is detected, for later
    /// inspection of what the server actually served.
    async fn capture_block_evidence(&self, surface: &dyn RenderSurface, asin: &str) {
        let path = std::env::temp_dir().join(format!("shelfwatch-blocked-{asin}.png"));
        match surface.screenshot_element("body", &path).await {
            Ok(()) => info!("Blocked page for {} captured at {}", asin, path.display()),
            Err(e) => debug!("Block evidence capture for {} failed: {}", asin, e),
        }
    }

    async fn attempt_extract(
        &self,
        surface: &dyn RenderSurface,
        url: &str,
    ) -> Result<ProductDetails, ScrapeError> {
        surface.navigate(url).await?;
        tokio::time::sleep(self.settings.page_load_wait).await;

        // Jump near the review section first so the convergence pass spends
        // its scroll budget where the lazy content actually is.
        if let Err(e) = surface
            .execute_script(
                "document.getElementById('reviewsMedley')?.scrollIntoView({behavior: 'smooth'});",
            )
            .await
        {
            debug!("Review section jump failed, scrolling from the top: {}", e);
        }

        let reviews_loaded = self
            .scroller
            .scroll_until_stable(surface, &*self.extractor)
            .await;
        debug!("Scroll pass settled with {} reviews visible", reviews_loaded);

        let html = surface.content().await?;
        self.extractor.extract(&html, url)
    }

    /// Persist a successful extraction. A record that could not be durably
    /// saved anywhere is demoted to NoData and the product stays unstamped.
    async fn persist(&self, item: &PendingProduct, details: &ProductDetails) -> ScrapeOutcome {
        let details_saved = self.loader.save_details(&item.asin, details).await;
        let price_saved = match details.price {
            Some(price) => self.loader.save_price_point(&item.asin, price).await,
            None => false,
        };
        let delta = match self.loader.load_reviews(&item.asin, &details.reviews).await {
            Ok(delta) => delta,
            Err(e) => {
                warn!("Review delta for {} failed: {}", item.asin, e);
                Default::default()
            }
        };

        if !details_saved && !price_saved {
            let mut outcome = ScrapeOutcome::new(
                &item.asin,
                ScrapeStatus::NoData,
                "data extracted but nothing could be durably saved",
            );
            outcome.reviews_added = delta.inserted;
            return outcome;
        }

        match self.catalog.mark_scraped(&item.asin).await {
            Ok(true) => {}
            Ok(false) => warn!("{} not found while stamping the scrape", item.asin),
            Err(e) => warn!("Failed to stamp {} as scraped: {}", item.asin, e),
        }

        let mut outcome = ScrapeOutcome::new(
            &item.asin,
            ScrapeStatus::Success,
            format!(
                "details={} price={} reviews +{} ={} !{}",
                details_saved, price_saved, delta.inserted, delta.skipped, delta.failed
            ),
        );
        outcome.details_saved = details_saved;
        outcome.price_saved = price_saved;
        outcome.reviews_added = delta.inserted;
        outcome
    }
}
