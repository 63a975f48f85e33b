//! End-to-end orchestrator behavior over in-memory fakes: gating,
//! cancellation, outcome accounting, and persistence rules.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio_util::sync::CancellationToken;

use shelfwatch::application::backoff::DelayPolicy;
use shelfwatch::application::orchestrator::{
    BatchSelection, OrchestratorSettings, ScrapeOrchestrator,
};
use shelfwatch::domain::error::ScrapeError;
use shelfwatch::domain::outcome::ScrapeStatus;
use shelfwatch::domain::product::{
    ListingProduct, PendingProduct, ProductDetails, Review,
};
use shelfwatch::infrastructure::browser::{RenderSurface, SurfaceFactory};
use shelfwatch::infrastructure::config::DelayConfig;
use shelfwatch::infrastructure::extract::{DetailExtractor, ListingExtractor};
use shelfwatch::infrastructure::repository::CatalogStore;
use shelfwatch::infrastructure::scroller::{ItemCounter, ScrollConfig};

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Default)]
struct CatalogState {
    products: Vec<PendingProduct>,
    updated_today: HashSet<String>,
    reviews: HashSet<(String, String)>,
    detail_rows: Vec<String>,
    price_rows: Vec<(String, NaiveDate)>,
    marked: Vec<String>,
    listing_rows: Vec<(String, String)>,
}

#[derive(Default)]
struct FakeCatalog {
    state: Mutex<CatalogState>,
}

impl FakeCatalog {
    fn with_products(asins: &[&str]) -> Self {
        let catalog = Self::default();
        {
            let mut state = catalog.state.lock().unwrap();
            for asin in asins {
                state.products.push(PendingProduct {
                    asin: asin.to_string(),
                    url: format!("https://shop.test/dp/{asin}"),
                    category: Some("electronics".to_string()),
                    last_detail_scrape: None,
                    has_details: false,
                });
            }
        }
        catalog
    }

    fn push_product(&self, asin: &str, last_detail_scrape: Option<DateTime<Utc>>) {
        let mut state = self.state.lock().unwrap();
        state.products.push(PendingProduct {
            asin: asin.to_string(),
            url: format!("https://shop.test/dp/{asin}"),
            category: Some("electronics".to_string()),
            has_details: last_detail_scrape.is_some(),
            last_detail_scrape,
        });
    }
}

#[async_trait]
impl CatalogStore for FakeCatalog {
    async fn list_pending(&self, limit: Option<u32>, _: u32) -> Result<Vec<PendingProduct>> {
        let mut products = self.state.lock().unwrap().products.clone();
        if let Some(limit) = limit {
            products.truncate(limit as usize);
        }
        Ok(products)
    }

    async fn list_from_latest_batch(&self, limit: Option<u32>) -> Result<Vec<PendingProduct>> {
        self.list_pending(limit, 0).await
    }

    async fn single_for_test(&self) -> Result<Option<PendingProduct>> {
        Ok(self.state.lock().unwrap().products.first().cloned())
    }

    async fn was_updated_today(&self, asin: &str) -> Result<bool> {
        Ok(self.state.lock().unwrap().updated_today.contains(asin))
    }

    async fn existing_review_ids(&self, asin: &str) -> Result<HashSet<String>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .reviews
            .iter()
            .filter(|(a, _)| a == asin)
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn mark_scraped(&self, asin: &str) -> Result<bool> {
        self.state.lock().unwrap().marked.push(asin.to_string());
        Ok(true)
    }

    async fn insert_details(&self, asin: &str, _: &ProductDetails) -> Result<bool> {
        self.state.lock().unwrap().detail_rows.push(asin.to_string());
        Ok(true)
    }

    async fn upsert_price_point(&self, asin: &str, date: NaiveDate, _: f64) -> Result<bool> {
        self.state.lock().unwrap().price_rows.push((asin.to_string(), date));
        Ok(true)
    }

    async fn insert_review(&self, asin: &str, review: &Review) -> Result<bool> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .reviews
            .insert((asin.to_string(), review.review_id.clone())))
    }

    async fn record_listing(&self, category: &str, products: &[ListingProduct]) -> Result<u32> {
        let mut state = self.state.lock().unwrap();
        for product in products {
            state
                .listing_rows
                .push((category.to_string(), product.asin.clone()));
        }
        Ok(products.len() as u32)
    }
}

/// Surface serving canned content per navigated URL.
struct FakeSurface {
    pages: HashMap<String, String>,
    current: Mutex<String>,
    closed: Arc<AtomicUsize>,
    cancel_on_navigate: Option<CancellationToken>,
}

#[async_trait]
impl RenderSurface for FakeSurface {
    async fn navigate(&self, url: &str) -> Result<(), ScrapeError> {
        *self.current.lock().unwrap() = url.to_string();
        if let Some(token) = &self.cancel_on_navigate {
            token.cancel();
        }
        Ok(())
    }

    async fn execute_script(&self, script: &str) -> Result<serde_json::Value, ScrapeError> {
        if script.contains("scrollHeight") {
            Ok(serde_json::json!(0))
        } else {
            Ok(serde_json::Value::Null)
        }
    }

    async fn content(&self) -> Result<String, ScrapeError> {
        let url = self.current.lock().unwrap().clone();
        Ok(self.pages.get(&url).cloned().unwrap_or_default())
    }

    async fn screenshot_element(&self, _: &str, _: &Path) -> Result<(), ScrapeError> {
        Ok(())
    }

    async fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct FakeSurfaceFactory {
    pages: HashMap<String, String>,
    acquired: AtomicUsize,
    closed: Arc<AtomicUsize>,
    cancel_on_navigate: Option<CancellationToken>,
}

impl FakeSurfaceFactory {
    fn with_pages(pages: Vec<(&str, &str)>) -> Self {
        Self {
            pages: pages
                .into_iter()
                .map(|(u, c)| (u.to_string(), c.to_string()))
                .collect(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl SurfaceFactory for FakeSurfaceFactory {
    async fn acquire(&self) -> Result<Box<dyn RenderSurface>, ScrapeError> {
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSurface {
            pages: self.pages.clone(),
            current: Mutex::new(String::new()),
            closed: Arc::clone(&self.closed),
            cancel_on_navigate: self.cancel_on_navigate.clone(),
        }))
    }
}

/// Detail extractor keyed by page markers instead of real markup.
struct MarkerExtractor;

impl ItemCounter for MarkerExtractor {
    fn count_items(&self, _: &str) -> usize {
        0
    }
}

fn review(id: &str) -> Review {
    Review {
        review_id: id.to_string(),
        stars: Some(5),
        date: None,
        location: None,
        title: None,
        text: None,
        verified_purchase: false,
        helpful_count: None,
    }
}

impl DetailExtractor for MarkerExtractor {
    fn extract(&self, html: &str, url: &str) -> Result<ProductDetails, ScrapeError> {
        if html.contains("network-down") {
            return Err(ScrapeError::Network("connection reset".to_string()));
        }
        if html.contains("rich-page") {
            return Ok(ProductDetails {
                asin: None,
                url: url.to_string(),
                price: Some(19.99),
                brand: Some("Acme".to_string()),
                rating: Some(4.4),
                total_reviews: Some(3),
                star_histogram: Default::default(),
                reviews: vec![review("R1"), review("R2"), review("R3")],
            });
        }
        // Anything else renders but yields nothing, a silent block.
        Ok(ProductDetails {
            url: url.to_string(),
            ..ProductDetails::default()
        })
    }
}

struct NullListing;

impl ItemCounter for NullListing {
    fn count_items(&self, html: &str) -> usize {
        html.matches("asin=").count()
    }
}

impl ListingExtractor for NullListing {
    fn parse_products(&self, html: &str, start_rank: u32) -> Vec<ListingProduct> {
        html.lines()
            .filter_map(|l| l.trim().strip_prefix("asin="))
            .enumerate()
            .map(|(i, asin)| ListingProduct {
                asin: asin.to_string(),
                name: None,
                url: format!("https://shop.test/dp/{asin}"),
                image_url: None,
                rank: start_rank + i as u32,
            })
            .collect()
    }

    fn next_page_url(&self, _: &str) -> Option<String> {
        None
    }
}

fn orchestrator(
    catalog: Arc<FakeCatalog>,
    factory: Arc<FakeSurfaceFactory>,
    force: bool,
) -> ScrapeOrchestrator {
    ScrapeOrchestrator::new(
        catalog,
        factory,
        Arc::new(MarkerExtractor),
        Arc::new(NullListing),
        ScrollConfig {
            step_px: 600,
            pause: Duration::from_millis(0),
            settle_wait: Duration::from_millis(0),
            max_no_change_streak: 1,
        },
        DelayPolicy::new(DelayConfig {
            success_min_s: 0.0,
            success_max_s: 0.0,
            skip_min_s: 0.0,
            skip_max_s: 0.0,
            server_blocked_min_s: 0.0,
            server_blocked_max_s: 0.0,
            network_error_min_s: 0.0,
            network_error_max_s: 0.0,
            error_min_s: 0.0,
            error_max_s: 0.0,
        }),
        OrchestratorSettings {
            stale_after_days: 1,
            force,
            page_load_wait: Duration::from_millis(0),
        },
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn updated_today_items_are_skipped_without_a_browser() {
    let catalog = Arc::new(FakeCatalog::with_products(&["A"]));
    catalog
        .state
        .lock()
        .unwrap()
        .updated_today
        .insert("A".to_string());
    let factory = Arc::new(FakeSurfaceFactory::default());

    let summary = orchestrator(Arc::clone(&catalog), Arc::clone(&factory), false)
        .run_batch(BatchSelection::Pending { limit: None }, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.total, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(factory.acquired.load(Ordering::SeqCst), 0);
    assert!(catalog.state.lock().unwrap().marked.is_empty());
}

#[tokio::test]
async fn force_overrides_the_gate() {
    let catalog = Arc::new(FakeCatalog::with_products(&["A"]));
    catalog
        .state
        .lock()
        .unwrap()
        .updated_today
        .insert("A".to_string());
    let factory = Arc::new(FakeSurfaceFactory::with_pages(vec![(
        "https://shop.test/dp/A",
        "rich-page",
    )]));

    let summary = orchestrator(Arc::clone(&catalog), Arc::clone(&factory), true)
        .run_batch(BatchSelection::Pending { limit: None }, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.success, 1);
    assert_eq!(factory.acquired.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn pre_cancelled_run_interrupts_immediately() {
    let catalog = Arc::new(FakeCatalog::with_products(&["A", "B"]));
    let factory = Arc::new(FakeSurfaceFactory::default());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let summary = orchestrator(Arc::clone(&catalog), Arc::clone(&factory), false)
        .run_batch(BatchSelection::Pending { limit: None }, &cancel)
        .await
        .unwrap();

    assert_eq!(summary.total, 2);
    assert!(summary.interrupted);
    assert_eq!(summary.items.len(), 1);
    assert_eq!(summary.items[0].status, ScrapeStatus::Interrupted);
    assert_eq!(factory.acquired.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cancellation_mid_attempt_still_persists_the_item() {
    let catalog = Arc::new(FakeCatalog::with_products(&["A", "B"]));
    let cancel = CancellationToken::new();
    let factory = Arc::new(FakeSurfaceFactory {
        cancel_on_navigate: Some(cancel.clone()),
        ..FakeSurfaceFactory::with_pages(vec![("https://shop.test/dp/A", "rich-page")])
    });

    let summary = orchestrator(Arc::clone(&catalog), Arc::clone(&factory), false)
        .run_batch(BatchSelection::Pending { limit: None }, &cancel)
        .await
        .unwrap();

    // The attempt in flight runs to completion and is persisted.
    assert_eq!(summary.success, 1);
    assert_eq!(summary.items[0].asin, "A");
    assert_eq!(summary.items[0].status, ScrapeStatus::Success);
    assert_eq!(catalog.state.lock().unwrap().marked, vec!["A"]);

    // The next item never gets a surface and the batch ends interrupted.
    assert!(summary.interrupted);
    assert_eq!(summary.items[1].asin, "B");
    assert_eq!(summary.items[1].status, ScrapeStatus::Interrupted);
    assert_eq!(factory.acquired.load(Ordering::SeqCst), 1);
    assert_eq!(factory.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn fresh_items_are_skipped_before_any_catalog_lookup() {
    let catalog = Arc::new(FakeCatalog::default());
    catalog.push_product("A", Some(Utc::now() - chrono::Duration::hours(2)));
    catalog.push_product("B", None);
    let factory = Arc::new(FakeSurfaceFactory::with_pages(vec![(
        "https://shop.test/dp/B",
        "rich-page",
    )]));

    let summary = orchestrator(Arc::clone(&catalog), Arc::clone(&factory), false)
        .run_batch(BatchSelection::Pending { limit: None }, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.success, 1);
    assert_eq!(summary.items[0].asin, "A");
    assert_eq!(summary.items[0].status, ScrapeStatus::Skipped);
    // The stale-by-timestamp gate alone keeps A off the wire.
    assert_eq!(factory.acquired.load(Ordering::SeqCst), 1);
    assert_eq!(catalog.state.lock().unwrap().marked, vec!["B"]);
}

#[tokio::test]
async fn mixed_batch_accounts_every_outcome() {
    let catalog = Arc::new(FakeCatalog::with_products(&["A", "B", "C"]));
    {
        let mut state = catalog.state.lock().unwrap();
        state.updated_today.insert("B".to_string());
        // One of A's reviews is already known.
        state.reviews.insert(("A".to_string(), "R1".to_string()));
    }
    let factory = Arc::new(FakeSurfaceFactory::with_pages(vec![
        ("https://shop.test/dp/A", "rich-page"),
        ("https://shop.test/dp/C", "blank-page"),
    ]));

    let summary = orchestrator(Arc::clone(&catalog), Arc::clone(&factory), false)
        .run_batch(BatchSelection::Pending { limit: None }, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.total, 3);
    assert_eq!(summary.success, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.server_blocked, 1);
    assert_eq!(summary.retryable_failures(), 1);

    let first = &summary.items[0];
    assert_eq!(first.asin, "A");
    assert!(first.details_saved);
    assert!(first.price_saved);
    assert_eq!(first.reviews_added, 2);

    let state = catalog.state.lock().unwrap();
    // Only the successful item is stamped; the blocked one stays pending.
    assert_eq!(state.marked, vec!["A"]);
    assert_eq!(state.detail_rows, vec!["A"]);
    assert_eq!(state.price_rows.len(), 1);
    assert!(state.reviews.contains(&("A".to_string(), "R2".to_string())));
    assert!(state.reviews.contains(&("A".to_string(), "R3".to_string())));
    drop(state);

    // One surface per attempted item, all released.
    assert_eq!(factory.acquired.load(Ordering::SeqCst), 2);
    assert_eq!(factory.closed.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn network_fault_is_isolated_and_retryable() {
    let catalog = Arc::new(FakeCatalog::with_products(&["A", "B"]));
    let factory = Arc::new(FakeSurfaceFactory::with_pages(vec![
        ("https://shop.test/dp/A", "network-down"),
        ("https://shop.test/dp/B", "rich-page"),
    ]));

    let summary = orchestrator(Arc::clone(&catalog), Arc::clone(&factory), false)
        .run_batch(BatchSelection::Pending { limit: None }, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.network_errors, 1);
    assert_eq!(summary.success, 1);
    assert_eq!(summary.retryable_failures(), 1);
    // The fault on A did not keep B from being processed.
    assert_eq!(catalog.state.lock().unwrap().marked, vec!["B"]);
}

#[tokio::test]
async fn single_selection_processes_one_item() {
    let catalog = Arc::new(FakeCatalog::with_products(&["A", "B"]));
    let factory = Arc::new(FakeSurfaceFactory::with_pages(vec![(
        "https://shop.test/dp/A",
        "rich-page",
    )]));

    let summary = orchestrator(Arc::clone(&catalog), Arc::clone(&factory), false)
        .run_batch(BatchSelection::Single, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.total, 1);
    assert_eq!(summary.success, 1);
}

#[tokio::test]
async fn listing_run_records_the_walked_snapshot() {
    let catalog = Arc::new(FakeCatalog::default());
    let factory = Arc::new(FakeSurfaceFactory::with_pages(vec![(
        "https://shop.test/bestsellers",
        "asin=A1\nasin=A2",
    )]));

    let report = orchestrator(Arc::clone(&catalog), Arc::clone(&factory), false)
        .run_listing(
            "electronics",
            "https://shop.test/bestsellers",
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.category, "electronics");
    assert_eq!(report.products_scraped, 2);
    assert_eq!(report.pages_processed, 1);
    assert_eq!(report.rows_recorded, 2);
    assert_eq!(factory.closed.load(Ordering::SeqCst), 1);

    let state = catalog.state.lock().unwrap();
    assert_eq!(
        state.listing_rows,
        vec![
            ("electronics".to_string(), "A1".to_string()),
            ("electronics".to_string(), "A2".to_string()),
        ]
    );
}
