//! Incremental persistence of a scraped record.
//!
//! Reviews load as a delta against what the catalog already holds; details
//! and price points are independent writes. A failed write never aborts the
//! batch, it only shows up in the delta counts and the item outcome.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, warn};

use crate::domain::product::{ProductDetails, Review};
use crate::infrastructure::repository::CatalogStore;

/// What one review delta actually did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeltaResult {
    pub inserted: u32,
    pub skipped: u32,
    pub failed: u32,
}

/// Split scraped reviews into new ones and an already-present count.
pub fn split_delta<'a>(
    existing: &HashSet<String>,
    reviews: &'a [Review],
) -> (Vec<&'a Review>, u32) {
    let mut fresh = Vec::new();
    let mut skipped = 0;
    for review in reviews {
        if existing.contains(&review.review_id) {
            skipped += 1;
        } else {
            fresh.push(review);
        }
    }
    (fresh, skipped)
}

pub struct IncrementalLoader {
    catalog: Arc<dyn CatalogStore>,
}

impl IncrementalLoader {
    pub fn new(catalog: Arc<dyn CatalogStore>) -> Self {
        Self { catalog }
    }

    /// Insert only the reviews the catalog has not seen for this product.
    pub async fn load_reviews(&self, asin: &str, reviews: &[Review]) -> Result<DeltaResult> {
        let existing = self.catalog.existing_review_ids(asin).await?;
        let (fresh, skipped) = split_delta(&existing, reviews);
        let mut delta = DeltaResult { skipped, ..DeltaResult::default() };

        for review in fresh {
            match self.catalog.insert_review(asin, review).await {
                Ok(true) => delta.inserted += 1,
                // Raced with an earlier duplicate inside this same batch.
                Ok(false) => delta.skipped += 1,
                Err(e) => {
                    warn!("Review {} for {} failed to persist: {}", review.review_id, asin, e);
                    delta.failed += 1;
                }
            }
        }
        debug!(
            "Review delta for {}: +{} ={} !{}",
            asin, delta.inserted, delta.skipped, delta.failed
        );
        Ok(delta)
    }

    /// Append the detail snapshot. Returns whether the write committed.
    pub async fn save_details(&self, asin: &str, details: &ProductDetails) -> bool {
        match self.catalog.insert_details(asin, details).await {
            Ok(saved) => saved,
            Err(e) => {
                warn!("Detail snapshot for {} failed to persist: {}", asin, e);
                false
            }
        }
    }

    /// Upsert today's price point. Returns whether the write committed.
    pub async fn save_price_point(&self, asin: &str, price: f64) -> bool {
        let today = Utc::now().date_naive();
        match self.catalog.upsert_price_point(asin, today, price).await {
            Ok(saved) => saved,
            Err(e) => {
                warn!("Price point for {} failed to persist: {}", asin, e);
                false
            }
        }
    }
}
