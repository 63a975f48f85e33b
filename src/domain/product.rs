use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A catalog item waiting for a detail scrape.
///
/// Owned by the catalog store; the orchestrator only reads it and reports
/// completion back through `mark_scraped`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingProduct {
    pub asin: String,
    pub url: String,
    pub category: Option<String>,
    pub last_detail_scrape: Option<DateTime<Utc>>,
    pub has_details: bool,
}

impl PendingProduct {
    /// Whether the gating rule allows a new attempt: never scraped, stale
    /// beyond the threshold, or force-overridden by the caller.
    pub fn is_eligible(&self, stale_after_days: u32, force: bool, now: DateTime<Utc>) -> bool {
        if force {
            return true;
        }
        match self.last_detail_scrape {
            None => true,
            Some(ts) => now - ts > chrono::Duration::days(i64::from(stale_after_days)),
        }
    }
}

/// One row scraped from a best-seller listing page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingProduct {
    pub asin: String,
    pub name: Option<String>,
    pub url: String,
    pub image_url: Option<String>,
    pub rank: u32,
}

/// Star rating distribution in percent, five down to one star.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StarHistogram {
    pub five_star: Option<u8>,
    pub four_star: Option<u8>,
    pub three_star: Option<u8>,
    pub two_star: Option<u8>,
    pub one_star: Option<u8>,
}

impl StarHistogram {
    pub fn is_empty(&self) -> bool {
        self.five_star.is_none()
            && self.four_star.is_none()
            && self.three_star.is_none()
            && self.two_star.is_none()
            && self.one_star.is_none()
    }
}

/// A single customer review, identified by a stable review id unique within
/// its parent product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub review_id: String,
    pub stars: Option<i32>,
    pub date: Option<NaiveDate>,
    pub location: Option<String>,
    pub title: Option<String>,
    pub text: Option<String>,
    pub verified_purchase: bool,
    pub helpful_count: Option<String>,
}

/// The structured output of one detail-page extraction. Every field is
/// independently optional; absence means the page did not yield it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductDetails {
    pub asin: Option<String>,
    pub url: String,
    pub price: Option<f64>,
    pub brand: Option<String>,
    pub rating: Option<f64>,
    pub total_reviews: Option<i64>,
    pub star_histogram: StarHistogram,
    pub reviews: Vec<Review>,
}

impl ProductDetails {
    /// All four main fields unknown. A page that should have content but
    /// yields nothing is treated as a silent server block, not data absence.
    pub fn all_main_fields_empty(&self) -> bool {
        self.price.is_none()
            && self.rating.is_none()
            && self.brand.is_none()
            && self.total_reviews.is_none()
    }

    /// Price and rating are the minimum fields required downstream.
    pub fn has_minimum_fields(&self) -> bool {
        self.price.is_some() || self.rating.is_some()
    }
}
