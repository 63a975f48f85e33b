//! Markup extraction for listing pages and product detail pages.
//!
//! Every field is tried against an ordered chain of selectors, first match
//! wins. A missing field is `None`, never an error; the only hard failure is
//! markup that cannot be interpreted as a page at all.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::domain::error::ScrapeError;
use crate::domain::product::{ListingProduct, ProductDetails, Review, StarHistogram};
use crate::infrastructure::scroller::ItemCounter;
use crate::infrastructure::text_parse;

/// Parses best-seller listing pages.
pub trait ListingExtractor: ItemCounter {
    /// Extract the product rows on one listing page, ranked from `start_rank`.
    fn parse_products(&self, html: &str, start_rank: u32) -> Vec<ListingProduct>;

    /// Absolute URL of the next listing page, if pagination continues.
    fn next_page_url(&self, html: &str) -> Option<String>;
}

/// Parses product detail pages into a structured record.
pub trait DetailExtractor: ItemCounter {
    fn extract(&self, html: &str, url: &str) -> Result<ProductDetails, ScrapeError>;
}

fn sel(css: &str) -> Selector {
    Selector::parse(css).unwrap()
}

/// Element text with collapsed whitespace.
fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().split_whitespace().collect::<Vec<_>>().join(" ")
}

// ---------------------------------------------------------------------------
// Listing pages
// ---------------------------------------------------------------------------

static LISTING_CONTAINER: Lazy<Selector> = Lazy::new(|| sel("div#gridItemRoot"));
static LISTING_NAME: Lazy<Selector> =
    Lazy::new(|| sel("div._cDEzb_p13n-sc-css-line-clamp-3_g3dy1"));
static LISTING_LINK: Lazy<Selector> = Lazy::new(|| sel("a.a-link-normal"));
static LISTING_IMAGE: Lazy<Selector> = Lazy::new(|| sel("img"));
static LISTING_ASIN: Lazy<Selector> = Lazy::new(|| sel("div[data-asin]"));
static NEXT_PAGE: Lazy<Selector> = Lazy::new(|| sel("li.a-last a"));

pub struct SiteListingExtractor {
    base: Url,
}

impl SiteListingExtractor {
    pub fn new(base: Url) -> Self {
        Self { base }
    }

    fn parse_row(&self, container: ElementRef<'_>, rank: u32) -> Option<ListingProduct> {
        let asin = container
            .select(&LISTING_ASIN)
            .find_map(|el| el.value().attr("data-asin"))
            .filter(|a| !a.is_empty())?
            .to_string();
        let href = container
            .select(&LISTING_LINK)
            .find_map(|el| el.value().attr("href"))?;
        let url = self.base.join(href).ok()?.to_string();
        let name = container.select(&LISTING_NAME).next().map(text_of);
        let image_url = container
            .select(&LISTING_IMAGE)
            .find_map(|el| el.value().attr("src"))
            .map(str::to_string);
        Some(ListingProduct { asin, name, url, image_url, rank })
    }
}

impl ItemCounter for SiteListingExtractor {
    fn count_items(&self, html: &str) -> usize {
        let doc = Html::parse_document(html);
        doc.select(&LISTING_CONTAINER).count()
    }
}

impl ListingExtractor for SiteListingExtractor {
    fn parse_products(&self, html: &str, start_rank: u32) -> Vec<ListingProduct> {
        let doc = Html::parse_document(html);
        doc.select(&LISTING_CONTAINER)
            .enumerate()
            .filter_map(|(i, container)| self.parse_row(container, start_rank + i as u32))
            .collect()
    }

    fn next_page_url(&self, html: &str) -> Option<String> {
        let doc = Html::parse_document(html);
        let href = doc
            .select(&NEXT_PAGE)
            .find_map(|el| el.value().attr("href"))?;
        Some(self.base.join(href).ok()?.to_string())
    }
}

// ---------------------------------------------------------------------------
// Detail pages
// ---------------------------------------------------------------------------

static PRICE_WHOLE: Lazy<Selector> = Lazy::new(|| sel("span.a-price-whole"));
static PRICE_FRACTION: Lazy<Selector> = Lazy::new(|| sel("span.a-price-fraction"));
static TABLE_ROW: Lazy<Selector> = Lazy::new(|| sel("tr"));
static TABLE_HEADER: Lazy<Selector> = Lazy::new(|| sel("th"));
static TABLE_CELL: Lazy<Selector> = Lazy::new(|| sel("td"));
static BRAND_ROW_CELL: Lazy<Selector> = Lazy::new(|| sel("tr.po-brand td.a-span9"));
static BYLINE: Lazy<Selector> = Lazy::new(|| sel("a#bylineInfo"));
static AVG_RATING_ICON: Lazy<Selector> =
    Lazy::new(|| sel(r#"i[data-hook="average-star-rating"] span.a-icon-alt"#));
static RATING_TEXT: Lazy<Selector> = Lazy::new(|| sel(r#"span[data-hook="rating-out-of-text"]"#));
static ICON_ALT: Lazy<Selector> = Lazy::new(|| sel("span.a-icon-alt"));
static TOTAL_REVIEWS: Lazy<Selector> =
    Lazy::new(|| sel(r#"span[data-hook="total-review-count"]"#));
static RATINGS_LINK: Lazy<Selector> = Lazy::new(|| sel("a#acrCustomerReviewLink"));
static HISTOGRAM_ROW: Lazy<Selector> = Lazy::new(|| sel("ul#histogramTable li"));
static HISTOGRAM_METER: Lazy<Selector> = Lazy::new(|| sel(r#"div[role="progressbar"]"#));
static HISTOGRAM_LINK: Lazy<Selector> = Lazy::new(|| sel("a"));
static LOCAL_REVIEWS: Lazy<Selector> =
    Lazy::new(|| sel(r#"ul#cm-cr-dp-review-list li[data-hook="review"]"#));
static GLOBAL_REVIEWS: Lazy<Selector> =
    Lazy::new(|| sel(r#"ul#cm-cr-global-review-list li[data-hook="review"]"#));
static ANY_REVIEW: Lazy<Selector> = Lazy::new(|| sel(r#"li[data-hook="review"]"#));
static REVIEW_STARS: Lazy<Selector> =
    Lazy::new(|| sel(r#"i[data-hook="review-star-rating"] span.a-icon-alt"#));
static REVIEW_DATE: Lazy<Selector> = Lazy::new(|| sel(r#"span[data-hook="review-date"]"#));
static REVIEW_TITLE: Lazy<Selector> = Lazy::new(|| sel(r#"a[data-hook="review-title"]"#));
static REVIEW_TITLE_SPAN: Lazy<Selector> = Lazy::new(|| sel("span"));
static ORIGINAL_CONTENT: Lazy<Selector> = Lazy::new(|| sel("span.cr-original-review-content"));
static REVIEW_BODY: Lazy<Selector> = Lazy::new(|| sel(r#"span[data-hook="review-body"]"#));
static VERIFIED_BADGE: Lazy<Selector> = Lazy::new(|| sel(r#"span[data-hook^="avp-badge"]"#));
static HELPFUL_VOTES: Lazy<Selector> =
    Lazy::new(|| sel(r#"span[data-hook="helpful-vote-statement"]"#));

static REVIEW_LOCATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:Calificado en|Reviewed in|Revisado en)\s+(.+?)\s+(?:el|on)\b").unwrap()
});
static PERCENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)%").unwrap());

pub struct SiteDetailExtractor;

impl SiteDetailExtractor {
    pub fn new() -> Self {
        Self
    }

    fn extract_price(doc: &Html) -> Option<f64> {
        let whole = doc.select(&PRICE_WHOLE).next().map(text_of)?;
        let fraction = doc.select(&PRICE_FRACTION).next().map(text_of);
        let raw = match fraction {
            Some(f) => format!("{whole}{f}"),
            None => whole,
        };
        text_parse::parse_price(&raw)
    }

    /// Scan detail tables for a header containing `label` and return the
    /// sibling cell's text. Covers both detail-table layouts.
    fn table_value(doc: &Html, label: &str) -> Option<String> {
        for row in doc.select(&TABLE_ROW) {
            let header = match row.select(&TABLE_HEADER).next() {
                Some(h) => h,
                None => continue,
            };
            if text_of(header).contains(label) {
                if let Some(cell) = row.select(&TABLE_CELL).next() {
                    let value = text_of(cell);
                    if !value.is_empty() {
                        return Some(value);
                    }
                }
            }
        }
        None
    }

    fn extract_brand(doc: &Html) -> Option<String> {
        if let Some(value) = Self::table_value(doc, "Brand") {
            return Some(value);
        }
        if let Some(cell) = doc.select(&BRAND_ROW_CELL).next() {
            let value = text_of(cell);
            if !value.is_empty() {
                return Some(value);
            }
        }
        let byline = text_of(doc.select(&BYLINE).next()?);
        if byline.is_empty() {
            return None;
        }
        if byline.contains("Visit the") {
            return Some(byline.replace("Visit the", "").replace("Store", "").trim().to_string());
        }
        if let Some(stripped) = byline.strip_prefix("Brand:") {
            return Some(stripped.trim().to_string());
        }
        Some(byline)
    }

    fn extract_rating(doc: &Html) -> Option<f64> {
        if let Some(alt) = doc.select(&AVG_RATING_ICON).next() {
            if let Some(rating) = text_parse::parse_rating(&text_of(alt)) {
                return Some(rating);
            }
        }
        if let Some(span) = doc.select(&RATING_TEXT).next() {
            if let Some(rating) = text_parse::parse_rating(&text_of(span)) {
                return Some(rating);
            }
        }
        doc.select(&ICON_ALT)
            .map(|el| text_of(el))
            .filter(|t| {
                let lower = t.to_lowercase();
                lower.contains("stars") || lower.contains("estrellas")
            })
            .find_map(|t| text_parse::parse_rating(&t))
    }

    fn extract_total_reviews(doc: &Html) -> Option<i64> {
        if let Some(span) = doc.select(&TOTAL_REVIEWS).next() {
            if let Some(count) = text_parse::parse_review_count(&text_of(span)) {
                return Some(count);
            }
        }
        let link = doc.select(&RATINGS_LINK).next()?;
        text_parse::parse_review_count(&text_of(link))
    }

    fn extract_histogram(doc: &Html) -> StarHistogram {
        let mut histogram = StarHistogram::default();
        for (idx, row) in doc.select(&HISTOGRAM_ROW).enumerate().take(5) {
            let percent = row
                .select(&HISTOGRAM_METER)
                .find_map(|meter| meter.value().attr("aria-valuenow"))
                .and_then(|v| v.parse::<u8>().ok())
                .or_else(|| {
                    let link = row.select(&HISTOGRAM_LINK).next()?;
                    let text = text_of(link);
                    let captures = PERCENT.captures(&text)?;
                    captures.get(1)?.as_str().parse().ok()
                });
            match idx {
                0 => histogram.five_star = percent,
                1 => histogram.four_star = percent,
                2 => histogram.three_star = percent,
                3 => histogram.two_star = percent,
                _ => histogram.one_star = percent,
            }
        }
        histogram
    }

    fn parse_review(el: ElementRef<'_>) -> Option<Review> {
        let review_id = el.value().attr("id").filter(|id| !id.is_empty())?.to_string();

        let stars = el
            .select(&REVIEW_STARS)
            .next()
            .and_then(|alt| text_parse::parse_review_stars(&text_of(alt)));

        let (date, location) = match el.select(&REVIEW_DATE).next() {
            Some(date_el) => {
                let raw = text_of(date_el);
                let location = REVIEW_LOCATION
                    .captures(&raw)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().trim().to_string());
                (text_parse::parse_review_date(&raw), location)
            }
            None => (None, None),
        };

        let title = el.select(&REVIEW_TITLE).next().and_then(|title_el| {
            if let Some(original) = title_el.select(&ORIGINAL_CONTENT).next() {
                return Some(text_of(original));
            }
            // The title link also carries the star icon text; skip those spans.
            title_el
                .select(&REVIEW_TITLE_SPAN)
                .filter(|span| !span.value().classes().any(|c| c == "a-icon-alt"))
                .map(text_of)
                .find(|t| {
                    let lower = t.to_lowercase();
                    !t.is_empty() && !lower.contains("stars") && !lower.contains("estrellas")
                })
        });

        let text = el.select(&REVIEW_BODY).next().map(|body| {
            body.select(&ORIGINAL_CONTENT)
                .next()
                .map(text_of)
                .unwrap_or_else(|| text_of(body))
        });

        let verified_purchase = el.select(&VERIFIED_BADGE).next().is_some();
        let helpful_count = el
            .select(&HELPFUL_VOTES)
            .next()
            .map(text_of)
            .filter(|t| !t.is_empty());

        Some(Review {
            review_id,
            stars,
            date,
            location,
            title,
            text,
            verified_purchase,
            helpful_count,
        })
    }

    /// Collect reviews from the local and global lists, deduplicated by
    /// review id. Falls back to a page-wide scan when neither list is found.
    fn extract_reviews(doc: &Html) -> Vec<Review> {
        let mut seen = HashSet::new();
        let mut reviews = Vec::new();
        for el in doc.select(&LOCAL_REVIEWS).chain(doc.select(&GLOBAL_REVIEWS)) {
            if let Some(review) = Self::parse_review(el) {
                if seen.insert(review.review_id.clone()) {
                    reviews.push(review);
                }
            }
        }
        if reviews.is_empty() {
            for el in doc.select(&ANY_REVIEW) {
                if let Some(review) = Self::parse_review(el) {
                    if seen.insert(review.review_id.clone()) {
                        reviews.push(review);
                    }
                }
            }
        }
        reviews
    }
}

impl Default for SiteDetailExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ItemCounter for SiteDetailExtractor {
    /// Only the local review list counts toward scroll convergence; global
    /// reviews arrive with it and need no separate signal.
    fn count_items(&self, html: &str) -> usize {
        let doc = Html::parse_document(html);
        doc.select(&LOCAL_REVIEWS).count()
    }
}

impl DetailExtractor for SiteDetailExtractor {
    fn extract(&self, html: &str, url: &str) -> Result<ProductDetails, ScrapeError> {
        if html.trim().is_empty() {
            return Err(ScrapeError::Parse("empty page markup".to_string()));
        }
        let doc = Html::parse_document(html);
        Ok(ProductDetails {
            asin: Self::table_value(&doc, "ASIN"),
            url: url.to_string(),
            price: Self::extract_price(&doc),
            brand: Self::extract_brand(&doc),
            rating: Self::extract_rating(&doc),
            total_reviews: Self::extract_total_reviews(&doc),
            star_histogram: Self::extract_histogram(&doc),
            reviews: Self::extract_reviews(&doc),
        })
    }
}
