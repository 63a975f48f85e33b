//! SQLite-backed product catalog.
//!
//! The catalog is the single durable surface of the system: products known
//! from listing runs, their scraped details, a one-row-per-day price history,
//! and deduplicated reviews. All writes are idempotent upserts so re-running
//! a batch never duplicates data.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::domain::product::{ListingProduct, PendingProduct, ProductDetails, Review};

/// Durable catalog operations used by the orchestrator and the CLI.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Products needing a detail scrape, never-scraped first, then stalest.
    /// `stale_after_days = 0` makes every product eligible.
    async fn list_pending(
        &self,
        limit: Option<u32>,
        stale_after_days: u32,
    ) -> Result<Vec<PendingProduct>>;

    /// Products from the most recent listing run.
    async fn list_from_latest_batch(&self, limit: Option<u32>) -> Result<Vec<PendingProduct>>;

    /// One arbitrary product, for smoke-testing a single scrape.
    async fn single_for_test(&self) -> Result<Option<PendingProduct>>;

    /// Whether the product's detail scrape already ran today.
    async fn was_updated_today(&self, asin: &str) -> Result<bool>;

    /// Review ids already stored for a product.
    async fn existing_review_ids(&self, asin: &str) -> Result<HashSet<String>>;

    /// Stamp a product as detail-scraped now. Returns whether a row changed.
    async fn mark_scraped(&self, asin: &str) -> Result<bool>;

    /// Append a detail snapshot row.
    async fn insert_details(&self, asin: &str, details: &ProductDetails) -> Result<bool>;

    /// Insert or refresh the price point for one calendar day.
    async fn upsert_price_point(&self, asin: &str, date: NaiveDate, price: f64) -> Result<bool>;

    /// Insert one review. Returns false when the id already exists.
    async fn insert_review(&self, asin: &str, review: &Review) -> Result<bool>;

    /// Record one listing run: snapshot rows plus product upserts.
    async fn record_listing(&self, category: &str, products: &[ListingProduct]) -> Result<u32>;
}

pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    /// Open (and create if needed) the catalog database at `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self> {
        if let Some(path) = database_url.strip_prefix("sqlite://") {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await.with_context(|| {
                        format!("failed to create database directory {}", parent.display())
                    })?;
                }
            }
        }
        let url = if database_url.contains('?') {
            database_url.to_string()
        } else {
            format!("{database_url}?mode=rwc")
        };
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .with_context(|| format!("failed to open catalog database {database_url}"))?;
        info!("Catalog database connected: {}", database_url);
        Ok(Self { pool })
    }

    /// Create the schema. Safe to run on every start.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS products (
                asin TEXT PRIMARY KEY,
                product_url TEXT NOT NULL,
                category TEXT,
                name TEXT,
                has_details INTEGER NOT NULL DEFAULT 0,
                last_detail_scrape TEXT,
                has_price_history INTEGER NOT NULL DEFAULT 0,
                last_price_scrape TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS listing_snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                category TEXT NOT NULL,
                rank_position INTEGER NOT NULL,
                asin TEXT NOT NULL,
                name TEXT,
                url TEXT NOT NULL,
                image_url TEXT,
                scraped_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS product_details (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                asin TEXT NOT NULL,
                brand TEXT,
                price REAL,
                avg_rating REAL,
                total_reviews INTEGER,
                rating_histogram TEXT,
                scraped_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS price_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                asin TEXT NOT NULL,
                price_date TEXT NOT NULL,
                price REAL NOT NULL,
                source TEXT NOT NULL DEFAULT 'detail_page',
                inserted_at TEXT NOT NULL,
                UNIQUE (asin, price_date)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS reviews (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                asin TEXT NOT NULL,
                review_id TEXT NOT NULL,
                rating INTEGER,
                review_date TEXT,
                country TEXT,
                title TEXT,
                review_text TEXT,
                verified_purchase INTEGER NOT NULL DEFAULT 0,
                helpful_count TEXT,
                scraped_at TEXT NOT NULL,
                UNIQUE (asin, review_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        debug!("Catalog schema ensured");
        Ok(())
    }

    fn row_to_pending(row: &sqlx::sqlite::SqliteRow) -> PendingProduct {
        PendingProduct {
            asin: row.get("asin"),
            url: row.get("product_url"),
            category: row.get("category"),
            last_detail_scrape: row.get("last_detail_scrape"),
            has_details: row.get::<i64, _>("has_details") != 0,
        }
    }
}

#[async_trait]
impl CatalogStore for SqliteCatalog {
    async fn list_pending(
        &self,
        limit: Option<u32>,
        stale_after_days: u32,
    ) -> Result<Vec<PendingProduct>> {
        let mut sql = String::from(
            "SELECT asin, product_url, category, last_detail_scrape, has_details \
             FROM products \
             WHERE last_detail_scrape IS NULL \
                OR datetime(last_detail_scrape) <= datetime('now', '-' || ? || ' days') \
             ORDER BY has_details ASC, (last_detail_scrape IS NOT NULL) ASC, \
                      last_detail_scrape ASC",
        );
        if limit.is_some() {
            sql.push_str(" LIMIT ?");
        }
        let mut query = sqlx::query(&sql).bind(stale_after_days);
        if let Some(limit) = limit {
            query = query.bind(limit);
        }
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(Self::row_to_pending).collect())
    }

    async fn list_from_latest_batch(&self, limit: Option<u32>) -> Result<Vec<PendingProduct>> {
        let mut sql = String::from(
            "SELECT p.asin, p.product_url, p.category, p.last_detail_scrape, p.has_details \
             FROM products p \
             JOIN (SELECT asin, MIN(rank_position) AS rank_position \
                   FROM listing_snapshots \
                   WHERE scraped_at = (SELECT MAX(scraped_at) FROM listing_snapshots) \
                   GROUP BY asin) b ON b.asin = p.asin \
             WHERE p.has_details = 0 \
                OR p.last_detail_scrape IS NULL \
                OR DATE(p.last_detail_scrape) < DATE('now') \
             ORDER BY b.rank_position ASC",
        );
        if limit.is_some() {
            sql.push_str(" LIMIT ?");
        }
        let mut query = sqlx::query(&sql);
        if let Some(limit) = limit {
            query = query.bind(limit);
        }
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(Self::row_to_pending).collect())
    }

    async fn single_for_test(&self) -> Result<Option<PendingProduct>> {
        let row = sqlx::query(
            "SELECT asin, product_url, category, last_detail_scrape, has_details \
             FROM products ORDER BY created_at ASC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(Self::row_to_pending))
    }

    async fn was_updated_today(&self, asin: &str) -> Result<bool> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM products \
             WHERE asin = ? AND DATE(last_detail_scrape) = DATE('now')",
        )
        .bind(asin)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<i64, _>("n") > 0)
    }

    async fn existing_review_ids(&self, asin: &str) -> Result<HashSet<String>> {
        let rows = sqlx::query("SELECT review_id FROM reviews WHERE asin = ?")
            .bind(asin)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|r| r.get("review_id")).collect())
    }

    async fn mark_scraped(&self, asin: &str) -> Result<bool> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE products SET has_details = 1, last_detail_scrape = ?, updated_at = ? \
             WHERE asin = ?",
        )
        .bind(now)
        .bind(now)
        .bind(asin)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_details(&self, asin: &str, details: &ProductDetails) -> Result<bool> {
        let histogram = serde_json::to_string(&details.star_histogram)
            .context("failed to serialize rating histogram")?;
        sqlx::query(
            "INSERT INTO product_details \
             (asin, brand, price, avg_rating, total_reviews, rating_histogram, scraped_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(asin)
        .bind(&details.brand)
        .bind(details.price)
        .bind(details.rating)
        .bind(details.total_reviews)
        .bind(histogram)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(true)
    }

    async fn upsert_price_point(&self, asin: &str, date: NaiveDate, price: f64) -> Result<bool> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO price_history (asin, price_date, price, inserted_at) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT (asin, price_date) DO UPDATE SET \
                price = excluded.price, inserted_at = excluded.inserted_at",
        )
        .bind(asin)
        .bind(date)
        .bind(price)
        .bind(now)
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "UPDATE products SET has_price_history = 1, last_price_scrape = ?, updated_at = ? \
             WHERE asin = ?",
        )
        .bind(now)
        .bind(now)
        .bind(asin)
        .execute(&self.pool)
        .await?;
        Ok(true)
    }

    async fn insert_review(&self, asin: &str, review: &Review) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO reviews \
             (asin, review_id, rating, review_date, country, title, review_text, \
              verified_purchase, helpful_count, scraped_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (asin, review_id) DO NOTHING",
        )
        .bind(asin)
        .bind(&review.review_id)
        .bind(review.stars)
        .bind(review.date)
        .bind(&review.location)
        .bind(&review.title)
        .bind(&review.text)
        .bind(review.verified_purchase)
        .bind(&review.helpful_count)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_listing(&self, category: &str, products: &[ListingProduct]) -> Result<u32> {
        // One timestamp for the whole run so the batch can be selected later.
        let now = Utc::now();
        let mut recorded = 0u32;
        for product in products {
            sqlx::query(
                "INSERT INTO listing_snapshots \
                 (category, rank_position, asin, name, url, image_url, scraped_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(category)
            .bind(product.rank)
            .bind(&product.asin)
            .bind(&product.name)
            .bind(&product.url)
            .bind(&product.image_url)
            .bind(now)
            .execute(&self.pool)
            .await?;

            sqlx::query(
                "INSERT INTO products (asin, product_url, category, name, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?) \
                 ON CONFLICT (asin) DO UPDATE SET \
                    product_url = excluded.product_url, \
                    category = excluded.category, \
                    name = COALESCE(excluded.name, products.name), \
                    updated_at = excluded.updated_at",
            )
            .bind(&product.asin)
            .bind(&product.url)
            .bind(category)
            .bind(&product.name)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await?;

            recorded += 1;
        }
        info!("Recorded {} listing rows for category {}", recorded, category);
        Ok(recorded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::product::StarHistogram;

    async fn catalog(dir: &tempfile::TempDir) -> SqliteCatalog {
        let url = format!("sqlite://{}", dir.path().join("catalog.db").display());
        let catalog = SqliteCatalog::connect(&url).await.unwrap();
        catalog.migrate().await.unwrap();
        catalog
    }

    fn listing_product(asin: &str, rank: u32) -> ListingProduct {
        ListingProduct {
            asin: asin.to_string(),
            name: Some(format!("Product {asin}")),
            url: format!("https://shop.test/dp/{asin}"),
            image_url: None,
            rank,
        }
    }

    fn review(id: &str) -> Review {
        Review {
            review_id: id.to_string(),
            stars: Some(5),
            date: NaiveDate::from_ymd_opt(2026, 1, 4),
            location: Some("the United States".to_string()),
            title: Some("Great".to_string()),
            text: Some("Works.".to_string()),
            verified_purchase: true,
            helpful_count: None,
        }
    }

    #[tokio::test]
    async fn listing_run_creates_products_and_pending_sees_them() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = catalog(&dir).await;

        let recorded = catalog
            .record_listing("electronics", &[listing_product("A1", 1), listing_product("A2", 2)])
            .await
            .unwrap();
        assert_eq!(recorded, 2);

        let pending = catalog.list_pending(None, 1).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|p| !p.has_details));
        assert!(pending.iter().all(|p| p.last_detail_scrape.is_none()));

        let limited = catalog.list_pending(Some(1), 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn repeated_listing_runs_upsert_products() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = catalog(&dir).await;

        catalog
            .record_listing("electronics", &[listing_product("A1", 1)])
            .await
            .unwrap();
        catalog
            .record_listing("electronics", &[listing_product("A1", 3), listing_product("A2", 1)])
            .await
            .unwrap();

        let pending = catalog.list_pending(None, 1).await.unwrap();
        assert_eq!(pending.len(), 2);

        // Latest batch only sees the second run.
        let latest = catalog.list_from_latest_batch(None).await.unwrap();
        let asins: Vec<_> = latest.iter().map(|p| p.asin.as_str()).collect();
        assert_eq!(asins, vec!["A2", "A1"]);
    }

    #[tokio::test]
    async fn mark_scraped_gates_further_attempts_today() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = catalog(&dir).await;
        catalog
            .record_listing("electronics", &[listing_product("A1", 1)])
            .await
            .unwrap();

        assert!(!catalog.was_updated_today("A1").await.unwrap());
        assert!(catalog.mark_scraped("A1").await.unwrap());
        assert!(catalog.was_updated_today("A1").await.unwrap());
        assert!(!catalog.mark_scraped("UNKNOWN").await.unwrap());

        // Freshly stamped products drop out of the pending set.
        let pending = catalog.list_pending(None, 1).await.unwrap();
        assert!(pending.is_empty());
        // A zero-day threshold readmits them.
        let all = catalog.list_pending(None, 0).await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].has_details);
    }

    #[tokio::test]
    async fn latest_batch_excludes_items_updated_today() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = catalog(&dir).await;
        catalog
            .record_listing("electronics", &[listing_product("A1", 1), listing_product("A2", 2)])
            .await
            .unwrap();
        catalog.mark_scraped("A1").await.unwrap();

        let latest = catalog.list_from_latest_batch(None).await.unwrap();
        let asins: Vec<_> = latest.iter().map(|p| p.asin.as_str()).collect();
        assert_eq!(asins, vec!["A2"]);
    }

    #[tokio::test]
    async fn reviews_are_deduplicated_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = catalog(&dir).await;

        assert!(catalog.insert_review("A1", &review("R1")).await.unwrap());
        assert!(!catalog.insert_review("A1", &review("R1")).await.unwrap());
        assert!(catalog.insert_review("A1", &review("R2")).await.unwrap());
        // Same review id under another product is a distinct row.
        assert!(catalog.insert_review("A2", &review("R1")).await.unwrap());

        let ids = catalog.existing_review_ids("A1").await.unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("R1") && ids.contains("R2"));
    }

    #[tokio::test]
    async fn price_point_is_one_row_per_day() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = catalog(&dir).await;
        catalog
            .record_listing("electronics", &[listing_product("A1", 1)])
            .await
            .unwrap();

        let day = NaiveDate::from_ymd_opt(2026, 8, 23).unwrap();
        assert!(catalog.upsert_price_point("A1", day, 19.99).await.unwrap());
        assert!(catalog.upsert_price_point("A1", day, 17.49).await.unwrap());

        let row = sqlx::query("SELECT COUNT(*) AS n, MAX(price) AS p FROM price_history")
            .fetch_one(&catalog.pool)
            .await
            .unwrap();
        assert_eq!(row.get::<i64, _>("n"), 1);
        assert!((row.get::<f64, _>("p") - 17.49).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn details_snapshot_round_trips_histogram() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = catalog(&dir).await;

        let details = ProductDetails {
            asin: Some("A1".to_string()),
            url: "https://shop.test/dp/A1".to_string(),
            price: Some(19.99),
            brand: Some("Acme".to_string()),
            rating: Some(4.4),
            total_reviews: Some(35231),
            star_histogram: StarHistogram {
                five_star: Some(70),
                ..StarHistogram::default()
            },
            reviews: vec![],
        };
        assert!(catalog.insert_details("A1", &details).await.unwrap());

        let row = sqlx::query("SELECT rating_histogram FROM product_details WHERE asin = 'A1'")
            .fetch_one(&catalog.pool)
            .await
            .unwrap();
        let histogram: StarHistogram =
            serde_json::from_str(&row.get::<String, _>("rating_histogram")).unwrap();
        assert_eq!(histogram.five_star, Some(70));
    }

    #[tokio::test]
    async fn single_for_test_returns_some_product() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = catalog(&dir).await;
        assert!(catalog.single_for_test().await.unwrap().is_none());

        catalog
            .record_listing("electronics", &[listing_product("A1", 1)])
            .await
            .unwrap();
        let product = catalog.single_for_test().await.unwrap().unwrap();
        assert_eq!(product.asin, "A1");
    }
}
