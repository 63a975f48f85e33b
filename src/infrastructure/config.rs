//! Configuration loading and management.
//!
//! Settings are persisted as JSON under the platform config directory and
//! written out with defaults on first run, so a fresh install has a file the
//! operator can edit.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;
use tracing::info;

/// Complete application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub browser: BrowserConfig,
    pub scrolling: ScrollingConfig,
    pub delays: DelayConfig,
    pub batch: BatchConfig,
    pub database: DatabaseConfig,
}

/// Browser session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    pub user_agent: String,
    /// Wait after navigation before the first scroll, in milliseconds.
    pub page_load_wait_ms: u64,
    pub request_timeout_seconds: u64,
}

/// Lazy-load scroll settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollingConfig {
    pub step_px: u32,
    pub pause_ms: u64,
    /// Wait after reaching the bottom before re-counting items.
    pub settle_wait_ms: u64,
    /// Stop after this many consecutive observations with no new items.
    pub max_no_change_streak: u32,
}

/// Randomized delay ranges between items, in seconds, keyed by outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DelayConfig {
    pub success_min_s: f64,
    pub success_max_s: f64,
    pub skip_min_s: f64,
    pub skip_max_s: f64,
    pub server_blocked_min_s: f64,
    pub server_blocked_max_s: f64,
    pub network_error_min_s: f64,
    pub network_error_max_s: f64,
    pub error_min_s: f64,
    pub error_max_s: f64,
}

/// Batch selection and retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub default_limit: u32,
    pub stale_after_days: u32,
    /// Upper bound for the caller-owned re-run loop around a batch.
    pub max_batch_attempts: u32,
}

/// Catalog database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                         AppleWebKit/537.36 (KHTML, like Gecko) \
                         Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            page_load_wait_ms: 3000,
            request_timeout_seconds: 30,
        }
    }
}

impl Default for ScrollingConfig {
    fn default() -> Self {
        Self {
            step_px: 600,
            pause_ms: 500,
            settle_wait_ms: 2500,
            max_no_change_streak: 4,
        }
    }
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            success_min_s: 3.0,
            success_max_s: 8.0,
            skip_min_s: 0.5,
            skip_max_s: 1.5,
            server_blocked_min_s: 30.0,
            server_blocked_max_s: 60.0,
            network_error_min_s: 10.0,
            network_error_max_s: 20.0,
            error_min_s: 5.0,
            error_max_s: 10.0,
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            stale_after_days: 1,
            max_batch_attempts: 5,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/shelfwatch.db".to_string(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            browser: BrowserConfig::default(),
            scrolling: ScrollingConfig::default(),
            delays: DelayConfig::default(),
            batch: BatchConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

impl AppConfig {
    /// Path of the config file under the platform config directory.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("shelfwatch")
            .join("config.json")
    }

    /// Load configuration from the given path, writing defaults on first run.
    pub async fn load_or_create(path: &PathBuf) -> Result<Self> {
        if path.exists() {
            let raw = fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            let config: Self = serde_json::from_str(&raw)
                .with_context(|| format!("invalid config file {}", path.display()))?;
            Ok(config)
        } else {
            let config = Self::default();
            config.save(path).await?;
            info!("Created default configuration at {}", path.display());
            Ok(config)
        }
    }

    pub async fn save(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create config directory {}", parent.display()))?;
        }
        let raw = serde_json::to_string_pretty(self).context("failed to serialize config")?;
        fs::write(path, raw)
            .await
            .with_context(|| format!("failed to write config file {}", path.display()))?;
        Ok(())
    }
}
