//! Convergence-based lazy-load scrolling.
//!
//! Scrolls a rendered page in fixed steps and, each time the bottom is
//! reached, waits for lazy content to settle and counts the items of
//! interest. The pass ends once the count has stayed unchanged for a
//! configured number of consecutive observations. Faults during a pass are
//! absorbed as zero-progress observations so a flaky page still converges.

use std::time::Duration;

use tracing::{debug, warn};

use crate::infrastructure::browser::RenderSurface;
use crate::infrastructure::config::ScrollingConfig;

/// Counts the items a scroll pass is trying to surface in rendered markup.
pub trait ItemCounter: Send + Sync {
    fn count_items(&self, html: &str) -> usize;
}

/// Tuning for one scroll pass.
#[derive(Debug, Clone)]
pub struct ScrollConfig {
    pub step_px: u32,
    pub pause: Duration,
    pub settle_wait: Duration,
    pub max_no_change_streak: u32,
}

impl From<&ScrollingConfig> for ScrollConfig {
    fn from(c: &ScrollingConfig) -> Self {
        Self {
            step_px: c.step_px,
            pause: Duration::from_millis(c.pause_ms),
            settle_wait: Duration::from_millis(c.settle_wait_ms),
            max_no_change_streak: c.max_no_change_streak,
        }
    }
}

pub struct ConvergenceScroller {
    config: ScrollConfig,
}

impl ConvergenceScroller {
    pub fn new(config: ScrollConfig) -> Self {
        Self { config }
    }

    /// Scroll until the observed item count stops changing.
    ///
    /// Returns the last stable count. Never fails: every fault is treated as
    /// an observation with no new items, which feeds the exit streak.
    pub async fn scroll_until_stable<C>(&self, surface: &dyn RenderSurface, counter: &C) -> usize
    where
        C: ItemCounter + ?Sized,
    {
        let mut position: u64 = 0;
        let mut last_count: usize = 0;
        let mut streak: u32 = 0;

        loop {
            let height = self.read_height(surface).await;
            position += u64::from(self.config.step_px);
            if let Err(e) = surface
                .execute_script(&format!("window.scrollTo(0, {position});"))
                .await
            {
                warn!("Scroll step failed, treating as no progress: {}", e);
                streak += 1;
                if streak >= self.config.max_no_change_streak {
                    break;
                }
                continue;
            }
            tokio::time::sleep(self.config.pause).await;

            if position >= height {
                tokio::time::sleep(self.config.settle_wait).await;

                let count = match surface.content().await {
                    Ok(html) => counter.count_items(&html),
                    Err(e) => {
                        warn!("Content read failed during scroll pass: {}", e);
                        last_count
                    }
                };
                if count == last_count {
                    streak += 1;
                    debug!(
                        "No new items at {} ({}/{} stable observations)",
                        count, streak, self.config.max_no_change_streak
                    );
                } else {
                    debug!("Item count moved from {} to {}", last_count, count);
                    streak = 0;
                    last_count = count;
                }
                if streak >= self.config.max_no_change_streak {
                    break;
                }

                // Lazy content may have grown the document under us; back the
                // cursor up to the old bottom so the new region is covered.
                let new_height = self.read_height(surface).await;
                if new_height > height {
                    position = height;
                }
            }
        }

        debug!("Scroll pass converged at {} items", last_count);
        last_count
    }

    async fn read_height(&self, surface: &dyn RenderSurface) -> u64 {
        match surface.execute_script("document.body.scrollHeight").await {
            Ok(value) => value.as_u64().unwrap_or(0),
            Err(e) => {
                warn!("Height read failed, assuming bottom: {}", e);
                0
            }
        }
    }
}
