//! View recency tracking over fixed time windows.
//!
//! Each view writes the current epoch-millisecond timestamp as the item's
//! score in every window's ranked set, globally and for the owning feed. A
//! repeat view only refreshes the score. Queries keep members whose score
//! falls inside the window. Entries are never pruned from the ranked sets;
//! stale members stay until they are viewed again, and the score filter at
//! read time keeps them out of results.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::clock::Clock;
use crate::error::{Result, StorageContext};
use crate::feeds::FeedRepository;
use crate::items::ItemRepository;
use crate::keys;
use crate::kv::KvStore;
use crate::model::Item;

pub const DEFAULT_TRENDING_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrendingWindow {
    #[serde(rename = "1h")]
    Hour,
    #[serde(rename = "24h")]
    Day,
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
}

impl TrendingWindow {
    pub const ALL: [TrendingWindow; 4] = [
        TrendingWindow::Hour,
        TrendingWindow::Day,
        TrendingWindow::Week,
        TrendingWindow::Month,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TrendingWindow::Hour => "1h",
            TrendingWindow::Day => "24h",
            TrendingWindow::Week => "7d",
            TrendingWindow::Month => "30d",
        }
    }

    pub fn duration(self) -> Duration {
        match self {
            TrendingWindow::Hour => Duration::seconds(3_600),
            TrendingWindow::Day => Duration::seconds(86_400),
            TrendingWindow::Week => Duration::seconds(604_800),
            TrendingWindow::Month => Duration::seconds(2_592_000),
        }
    }
}

impl fmt::Display for TrendingWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown trending window `{0}`, expected one of 1h, 24h, 7d, 30d")]
pub struct UnknownWindow(pub String);

impl FromStr for TrendingWindow {
    type Err = UnknownWindow;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TrendingWindow::ALL
            .into_iter()
            .find(|w| w.as_str() == s)
            .ok_or_else(|| UnknownWindow(s.to_string()))
    }
}

#[derive(Clone)]
pub struct TrendingTracker {
    kv: Arc<dyn KvStore>,
    feeds: FeedRepository,
    items: ItemRepository,
    clock: Arc<dyn Clock>,
}

impl TrendingTracker {
    pub fn new(
        kv: Arc<dyn KvStore>,
        feeds: FeedRepository,
        items: ItemRepository,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            kv,
            feeds,
            items,
            clock,
        }
    }

    /// Records a view of `item_id` and returns the ID of the feed it was
    /// credited to, if any feed's index list contains it.
    ///
    /// Only the first owning feed (in directory ID order) is credited.
    #[instrument(level = "debug", skip(self))]
    pub async fn track_view(&self, item_id: &str) -> Result<Option<String>> {
        let score = self.clock.now().timestamp_millis() as f64;

        for window in TrendingWindow::ALL {
            self.record(&keys::trending(window), score, item_id).await?;
        }

        let owner = self.find_owner(item_id).await?;
        if let Some(feed_id) = &owner {
            for window in TrendingWindow::ALL {
                self.record(&keys::feed_trending(feed_id, window), score, item_id)
                    .await?;
            }
        }

        debug!(owner = ?owner, "Tracked view");
        Ok(owner)
    }

    async fn record(&self, key: &str, score: f64, item_id: &str) -> Result<()> {
        self.kv
            .ranked_add(key, score, item_id)
            .await
            .storage_context(|| format!("could not record a view of `{item_id}` in `{key}`"))
    }

    async fn find_owner(&self, item_id: &str) -> Result<Option<String>> {
        for feed_id in self.feeds.feed_ids().await? {
            let ids = self.items.item_ids(&feed_id).await?;
            if ids.iter().any(|id| id == item_id) {
                return Ok(Some(feed_id));
            }
        }
        Ok(None)
    }

    /// Items viewed within `window`, most recently viewed first.
    pub async fn get_trending(&self, window: TrendingWindow, limit: usize) -> Result<Vec<Item>> {
        self.query(&keys::trending(window), window, limit).await
    }

    pub async fn get_feed_trending(
        &self,
        feed_id: &str,
        window: TrendingWindow,
        limit: usize,
    ) -> Result<Vec<Item>> {
        self.query(&keys::feed_trending(feed_id, window), window, limit)
            .await
    }

    async fn query(&self, key: &str, window: TrendingWindow, limit: usize) -> Result<Vec<Item>> {
        let cutoff = (self.clock.now() - window.duration()).timestamp_millis() as f64;
        let ids = self
            .kv
            .ranked_range_by_score_desc(key, f64::INFINITY, cutoff, limit)
            .await
            .storage_context(|| format!("could not read trending set `{key}`"))?;
        self.items.get_items(&ids).await
    }
}
