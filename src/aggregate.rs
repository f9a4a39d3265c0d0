//! Cross-feed views: global item listing, categories and stats.
//!
//! None of these views is stored. Every query loads the whole corpus (all
//! feeds and all of their items) and filters, sorts and slices in memory,
//! so cost grows linearly with the total item count. A materialized index
//! maintained on write could replace [`Corpus`] without changing callers.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::feeds::FeedRepository;
use crate::items::ItemRepository;
use crate::model::{Feed, Item};

const DEFAULT_PAGE_SIZE: usize = 50;

fn default_limit() -> usize {
    DEFAULT_PAGE_SIZE
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Page {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

impl Page {
    pub fn new(limit: usize, offset: usize) -> Self {
        Self { limit, offset }
    }

    fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        items
            .into_iter()
            .skip(self.offset)
            .take(self.limit)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ItemQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
    /// Drop items whose effective date is before this instant
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
}

impl Default for ItemQuery {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
            since: None,
        }
    }
}

impl ItemQuery {
    fn page(&self) -> Page {
        Page::new(self.limit, self.offset)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_feeds: usize,
    pub total_items: usize,
    pub total_categories: usize,
}

struct CorpusFeed {
    feed: Feed,
    items: Vec<Item>,
}

impl CorpusFeed {
    fn has_category(&self, category: &str) -> bool {
        self.feed.has_category(category) || self.items.iter().any(|i| i.has_category(category))
    }
}

/// Snapshot of every feed in the directory with its items.
struct Corpus {
    feeds: Vec<CorpusFeed>,
}

impl Corpus {
    fn items(&self) -> impl Iterator<Item = &Item> {
        self.feeds.iter().flat_map(|f| f.items.iter())
    }

    fn categories(&self) -> BTreeSet<&str> {
        let mut categories = BTreeSet::new();
        for entry in &self.feeds {
            categories.extend(entry.feed.categories.iter().map(String::as_str));
            for item in &entry.items {
                for tag in &item.category {
                    categories.extend(tag.labels());
                }
            }
        }
        categories
    }
}

/// Newest first by effective date. The sort is stable, so items with equal
/// dates keep the order they were encountered in.
fn sort_newest_first(items: &mut [Item]) {
    items.sort_by(|a, b| b.effective_date().cmp(&a.effective_date()));
}

#[derive(Clone)]
pub struct Aggregator {
    feeds: FeedRepository,
    items: ItemRepository,
}

impl Aggregator {
    pub fn new(feeds: FeedRepository, items: ItemRepository) -> Self {
        Self { feeds, items }
    }

    async fn load_corpus(&self) -> Result<Corpus> {
        let mut feeds = Vec::new();
        for (feed_id, feed) in self.feeds.entries().await? {
            let items = self.items.list_items(&feed_id).await?;
            feeds.push(CorpusFeed { feed, items });
        }
        Ok(Corpus { feeds })
    }

    /// Items of every feed, newest first, optionally bounded by `since`.
    pub async fn list_all_items(&self, query: &ItemQuery) -> Result<Vec<Item>> {
        let corpus = self.load_corpus().await?;
        let mut items: Vec<Item> = corpus
            .items()
            .filter(|item| query.since.map_or(true, |since| item.effective_date() >= since))
            .cloned()
            .collect();
        sort_newest_first(&mut items);
        Ok(query.page().apply(items))
    }

    /// Every category string used by a feed or an item tag, sorted.
    pub async fn list_categories(&self) -> Result<Vec<String>> {
        let corpus = self.load_corpus().await?;
        Ok(corpus
            .categories()
            .into_iter()
            .map(str::to_string)
            .collect())
    }

    pub async fn list_items_by_category(&self, category: &str, page: Page) -> Result<Vec<Item>> {
        let corpus = self.load_corpus().await?;
        let mut items: Vec<Item> = corpus
            .items()
            .filter(|item| item.has_category(category))
            .cloned()
            .collect();
        sort_newest_first(&mut items);
        Ok(page.apply(items))
    }

    /// Feeds listing `category` themselves or holding an item tagged with it.
    pub async fn list_feeds_by_category(&self, category: &str) -> Result<Vec<Feed>> {
        let corpus = self.load_corpus().await?;
        Ok(corpus
            .feeds
            .into_iter()
            .filter(|entry| entry.has_category(category))
            .map(|entry| entry.feed)
            .collect())
    }

    pub async fn get_stats(&self) -> Result<Stats> {
        let corpus = self.load_corpus().await?;
        Ok(Stats {
            total_feeds: corpus.feeds.len(),
            total_items: corpus.items().count(),
            total_categories: corpus.categories().len(),
        })
    }
}
