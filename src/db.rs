use std::sync::Arc;

use crate::aggregate::{Aggregator, ItemQuery, Page, Stats};
use crate::clock::{Clock, SystemClock};
use crate::config::StorageConfig;
use crate::error::Result;
use crate::feeds::FeedRepository;
use crate::items::ItemRepository;
use crate::kv::{self, KvStore, MemoryStore};
use crate::model::{Feed, Item};
use crate::trending::{TrendingTracker, TrendingWindow};

/// The storage engine's full operation surface over one shared store handle.
#[derive(Clone)]
pub struct Database {
    feeds: FeedRepository,
    items: ItemRepository,
    aggregator: Aggregator,
    trending: TrendingTracker,
}

impl Database {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self::with_clock(kv, Arc::new(SystemClock))
    }

    pub fn with_clock(kv: Arc<dyn KvStore>, clock: Arc<dyn Clock>) -> Self {
        let feeds = FeedRepository::new(kv.clone());
        let items = ItemRepository::new(kv.clone());
        let aggregator = Aggregator::new(feeds.clone(), items.clone());
        let trending = TrendingTracker::new(kv, feeds.clone(), items.clone(), clock);

        Self {
            feeds,
            items,
            aggregator,
            trending,
        }
    }

    pub async fn connect(config: &StorageConfig) -> anyhow::Result<Self> {
        let kv = kv::connect(config).await?;
        Ok(Self::new(kv))
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Adds `feed` with its items, or replaces the feed with the same ID.
    pub async fn add_feed(&self, feed: Feed) -> Result<String> {
        self.feeds.add_or_replace_feed(feed).await
    }

    pub async fn get_feed(&self, feed_id: &str) -> Result<Option<Feed>> {
        self.feeds.get_feed(feed_id).await
    }

    pub async fn list_feeds(&self) -> Result<Vec<Feed>> {
        self.feeds.list_feeds().await
    }

    pub async fn delete_feed(&self, feed_id: &str) -> Result<()> {
        self.feeds.delete_feed(feed_id).await
    }

    pub async fn add_item(&self, feed_id: &str, item: Item) -> Result<String> {
        self.items.add_item(feed_id, item).await
    }

    pub async fn list_items(&self, feed_id: &str) -> Result<Vec<Item>> {
        self.items.list_items(feed_id).await
    }

    pub async fn get_item(&self, feed_id: &str, item_id: &str) -> Result<Option<Item>> {
        self.items.get_item(feed_id, item_id).await
    }

    pub async fn list_all_items(&self, query: &ItemQuery) -> Result<Vec<Item>> {
        self.aggregator.list_all_items(query).await
    }

    pub async fn list_categories(&self) -> Result<Vec<String>> {
        self.aggregator.list_categories().await
    }

    pub async fn list_items_by_category(&self, category: &str, page: Page) -> Result<Vec<Item>> {
        self.aggregator.list_items_by_category(category, page).await
    }

    pub async fn list_feeds_by_category(&self, category: &str) -> Result<Vec<Feed>> {
        self.aggregator.list_feeds_by_category(category).await
    }

    pub async fn track_view(&self, item_id: &str) -> Result<Option<String>> {
        self.trending.track_view(item_id).await
    }

    pub async fn get_trending(&self, window: TrendingWindow, limit: usize) -> Result<Vec<Item>> {
        self.trending.get_trending(window, limit).await
    }

    pub async fn get_feed_trending(
        &self,
        feed_id: &str,
        window: TrendingWindow,
        limit: usize,
    ) -> Result<Vec<Item>> {
        self.trending.get_feed_trending(feed_id, window, limit).await
    }

    pub async fn get_stats(&self) -> Result<Stats> {
        self.aggregator.get_stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::model::Category;
    use chrono::{Duration, TimeZone, Utc};

    fn create_item(title: &str, day: u32) -> Item {
        Item::new(
            title,
            format!("https://example.com/{title}"),
            Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_news_scenario() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
        ));
        let db = Database::with_clock(Arc::new(MemoryStore::new()), clock.clone());

        let mut a = create_item("A", 1);
        a.category = vec![Category::term("tech")];
        let mut feed = Feed::new("news", "News");
        feed.items = vec![a, create_item("B", 2)];
        db.add_feed(feed).await.unwrap();

        let items = db.list_items("news").await.unwrap();
        let titles: Vec<_> = items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["B", "A"]);

        let id_of_a = items[1].id.clone().unwrap();
        db.track_view(&id_of_a).await.unwrap();
        clock.advance(Duration::minutes(5));

        let trending = db
            .get_feed_trending("news", TrendingWindow::Day, 10)
            .await
            .unwrap();
        assert_eq!(trending.len(), 1);
        assert_eq!(trending[0].title, "A");
    }

    #[tokio::test]
    async fn test_facade_reaches_every_component() {
        let db = Database::in_memory();
        let mut feed = Feed::new("news", "News");
        feed.categories = vec!["Tech".into()];
        db.add_feed(feed).await.unwrap();
        let id = db.add_item("news", create_item("A", 3)).await.unwrap();

        assert!(db.get_feed("news").await.unwrap().is_some());
        assert_eq!(db.list_feeds().await.unwrap().len(), 1);
        assert!(db.get_item("news", &id).await.unwrap().is_some());
        assert_eq!(db.list_all_items(&ItemQuery::default()).await.unwrap().len(), 1);
        assert_eq!(db.list_categories().await.unwrap(), vec!["Tech"]);
        assert!(db
            .list_items_by_category("Tech", Page::default())
            .await
            .unwrap()
            .is_empty());
        assert_eq!(db.list_feeds_by_category("Tech").await.unwrap().len(), 1);
        assert_eq!(db.get_stats().await.unwrap().total_items, 1);

        db.delete_feed("news").await.unwrap();
        assert_eq!(db.get_stats().await.unwrap().total_feeds, 0);
    }
}
