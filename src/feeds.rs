//! Whole-feed documents and the feed directory.
//!
//! A write touches several keys in sequence: the feed document, the
//! directory set, the item-index list and each item document. Nothing is
//! atomic across keys, and a reader running concurrently can see a feed in
//! the directory before its items are written, or an index entry whose item
//! has just been deleted. Every step is idempotent, so rerunning a failed
//! delete or replace converges on the intended state.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn, Span};

use crate::error::{Result, StorageContext, StorageError};
use crate::items::ItemRepository;
use crate::keys;
use crate::kv::{read_json, write_json, KvStore};
use crate::model::Feed;

#[derive(Clone)]
pub struct FeedRepository {
    kv: Arc<dyn KvStore>,
    items: ItemRepository,
}

impl FeedRepository {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        let items = ItemRepository::new(kv.clone());
        Self { kv, items }
    }

    /// Stores `feed` and its items, replacing any feed with the same ID.
    ///
    /// Items previously indexed under the ID are deleted, never merged.
    /// Items are pushed in input order, so the last input item ends up first
    /// in the index list.
    #[instrument(level = "debug", skip(self, feed), fields(feed_id, item_count = feed.items.len()))]
    pub async fn add_or_replace_feed(&self, mut feed: Feed) -> Result<String> {
        let feed_id = feed.ensure_id();
        Span::current().record("feed_id", feed_id.as_str());
        let items = std::mem::take(&mut feed.items);
        let feed_key = keys::feed(&feed_id);

        let exists = self
            .kv
            .get(&feed_key)
            .await
            .storage_context(|| format!("could not check for an existing feed `{feed_id}`"))?
            .is_some();
        // An index list can exist without a feed document.
        let removed = self.items.remove_all(&feed_id).await?;
        debug!(removed, exists, "Cleared previous items");

        write_json(&*self.kv, &feed_key, &feed).await?;
        self.kv
            .set_add(keys::FEED_DIRECTORY, &feed_id)
            .await
            .storage_context(|| format!("could not add feed `{feed_id}` to the directory"))?;

        for item in items {
            self.items
                .add_item(&feed_id, item)
                .await
                .map_err(|err| {
                    StorageError::new(format!("could not store items of feed `{feed_id}`"), err)
                })?;
        }

        info!(feed_id = %feed_id, replaced = exists, "Stored feed");
        Ok(feed_id)
    }

    pub async fn get_feed(&self, feed_id: &str) -> Result<Option<Feed>> {
        read_json(&*self.kv, &keys::feed(feed_id)).await
    }

    /// Directory membership in ascending ID order.
    pub async fn feed_ids(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self
            .kv
            .set_members(keys::FEED_DIRECTORY)
            .await
            .storage_context(|| "could not read the feed directory".to_string())?
            .into_iter()
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// Every feed in the directory paired with its directory ID. Entries
    /// without a document are skipped.
    pub async fn entries(&self) -> Result<Vec<(String, Feed)>> {
        let ids = self.feed_ids().await?;
        let mut feeds = Vec::with_capacity(ids.len());
        for id in ids {
            match self.get_feed(&id).await? {
                Some(feed) => feeds.push((id, feed)),
                None => warn!(feed_id = %id, "Directory entry has no feed document"),
            }
        }
        Ok(feeds)
    }

    pub async fn list_feeds(&self) -> Result<Vec<Feed>> {
        Ok(self
            .entries()
            .await?
            .into_iter()
            .map(|(_, feed)| feed)
            .collect())
    }

    /// Deletes the feed, its items, its index list and its directory entry.
    /// Deleting an unknown feed succeeds and changes nothing.
    #[instrument(level = "debug", skip(self))]
    pub async fn delete_feed(&self, feed_id: &str) -> Result<()> {
        let removed = self.items.remove_all(feed_id).await?;

        let feed_key = keys::feed(feed_id);
        self.kv
            .delete(&feed_key)
            .await
            .storage_context(|| format!("could not delete feed `{feed_id}`"))?;
        self.kv
            .set_remove(keys::FEED_DIRECTORY, feed_id)
            .await
            .storage_context(|| format!("could not remove feed `{feed_id}` from the directory"))?;

        info!(feed_id, removed, "Deleted feed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::{KvError, KvResult, MemoryStore};
    use crate::model::Item;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::collections::HashSet;

    fn create_repo() -> (FeedRepository, Arc<dyn KvStore>) {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        (FeedRepository::new(kv.clone()), kv)
    }

    fn create_item(id: &str) -> Item {
        let mut item = Item::new(
            id.to_uppercase(),
            format!("https://example.com/{id}"),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        );
        item.id = Some(id.to_string());
        item
    }

    fn create_feed(id: &str, item_ids: &[&str]) -> Feed {
        let mut feed = Feed::new(id, format!("Feed {id}"));
        feed.items = item_ids.iter().map(|i| create_item(i)).collect();
        feed
    }

    fn item_repo(repo: &FeedRepository) -> ItemRepository {
        repo.items.clone()
    }

    /// Memory store that rejects writes of item documents.
    struct FailingItemWrites(MemoryStore);

    #[async_trait]
    impl KvStore for FailingItemWrites {
        async fn get(&self, key: &str) -> KvResult<Option<Vec<u8>>> {
            self.0.get(key).await
        }
        async fn set(&self, key: &str, value: &[u8]) -> KvResult<()> {
            if key.starts_with("item:") {
                return Err(KvError::WrongType(key.to_string()));
            }
            self.0.set(key, value).await
        }
        async fn delete(&self, key: &str) -> KvResult<()> {
            self.0.delete(key).await
        }
        async fn set_members(&self, key: &str) -> KvResult<HashSet<String>> {
            self.0.set_members(key).await
        }
        async fn set_add(&self, key: &str, member: &str) -> KvResult<()> {
            self.0.set_add(key, member).await
        }
        async fn set_remove(&self, key: &str, member: &str) -> KvResult<()> {
            self.0.set_remove(key, member).await
        }
        async fn list_range(&self, key: &str, start: isize, end: isize) -> KvResult<Vec<String>> {
            self.0.list_range(key, start, end).await
        }
        async fn list_push_front(&self, key: &str, value: &str) -> KvResult<()> {
            self.0.list_push_front(key, value).await
        }
        async fn ranked_add(&self, key: &str, score: f64, member: &str) -> KvResult<()> {
            self.0.ranked_add(key, score, member).await
        }
        async fn ranked_range_by_score_desc(
            &self,
            key: &str,
            max: f64,
            min: f64,
            limit: usize,
        ) -> KvResult<Vec<String>> {
            self.0.ranked_range_by_score_desc(key, max, min, limit).await
        }
    }

    mod add_feed_tests {
        use super::*;

        #[tokio::test]
        async fn test_add_stores_document_and_directory_entry() {
            let (repo, kv) = create_repo();
            let id = repo.add_or_replace_feed(create_feed("news", &[])).await.unwrap();

            assert_eq!(id, "news");
            assert!(kv.get("feed:news").await.unwrap().is_some());
            assert!(kv.set_members("feeds:directory").await.unwrap().contains("news"));
        }

        #[tokio::test]
        async fn test_add_generates_missing_id() {
            let (repo, _kv) = create_repo();
            let mut feed = create_feed("x", &[]);
            feed.id = None;

            let id = repo.add_or_replace_feed(feed).await.unwrap();
            let stored = repo.get_feed(&id).await.unwrap().unwrap();
            assert_eq!(stored.id.as_deref(), Some(id.as_str()));
        }

        #[tokio::test]
        async fn test_stored_document_does_not_embed_items() {
            let (repo, kv) = create_repo();
            repo.add_or_replace_feed(create_feed("news", &["a", "b"]))
                .await
                .unwrap();

            let raw = kv.get("feed:news").await.unwrap().unwrap();
            let value: serde_json::Value = serde_json::from_slice(&raw).unwrap();
            assert!(value.get("items").is_none());

            let stored = repo.get_feed("news").await.unwrap().unwrap();
            assert!(stored.items.is_empty());
        }

        #[tokio::test]
        async fn test_items_indexed_last_input_first() {
            let (repo, _kv) = create_repo();
            repo.add_or_replace_feed(create_feed("news", &["a", "b", "c"]))
                .await
                .unwrap();

            let ids = item_repo(&repo).item_ids("news").await.unwrap();
            assert_eq!(ids, vec!["c", "b", "a"]);
        }

        #[tokio::test]
        async fn test_readd_replaces_items() {
            let (repo, kv) = create_repo();
            repo.add_or_replace_feed(create_feed("news", &["a", "b", "c"]))
                .await
                .unwrap();
            repo.add_or_replace_feed(create_feed("news", &["d", "e"]))
                .await
                .unwrap();

            let ids = item_repo(&repo).item_ids("news").await.unwrap();
            assert_eq!(ids, vec!["e", "d"]);
            for old in ["a", "b", "c"] {
                assert!(kv.get(&keys::item(old)).await.unwrap().is_none());
            }
            assert_eq!(repo.list_feeds().await.unwrap().len(), 1);
        }

        #[tokio::test]
        async fn test_add_clears_index_without_feed_document() {
            let (repo, kv) = create_repo();
            item_repo(&repo)
                .add_item("news", create_item("stale"))
                .await
                .unwrap();

            repo.add_or_replace_feed(create_feed("news", &["d", "e"]))
                .await
                .unwrap();

            let ids = item_repo(&repo).item_ids("news").await.unwrap();
            assert_eq!(ids, vec!["e", "d"]);
            assert!(kv.get("item:stale").await.unwrap().is_none());
        }

        #[tokio::test]
        async fn test_failed_item_write_names_feed() {
            let repo = FeedRepository::new(Arc::new(FailingItemWrites(MemoryStore::new())));

            let err = repo
                .add_or_replace_feed(create_feed("news", &["x1"]))
                .await
                .unwrap_err();
            assert!(err.message().contains("`news`"), "{}", err.message());
        }

        #[tokio::test]
        async fn test_readd_updates_metadata() {
            let (repo, _kv) = create_repo();
            repo.add_or_replace_feed(create_feed("news", &[])).await.unwrap();

            let mut updated = create_feed("news", &[]);
            updated.title = "Renamed".into();
            updated.categories = vec!["Tech".into()];
            repo.add_or_replace_feed(updated).await.unwrap();

            let stored = repo.get_feed("news").await.unwrap().unwrap();
            assert_eq!(stored.title, "Renamed");
            assert_eq!(stored.categories, vec!["Tech"]);
        }
    }

    mod list_feeds_tests {
        use super::*;

        #[tokio::test]
        async fn test_empty_directory() {
            let (repo, _kv) = create_repo();
            assert!(repo.list_feeds().await.unwrap().is_empty());
        }

        #[tokio::test]
        async fn test_lists_in_id_order() {
            let (repo, _kv) = create_repo();
            for id in ["zeta", "alpha", "mid"] {
                repo.add_or_replace_feed(create_feed(id, &[])).await.unwrap();
            }

            let ids: Vec<_> = repo
                .list_feeds()
                .await
                .unwrap()
                .into_iter()
                .filter_map(|f| f.id)
                .collect();
            assert_eq!(ids, vec!["alpha", "mid", "zeta"]);
        }

        #[tokio::test]
        async fn test_skips_directory_entry_without_document() {
            let (repo, kv) = create_repo();
            repo.add_or_replace_feed(create_feed("news", &[])).await.unwrap();
            kv.set_add("feeds:directory", "ghost").await.unwrap();

            let feeds = repo.list_feeds().await.unwrap();
            assert_eq!(feeds.len(), 1);
            assert_eq!(feeds[0].id.as_deref(), Some("news"));
        }
    }

    mod get_feed_tests {
        use super::*;

        #[tokio::test]
        async fn test_get_existing_feed() {
            let (repo, _kv) = create_repo();
            repo.add_or_replace_feed(create_feed("news", &[])).await.unwrap();

            let feed = repo.get_feed("news").await.unwrap();
            assert_eq!(feed.unwrap().title, "Feed news");
        }

        #[tokio::test]
        async fn test_get_nonexistent_feed() {
            let (repo, _kv) = create_repo();
            assert!(repo.get_feed("missing").await.unwrap().is_none());
        }
    }

    mod delete_feed_tests {
        use super::*;

        #[tokio::test]
        async fn test_delete_cascades() {
            let (repo, kv) = create_repo();
            repo.add_or_replace_feed(create_feed("news", &["a", "b"]))
                .await
                .unwrap();

            repo.delete_feed("news").await.unwrap();

            assert!(repo.get_feed("news").await.unwrap().is_none());
            assert!(repo.list_feeds().await.unwrap().is_empty());
            assert!(kv.get("item:a").await.unwrap().is_none());
            assert!(kv.get("item:b").await.unwrap().is_none());
            assert!(kv.list_range("feed:news:items", 0, -1).await.unwrap().is_empty());
        }

        #[tokio::test]
        async fn test_delete_twice_is_ok() {
            let (repo, _kv) = create_repo();
            repo.add_or_replace_feed(create_feed("news", &["a"])).await.unwrap();

            repo.delete_feed("news").await.unwrap();
            repo.delete_feed("news").await.unwrap();
            assert!(repo.get_feed("news").await.unwrap().is_none());
        }

        #[tokio::test]
        async fn test_delete_leaves_other_feeds() {
            let (repo, kv) = create_repo();
            repo.add_or_replace_feed(create_feed("news", &["a"])).await.unwrap();
            repo.add_or_replace_feed(create_feed("blog", &["b"])).await.unwrap();

            repo.delete_feed("news").await.unwrap();

            assert!(repo.get_feed("blog").await.unwrap().is_some());
            assert!(kv.get("item:b").await.unwrap().is_some());
        }
    }
}
