//! Standalone item documents and the per-feed item-index lists.

use std::sync::Arc;

use tracing::{debug, instrument, warn, Span};

use crate::error::{Result, StorageContext};
use crate::keys;
use crate::kv::{read_json, write_json, KvStore};
use crate::model::Item;

#[derive(Clone)]
pub struct ItemRepository {
    kv: Arc<dyn KvStore>,
}

impl ItemRepository {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Stores `item` and pushes its ID to the front of the feed's index list.
    ///
    /// The feed itself is not checked: adding to an unknown feed ID creates
    /// an index list with no feed document, which every read path tolerates.
    #[instrument(level = "debug", skip(self, item), fields(item_id))]
    pub async fn add_item(&self, feed_id: &str, mut item: Item) -> Result<String> {
        let item_id = item.ensure_id();
        Span::current().record("item_id", item_id.as_str());

        write_json(&*self.kv, &keys::item(&item_id), &item).await?;
        let index_key = keys::feed_items(feed_id);
        self.kv
            .list_push_front(&index_key, &item_id)
            .await
            .storage_context(|| {
                format!("could not index item `{item_id}` under feed `{feed_id}`")
            })?;

        debug!("Stored item");
        Ok(item_id)
    }

    /// Item IDs of a feed, newest insertion first.
    pub async fn item_ids(&self, feed_id: &str) -> Result<Vec<String>> {
        let index_key = keys::feed_items(feed_id);
        self.kv
            .list_range(&index_key, 0, -1)
            .await
            .storage_context(|| format!("could not read the item index of feed `{feed_id}`"))
    }

    /// Items of a feed in index order. Dangling index entries are skipped.
    pub async fn list_items(&self, feed_id: &str) -> Result<Vec<Item>> {
        let ids = self.item_ids(feed_id).await?;
        self.get_items(&ids).await
    }

    /// Looks up an item by ID.
    ///
    /// Returns `None` when the feed does not exist. Otherwise the lookup is
    /// global: an item stored under another feed is still returned.
    pub async fn get_item(&self, feed_id: &str, item_id: &str) -> Result<Option<Item>> {
        let feed_key = keys::feed(feed_id);
        let feed_exists = self
            .kv
            .get(&feed_key)
            .await
            .storage_context(|| format!("could not read feed `{feed_id}`"))?
            .is_some();
        if !feed_exists {
            return Ok(None);
        }

        read_json(&*self.kv, &keys::item(item_id)).await
    }

    /// Resolves IDs in order, skipping any whose document is gone.
    pub async fn get_items(&self, ids: &[String]) -> Result<Vec<Item>> {
        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            match read_json::<Item>(&*self.kv, &keys::item(id)).await? {
                Some(item) => items.push(item),
                None => warn!(item_id = %id, "Skipping missing item document"),
            }
        }
        Ok(items)
    }

    /// Deletes every item indexed under the feed, then the index itself.
    pub(crate) async fn remove_all(&self, feed_id: &str) -> Result<usize> {
        let ids = self.item_ids(feed_id).await?;
        for id in &ids {
            self.kv
                .delete(&keys::item(id))
                .await
                .storage_context(|| format!("could not delete item `{id}` of feed `{feed_id}`"))?;
        }

        let index_key = keys::feed_items(feed_id);
        self.kv
            .delete(&index_key)
            .await
            .storage_context(|| format!("could not delete the item index of feed `{feed_id}`"))?;

        debug!(count = ids.len(), "Removed items of feed");
        Ok(ids.len())
    }
}
