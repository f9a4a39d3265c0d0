//! Key layout in the backing store. Existing deployments depend on these
//! exact strings.

use crate::trending::TrendingWindow;

/// Set of all known feed IDs.
pub const FEED_DIRECTORY: &str = "feeds:directory";

pub fn feed(feed_id: &str) -> String {
    format!("feed:{feed_id}")
}

/// List of item IDs for a feed, newest insertion first.
pub fn feed_items(feed_id: &str) -> String {
    format!("feed:{feed_id}:items")
}

pub fn item(item_id: &str) -> String {
    format!("item:{item_id}")
}

pub fn trending(window: TrendingWindow) -> String {
    format!("trending:{window}")
}

pub fn feed_trending(feed_id: &str, window: TrendingWindow) -> String {
    format!("trending:feed:{feed_id}:{window}")
}
