use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use feed_rs::model::{Entry, Link, MediaContent, Text};
use feed_rs::parser;
use reqwest::Client;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::SourceConfig;
use crate::db::Database;
use crate::model::{Category, Enclosure, Feed, Item, Media, Person};

/// Imports configured sources into the store, one full replace per source.
pub struct Fetcher {
    client: Client,
    db: Arc<Database>,
    sources: Vec<SourceConfig>,
    refreshing: Arc<RwLock<bool>>,
}

impl Fetcher {
    pub fn new(db: Arc<Database>, sources: Vec<SourceConfig>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Feedstash/1.0 (Feed Aggregator)")
            .build()
            .context("could not create the HTTP client")?;

        Ok(Self {
            client,
            db,
            sources,
            refreshing: Arc::new(RwLock::new(false)),
        })
    }

    pub async fn is_refreshing(&self) -> bool {
        *self.refreshing.read().await
    }

    pub async fn refresh_all_feeds(&self) -> anyhow::Result<()> {
        // Check if already refreshing
        {
            let mut refreshing = self.refreshing.write().await;
            if *refreshing {
                info!("Refresh already in progress, skipping");
                return Ok(());
            }
            *refreshing = true;
        }

        let result = self.do_refresh_all().await;

        {
            let mut refreshing = self.refreshing.write().await;
            *refreshing = false;
        }

        result
    }

    async fn do_refresh_all(&self) -> anyhow::Result<()> {
        info!("Refreshing {} sources", self.sources.len());

        for source in &self.sources {
            match self.refresh_source(source).await {
                Ok(count) => info!("Imported {} items for feed '{}'", count, source.id),
                Err(e) => error!("Failed to refresh feed '{}': {:#}", source.id, e),
            }
        }

        info!("Feed refresh complete");
        Ok(())
    }

    async fn refresh_source(&self, source: &SourceConfig) -> anyhow::Result<usize> {
        info!("Fetching feed: {} ({})", source.id, source.url);

        let response = self
            .client
            .get(&source.url)
            .send()
            .await?
            .error_for_status()?;
        let bytes = response.bytes().await?;

        let parsed = parser::parse(&bytes[..])
            .with_context(|| format!("could not parse the feed at `{}`", source.url))?;
        let feed = Self::convert_feed(source, parsed);
        let count = feed.items.len();

        self.db
            .add_feed(feed)
            .await
            .with_context(|| format!("could not store feed `{}`", source.id))?;

        Ok(count)
    }

    /// Maps a parsed feed onto the stored model under the source's ID.
    pub fn convert_feed(source: &SourceConfig, parsed: feed_rs::model::Feed) -> Feed {
        let mut categories = source.categories.clone();
        for category in &parsed.categories {
            let label = category.label.as_ref().unwrap_or(&category.term);
            if !categories.contains(label) {
                categories.push(label.clone());
            }
        }

        // Oldest first, so the newest entry is pushed last and indexed first.
        let mut items: Vec<Item> = parsed
            .entries
            .iter()
            .filter_map(|entry| Self::convert_entry(&source.id, entry))
            .collect();
        items.sort_by_key(Item::effective_date);

        Feed {
            id: Some(source.id.clone()),
            title: text(&parsed.title).unwrap_or_else(|| source.id.clone()),
            description: text(&parsed.description),
            link: Self::primary_link(&parsed.links).map(|l| l.href.clone()),
            language: parsed.language.clone(),
            ttl: parsed.ttl,
            image: parsed.logo.as_ref().map(|i| i.uri.clone()),
            favicon: parsed.icon.as_ref().map(|i| i.uri.clone()),
            copyright: text(&parsed.rights),
            author: parsed.authors.first().map(convert_person),
            updated: parsed.updated,
            categories,
            contributors: parsed.contributors.iter().map(convert_person).collect(),
            extensions: Vec::new(),
            items,
        }
    }

    /// Maps one entry to an item. Entries without a link are skipped.
    pub fn convert_entry(feed_id: &str, entry: &Entry) -> Option<Item> {
        let title = text(&entry.title).unwrap_or_else(|| "Untitled".to_string());

        let Some(link) = Self::primary_link(&entry.links) else {
            warn!("Skipping entry with no link: {}", title);
            return None;
        };

        let date = entry.updated.or(entry.published).unwrap_or_else(Utc::now);
        let mut item = Item::new(title, link.href.clone(), date);
        item.id = Some(Self::item_id(feed_id, &entry.id));
        item.published = entry.published;
        item.description = text(&entry.summary);
        item.content = entry.content.as_ref().and_then(|c| c.body.clone());
        item.copyright = text(&entry.rights);
        item.author = entry.authors.iter().map(convert_person).collect();
        item.contributor = entry.contributors.iter().map(convert_person).collect();
        item.category = entry
            .categories
            .iter()
            .map(|c| Category {
                name: c.label.clone(),
                domain: None,
                scheme: c.scheme.clone(),
                term: Some(c.term.clone()),
            })
            .collect();
        item.enclosure = entry
            .links
            .iter()
            .find(|l| l.rel.as_deref() == Some("enclosure"))
            .map(link_enclosure);

        // RSS enclosures arrive as media objects rather than links.
        for content in entry.media.iter().flat_map(|m| m.content.iter()) {
            let Some(enclosure) = media_enclosure(content) else {
                continue;
            };
            if item.enclosure.is_none() {
                item.enclosure = Some(enclosure.clone());
            }
            let mime = enclosure.mime_type.clone().unwrap_or_default();
            let slot = if mime.starts_with("image/") {
                &mut item.image
            } else if mime.starts_with("audio/") {
                &mut item.audio
            } else if mime.starts_with("video/") {
                &mut item.video
            } else {
                continue;
            };
            if slot.is_none() {
                *slot = Some(Media::Enclosure(enclosure));
            }
        }

        Some(item)
    }

    /// Stable item ID, so re-importing the same entry yields the same key.
    pub fn item_id(feed_id: &str, entry_id: &str) -> String {
        let name = format!("{feed_id}/{entry_id}");
        Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes()).to_string()
    }

    /// Prefers a link without `rel` or marked `alternate`, else the first one.
    pub fn primary_link(links: &[Link]) -> Option<&Link> {
        links
            .iter()
            .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
            .or_else(|| links.first())
            .filter(|l| !l.href.is_empty())
    }
}

fn text(value: &Option<Text>) -> Option<String> {
    value
        .as_ref()
        .map(|t| t.content.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn convert_person(person: &feed_rs::model::Person) -> Person {
    Person {
        name: Some(person.name.clone()).filter(|n| !n.is_empty()),
        email: person.email.clone(),
        link: person.uri.clone(),
    }
}

fn link_enclosure(link: &Link) -> Enclosure {
    Enclosure {
        url: link.href.clone(),
        mime_type: link.media_type.clone(),
        length: link.length,
        title: link.title.clone(),
        duration: None,
    }
}

fn media_enclosure(content: &MediaContent) -> Option<Enclosure> {
    let url = content.url.as_ref()?;
    Some(Enclosure {
        url: url.to_string(),
        mime_type: content.content_type.as_ref().map(|m| m.to_string()),
        length: content.size,
        title: None,
        duration: content.duration.map(|d| d.as_secs()),
    })
}

pub async fn start_background_refresh(fetcher: Arc<Fetcher>, interval_minutes: u64) {
    let interval = Duration::from_secs(interval_minutes * 60);

    // Do initial fetch
    info!("Starting initial feed fetch");
    if let Err(e) = fetcher.refresh_all_feeds().await {
        error!("Initial feed fetch failed: {}", e);
    }

    loop {
        tokio::time::sleep(interval).await;
        info!("Starting scheduled feed refresh");
        if let Err(e) = fetcher.refresh_all_feeds().await {
            error!("Scheduled feed refresh failed: {}", e);
        }
    }
}
