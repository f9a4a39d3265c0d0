//! Key-value client adapter.
//!
//! A small command surface: plain values, sets, lists and
//! ranked sets. Every call is an independent round trip; there are no
//! transactions and no pipelining, so callers composing several calls must
//! tolerate partial completion.

mod memory;
mod redis_store;

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{bail, Context};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::config::{Backend, StorageConfig};
use crate::error::{Result, StorageContext};

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("redis command failed: {0}")]
    Redis(#[from] ::redis::RedisError),
    #[error("WRONGTYPE operation against key `{0}` holding the wrong kind of value")]
    WrongType(String),
}

pub type KvResult<T> = std::result::Result<T, KvError>;

#[async_trait]
pub trait KvStore: Send + Sync {
    /// GET
    async fn get(&self, key: &str) -> KvResult<Option<Vec<u8>>>;

    /// SET
    async fn set(&self, key: &str, value: &[u8]) -> KvResult<()>;

    /// DEL. Deleting an absent key is a no-op.
    async fn delete(&self, key: &str) -> KvResult<()>;

    /// SMEMBERS
    async fn set_members(&self, key: &str) -> KvResult<HashSet<String>>;

    /// SADD
    async fn set_add(&self, key: &str, member: &str) -> KvResult<()>;

    /// SREM
    async fn set_remove(&self, key: &str, member: &str) -> KvResult<()>;

    /// LRANGE. Both bounds are inclusive; negative indexes count from the tail.
    async fn list_range(&self, key: &str, start: isize, end: isize) -> KvResult<Vec<String>>;

    /// LPUSH
    async fn list_push_front(&self, key: &str, value: &str) -> KvResult<()>;

    /// ZADD. Replaces any previous score of `member`.
    async fn ranked_add(&self, key: &str, score: f64, member: &str) -> KvResult<()>;

    /// ZREVRANGEBYSCORE with LIMIT 0 `limit`. Bounds are inclusive.
    async fn ranked_range_by_score_desc(
        &self,
        key: &str,
        max: f64,
        min: f64,
        limit: usize,
    ) -> KvResult<Vec<String>>;
}

/// Opens the backend selected by `config`.
pub async fn connect(config: &StorageConfig) -> anyhow::Result<Arc<dyn KvStore>> {
    match config.backend {
        Backend::Memory => {
            info!("Using the in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
        Backend::Redis => {
            let Some(url) = config.url.as_deref() else {
                bail!("the redis backend requires `storage.url` or REDIS_URL");
            };
            let store = RedisStore::connect(url)
                .await
                .with_context(|| format!("could not connect to redis at `{url}`"))?;
            info!("Using redis at `{}`", url);
            Ok(Arc::new(store))
        }
    }
}

/// Reads and deserializes a JSON document.
pub async fn read_json<T: DeserializeOwned>(kv: &dyn KvStore, key: &str) -> Result<Option<T>> {
    let Some(bytes) = kv
        .get(key)
        .await
        .storage_context(|| format!("could not read `{key}`"))?
    else {
        return Ok(None);
    };

    serde_json::from_slice(&bytes)
        .map(Some)
        .storage_context(|| format!("could not decode the document at `{key}`"))
}

/// Serializes and writes a JSON document.
pub async fn write_json<T: Serialize>(kv: &dyn KvStore, key: &str, value: &T) -> Result<()> {
    let bytes =
        serde_json::to_vec(value).storage_context(|| format!("could not encode `{key}`"))?;
    kv.set(key, &bytes)
        .await
        .storage_context(|| format!("could not write `{key}`"))
}
