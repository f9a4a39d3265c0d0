use std::collections::HashSet;

use ::redis::aio::ConnectionManager;
use ::redis::{AsyncCommands, Client};
use async_trait::async_trait;

use super::{KvResult, KvStore};

/// Redis backend over a single auto-reconnecting multiplexed connection.
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> KvResult<Self> {
        let client = Client::open(url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self { manager })
    }

    fn conn(&self) -> ConnectionManager {
        self.manager.clone()
    }
}

/// Formats a score bound the way ZRANGEBYSCORE expects infinities.
fn score_bound(score: f64) -> String {
    if score == f64::INFINITY {
        "+inf".to_string()
    } else if score == f64::NEG_INFINITY {
        "-inf".to_string()
    } else {
        score.to_string()
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> KvResult<Option<Vec<u8>>> {
        Ok(self.conn().get(key).await?)
    }

    async fn set(&self, key: &str, value: &[u8]) -> KvResult<()> {
        self.conn().set::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> KvResult<()> {
        self.conn().del::<_, ()>(key).await?;
        Ok(())
    }

    async fn set_members(&self, key: &str) -> KvResult<HashSet<String>> {
        Ok(self.conn().smembers(key).await?)
    }

    async fn set_add(&self, key: &str, member: &str) -> KvResult<()> {
        self.conn().sadd::<_, _, ()>(key, member).await?;
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> KvResult<()> {
        self.conn().srem::<_, _, ()>(key, member).await?;
        Ok(())
    }

    async fn list_range(&self, key: &str, start: isize, end: isize) -> KvResult<Vec<String>> {
        Ok(self.conn().lrange(key, start, end).await?)
    }

    async fn list_push_front(&self, key: &str, value: &str) -> KvResult<()> {
        self.conn().lpush::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn ranked_add(&self, key: &str, score: f64, member: &str) -> KvResult<()> {
        self.conn().zadd::<_, _, _, ()>(key, member, score).await?;
        Ok(())
    }

    async fn ranked_range_by_score_desc(
        &self,
        key: &str,
        max: f64,
        min: f64,
        limit: usize,
    ) -> KvResult<Vec<String>> {
        let count = isize::try_from(limit).unwrap_or(isize::MAX);
        Ok(self
            .conn()
            .zrevrangebyscore_limit(key, score_bound(max), score_bound(min), 0, count)
            .await?)
    }
}
