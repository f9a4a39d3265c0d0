use std::cmp::Ordering;
use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{KvError, KvResult, KvStore};

#[derive(Debug, Clone)]
enum Value {
    Bytes(Vec<u8>),
    Set(HashSet<String>),
    List(VecDeque<String>),
    Ranked(HashMap<String, f64>),
}

/// In-process store with the same observable behavior as the redis backend,
/// including WRONGTYPE errors and removal of emptied collections.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }
}

fn wrong_type(key: &str) -> KvError {
    KvError::WrongType(key.to_string())
}

/// Resolves LRANGE bounds against a list of `len` elements.
fn range_bounds(len: usize, start: isize, end: isize) -> Option<(usize, usize)> {
    let len = len as isize;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let end = if end < 0 { len + end } else { end.min(len - 1) };

    if len == 0 || start > end || start >= len {
        None
    } else {
        Some((start as usize, end as usize))
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> KvResult<Option<Vec<u8>>> {
        match self.data.read().await.get(key) {
            None => Ok(None),
            Some(Value::Bytes(bytes)) => Ok(Some(bytes.clone())),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn set(&self, key: &str, value: &[u8]) -> KvResult<()> {
        self.data
            .write()
            .await
            .insert(key.to_string(), Value::Bytes(value.to_vec()));
        Ok(())
    }

    async fn delete(&self, key: &str) -> KvResult<()> {
        self.data.write().await.remove(key);
        Ok(())
    }

    async fn set_members(&self, key: &str) -> KvResult<HashSet<String>> {
        match self.data.read().await.get(key) {
            None => Ok(HashSet::new()),
            Some(Value::Set(members)) => Ok(members.clone()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn set_add(&self, key: &str, member: &str) -> KvResult<()> {
        let mut data = self.data.write().await;
        match data
            .entry(key.to_string())
            .or_insert_with(|| Value::Set(HashSet::new()))
        {
            Value::Set(members) => {
                members.insert(member.to_string());
                Ok(())
            }
            _ => Err(wrong_type(key)),
        }
    }

    async fn set_remove(&self, key: &str, member: &str) -> KvResult<()> {
        let mut data = self.data.write().await;
        let emptied = match data.get_mut(key) {
            None => return Ok(()),
            Some(Value::Set(members)) => {
                members.remove(member);
                members.is_empty()
            }
            Some(_) => return Err(wrong_type(key)),
        };
        if emptied {
            data.remove(key);
        }
        Ok(())
    }

    async fn list_range(&self, key: &str, start: isize, end: isize) -> KvResult<Vec<String>> {
        match self.data.read().await.get(key) {
            None => Ok(Vec::new()),
            Some(Value::List(list)) => Ok(match range_bounds(list.len(), start, end) {
                Some((from, to)) => list.range(from..=to).cloned().collect(),
                None => Vec::new(),
            }),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn list_push_front(&self, key: &str, value: &str) -> KvResult<()> {
        let mut data = self.data.write().await;
        match data
            .entry(key.to_string())
            .or_insert_with(|| Value::List(VecDeque::new()))
        {
            Value::List(list) => {
                list.push_front(value.to_string());
                Ok(())
            }
            _ => Err(wrong_type(key)),
        }
    }

    async fn ranked_add(&self, key: &str, score: f64, member: &str) -> KvResult<()> {
        let mut data = self.data.write().await;
        match data
            .entry(key.to_string())
            .or_insert_with(|| Value::Ranked(HashMap::new()))
        {
            Value::Ranked(scores) => {
                scores.insert(member.to_string(), score);
                Ok(())
            }
            _ => Err(wrong_type(key)),
        }
    }

    async fn ranked_range_by_score_desc(
        &self,
        key: &str,
        max: f64,
        min: f64,
        limit: usize,
    ) -> KvResult<Vec<String>> {
        let data = self.data.read().await;
        let scores = match data.get(key) {
            None => return Ok(Vec::new()),
            Some(Value::Ranked(scores)) => scores,
            Some(_) => return Err(wrong_type(key)),
        };

        let mut hits: Vec<(&String, f64)> = scores
            .iter()
            .filter(|(_, score)| **score >= min && **score <= max)
            .map(|(member, score)| (member, *score))
            .collect();
        // Equal scores come back in reverse lexicographic order, as in redis.
        hits.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.0.cmp(a.0))
        });

        Ok(hits
            .into_iter()
            .take(limit)
            .map(|(member, _)| member.clone())
            .collect())
    }
}
