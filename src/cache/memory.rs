//! In-process [`KeyValueCache`]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{CacheError, CacheResult, KeyValueCache};

#[derive(Debug, Default)]
struct Entries {
    values: HashMap<String, String>,
    lists: HashMap<String, VecDeque<String>>,
}

/// Cache held in process memory. Clones share entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: Arc<RwLock<Entries>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueCache for MemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        Ok(self.entries.read().await.values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> CacheResult<()> {
        self.entries
            .write()
            .await
            .values
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> CacheResult<u64> {
        let mut entries = self.entries.write().await;
        let mut removed = 0;
        for key in keys {
            let had_value = entries.values.remove(*key).is_some();
            let had_list = entries.lists.remove(*key).is_some();
            if had_value || had_list {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn increment(&self, keys: &[&str]) -> CacheResult<()> {
        let mut entries = self.entries.write().await;
        let mut first_error = None;

        for key in keys {
            let current = entries.values.get(*key).map(|v| v.parse::<i64>());
            match current {
                None => {
                    entries.values.insert(key.to_string(), "1".to_string());
                }
                Some(Ok(n)) => {
                    entries.values.insert(key.to_string(), (n + 1).to_string());
                }
                Some(Err(_)) => {
                    first_error.get_or_insert_with(|| CacheError::NotAnInteger(key.to_string()));
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn push_list(&self, key: &str, value: &str) -> CacheResult<()> {
        self.entries
            .write()
            .await
            .lists
            .entry(key.to_string())
            .or_default()
            .push_front(value.to_string());
        Ok(())
    }

    async fn list(&self, key: &str) -> CacheResult<Vec<String>> {
        Ok(self
            .entries
            .read()
            .await
            .lists
            .get(key)
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_remove() {
        let cache = MemoryCache::new();
        cache.set("a", "1").await.unwrap();
        assert_eq!(cache.get("a").await.unwrap(), Some("1".to_string()));

        assert_eq!(cache.remove(&["a", "missing"]).await.unwrap(), 1);
        assert_eq!(cache.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_increment_attempts_every_key() {
        let cache = MemoryCache::new();
        cache.set("count", "4").await.unwrap();
        cache.set("name", "usd").await.unwrap();

        let result = cache.increment(&["count", "name", "fresh"]).await;
        assert!(matches!(result, Err(CacheError::NotAnInteger(key)) if key == "name"));

        assert_eq!(cache.get("count").await.unwrap(), Some("5".to_string()));
        assert_eq!(cache.get("fresh").await.unwrap(), Some("1".to_string()));
    }

    #[tokio::test]
    async fn test_list_is_newest_first() {
        let cache = MemoryCache::new();
        cache.push_list("prices", "1").await.unwrap();
        cache.push_list("prices", "2").await.unwrap();

        assert_eq!(cache.list("prices").await.unwrap(), vec!["2", "1"]);
        assert!(cache.list("other").await.unwrap().is_empty());
    }

    #[test]
    fn test_clones_share_entries() {
        let cache = MemoryCache::new();
        let other = cache.clone();
        tokio_test::block_on(async {
            other.set("shared", "yes").await.unwrap();
            assert_eq!(cache.get("shared").await.unwrap(), Some("yes".to_string()));
        });
    }
}
