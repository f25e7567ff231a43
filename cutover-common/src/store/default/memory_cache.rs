use std::{collections::BTreeMap, time::Duration};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{error::Error, store::CacheStore};

/// In-memory cache used as the default collaborator in tests and local
/// operation. TTLs are recorded but not expired.
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    entries: Mutex<BTreeMap<String, (String, Option<Duration>)>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed(&self, key: &str, value: &str) {
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), (value.to_string(), None));
    }

    pub async fn ttl_of(&self, key: &str) -> Option<Duration> {
        let entries = self.entries.lock().await;
        entries.get(key).and_then(|(_, ttl)| *ttl)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, Error> {
        let entries = self.entries.lock().await;
        let keys = match pattern.strip_suffix('*') {
            Some(prefix) => entries
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect(),
            None => entries
                .keys()
                .filter(|k| k.as_str() == pattern)
                .cloned()
                .collect(),
        };
        Ok(keys)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let entries = self.entries.lock().await;
        Ok(entries.get(key).map(|(value, _)| value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), Error> {
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), (value.to_string(), ttl));
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, Error> {
        let entries = self.entries.lock().await;
        Ok(entries.contains_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scan_matches_glob_prefix() {
        let cache = InMemoryCacheStore::new();
        cache.seed("users:1", "{}").await;
        cache.seed("users:2", "{}").await;
        cache.seed("orders:1", "{}").await;

        let keys = cache.scan_keys("users:*").await.unwrap();
        assert_eq!(keys, vec!["users:1", "users:2"]);

        let exact = cache.scan_keys("orders:1").await.unwrap();
        assert_eq!(exact, vec!["orders:1"]);
    }

    #[tokio::test]
    async fn test_set_records_ttl() {
        let cache = InMemoryCacheStore::new();
        cache
            .set("k", "v", Some(Duration::from_secs(300)))
            .await
            .unwrap();

        assert!(cache.exists("k").await.unwrap());
        assert_eq!(cache.ttl_of("k").await, Some(Duration::from_secs(300)));
    }
}
