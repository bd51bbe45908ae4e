use async_trait::async_trait;
use dashmap::DashMap;

use super::{Cache, CacheError, CacheResult};

/// Process-local cache backed by a concurrent map. Unbounded; meant for
/// single-instance deployments and tests.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: DashMap<String, Vec<u8>>,
}

impl InMemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn exists(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    async fn get(&self, key: &str) -> CacheResult<Vec<u8>> {
        self.entries
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or(CacheError::NoValue)
    }

    async fn put(&self, key: &str, value: &[u8]) -> CacheResult<()> {
        self.entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_rt::test]
    async fn roundtrips_values() {
        let cache = InMemoryCache::new();
        assert!(!cache.exists("tile").await);
        cache.put("tile", &[1, 2, 3]).await.unwrap();
        assert!(cache.exists("tile").await);
        assert_eq!(cache.get("tile").await.unwrap(), vec![1, 2, 3]);
    }

    #[actix_rt::test]
    async fn last_write_wins() {
        let cache = InMemoryCache::new();
        cache.put("tile", &[1]).await.unwrap();
        cache.put("tile", &[2]).await.unwrap();
        assert_eq!(cache.get("tile").await.unwrap(), vec![2]);
    }
}
