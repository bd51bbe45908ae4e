use async_trait::async_trait;
use log::warn;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};

use super::{Cache, CacheError, CacheResult};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    /// Entry lifetime in seconds. `0` stores entries without expiry.
    #[serde(default)]
    pub ttl: u64,
}

/// Redis-backed cache shared between server instances.
///
/// The connection manager reconnects on its own; individual command failures
/// surface as [`CacheError`] and are absorbed by the callers.
#[derive(Clone)]
pub struct RedisCache {
    manager: ConnectionManager,
    ttl: u64,
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache").field("ttl", &self.ttl).finish()
    }
}

impl RedisCache {
    pub async fn new(config: &RedisConfig) -> CacheResult<Self> {
        let client = redis::Client::open(format!("redis://{}:{}", config.host, config.port))?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self {
            manager,
            ttl: config.ttl,
        })
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn exists(&self, key: &str) -> bool {
        let mut conn = self.manager.clone();
        match conn.exists(key).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!("Could not talk to Redis: {e}");
                false
            }
        }
    }

    async fn get(&self, key: &str) -> CacheResult<Vec<u8>> {
        let mut conn = self.manager.clone();
        let value: Option<Vec<u8>> = conn.get(key).await?;
        value.ok_or(CacheError::NoValue)
    }

    async fn put(&self, key: &str, value: &[u8]) -> CacheResult<()> {
        let mut conn = self.manager.clone();
        if self.ttl == 0 {
            conn.set::<_, _, ()>(key, value).await?;
        } else {
            conn.set_ex::<_, _, ()>(key, value, self.ttl).await?;
        }
        Ok(())
    }
}
