mod memory;
mod redis;

use std::fmt::Debug;

use async_trait::async_trait;

pub use self::memory::InMemoryCache;
pub use self::redis::{RedisCache, RedisConfig};

pub type CacheResult<T> = Result<T, CacheError>;

#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    /// The key has no value. Callers fall back to recomputing.
    #[error("no cached value for key")]
    NoValue,

    #[error(transparent)]
    Redis(#[from] ::redis::RedisError),
}

/// A shared key→bytes store. The cache is advisory everywhere it is used:
/// read and write failures degrade to recomputation, never to request
/// failure.
#[async_trait]
pub trait Cache: Send + Sync + Debug {
    /// Probes for the existence of a key.
    async fn exists(&self, key: &str) -> bool;

    /// Retrieves the cached bytes for a key.
    async fn get(&self, key: &str) -> CacheResult<Vec<u8>>;

    /// Stores a new value at a key.
    async fn put(&self, key: &str, value: &[u8]) -> CacheResult<()>;
}

pub type BoxedCache = Box<dyn Cache>;

/// The no-op cache: the supported way to run without caching.
#[derive(Debug, Default)]
pub struct NoopCache;

#[async_trait]
impl Cache for NoopCache {
    async fn exists(&self, _key: &str) -> bool {
        false
    }

    async fn get(&self, _key: &str) -> CacheResult<Vec<u8>> {
        Err(CacheError::NoValue)
    }

    async fn put(&self, _key: &str, _value: &[u8]) -> CacheResult<()> {
        Ok(())
    }
}
