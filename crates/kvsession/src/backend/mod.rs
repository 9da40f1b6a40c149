//! Backing store contract.
//!
//! The store only needs a handful of hash and expiration commands from a
//! Redis-like key-value service. [`Backend`] captures exactly those, so
//! the session lifecycle can run against Redis, the in-process
//! [`MemoryBackend`], or a test double.
//!
//! Each command is expected to be atomic on its own. Nothing is assumed
//! about ordering between separate commands.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::BackendResult;

mod memory;
#[cfg(feature = "redis")]
mod redis_backend;

pub use memory::MemoryBackend;
#[cfg(feature = "redis")]
pub use redis_backend::RedisBackend;

/// Commands a backing store must provide.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Set several fields of the hash at `key`, creating it if needed.
    ///
    /// Returns the number of fields that did not exist before.
    async fn hset_multiple(
        &self,
        key: &str,
        fields: &HashMap<String, String>,
    ) -> BackendResult<usize>;

    /// All fields of the hash at `key`; empty if the key does not exist.
    async fn hgetall(&self, key: &str) -> BackendResult<HashMap<String, String>>;

    /// Delete fields from the hash at `key`, returning how many existed.
    async fn hdel(&self, key: &str, fields: &[String]) -> BackendResult<usize>;

    /// Expire `key` after `ttl`, returning `false` if the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> BackendResult<bool>;

    /// Delete keys, returning how many existed.
    async fn del(&self, keys: &[String]) -> BackendResult<usize>;

    /// Release the connection.
    async fn close(&self) -> BackendResult<()>;
}

#[async_trait]
impl<B: Backend + ?Sized> Backend for Arc<B> {
    async fn hset_multiple(
        &self,
        key: &str,
        fields: &HashMap<String, String>,
    ) -> BackendResult<usize> {
        (**self).hset_multiple(key, fields).await
    }

    async fn hgetall(&self, key: &str) -> BackendResult<HashMap<String, String>> {
        (**self).hgetall(key).await
    }

    async fn hdel(&self, key: &str, fields: &[String]) -> BackendResult<usize> {
        (**self).hdel(key, fields).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> BackendResult<bool> {
        (**self).expire(key, ttl).await
    }

    async fn del(&self, keys: &[String]) -> BackendResult<usize> {
        (**self).del(keys).await
    }

    async fn close(&self) -> BackendResult<()> {
        (**self).close().await
    }
}
