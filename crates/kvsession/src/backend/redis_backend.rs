//! Redis backend over a multiplexed tokio connection.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::MultiplexedConnection;
use tracing::debug;

use super::Backend;
use crate::config::RedisConfig;
use crate::error::{BackendError, BackendResult};

/// Backend issuing commands to a Redis server.
pub struct RedisBackend {
    conn: Mutex<Option<MultiplexedConnection>>,
}

impl RedisBackend {
    /// Connect using the given settings and verify the server answers `PING`.
    pub async fn connect(config: &RedisConfig) -> BackendResult<Self> {
        Self::connect_url(&config.url()).await
    }

    /// Connect to a `redis://` URL and verify the server answers `PING`.
    pub async fn connect_url(url: &str) -> BackendResult<Self> {
        let client = redis::Client::open(url)?;
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| BackendError::Connection(e.to_string()))?;

        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        debug!("Connected to Redis");

        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    /// Handle to the shared connection; clones are cheap.
    fn connection(&self) -> BackendResult<MultiplexedConnection> {
        self.conn.lock().clone().ok_or(BackendError::Closed)
    }
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend")
            .field("open", &self.conn.lock().is_some())
            .finish()
    }
}

#[async_trait]
impl Backend for RedisBackend {
    async fn hset_multiple(
        &self,
        key: &str,
        fields: &HashMap<String, String>,
    ) -> BackendResult<usize> {
        let mut conn = self.connection()?;
        let mut cmd = redis::cmd("HSET");
        cmd.arg(key);
        for (field, value) in fields {
            cmd.arg(field.as_str()).arg(value.as_str());
        }
        let added: usize = cmd.query_async(&mut conn).await?;
        Ok(added)
    }

    async fn hgetall(&self, key: &str) -> BackendResult<HashMap<String, String>> {
        let mut conn = self.connection()?;
        let fields: HashMap<String, String> =
            redis::cmd("HGETALL").arg(key).query_async(&mut conn).await?;
        Ok(fields)
    }

    async fn hdel(&self, key: &str, fields: &[String]) -> BackendResult<usize> {
        let mut conn = self.connection()?;
        let mut cmd = redis::cmd("HDEL");
        cmd.arg(key);
        for field in fields {
            cmd.arg(field.as_str());
        }
        let removed: usize = cmd.query_async(&mut conn).await?;
        Ok(removed)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> BackendResult<bool> {
        let mut conn = self.connection()?;
        let applied: bool = redis::cmd("EXPIRE")
            .arg(key)
            .arg(ttl.as_secs())
            .query_async(&mut conn)
            .await?;
        Ok(applied)
    }

    async fn del(&self, keys: &[String]) -> BackendResult<usize> {
        let mut conn = self.connection()?;
        let mut cmd = redis::cmd("DEL");
        for key in keys {
            cmd.arg(key.as_str());
        }
        let removed: usize = cmd.query_async(&mut conn).await?;
        Ok(removed)
    }

    async fn close(&self) -> BackendResult<()> {
        // Dropping the last handle shuts the multiplexed connection down.
        self.conn
            .lock()
            .take()
            .map(drop)
            .ok_or(BackendError::Closed)
    }
}
