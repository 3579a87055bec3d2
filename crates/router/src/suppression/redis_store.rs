//! Redis-backed suppression store.
//!
//! Each destination key is a Redis set of patterns (`SADD`/`SREM`/
//! `SMEMBERS`). A [`ConnectionManager`] is opened in `connect` and cloned
//! per lookup; clones share one multiplexed connection, so concurrent
//! lookups from many receivers need no locking.

use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use super::SuppressionStore;
use crate::error::RouterError;

/// Redis set store.
pub struct RedisStore {
    url: String,
    connection: Option<ConnectionManager>,
}

impl RedisStore {
    pub fn new(host: &str, port: u16, db: i64) -> Self {
        Self::from_url(format!("redis://{host}:{port}/{db}"))
    }

    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connection: None,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    fn connection(&self) -> Result<ConnectionManager, RouterError> {
        self.connection
            .clone()
            .ok_or_else(|| RouterError::store(format!("not connected to {}", self.url)))
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("url", &self.url)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl SuppressionStore for RedisStore {
    async fn connect(&mut self) -> Result<(), RouterError> {
        if self.connection.is_some() {
            return Ok(());
        }

        let client = redis::Client::open(self.url.as_str())
            .map_err(|e| RouterError::store(format!("invalid redis url {}: {e}", self.url)))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| RouterError::store(format!("failed to connect to {}: {e}", self.url)))?;

        tracing::debug!(url = %self.url, "redis connection established");
        self.connection = Some(manager);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), RouterError> {
        if self.connection.take().is_some() {
            tracing::debug!(url = %self.url, "redis connection released");
        }
        Ok(())
    }

    async fn members(&self, key: &str) -> Result<Vec<String>, RouterError> {
        let mut conn = self.connection()?;
        conn.smembers::<_, Vec<String>>(key)
            .await
            .map_err(|e| RouterError::store(format!("SMEMBERS {key}: {e}")))
    }

    async fn add(&self, key: &str, pattern: &str) -> Result<bool, RouterError> {
        let mut conn = self.connection()?;
        let added: i64 = conn
            .sadd(key, pattern)
            .await
            .map_err(|e| RouterError::store(format!("SADD {key}: {e}")))?;
        Ok(added > 0)
    }

    async fn remove(&self, key: &str, pattern: &str) -> Result<bool, RouterError> {
        let mut conn = self.connection()?;
        let removed: i64 = conn
            .srem(key, pattern)
            .await
            .map_err(|e| RouterError::store(format!("SREM {key}: {e}")))?;
        Ok(removed > 0)
    }
}
