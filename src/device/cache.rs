use super::CacheStore;
use crate::error::{BridgeError, BridgeResult};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::collections::HashMap;
use tracing::info;

/// Redis-backed cache store
pub struct RedisCache {
    conn: MultiplexedConnection,
}

impl RedisCache {
    pub async fn connect(url: &str) -> BridgeResult<Self> {
        info!(url = %url, "Connecting to Redis");

        let client = redis::Client::open(url)
            .map_err(|e| BridgeError::Config(format!("invalid redis url '{url}': {e}")))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| BridgeError::SnapshotUnavailable(format!("redis connect: {e}")))?;

        Ok(Self { conn })
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn hash(&self, key: &str) -> BridgeResult<HashMap<String, String>> {
        let mut conn = self.conn.clone();
        let values: HashMap<String, String> = conn
            .hgetall(key)
            .await
            .map_err(|e| BridgeError::SnapshotUnavailable(format!("HGETALL {key}: {e}")))?;
        Ok(values)
    }
}
