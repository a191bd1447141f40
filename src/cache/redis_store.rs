//! Redis-backed [`CacheStore`].

use std::time::Duration;

use redis::aio::ConnectionManager;
use tracing::{debug, info};

use super::{CacheError, CacheStore, StoreFuture};

/// Cache store talking to Redis through a multiplexed, auto-reconnecting
/// [`ConnectionManager`].
///
/// The manager is cheap to clone; each command works on its own clone.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Opens a connection to `url` and verifies it with `PING`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Redis`] if the URL is invalid or the server does
    /// not answer.
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let mut conn = ConnectionManager::new(client).await?;

        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!(reply = %pong, "connected to redis");

        Ok(Self { conn })
    }
}

impl CacheStore for RedisStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
            debug!(key, hit = value.is_some(), "redis GET");
            Ok(value)
        })
    }

    fn set<'a>(&'a self, key: &'a str, value: String, ttl: Duration) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            // EX rejects 0; a sub-second TTL still gets one second.
            let seconds = ttl.as_secs().max(1);
            let _: () = redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("EX")
                .arg(seconds)
                .query_async(&mut conn)
                .await?;
            debug!(key, seconds, "redis SET");
            Ok(())
        })
    }
}
