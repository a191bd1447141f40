//! Caching layer — a small key/value contract with a fixed TTL per write.
//!
//! Values are opaque strings; callers serialize before [`CacheStore::set`] and
//! deserialize after [`CacheStore::get`]. Expiry is passive: an entry simply
//! stops being returned once its TTL has elapsed.
//!
//! - [`RedisStore`] — production backend (`GET` / `SET … EX`).
//! - [`MemoryStore`] — in-process backend for local runs and tests.

use std::collections::HashMap;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::Instant;

mod redis_store;

pub use redis_store::RedisStore;

/// Errors surfaced by a cache backend. These are never treated as a miss.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache store error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("cache store unavailable: {0}")]
    Unavailable(String),
}

/// Boxed future returned by [`CacheStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CacheError>> + Send + 'a>>;

/// Key/value store with per-entry time-to-live.
pub trait CacheStore: Send + Sync {
    /// Returns the value stored under `key`, or `None` if absent or expired.
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>>;

    /// Stores `value` under `key`, replacing any previous value, expiring after `ttl`.
    fn set<'a>(&'a self, key: &'a str, value: String, ttl: Duration) -> StoreFuture<'a, ()>;
}

struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process [`CacheStore`] backed by a `HashMap`.
///
/// Expired entries are dropped lazily on read and in bulk by
/// [`purge_expired`](Self::purge_expired).
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes every expired entry and returns how many were dropped.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    /// Number of entries currently held, expired or not.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl CacheStore for MemoryStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move {
            let now = Instant::now();
            {
                let entries = self.entries.read().await;
                match entries.get(key) {
                    None => return Ok(None),
                    Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
                    Some(_) => {}
                }
            }

            let mut entries = self.entries.write().await;
            if entries.get(key).is_some_and(|entry| entry.expires_at <= now) {
                entries.remove(key);
            }
            Ok(None)
        })
    }

    fn set<'a>(&'a self, key: &'a str, value: String, ttl: Duration) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let entry = Entry {
                value,
                expires_at: Instant::now() + ttl,
            };
            self.entries.write().await.insert(key.to_owned(), entry);
            Ok(())
        })
    }
}
