use std::time::Duration;

use async_trait::async_trait;

use crate::error::Error;

/// Minimal interface onto a cache.
/// ---
/// Cache contents are derived data; the relational store stays the
/// source of truth for verification.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Lists keys matching a glob-style pattern (`prefix:*`).
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, Error>;

    async fn get(&self, key: &str) -> Result<Option<String>, Error>;

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), Error>;

    async fn exists(&self, key: &str) -> Result<bool, Error>;
}
