use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub key: String,
    pub size_bytes: u64,
    pub checksum: String,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Minimal interface onto an object store.
/// ---
/// Buckets are plain names; the provider behind them is opaque to the
/// engine. `copy` is the only destination-mutating operation.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectMeta>, Error>;

    async fn head(&self, bucket: &str, key: &str) -> Result<Option<ObjectMeta>, Error>;

    async fn copy(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<(), Error>;

    async fn presign(&self, bucket: &str, key: &str) -> Result<String, Error>;
}
