use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{
    error::Error,
    store::{ObjectMeta, ObjectStore},
};

/// In-memory object store used as the default collaborator in tests and
/// local operation. Tracks destination write calls so dry-run behavior
/// can be asserted.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<HashMap<(String, String), ObjectMeta>>,
    copy_calls: AtomicU64,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_object(&self, bucket: &str, meta: ObjectMeta) {
        let mut objects = self.objects.lock().await;
        objects.insert((bucket.to_string(), meta.key.clone()), meta);
    }

    pub async fn object_count(&self, bucket: &str) -> usize {
        let objects = self.objects.lock().await;
        objects.keys().filter(|(b, _)| b == bucket).count()
    }

    /// Number of destination-mutating `copy` calls observed.
    pub fn copy_call_count(&self) -> u64 {
        self.copy_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectMeta>, Error> {
        let objects = self.objects.lock().await;
        let mut metas: Vec<ObjectMeta> = objects
            .iter()
            .filter(|((b, key), _)| b == bucket && key.starts_with(prefix))
            .map(|(_, meta)| meta.clone())
            .collect();
        metas.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(metas)
    }

    async fn head(&self, bucket: &str, key: &str) -> Result<Option<ObjectMeta>, Error> {
        let objects = self.objects.lock().await;
        Ok(objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned())
    }

    async fn copy(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<(), Error> {
        self.copy_calls.fetch_add(1, Ordering::Relaxed);

        let mut objects = self.objects.lock().await;
        let source = objects
            .get(&(src_bucket.to_string(), src_key.to_string()))
            .cloned()
            .ok_or_else(|| Error::NotFound {
                resource_type: "object".to_string(),
                resource_id: format!("{src_bucket}/{src_key}"),
            })?;

        let mut copied = source;
        copied.key = dst_key.to_string();
        objects.insert((dst_bucket.to_string(), dst_key.to_string()), copied);
        Ok(())
    }

    async fn presign(&self, bucket: &str, key: &str) -> Result<String, Error> {
        let objects = self.objects.lock().await;
        if !objects.contains_key(&(bucket.to_string(), key.to_string())) {
            return Err(Error::NotFound {
                resource_type: "object".to_string(),
                resource_id: format!("{bucket}/{key}"),
            });
        }
        Ok(format!("memory://{bucket}/{key}?signed=true"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(key: &str, size: u64) -> ObjectMeta {
        ObjectMeta {
            key: key.to_string(),
            size_bytes: size,
            checksum: format!("sum-{key}"),
            last_modified: None,
        }
    }

    #[tokio::test]
    async fn test_copy_places_object_in_destination_bucket() {
        let store = InMemoryObjectStore::new();
        store.seed_object("src", meta("a/1.png", 10)).await;

        store.copy("src", "a/1.png", "dst", "a/1.png").await.unwrap();

        let head = store.head("dst", "a/1.png").await.unwrap().unwrap();
        assert_eq!(head.size_bytes, 10);
        assert_eq!(store.copy_call_count(), 1);
    }

    #[tokio::test]
    async fn test_list_filters_by_bucket_and_prefix() {
        let store = InMemoryObjectStore::new();
        store.seed_object("src", meta("img/a.png", 1)).await;
        store.seed_object("src", meta("doc/b.pdf", 2)).await;
        store.seed_object("other", meta("img/c.png", 3)).await;

        let listed = store.list("src", "img/").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].key, "img/a.png");
    }
}
