use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use tracing::{debug, info};

use cutover_common::{
    error::Error,
    store::{ObjectMeta, ObjectStore},
};

use crate::batch::{BatchExecutor, MigrationUnit};

use super::{MigrationProgress, MigrationWorker, VerificationMode, VerificationReport, WorkerContext};

#[derive(Clone, Debug)]
pub struct ObjectStorageConfig {
    pub source_bucket: String,
    pub destination_bucket: String,
    pub prefix: String,
}

/// Bulk object copier between two buckets.
/// ---
/// Overwrite-by-key semantics: a key whose destination head already
/// matches size and checksum is skipped; anything else is copied. The
/// source is never deleted.
pub struct ObjectStorageMigrator {
    store: Arc<dyn ObjectStore>,
    config: ObjectStorageConfig,
}

struct ObjectUnit {
    meta: ObjectMeta,
}

impl MigrationUnit for ObjectUnit {
    fn unit_id(&self) -> String {
        self.meta.key.clone()
    }
}

impl ObjectStorageMigrator {
    pub fn new(store: Arc<dyn ObjectStore>, config: ObjectStorageConfig) -> Self {
        Self { store, config }
    }

    fn category_of(key: &str) -> String {
        match key.rsplit_once('.') {
            Some((_, ext)) if !ext.is_empty() && !ext.contains('/') => ext.to_ascii_lowercase(),
            _ => "other".to_string(),
        }
    }
}

#[async_trait]
impl MigrationWorker for ObjectStorageMigrator {
    fn name(&self) -> &str {
        "object-storage-migrator"
    }

    async fn execute(&self, ctx: &WorkerContext) -> Result<MigrationProgress, Error> {
        let objects = self
            .store
            .list(&self.config.source_bucket, &self.config.prefix)
            .await?;

        let mut progress = MigrationProgress {
            total_units: objects.len() as u64,
            total_size_bytes: objects.iter().map(|o| o.size_bytes).sum(),
            ..Default::default()
        };
        for object in &objects {
            *progress
                .categories
                .entry(Self::category_of(&object.key))
                .or_insert(0) += 1;
        }

        if ctx.dry_run {
            debug!(
                source_bucket = %self.config.source_bucket,
                total_units = progress.total_units,
                total_size_bytes = progress.total_size_bytes,
                "Dry run: enumerated objects without touching the destination"
            );
            return Ok(progress);
        }

        let executor = BatchExecutor::new(ctx.concurrency, ctx.unit_timeout, ctx.cancel.clone());
        let completed = Arc::new(AtomicU64::new(0));
        let skipped = Arc::new(AtomicU64::new(0));
        let copied_bytes = Arc::new(AtomicU64::new(0));
        let total = progress.total_units.max(1);

        let units: Vec<ObjectUnit> = objects.into_iter().map(|meta| ObjectUnit { meta }).collect();
        let result = executor
            .run(units, |unit| {
                let store = self.store.clone();
                let src_bucket = self.config.source_bucket.clone();
                let dst_bucket = self.config.destination_bucket.clone();
                let reporter = ctx.reporter.clone();
                let phase_id = ctx.phase_id.clone();
                let completed = completed.clone();
                let skipped = skipped.clone();
                let copied_bytes = copied_bytes.clone();

                async move {
                    let key = &unit.meta.key;
                    let existing = store.head(&dst_bucket, key).await?;
                    let already_present = existing.is_some_and(|dst| {
                        dst.size_bytes == unit.meta.size_bytes && dst.checksum == unit.meta.checksum
                    });

                    if already_present {
                        skipped.fetch_add(1, Ordering::Relaxed);
                    } else {
                        store.copy(&src_bucket, key, &dst_bucket, key).await?;
                        copied_bytes.fetch_add(unit.meta.size_bytes, Ordering::Relaxed);
                    }

                    let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                    reporter.report(&phase_id, done as f64 * 100.0 / total as f64, None);
                    Ok(())
                }
            })
            .await;

        progress.migrated_units = result.succeeded;
        progress.failed_units = result.failed;
        progress.skipped_units = skipped.load(Ordering::Relaxed);
        progress.migrated_size_bytes = copied_bytes.load(Ordering::Relaxed);
        progress.errors = result.errors;

        info!(
            migrated = progress.migrated_units,
            skipped = progress.skipped_units,
            failed = progress.failed_units,
            "Object storage pass finished"
        );
        Ok(progress)
    }

    /// Compares object counts, sizes and checksums between buckets.
    async fn verify(&self, mode: VerificationMode) -> Result<VerificationReport, Error> {
        let source = self
            .store
            .list(&self.config.source_bucket, &self.config.prefix)
            .await?;
        let destination = self
            .store
            .list(&self.config.destination_bucket, &self.config.prefix)
            .await?;

        let mut report = VerificationReport::default();

        if let VerificationMode::Full = mode
            && source.len() != destination.len()
        {
            report.mismatches.push(format!(
                "Object count mismatch: source has {}, destination has {}",
                source.len(),
                destination.len()
            ));
        }

        let dst_by_key: std::collections::HashMap<&str, &ObjectMeta> =
            destination.iter().map(|m| (m.key.as_str(), m)).collect();

        let sample: Box<dyn Iterator<Item = &ObjectMeta> + Send> = match mode {
            VerificationMode::Full => Box::new(source.iter()),
            VerificationMode::Sample(n) => Box::new(source.iter().take(n)),
        };

        for object in sample {
            report.checked_units += 1;
            match dst_by_key.get(object.key.as_str()) {
                None => report
                    .mismatches
                    .push(format!("Missing in destination: {}", object.key)),
                Some(dst) if dst.size_bytes != object.size_bytes => report.mismatches.push(format!(
                    "Size mismatch for {}: {} != {}",
                    object.key, object.size_bytes, dst.size_bytes
                )),
                Some(dst) if dst.checksum != object.checksum => report
                    .mismatches
                    .push(format!("Checksum mismatch for {}", object.key)),
                Some(_) => {}
            }
        }

        report.passed = report.mismatches.is_empty();
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cutover_common::{progress::NoopReporter, store::default::InMemoryObjectStore};

    fn meta(key: &str, size: u64) -> ObjectMeta {
        ObjectMeta {
            key: key.to_string(),
            size_bytes: size,
            checksum: format!("sum-{key}"),
            last_modified: None,
        }
    }

    async fn seeded_store(count: usize, size_each: u64) -> Arc<InMemoryObjectStore> {
        let store = Arc::new(InMemoryObjectStore::new());
        for i in 0..count {
            store
                .seed_object("legacy", meta(&format!("assets/img-{i:03}.png"), size_each))
                .await;
        }
        store
    }

    fn migrator(store: Arc<InMemoryObjectStore>) -> ObjectStorageMigrator {
        ObjectStorageMigrator::new(
            store,
            ObjectStorageConfig {
                source_bucket: "legacy".to_string(),
                destination_bucket: "fresh".to_string(),
                prefix: String::new(),
            },
        )
    }

    fn ctx() -> WorkerContext {
        WorkerContext::new("storage", Arc::new(NoopReporter))
    }

    #[tokio::test]
    async fn test_dry_run_enumerates_without_destination_writes() {
        // 120 objects of ~437 KB each, ≈50 MB in total.
        let store = seeded_store(120, 437_000).await;
        let worker = migrator(store.clone());

        let estimate = worker.plan().await.unwrap();
        assert_eq!(estimate.total_units, 120);
        assert_eq!(estimate.total_size_bytes, 120 * 437_000);
        assert_eq!(estimate.categories["png"], 120);

        assert_eq!(store.copy_call_count(), 0);
        assert_eq!(store.object_count("fresh").await, 0);
    }

    #[tokio::test]
    async fn test_execute_copies_everything_and_reports_sizes() {
        let store = seeded_store(25, 1_000).await;
        let worker = migrator(store.clone());

        let progress = worker.execute(&ctx()).await.unwrap();
        assert_eq!(progress.migrated_units, 25);
        assert_eq!(progress.failed_units, 0);
        assert_eq!(progress.migrated_size_bytes, 25_000);
        assert_eq!(store.object_count("fresh").await, 25);
        assert!(progress.is_fully_successful());
    }

    #[tokio::test]
    async fn test_rerun_skips_already_migrated_objects() {
        let store = seeded_store(30, 1_000).await;
        let worker = migrator(store.clone());

        // First pass copies 10 objects worth of a partial run.
        for i in 0..10 {
            let key = format!("assets/img-{i:03}.png");
            store.copy("legacy", &key, "fresh", &key).await.unwrap();
        }
        let copies_before = store.copy_call_count();

        let progress = worker.execute(&ctx()).await.unwrap();
        assert_eq!(progress.migrated_units, 30);
        assert_eq!(progress.skipped_units, 10);
        assert_eq!(progress.failed_units, 0);
        // Only the 20 missing objects were copied again.
        assert_eq!(store.copy_call_count() - copies_before, 20);
        assert_eq!(store.object_count("fresh").await, 30);
    }

    #[tokio::test]
    async fn test_verify_detects_missing_and_mismatched_objects() {
        let store = seeded_store(5, 1_000).await;
        let worker = migrator(store.clone());
        worker.execute(&ctx()).await.unwrap();

        let report = worker.verify(VerificationMode::Full).await.unwrap();
        assert!(report.passed);
        assert_eq!(report.checked_units, 5);

        // Corrupt one destination object.
        store
            .seed_object("fresh", meta("assets/img-000.png", 999))
            .await;
        let report = worker.verify(VerificationMode::Full).await.unwrap();
        assert!(!report.passed);
        assert!(report.mismatches[0].contains("img-000"));
    }
}
