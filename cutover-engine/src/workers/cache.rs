use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use tracing::{debug, info};

use cutover_common::{
    error::Error,
    store::{CacheStore, RelationalStore},
};

use crate::batch::{BatchExecutor, MigrationUnit};

use super::{MigrationProgress, MigrationWorker, VerificationMode, VerificationReport, WorkerContext};

#[derive(Clone, Debug)]
pub struct CacheRebuildConfig {
    /// Tables whose rows are projected into the cache as `table:id`.
    pub tables: Vec<String>,
    /// Pattern used to census keys left in the legacy cache; informational.
    pub legacy_key_pattern: String,
    pub ttl: Option<Duration>,
    pub page_size: usize,
}

/// Rebuilds cache entries from the relational store.
/// ---
/// Cache data is derived, not authoritative: entries are recomputed
/// from the database rather than copied from the old cache, and
/// verification resolves rebuilt keys against the database too.
pub struct CacheRebuilder {
    cache: Arc<dyn CacheStore>,
    database: Arc<dyn RelationalStore>,
    config: CacheRebuildConfig,
}

struct CacheUnit {
    key: String,
    value: String,
}

impl MigrationUnit for CacheUnit {
    fn unit_id(&self) -> String {
        self.key.clone()
    }
}

impl CacheRebuilder {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        database: Arc<dyn RelationalStore>,
        config: CacheRebuildConfig,
    ) -> Self {
        Self {
            cache,
            database,
            config,
        }
    }

    /// Derives the full set of cache entries from the database.
    async fn derive_units(&self) -> Result<Vec<CacheUnit>, Error> {
        let mut units = Vec::new();
        for table in &self.config.tables {
            let mut cursor = None;
            loop {
                let page = self
                    .database
                    .page_rows(table, cursor, self.config.page_size)
                    .await?;
                for row in &page.rows {
                    units.push(CacheUnit {
                        key: format!("{table}:{}", row.id),
                        value: row.data.to_string(),
                    });
                }
                cursor = page.next_cursor;
                if cursor.is_none() {
                    break;
                }
            }
        }
        Ok(units)
    }
}

#[async_trait]
impl MigrationWorker for CacheRebuilder {
    fn name(&self) -> &str {
        "cache-rebuilder"
    }

    async fn execute(&self, ctx: &WorkerContext) -> Result<MigrationProgress, Error> {
        let units = self.derive_units().await?;

        let mut progress = MigrationProgress {
            total_units: units.len() as u64,
            total_size_bytes: units.iter().map(|u| u.value.len() as u64).sum(),
            ..Default::default()
        };
        for unit in &units {
            let table = unit.key.split(':').next().unwrap_or("unknown").to_string();
            *progress.categories.entry(table).or_insert(0) += 1;
        }

        let legacy_keys = self
            .cache
            .scan_keys(&self.config.legacy_key_pattern)
            .await?;
        if units.len() != legacy_keys.len() {
            progress.warnings.push(format!(
                "Rebuilding {} entries; legacy cache held {} keys matching {}",
                units.len(),
                legacy_keys.len(),
                self.config.legacy_key_pattern
            ));
        }

        if ctx.dry_run {
            debug!(
                total_units = progress.total_units,
                "Dry run: derived cache entries without writing"
            );
            return Ok(progress);
        }

        let executor = BatchExecutor::new(ctx.concurrency, ctx.unit_timeout, ctx.cancel.clone());
        let completed = Arc::new(AtomicU64::new(0));
        let written_bytes = Arc::new(AtomicU64::new(0));
        let total = progress.total_units.max(1);

        let result = executor
            .run(units, |unit| {
                let cache = self.cache.clone();
                let ttl = self.config.ttl;
                let reporter = ctx.reporter.clone();
                let phase_id = ctx.phase_id.clone();
                let completed = completed.clone();
                let written_bytes = written_bytes.clone();

                async move {
                    // Overwrite-by-key: re-running replaces stale entries.
                    cache.set(&unit.key, &unit.value, ttl).await?;
                    written_bytes.fetch_add(unit.value.len() as u64, Ordering::Relaxed);

                    let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                    reporter.report(&phase_id, done as f64 * 100.0 / total as f64, None);
                    Ok(())
                }
            })
            .await;

        progress.migrated_units = result.succeeded;
        progress.failed_units = result.failed;
        progress.migrated_size_bytes = written_bytes.load(Ordering::Relaxed);
        progress.errors = result.errors;

        info!(
            rebuilt = progress.migrated_units,
            failed = progress.failed_units,
            "Cache rebuild pass finished"
        );
        Ok(progress)
    }

    /// Confirms a sample of rebuilt keys resolve correctly against the
    /// database (the primary source of truth), not the old cache.
    async fn verify(&self, mode: VerificationMode) -> Result<VerificationReport, Error> {
        let units = self.derive_units().await?;
        let sample: Vec<&CacheUnit> = match mode {
            VerificationMode::Full => units.iter().collect(),
            VerificationMode::Sample(n) => units.iter().take(n).collect(),
        };

        let mut report = VerificationReport::default();
        for unit in sample {
            report.checked_units += 1;
            match self.cache.get(&unit.key).await? {
                None => report
                    .mismatches
                    .push(format!("Missing cache entry: {}", unit.key)),
                Some(cached) if cached != unit.value => report
                    .mismatches
                    .push(format!("Stale cache entry: {}", unit.key)),
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
    use cutover_common::{
        progress::NoopReporter,
        store::{TableRow, default::{InMemoryCacheStore, InMemoryRelationalStore}},
    };
    use serde_json::json;

    async fn database() -> Arc<InMemoryRelationalStore> {
        let db = Arc::new(InMemoryRelationalStore::new(vec!["users".to_string()]));
        db.seed_rows(
            "users",
            (0..8)
                .map(|i| TableRow {
                    id: format!("u{i}"),
                    data: json!({ "id": format!("u{i}"), "name": format!("user {i}") }),
                })
                .collect(),
        )
        .await;
        db
    }

    fn rebuilder(
        cache: Arc<InMemoryCacheStore>,
        db: Arc<InMemoryRelationalStore>,
    ) -> CacheRebuilder {
        CacheRebuilder::new(
            cache,
            db,
            CacheRebuildConfig {
                tables: vec!["users".to_string()],
                legacy_key_pattern: "users:*".to_string(),
                ttl: Some(Duration::from_secs(3600)),
                page_size: 3,
            },
        )
    }

    fn ctx() -> WorkerContext {
        WorkerContext::new("cache", Arc::new(NoopReporter))
    }

    #[tokio::test]
    async fn test_rebuilds_entries_from_database_not_old_cache() {
        let cache = Arc::new(InMemoryCacheStore::new());
        // Stale entry left over from the legacy cache.
        cache.seed("users:u0", "{\"name\":\"outdated\"}").await;

        let db = database().await;
        let worker = rebuilder(cache.clone(), db.clone());

        let progress = worker.execute(&ctx()).await.unwrap();
        assert_eq!(progress.migrated_units, 8);
        assert_eq!(progress.failed_units, 0);

        // The stale value was replaced by the database projection.
        let rebuilt = cache.get("users:u0").await.unwrap().unwrap();
        assert!(rebuilt.contains("user 0"));
        assert_eq!(cache.ttl_of("users:u0").await, Some(Duration::from_secs(3600)));
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let cache = Arc::new(InMemoryCacheStore::new());
        let db = database().await;
        let worker = rebuilder(cache.clone(), db);

        let estimate = worker.plan().await.unwrap();
        assert_eq!(estimate.total_units, 8);
        assert_eq!(estimate.categories["users"], 8);
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_verify_samples_against_database() {
        let cache = Arc::new(InMemoryCacheStore::new());
        let db = database().await;
        let worker = rebuilder(cache.clone(), db);

        worker.execute(&ctx()).await.unwrap();
        let report = worker.verify(VerificationMode::Sample(5)).await.unwrap();
        assert!(report.passed);
        assert_eq!(report.checked_units, 5);

        // Tamper with one rebuilt entry; verification must notice.
        cache.seed("users:u1", "{\"tampered\":true}").await;
        let report = worker.verify(VerificationMode::Full).await.unwrap();
        assert!(!report.passed);
        assert!(report.mismatches[0].contains("users:u1"));
    }
}
