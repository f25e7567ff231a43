use std::{sync::Arc, time::Duration};

use cutover_common::{
    error::Error,
    phase::PhaseKind,
    plan::{MigrationPlan, PhaseSpec},
    store::{
        ObjectMeta, TableRow,
        default::{InMemoryCacheStore, InMemoryObjectStore, InMemoryRelationalStore},
    },
};
use cutover_engine::workers::{
    CacheRebuildConfig, CacheRebuilder, MigrationWorker, ObjectStorageConfig,
    ObjectStorageMigrator, RelationalConfig, RelationalDataMigrator,
};
use serde_json::{Value, json};

const DEMO_TABLES: [(&str, usize); 3] = [("accounts", 120), ("orders", 340), ("users", 80)];
const DEMO_OBJECTS_PER_BUCKET: usize = 48;

/// In-memory source and destination systems for rehearsing a plan.
/// ---
/// The binary has no live credentials; it exists to validate plans and
/// demonstrate a full run. Stores are seeded deterministically from the
/// buckets and tables the plan references, so two rehearsals of the
/// same plan produce identical numbers.
pub struct DemoStores {
    objects: Arc<InMemoryObjectStore>,
    cache: Arc<InMemoryCacheStore>,
    source_db: Arc<InMemoryRelationalStore>,
    dest_db: Arc<InMemoryRelationalStore>,
}

impl DemoStores {
    pub async fn provision(plan: &MigrationPlan) -> Result<Self, Error> {
        let objects = Arc::new(InMemoryObjectStore::new());
        for spec in &plan.phases {
            if spec.kind != PhaseKind::ObjectStorage {
                continue;
            }
            let bucket = str_meta(spec, "source_bucket")?.unwrap_or("legacy".to_string());
            let prefix = str_meta(spec, "prefix")?.unwrap_or_default();
            for i in 0..DEMO_OBJECTS_PER_BUCKET {
                let extension = ["png", "pdf", "csv"][i % 3];
                let key = format!("{prefix}demo/object-{i:03}.{extension}");
                objects
                    .seed_object(
                        &bucket,
                        ObjectMeta {
                            key: key.clone(),
                            size_bytes: 12_288 + i as u64 * 37_000,
                            checksum: format!("sha256:{key}"),
                            last_modified: None,
                        },
                    )
                    .await;
            }
        }

        let table_order: Vec<String> = DEMO_TABLES.iter().map(|(t, _)| t.to_string()).collect();
        let source_db = Arc::new(InMemoryRelationalStore::new(table_order));
        for (table, rows) in DEMO_TABLES {
            source_db
                .seed_rows(
                    table,
                    (0..rows)
                        .map(|i| TableRow {
                            id: format!("{table}-{i:05}"),
                            data: json!({ "id": format!("{table}-{i:05}"), "seq": i }),
                        })
                        .collect(),
                )
                .await;
        }

        Ok(Self {
            objects,
            cache: Arc::new(InMemoryCacheStore::new()),
            source_db,
            dest_db: Arc::new(InMemoryRelationalStore::default()),
        })
    }

    /// Builds the worker for one phase from its metadata, or `None` for
    /// manual phases.
    pub fn worker_for(
        &self,
        spec: &PhaseSpec,
        default_page_size: usize,
    ) -> Result<Option<Arc<dyn MigrationWorker>>, Error> {
        let worker: Arc<dyn MigrationWorker> = match spec.kind {
            PhaseKind::Manual => return Ok(None),
            PhaseKind::ObjectStorage => Arc::new(ObjectStorageMigrator::new(
                self.objects.clone(),
                ObjectStorageConfig {
                    source_bucket: str_meta(spec, "source_bucket")?.unwrap_or("legacy".to_string()),
                    destination_bucket: str_meta(spec, "destination_bucket")?
                        .unwrap_or("fresh".to_string()),
                    prefix: str_meta(spec, "prefix")?.unwrap_or_default(),
                },
            )),
            PhaseKind::CacheRebuild => Arc::new(CacheRebuilder::new(
                self.cache.clone(),
                self.source_db.clone(),
                CacheRebuildConfig {
                    tables: string_list_meta(spec, "tables")?
                        .unwrap_or_else(|| vec!["users".to_string()]),
                    legacy_key_pattern: str_meta(spec, "legacy_key_pattern")?
                        .unwrap_or("users:*".to_string()),
                    ttl: u64_meta(spec, "ttl_seconds")?.map(Duration::from_secs),
                    page_size: usize_meta(spec, "page_size")?.unwrap_or(default_page_size),
                },
            )),
            PhaseKind::RelationalData => Arc::new(RelationalDataMigrator::new(
                self.source_db.clone(),
                self.dest_db.clone(),
                RelationalConfig {
                    page_size: usize_meta(spec, "page_size")?.unwrap_or(default_page_size),
                },
            )),
        };
        Ok(Some(worker))
    }
}

fn meta<'a>(spec: &'a PhaseSpec, key: &str) -> Option<&'a Value> {
    spec.metadata.get(key)
}

fn str_meta(spec: &PhaseSpec, key: &str) -> Result<Option<String>, Error> {
    match meta(spec, key) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(bad_meta(spec, key, "a string", other)),
    }
}

fn u64_meta(spec: &PhaseSpec, key: &str) -> Result<Option<u64>, Error> {
    match meta(spec, key) {
        None => Ok(None),
        Some(Value::Number(n)) if n.as_u64().is_some() => Ok(n.as_u64()),
        Some(other) => Err(bad_meta(spec, key, "a non-negative integer", other)),
    }
}

fn usize_meta(spec: &PhaseSpec, key: &str) -> Result<Option<usize>, Error> {
    Ok(u64_meta(spec, key)?.map(|n| n as usize))
}

fn string_list_meta(spec: &PhaseSpec, key: &str) -> Result<Option<Vec<String>>, Error> {
    let Some(value) = meta(spec, key) else {
        return Ok(None);
    };
    let Value::Array(items) = value else {
        return Err(bad_meta(spec, key, "a list of strings", value));
    };
    items
        .iter()
        .map(|item| match item {
            Value::String(s) => Ok(s.clone()),
            other => Err(bad_meta(spec, key, "a list of strings", other)),
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

fn bad_meta(spec: &PhaseSpec, key: &str, expected: &str, found: &Value) -> Error {
    Error::Config(format!(
        "Phase {}: metadata key '{key}' must be {expected}, found {found}",
        spec.id
    ))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn object_phase() -> PhaseSpec {
        let mut metadata = BTreeMap::new();
        metadata.insert("source_bucket".to_string(), json!("old-media"));
        metadata.insert("destination_bucket".to_string(), json!("new-media"));
        PhaseSpec {
            id: "storage".to_string(),
            name: "Object storage".to_string(),
            description: None,
            kind: PhaseKind::ObjectStorage,
            depends_on: vec![],
            estimated_duration_minutes: 30,
            sub_tasks: vec![],
            metadata,
        }
    }

    fn plan_of(phases: Vec<PhaseSpec>) -> MigrationPlan {
        MigrationPlan {
            version: "1".to_string(),
            name: None,
            phases,
        }
    }

    #[tokio::test]
    async fn test_provision_seeds_buckets_named_in_plan() {
        let stores = DemoStores::provision(&plan_of(vec![object_phase()]))
            .await
            .unwrap();
        assert_eq!(
            stores.objects.object_count("old-media").await,
            DEMO_OBJECTS_PER_BUCKET
        );
        assert_eq!(stores.objects.object_count("new-media").await, 0);
    }

    #[tokio::test]
    async fn test_worker_for_manual_phase_is_none() {
        let mut spec = object_phase();
        spec.kind = PhaseKind::Manual;
        let stores = DemoStores::provision(&plan_of(vec![])).await.unwrap();
        assert!(stores.worker_for(&spec, 500).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_malformed_metadata_is_a_config_error() {
        let mut spec = object_phase();
        spec.metadata
            .insert("source_bucket".to_string(), json!(42));
        let stores = DemoStores::provision(&plan_of(vec![])).await.unwrap();
        let err = stores.worker_for(&spec, 500).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
