use std::path::PathBuf;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{error::Error, run::MigrationRun, store::RunStore};

/// Stores each run as one pretty-printed JSON document under a state
/// directory, `run-<uuid>.json`.
pub struct LocalFsRunStore {
    state_dir: PathBuf,
}

impl LocalFsRunStore {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    fn run_path(&self, run_id: Uuid) -> PathBuf {
        self.state_dir.join(format!("run-{run_id}.json"))
    }
}

#[async_trait]
impl RunStore for LocalFsRunStore {
    async fn save(&self, run: &MigrationRun) -> Result<(), Error> {
        tokio::fs::create_dir_all(&self.state_dir)
            .await
            .map_err(|io_err| {
                Error::Store(format!(
                    "Failed to create state directory {}: {}",
                    self.state_dir.display(),
                    io_err
                ))
            })?;

        let document = serde_json::to_vec_pretty(run)?;
        let path = self.run_path(run.id);
        tokio::fs::write(&path, document).await.map_err(|io_err| {
            Error::Store(format!(
                "Failed to write run document {}: {}",
                path.display(),
                io_err
            ))
        })
    }

    async fn load(&self, run_id: Uuid) -> Result<Option<MigrationRun>, Error> {
        let path = self.run_path(run_id);
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(io_err) if io_err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(io_err) => {
                return Err(Error::Store(format!(
                    "Failed to read run document {}: {}",
                    path.display(),
                    io_err
                )));
            }
        };

        let run = serde_json::from_slice(&data)?;
        Ok(Some(run))
    }

    async fn list_runs(&self) -> Result<Vec<Uuid>, Error> {
        let mut entries = match tokio::fs::read_dir(&self.state_dir).await {
            Ok(entries) => entries,
            Err(io_err) if io_err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(io_err) => {
                return Err(Error::Store(format!(
                    "Failed to list state directory {}: {}",
                    self.state_dir.display(),
                    io_err
                )));
            }
        };

        let mut run_ids = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|io_err| {
            Error::Store(format!(
                "Failed to list state directory {}: {}",
                self.state_dir.display(),
                io_err
            ))
        })? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(id_str) = name
                .strip_prefix("run-")
                .and_then(|rest| rest.strip_suffix(".json"))
                && let Ok(run_id) = Uuid::parse_str(id_str)
            {
                run_ids.push(run_id);
            }
        }

        run_ids.sort();
        Ok(run_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::MigrationPlan;

    fn empty_run() -> MigrationRun {
        let plan = MigrationPlan {
            version: "1".to_string(),
            name: Some("test".to_string()),
            phases: vec![],
        };
        MigrationRun::new(&plan, vec![], 10)
    }

    #[tokio::test]
    async fn test_round_trips_run_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFsRunStore::new(dir.path());

        let run = empty_run();
        store.save(&run).await.unwrap();

        let loaded = store.load(run.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, run.id);
        assert_eq!(loaded.plan_version, "1");
        assert_eq!(store.list_runs().await.unwrap(), vec![run.id]);
    }

    #[tokio::test]
    async fn test_missing_run_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFsRunStore::new(dir.path());
        assert!(store.load(Uuid::new_v4()).await.unwrap().is_none());
    }
}
