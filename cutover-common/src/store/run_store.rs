use async_trait::async_trait;
use uuid::Uuid;

use crate::{error::Error, run::MigrationRun};

/// Persistence for migration run state.
/// ---
/// One document per run id, written after every phase transition so a
/// run can be inspected (and audited) after the process exits.
#[async_trait]
pub trait RunStore: Send + Sync {
    async fn save(&self, run: &MigrationRun) -> Result<(), Error>;

    async fn load(&self, run_id: Uuid) -> Result<Option<MigrationRun>, Error>;

    async fn list_runs(&self) -> Result<Vec<Uuid>, Error>;
}
