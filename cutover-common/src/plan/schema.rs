use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::phase::PhaseKind;

/// Static migration plan, supplied once at `initialize_migration` time.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MigrationPlan {
    pub version: String,
    pub name: Option<String>,
    pub phases: Vec<PhaseSpec>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PhaseSpec {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub kind: PhaseKind,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub estimated_duration_minutes: u64,
    #[serde(default)]
    pub sub_tasks: Vec<SubTaskSpec>,
    /// Worker configuration keys, documented per `PhaseKind`:
    /// object_storage: `source_bucket`, `destination_bucket`, `prefix`;
    /// cache_rebuild: `tables`, `legacy_key_pattern`, `ttl_seconds`;
    /// relational_data: `page_size`.
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SubTaskSpec {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}
