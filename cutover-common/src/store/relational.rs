use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

/// One row, addressed by a stable id used both for paging order and
/// idempotent upserts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    pub id: String,
    pub data: Value,
}

#[derive(Clone, Debug, Default)]
pub struct RowPage {
    pub rows: Vec<TableRow>,
    /// Cursor for the next page; `None` when the table is exhausted.
    pub next_cursor: Option<String>,
}

/// Minimal interface onto a relational store being migrated.
/// ---
/// The engine does not define the schema; it only needs these four
/// operations. `tables_in_dependency_order` must list referenced
/// tables before their dependents so foreign keys resolve on insert.
#[async_trait]
pub trait RelationalStore: Send + Sync {
    async fn tables_in_dependency_order(&self) -> Result<Vec<String>, Error>;

    async fn count(&self, table: &str) -> Result<u64, Error>;

    /// Pages rows ordered by id. `cursor` is the last id of the
    /// previous page (exclusive); `None` starts from the beginning.
    async fn page_rows(
        &self,
        table: &str,
        cursor: Option<String>,
        size: usize,
    ) -> Result<RowPage, Error>;

    /// Insert-or-replace by row id. Reapplying rows that already exist
    /// must not produce duplicates.
    async fn upsert(&self, table: &str, rows: &[TableRow]) -> Result<(), Error>;
}
