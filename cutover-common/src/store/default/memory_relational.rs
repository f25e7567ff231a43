use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::{
    error::Error,
    store::{RelationalStore, RowPage, TableRow},
};

/// In-memory relational store keyed by table name and row id.
/// ---
/// Tables are declared up front in foreign-key dependency order;
/// `upsert` creates unknown tables implicitly so a freshly provisioned
/// destination needs no setup.
#[derive(Debug, Default)]
pub struct InMemoryRelationalStore {
    tables: Mutex<BTreeMap<String, BTreeMap<String, Value>>>,
    table_order: Vec<String>,
}

impl InMemoryRelationalStore {
    pub fn new(table_order: Vec<String>) -> Self {
        Self {
            tables: Mutex::new(BTreeMap::new()),
            table_order,
        }
    }

    pub async fn seed_rows(&self, table: &str, rows: Vec<TableRow>) {
        let mut tables = self.tables.lock().await;
        let entries = tables.entry(table.to_string()).or_default();
        for row in rows {
            entries.insert(row.id, row.data);
        }
    }

    pub async fn row(&self, table: &str, id: &str) -> Option<TableRow> {
        let tables = self.tables.lock().await;
        tables.get(table).and_then(|rows| {
            rows.get(id).map(|data| TableRow {
                id: id.to_string(),
                data: data.clone(),
            })
        })
    }
}

#[async_trait]
impl RelationalStore for InMemoryRelationalStore {
    async fn tables_in_dependency_order(&self) -> Result<Vec<String>, Error> {
        Ok(self.table_order.clone())
    }

    async fn count(&self, table: &str) -> Result<u64, Error> {
        let tables = self.tables.lock().await;
        Ok(tables.get(table).map_or(0, |rows| rows.len() as u64))
    }

    async fn page_rows(
        &self,
        table: &str,
        cursor: Option<String>,
        size: usize,
    ) -> Result<RowPage, Error> {
        let tables = self.tables.lock().await;
        let Some(rows) = tables.get(table) else {
            return Ok(RowPage::default());
        };

        let range: Box<dyn Iterator<Item = (&String, &Value)>> = match &cursor {
            Some(last_id) => Box::new(rows.range((Excluded(last_id.clone()), Unbounded))),
            None => Box::new(rows.iter()),
        };

        let mut page_rows = Vec::with_capacity(size);
        let mut next_cursor = None;
        for (id, data) in range {
            if page_rows.len() == size {
                next_cursor = page_rows.last().map(|row: &TableRow| row.id.clone());
                break;
            }
            page_rows.push(TableRow {
                id: id.clone(),
                data: data.clone(),
            });
        }

        Ok(RowPage {
            rows: page_rows,
            next_cursor,
        })
    }

    async fn upsert(&self, table: &str, rows: &[TableRow]) -> Result<(), Error> {
        let mut tables = self.tables.lock().await;
        let entries = tables.entry(table.to_string()).or_default();
        for row in rows {
            entries.insert(row.id.clone(), row.data.clone());
        }
        Ok(())
    }
}
