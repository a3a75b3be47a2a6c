//! Live catalog inspection.

use crate::{
    Result,
    adapters::DatabaseAdapter,
    models::{LiveColumn, LiveTable},
};

/// Reads table existence and column layout from the database.
///
/// Nothing is cached: every call goes to the catalog.
#[derive(Clone, Copy)]
pub struct CatalogInspector<'a> {
    adapter: &'a dyn DatabaseAdapter,
}

impl<'a> CatalogInspector<'a> {
    /// Creates an inspector over `adapter`.
    pub fn new(adapter: &'a dyn DatabaseAdapter) -> Self {
        Self { adapter }
    }

    /// # Errors
    /// Returns a catalog error if the lookup fails.
    pub async fn table_exists(&self, table: &str) -> Result<bool> {
        self.adapter.table_exists(table).await
    }

    /// Columns of `table` in ordinal order; empty for a missing table.
    ///
    /// # Errors
    /// Returns a catalog error if the lookup fails.
    pub async fn list_columns(&self, table: &str) -> Result<Vec<LiveColumn>> {
        let mut columns = self.adapter.list_columns(table).await?;
        columns.sort_by_key(|column| column.ordinal_position);
        Ok(columns)
    }

    /// Existence and columns of `table` in one value.
    ///
    /// # Errors
    /// Returns a catalog error if either lookup fails.
    pub async fn inspect(&self, table: &str) -> Result<LiveTable> {
        if !self.table_exists(table).await? {
            tracing::debug!(table, "Table not found in catalog");
            return Ok(LiveTable::absent(table));
        }

        let columns = self.list_columns(table).await?;
        tracing::debug!(table, columns = columns.len(), "Inspected live table");
        Ok(LiveTable {
            name: table.to_string(),
            exists: true,
            columns,
        })
    }
}
