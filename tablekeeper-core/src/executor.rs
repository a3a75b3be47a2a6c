//! DDL execution for allow-listed tables.
//!
//! Every entry point takes a [`PermittedTable`], so DDL can only target a
//! name that came out of the allow-list. Tables are never wrapped in a
//! transaction together; each call stands alone.

use crate::{
    Result,
    adapters::DatabaseAdapter,
    config::PermittedTable,
    error::TableKeeperError,
    models::{ColumnSpec, TableChange},
};

/// Applies planned schema changes.
#[derive(Clone, Copy)]
pub struct SchemaExecutor<'a> {
    adapter: &'a dyn DatabaseAdapter,
}

impl<'a> SchemaExecutor<'a> {
    /// Creates an executor issuing DDL through `adapter`.
    pub fn new(adapter: &'a dyn DatabaseAdapter) -> Self {
        Self { adapter }
    }

    /// Creates `table` with every canonical column.
    ///
    /// # Errors
    /// Returns a configuration error for an invalid identifier and an
    /// execution error if the statement fails.
    pub async fn create_table(&self, table: PermittedTable<'_>) -> Result<TableChange> {
        let columns = table.spec().column_names();
        let statement = self
            .adapter
            .dialect()
            .create_table_sql(table.name(), &columns)?;

        self.adapter.execute_ddl(&statement).await?;
        tracing::info!(table = table.name(), columns = columns.len(), "Created table");

        Ok(TableChange::Created {
            table: table.name().to_string(),
            columns: columns.into_iter().map(str::to_string).collect(),
        })
    }

    /// Adds `columns` to an existing `table`.
    ///
    /// Returns `None` when there is nothing to add. On backends that need one
    /// statement per column, execution stops at the first failure.
    ///
    /// # Errors
    /// Returns [`TableKeeperError::PartialColumnAdd`] when some columns were
    /// added before a failure, or the underlying execution error otherwise.
    pub async fn add_columns(
        &self,
        table: PermittedTable<'_>,
        columns: &[ColumnSpec],
    ) -> Result<Option<TableChange>> {
        if columns.is_empty() {
            return Ok(None);
        }

        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        let dialect = self.adapter.dialect();
        let statements = dialect.add_columns_sql(table.name(), &names)?;

        if dialect.supports_multi_column_add() {
            for statement in &statements {
                self.adapter.execute_ddl(statement).await?;
            }
        } else {
            // one statement per column, same order as `names`
            for (index, statement) in statements.iter().enumerate() {
                if let Err(error) = self.adapter.execute_ddl(statement).await {
                    if index == 0 {
                        return Err(error);
                    }
                    tracing::warn!(
                        table = table.name(),
                        failed = names[index],
                        added = index,
                        "Column addition stopped part way through"
                    );
                    return Err(TableKeeperError::PartialColumnAdd {
                        table: table.name().to_string(),
                        added: names[..index].iter().map(|n| n.to_string()).collect(),
                        failed: names[index].to_string(),
                        not_added: names[index..].iter().map(|n| n.to_string()).collect(),
                        source: Box::new(error),
                    });
                }
            }
        }

        tracing::info!(table = table.name(), columns = ?names, "Added columns");
        Ok(Some(TableChange::ColumnsAdded {
            table: table.name().to_string(),
            columns: names.into_iter().map(str::to_string).collect(),
        }))
    }
}
