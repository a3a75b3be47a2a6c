//! In-memory adapter that records every statement, for unit tests.

use crate::{
    Result,
    adapters::{ConnectionConfig, DatabaseAdapter},
    dialect::Dialect,
    error::TableKeeperError,
    models::{DatabaseType, LiveColumn},
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Default)]
struct State {
    tables: BTreeMap<String, Vec<LiveColumn>>,
    statements: Vec<String>,
    inserts: Vec<(String, Vec<Option<String>>)>,
    list_column_calls: usize,
    fail_catalog: bool,
    fail_ddl_containing: Option<String>,
    fail_inserts: bool,
    racing_create: Option<(String, Vec<LiveColumn>)>,
}

/// Fake adapter with a fixed catalog.
///
/// DDL is recorded but does not change the catalog, except for the
/// simulated create race.
pub(crate) struct RecordingAdapter {
    dialect: Dialect,
    state: Mutex<State>,
}

impl RecordingAdapter {
    pub(crate) fn new() -> Self {
        Self {
            dialect: Dialect::SqlServer,
            state: Mutex::new(State::default()),
        }
    }

    pub(crate) fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub(crate) fn with_table(self, name: &str, columns: Vec<LiveColumn>) -> Self {
        self.state.lock().unwrap().tables.insert(name.to_string(), columns);
        self
    }

    pub(crate) fn with_column_names(self, name: &str, columns: &[&str]) -> Self {
        let columns = columns
            .iter()
            .zip(1u32..)
            .map(|(column, ordinal)| LiveColumn::new(ordinal, *column))
            .collect();
        self.with_table(name, columns)
    }

    pub(crate) fn failing_catalog(self) -> Self {
        self.state.lock().unwrap().fail_catalog = true;
        self
    }

    /// Fails any DDL statement containing `needle`.
    pub(crate) fn failing_ddl_containing(self, needle: &str) -> Self {
        self.state.lock().unwrap().fail_ddl_containing = Some(needle.to_string());
        self
    }

    pub(crate) fn failing_inserts(self) -> Self {
        self.state.lock().unwrap().fail_inserts = true;
        self
    }

    /// `CREATE TABLE` on `name` fails, but the table appears with `columns`
    /// as if another request created it first.
    pub(crate) fn racing_create(self, name: &str, columns: &[&str]) -> Self {
        let columns = columns
            .iter()
            .zip(1u32..)
            .map(|(column, ordinal)| LiveColumn::new(ordinal, *column))
            .collect();
        self.state.lock().unwrap().racing_create = Some((name.to_string(), columns));
        self
    }

    pub(crate) fn statements(&self) -> Vec<String> {
        self.state.lock().unwrap().statements.clone()
    }

    pub(crate) fn ddl_statements(&self) -> Vec<String> {
        self.statements()
            .into_iter()
            .filter(|s| s.starts_with("CREATE") || s.starts_with("ALTER"))
            .collect()
    }

    pub(crate) fn inserts(&self) -> Vec<(String, Vec<Option<String>>)> {
        self.state.lock().unwrap().inserts.clone()
    }

    pub(crate) fn list_column_calls(&self) -> usize {
        self.state.lock().unwrap().list_column_calls
    }
}

fn simulated(message: &str) -> std::io::Error {
    std::io::Error::other(message.to_string())
}

#[async_trait]
impl DatabaseAdapter for RecordingAdapter {
    async fn test_connection(&self) -> Result<()> {
        Ok(())
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        let state = self.state.lock().unwrap();
        if state.fail_catalog {
            return Err(TableKeeperError::catalog_failed(
                "simulated catalog failure",
                simulated("catalog offline"),
            ));
        }
        Ok(state.tables.contains_key(table))
    }

    async fn list_columns(&self, table: &str) -> Result<Vec<LiveColumn>> {
        let mut state = self.state.lock().unwrap();
        state.list_column_calls += 1;
        if state.fail_catalog {
            return Err(TableKeeperError::catalog_failed(
                "simulated catalog failure",
                simulated("catalog offline"),
            ));
        }
        Ok(state.tables.get(table).cloned().unwrap_or_default())
    }

    async fn execute_ddl(&self, statement: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.statements.push(statement.to_string());

        if let Some((table, columns)) = state.racing_create.clone()
            && statement.starts_with("CREATE TABLE")
            && statement.contains(&table)
        {
            state.tables.insert(table, columns);
            state.racing_create = None;
            return Err(TableKeeperError::execution_failed(
                statement,
                simulated("There is already an object named in the database"),
            ));
        }

        if let Some(needle) = &state.fail_ddl_containing
            && statement.contains(needle.as_str())
        {
            return Err(TableKeeperError::execution_failed(
                statement,
                simulated("simulated DDL failure"),
            ));
        }
        Ok(())
    }

    async fn insert_row(&self, statement: &str, values: &[Option<String>]) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        state.statements.push(statement.to_string());
        if state.fail_inserts {
            return Err(TableKeeperError::execution_failed(
                statement,
                simulated("simulated insert failure"),
            ));
        }
        state
            .inserts
            .push((statement.to_string(), values.to_vec()));
        Ok(1)
    }

    fn database_type(&self) -> DatabaseType {
        match self.dialect {
            Dialect::SqlServer => DatabaseType::SqlServer,
            Dialect::Sqlite => DatabaseType::SQLite,
        }
    }

    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig::default()
    }
}
