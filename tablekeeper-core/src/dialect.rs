//! SQL text generation per backend.
//!
//! Identifiers are validated and quoted here; values are never inlined and
//! always travel as bind parameters.

use crate::{Result, validation::validate_identifier};

/// Column type used for every managed column.
pub const MANAGED_COLUMN_TYPE: &str = "VARCHAR(255)";

/// SQL flavour spoken by an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Bracket quoting, `@Pn` placeholders
    SqlServer,
    /// Double-quote quoting, `?` placeholders
    Sqlite,
}

impl Dialect {
    /// Whether one `ALTER TABLE` can add several columns.
    pub fn supports_multi_column_add(self) -> bool {
        matches!(self, Self::SqlServer)
    }

    /// Validates and quotes an identifier.
    ///
    /// # Errors
    /// Returns a configuration error if the name fails validation.
    pub fn quote_identifier(self, kind: &str, name: &str) -> Result<String> {
        validate_identifier(kind, name)?;
        Ok(match self {
            Self::SqlServer => format!("[{name}]"),
            Self::Sqlite => format!("\"{name}\""),
        })
    }

    /// Bind placeholder for the 1-based parameter `index`.
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Self::SqlServer => format!("@P{index}"),
            Self::Sqlite => "?".to_string(),
        }
    }

    fn column_definition(self, name: &str) -> Result<String> {
        Ok(format!(
            "{} {MANAGED_COLUMN_TYPE}",
            self.quote_identifier("column", name)?
        ))
    }

    /// `CREATE TABLE` with every column typed as managed text.
    ///
    /// # Errors
    /// Returns a configuration error for an invalid identifier or an empty
    /// column list.
    pub fn create_table_sql(self, table: &str, columns: &[&str]) -> Result<String> {
        if columns.is_empty() {
            return Err(crate::error::TableKeeperError::configuration(format!(
                "cannot create table '{table}' without columns"
            )));
        }
        let definitions = columns
            .iter()
            .map(|column| self.column_definition(column))
            .collect::<Result<Vec<_>>>()?;
        Ok(format!(
            "CREATE TABLE {} ({})",
            self.quote_identifier("table", table)?,
            definitions.join(", ")
        ))
    }

    /// `ALTER TABLE ... ADD` statements for `columns`.
    ///
    /// SQL Server gets a single combined statement; SQLite gets one
    /// statement per column.
    ///
    /// # Errors
    /// Returns a configuration error for an invalid identifier.
    pub fn add_columns_sql(self, table: &str, columns: &[&str]) -> Result<Vec<String>> {
        let table = self.quote_identifier("table", table)?;
        let definitions = columns
            .iter()
            .map(|column| self.column_definition(column))
            .collect::<Result<Vec<_>>>()?;

        Ok(match self {
            Self::SqlServer if !definitions.is_empty() => {
                vec![format!("ALTER TABLE {table} ADD {}", definitions.join(", "))]
            }
            Self::SqlServer => Vec::new(),
            Self::Sqlite => definitions
                .into_iter()
                .map(|definition| format!("ALTER TABLE {table} ADD COLUMN {definition}"))
                .collect(),
        })
    }

    /// Parameterized `INSERT` into `table`.
    ///
    /// # Errors
    /// Returns a configuration error for an invalid identifier.
    pub fn insert_sql(self, table: &str, columns: &[&str]) -> Result<String> {
        let quoted = columns
            .iter()
            .map(|column| self.quote_identifier("column", column))
            .collect::<Result<Vec<_>>>()?;
        let placeholders = (1..=columns.len())
            .map(|index| self.placeholder(index))
            .collect::<Vec<_>>();
        Ok(format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.quote_identifier("table", table)?,
            quoted.join(", "),
            placeholders.join(", ")
        ))
    }
}
