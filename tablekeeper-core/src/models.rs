//! Core data models for schema reconciliation.
//!
//! Canonical layouts ([`TableSpec`], [`ColumnSpec`]) come from configuration;
//! live layouts ([`LiveTable`], [`LiveColumn`]) are read from the database
//! catalog for every request and never cached.

use serde::{Deserialize, Serialize};

/// Supported database types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatabaseType {
    /// SQLite file or in-memory database
    SQLite,
    /// Microsoft SQL Server
    SqlServer,
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseType::SQLite => write!(f, "SQLite"),
            DatabaseType::SqlServer => write!(f, "SQL Server"),
        }
    }
}

/// A configured column at a given position of a canonical layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// 1-based position in the canonical layout
    pub position: u32,
    /// Column name; empty means the column was left unconfigured
    #[serde(default)]
    pub name: String,
    /// Configuration key the column was read from, for diagnostics
    #[serde(skip)]
    pub key: Option<String>,
}

impl ColumnSpec {
    /// Creates a column spec without a configuration key.
    pub fn new(position: u32, name: impl Into<String>) -> Self {
        Self {
            position,
            name: name.into(),
            key: None,
        }
    }

    /// Attaches the configuration key the column came from.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Whether the column has a usable name.
    pub fn is_configured(&self) -> bool {
        !self.name.trim().is_empty()
    }

    /// Human-readable reference to the configuration entry.
    pub fn config_reference(&self, table: &str) -> String {
        match &self.key {
            Some(key) => key.clone(),
            None => format!("{}[position {}]", table, self.position),
        }
    }
}

/// Canonical layout of one allow-listed table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    /// Allow-listed table name
    pub name: String,
    /// Canonical columns in position order
    #[serde(default)]
    pub columns: Vec<ColumnSpec>,
}

impl TableSpec {
    /// Creates a table spec, ordering its columns by position.
    pub fn new(name: impl Into<String>, mut columns: Vec<ColumnSpec>) -> Self {
        columns.sort_by_key(|column| column.position);
        Self {
            name: name.into(),
            columns,
        }
    }

    /// Builds a spec from bare names, numbering positions from 1.
    pub fn from_names<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns = columns
            .into_iter()
            .zip(1u32..)
            .map(|(column, position)| ColumnSpec::new(position, column))
            .collect();
        Self::new(name, columns)
    }

    /// Column names in position order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// A column as it currently exists in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveColumn {
    /// 1-based physical position
    pub ordinal_position: u32,
    /// Column name as stored in the catalog
    pub name: String,
}

impl LiveColumn {
    /// Creates a live column at `ordinal_position`.
    pub fn new(ordinal_position: u32, name: impl Into<String>) -> Self {
        Self {
            ordinal_position,
            name: name.into(),
        }
    }
}

/// Live state of a table as reported by the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveTable {
    /// Table name as requested
    pub name: String,
    /// Whether the catalog knows the table
    pub exists: bool,
    /// Columns ordered by ordinal position; empty when the table is absent
    pub columns: Vec<LiveColumn>,
}

impl LiveTable {
    /// A table that does not exist yet.
    pub fn absent(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exists: false,
            columns: Vec::new(),
        }
    }
}

/// A configured column whose position is occupied by a differently named
/// live column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionMismatch {
    /// Configured position of the expected column
    pub position: u32,
    /// Configured column name
    pub expected: String,
    /// Live column name found at that position
    pub actual: Option<String>,
}

impl std::fmt::Display for PositionMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "position {} expected '{}' but found '{}'",
            self.position,
            self.expected,
            self.actual.as_deref().unwrap_or("<none>")
        )
    }
}

/// Minimal set of changes needed to bring one table in line with its spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationPlan {
    /// Table the plan applies to
    pub table: String,
    /// Whether the table already exists
    pub table_exists: bool,
    /// Columns to create (all of them when the table is absent)
    pub missing_columns: Vec<ColumnSpec>,
    /// Positions whose live column has a different name
    pub position_mismatches: Vec<PositionMismatch>,
}

impl ReconciliationPlan {
    /// Whether the live schema already matches the spec.
    pub fn is_consistent(&self) -> bool {
        self.table_exists && self.missing_columns.is_empty() && self.position_mismatches.is_empty()
    }

    /// Whether any position is occupied by the wrong column.
    pub fn has_drift(&self) -> bool {
        !self.position_mismatches.is_empty()
    }

    /// Names of the columns to add.
    pub fn missing_names(&self) -> Vec<&str> {
        self.missing_columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// What happened to one table during a reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TableChange {
    /// The table was created with all its columns
    Created {
        /// Created table
        table: String,
        /// Columns it was created with
        columns: Vec<String>,
    },
    /// Missing columns were appended
    ColumnsAdded {
        /// Altered table
        table: String,
        /// Columns added, in position order
        columns: Vec<String>,
    },
}

impl TableChange {
    /// Name of the affected table.
    pub fn table(&self) -> &str {
        match self {
            Self::Created { table, .. } | Self::ColumnsAdded { table, .. } => table,
        }
    }
}

impl std::fmt::Display for TableChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created { table, .. } => {
                write!(f, "table {table} and its columns were created")
            }
            Self::ColumnsAdded { table, columns } => {
                write!(f, "columns {} added to table {table}", columns.join(", "))
            }
        }
    }
}

/// Tables implicated by an audit record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditSubject {
    /// No particular table
    None,
    /// A single table
    Table(String),
    /// Several tables
    Tables(Vec<String>),
}

impl AuditSubject {
    /// JSON payload stored in the subject column.
    ///
    /// A single table is written as `{"tabela": ...}` and several as
    /// `{"tabelas": [...]}`; downstream consumers parse these shapes.
    pub fn to_payload(&self) -> String {
        let value = match self {
            Self::None => serde_json::Value::Null,
            Self::Table(table) => serde_json::json!({ "tabela": table }),
            Self::Tables(tables) => serde_json::json!({ "tabelas": tables }),
        };
        value.to_string()
    }
}

impl From<&str> for AuditSubject {
    fn from(table: &str) -> Self {
        Self::Table(table.to_string())
    }
}

impl From<Vec<String>> for AuditSubject {
    fn from(tables: Vec<String>) -> Self {
        Self::Tables(tables)
    }
}

/// One row of the audit table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Local date, `YYYY-MM-DD`
    pub date: String,
    /// Local time, `HH:MM:SS`
    pub time: String,
    /// JSON rendering of the [`AuditSubject`]
    pub subject_payload: String,
    /// What was attempted or rejected
    pub action: String,
    /// Error detail, written only when a detail column exists
    pub detail: Option<String>,
}

impl AuditRecord {
    /// Builds a record stamped with the given local time.
    pub fn at(
        timestamp: chrono::DateTime<chrono::Local>,
        action: impl Into<String>,
        subject: &AuditSubject,
        detail: Option<String>,
    ) -> Self {
        Self {
            date: timestamp.format("%Y-%m-%d").to_string(),
            time: timestamp.format("%H:%M:%S").to_string(),
            subject_payload: subject.to_payload(),
            action: action.into(),
            detail,
        }
    }
}
