//! Reconciliation configuration and its providers.
//!
//! A [`ReconcilerConfig`] is an immutable snapshot holding the shared secret,
//! the allow-listed tables with their canonical column layouts, and the
//! audit table layout. Snapshots are obtained per request from a
//! [`ConfigProvider`], which may re-read its source on every call.
//!
//! # Environment format
//!
//! | Variable              | Meaning                                        |
//! |-----------------------|------------------------------------------------|
//! | `SCHEMA_SECRET`       | shared secret                                  |
//! | `TABLE_<n>`           | allow-listed table at position `n`             |
//! | `COLUMN_<TABLE>_<n>`  | column `n` of `<TABLE>` (table name uppercased) |
//! | `AUDIT_TABLE`         | audit table name                               |
//! | `AUDIT_COLUMN_<n>`    | audit column `n`                               |
//!
//! Numeric suffixes may carry leading zeros (`COLUMN_CHAMADOS_01`) and may
//! have gaps. Every matching variable is read in a single pass; two keys that
//! resolve to the same position are rejected instead of one silently winning.

use crate::{
    Result,
    error::TableKeeperError,
    models::{ColumnSpec, TableSpec},
    validation::validate_identifier,
};
use serde::{Deserialize, Deserializer};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use zeroize::Zeroizing;

/// Environment variable holding the shared secret.
pub const SECRET_VAR: &str = "SCHEMA_SECRET";
/// Prefix of allow-listed table variables.
pub const TABLE_PREFIX: &str = "TABLE_";
/// Prefix of canonical column variables.
pub const COLUMN_PREFIX: &str = "COLUMN_";
/// Environment variable holding the audit table name.
pub const AUDIT_TABLE_VAR: &str = "AUDIT_TABLE";
/// Prefix of audit column variables.
pub const AUDIT_COLUMN_PREFIX: &str = "AUDIT_COLUMN_";

/// Shared secret held in memory that is zeroed on drop.
#[derive(Clone)]
pub struct Secret(Zeroizing<String>);

impl Secret {
    /// Wraps `value`.
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    /// Exact comparison against a caller-supplied value.
    pub fn matches(&self, candidate: &str) -> bool {
        self.0.as_str() == candidate
    }

    /// Whether no secret was configured.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(****)")
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Self::new)
    }
}

/// Layout of the audit table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuditConfig {
    /// Audit table name
    pub table: String,
    /// Audit columns: date, time, subject, action and optional detail
    #[serde(default)]
    pub columns: Vec<ColumnSpec>,
}

impl AuditConfig {
    /// Creates an audit layout, ordering its columns by position.
    pub fn new(table: impl Into<String>, mut columns: Vec<ColumnSpec>) -> Self {
        columns.sort_by_key(|column| column.position);
        Self {
            table: table.into(),
            columns,
        }
    }
}

/// Proof that a table name is on the allow-list.
///
/// Only [`ReconcilerConfig::permit`] hands these out, so DDL that takes a
/// `PermittedTable` cannot be pointed at an arbitrary name.
#[derive(Debug, Clone, Copy)]
pub struct PermittedTable<'a> {
    spec: &'a TableSpec,
}

impl<'a> PermittedTable<'a> {
    /// Permitted table name.
    pub fn name(&self) -> &'a str {
        &self.spec.name
    }

    /// Canonical layout of the table.
    pub fn spec(&self) -> &'a TableSpec {
        self.spec
    }
}

/// Immutable configuration snapshot for one reconciliation request.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconcilerConfig {
    secret: Secret,
    #[serde(default)]
    tables: Vec<TableSpec>,
    #[serde(default)]
    audit: Option<AuditConfig>,
}

impl ReconcilerConfig {
    /// Builds and validates a configuration.
    ///
    /// # Errors
    /// Returns a configuration error if [`Self::validate`] fails.
    pub fn new(secret: Secret, tables: Vec<TableSpec>, audit: Option<AuditConfig>) -> Result<Self> {
        let config = Self {
            secret,
            tables: tables
                .into_iter()
                .map(|table| TableSpec::new(table.name, table.columns))
                .collect(),
            audit,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks structural invariants of the configuration.
    ///
    /// Column names are not checked here. Empty, invalid or repeated names
    /// are reported when the affected table is reconciled or the audit
    /// record is written, so other tables keep working.
    ///
    /// # Errors
    /// Returns a configuration error for an empty secret, invalid or
    /// duplicate table names, or duplicate or zero positions.
    pub fn validate(&self) -> Result<()> {
        if self.secret.is_empty() {
            return Err(TableKeeperError::configuration(format!(
                "{SECRET_VAR} must not be empty"
            )));
        }

        let mut seen_tables = HashSet::new();
        for table in &self.tables {
            validate_identifier("table", &table.name)?;
            if !seen_tables.insert(table.name.as_str()) {
                return Err(TableKeeperError::configuration(format!(
                    "table '{}' is listed more than once",
                    table.name
                )));
            }
            validate_columns(&table.name, &table.columns)?;
        }

        if let Some(audit) = &self.audit {
            validate_identifier("audit table", &audit.table)?;
            validate_columns(&audit.table, &audit.columns)?;
        }

        Ok(())
    }

    /// Shared secret callers must present.
    pub fn secret(&self) -> &Secret {
        &self.secret
    }

    /// Allow-listed table names in configuration order.
    pub fn permitted_tables(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    /// Whether `table` is on the allow-list (exact, case-sensitive match).
    pub fn is_permitted(&self, table: &str) -> bool {
        self.tables.iter().any(|t| t.name == table)
    }

    /// Returns the allow-list token for `table`, if it is permitted.
    pub fn permit(&self, table: &str) -> Option<PermittedTable<'_>> {
        self.tables
            .iter()
            .find(|t| t.name == table)
            .map(|spec| PermittedTable { spec })
    }

    /// Canonical columns of `table`, if it is permitted.
    pub fn column_specs_for_table(&self, table: &str) -> Option<&[ColumnSpec]> {
        self.tables
            .iter()
            .find(|t| t.name == table)
            .map(|t| t.columns.as_slice())
    }

    /// Every permitted table with its layout.
    pub fn tables(&self) -> &[TableSpec] {
        &self.tables
    }

    /// Audit layout, if configured.
    pub fn audit(&self) -> Option<&AuditConfig> {
        self.audit.as_ref()
    }

    /// Audit table name, if configured.
    pub fn audit_table_name(&self) -> Option<&str> {
        self.audit.as_ref().map(|a| a.table.as_str())
    }

    /// Audit columns; empty when no audit table is configured.
    pub fn audit_column_specs(&self) -> &[ColumnSpec] {
        self.audit.as_ref().map_or(&[], |a| a.columns.as_slice())
    }

    /// Parses a JSON configuration document.
    ///
    /// # Errors
    /// Returns a serialization error for malformed JSON, or a configuration
    /// error if the document fails validation.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let parsed: Self =
            serde_json::from_str(json).map_err(|source| TableKeeperError::Serialization {
                context: "Failed to parse reconciliation configuration".to_string(),
                source,
            })?;
        Self::new(parsed.secret, parsed.tables, parsed.audit)
    }

    /// Reads a JSON configuration file.
    ///
    /// # Errors
    /// Returns an I/O error if the file cannot be read, otherwise as
    /// [`Self::from_json_str`].
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| TableKeeperError::Io {
            context: format!("Failed to read configuration file {}", path.display()),
            source,
        })?;
        Self::from_json_str(&content)
    }

    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    /// As [`Self::from_vars`].
    pub fn from_env() -> Result<Self> {
        Self::from_vars(std::env::vars())
    }

    /// Builds the configuration from `(key, value)` pairs using the
    /// environment format described in the module docs.
    ///
    /// # Errors
    /// Returns a configuration error when the secret is missing, a table
    /// entry is empty, two keys resolve to the same position, or validation
    /// fails.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: BTreeMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        let secret = vars
            .get(SECRET_VAR)
            .map(|value| Secret::new(value.trim()))
            .ok_or_else(|| {
                TableKeeperError::configuration(format!("{SECRET_VAR} is not set"))
            })?;

        let mut tables = Vec::new();
        for entry in positional_entries(&vars, TABLE_PREFIX)? {
            if entry.value.is_empty() {
                return Err(TableKeeperError::configuration(format!(
                    "{} is set but empty",
                    entry.key
                )));
            }
            let prefix = format!("{COLUMN_PREFIX}{}_", entry.value.to_uppercase());
            let columns = positional_entries(&vars, &prefix)?
                .into_iter()
                .map(PositionalEntry::into_column)
                .collect();
            tables.push(TableSpec::new(entry.value, columns));
        }

        let audit = match vars.get(AUDIT_TABLE_VAR).map(|v| v.trim()) {
            Some(table) if !table.is_empty() => {
                let columns = positional_entries(&vars, AUDIT_COLUMN_PREFIX)?
                    .into_iter()
                    .map(PositionalEntry::into_column)
                    .collect();
                Some(AuditConfig::new(table, columns))
            }
            _ => None,
        };

        Self::new(secret, tables, audit)
    }
}

fn validate_columns(table: &str, columns: &[ColumnSpec]) -> Result<()> {
    let mut positions = HashSet::new();
    for column in columns {
        if column.position == 0 {
            return Err(TableKeeperError::configuration(format!(
                "{}: positions start at 1",
                column.config_reference(table)
            )));
        }
        if !positions.insert(column.position) {
            return Err(TableKeeperError::configuration(format!(
                "table '{table}' has more than one column at position {}",
                column.position
            )));
        }
    }
    Ok(())
}

struct PositionalEntry {
    position: u32,
    key: String,
    value: String,
}

impl PositionalEntry {
    fn into_column(self) -> ColumnSpec {
        ColumnSpec::new(self.position, self.value).with_key(self.key)
    }
}

/// Collects every `<prefix><digits>` variable, ordered by position.
fn positional_entries(
    vars: &BTreeMap<String, String>,
    prefix: &str,
) -> Result<Vec<PositionalEntry>> {
    let mut by_position: BTreeMap<u32, PositionalEntry> = BTreeMap::new();

    for (key, value) in vars {
        let Some(suffix) = key.strip_prefix(prefix) else {
            continue;
        };
        if suffix.is_empty() || !suffix.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        let position: u32 = suffix.parse().map_err(|_| {
            TableKeeperError::configuration(format!("{key}: position is out of range"))
        })?;
        if position == 0 {
            return Err(TableKeeperError::configuration(format!(
                "{key}: positions start at 1"
            )));
        }
        if let Some(existing) = by_position.get(&position) {
            return Err(TableKeeperError::configuration(format!(
                "{} and {key} both define position {position}",
                existing.key
            )));
        }
        by_position.insert(
            position,
            PositionalEntry {
                position,
                key: key.clone(),
                value: value.trim().to_string(),
            },
        );
    }

    Ok(by_position.into_values().collect())
}

/// Source of configuration snapshots.
pub trait ConfigProvider: Send + Sync {
    /// Returns the configuration to use for one request.
    ///
    /// # Errors
    /// Returns an error if the underlying source cannot be read or is
    /// invalid.
    fn snapshot(&self) -> Result<Arc<ReconcilerConfig>>;

    /// Short description of the source for logging.
    fn describe(&self) -> String;
}

/// Provider that always returns the same snapshot.
#[derive(Debug, Clone)]
pub struct StaticConfigProvider {
    config: Arc<ReconcilerConfig>,
}

impl StaticConfigProvider {
    /// Serves `config` for every request.
    pub fn new(config: ReconcilerConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl ConfigProvider for StaticConfigProvider {
    fn snapshot(&self) -> Result<Arc<ReconcilerConfig>> {
        Ok(Arc::clone(&self.config))
    }

    fn describe(&self) -> String {
        "static configuration".to_string()
    }
}

/// Provider that re-reads the process environment for every snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvConfigProvider;

impl ConfigProvider for EnvConfigProvider {
    fn snapshot(&self) -> Result<Arc<ReconcilerConfig>> {
        ReconcilerConfig::from_env().map(Arc::new)
    }

    fn describe(&self) -> String {
        "environment variables".to_string()
    }
}

/// Provider that re-reads a JSON file for every snapshot.
#[derive(Debug, Clone)]
pub struct FileConfigProvider {
    path: PathBuf,
}

impl FileConfigProvider {
    /// Reads the JSON file at `path` on every snapshot.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigProvider for FileConfigProvider {
    fn snapshot(&self) -> Result<Arc<ReconcilerConfig>> {
        ReconcilerConfig::from_json_file(&self.path).map(Arc::new)
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}
