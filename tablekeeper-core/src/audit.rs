//! Audit trail for denials and failures.
//!
//! The audit table layout comes from configuration. Positions 1 to 4 hold
//! date, time, subject and action; position 5, when configured, holds the
//! detail text. Anything beyond that is left for the database to default.

use crate::{
    adapters::DatabaseAdapter,
    catalog::CatalogInspector,
    config::ReconcilerConfig,
    error::AuditError,
    models::{AuditRecord, AuditSubject},
    validation::is_valid_identifier,
};
use chrono::{DateTime, Local};
use std::collections::HashSet;

/// Number of columns every audit layout must provide.
pub const REQUIRED_AUDIT_COLUMNS: usize = 4;

/// Writes [`AuditRecord`]s into the configured audit table.
#[derive(Clone, Copy)]
pub struct AuditRecorder<'a> {
    adapter: &'a dyn DatabaseAdapter,
    config: &'a ReconcilerConfig,
}

impl<'a> AuditRecorder<'a> {
    /// Creates a recorder writing through `adapter` with the audit layout
    /// of `config`.
    pub fn new(adapter: &'a dyn DatabaseAdapter, config: &'a ReconcilerConfig) -> Self {
        Self { adapter, config }
    }

    /// Records an event stamped with the current local time.
    ///
    /// # Errors
    /// See [`Self::record_at`].
    pub async fn record(
        &self,
        action: &str,
        subject: &AuditSubject,
        detail: Option<&str>,
    ) -> Result<AuditRecord, AuditError> {
        self.record_at(Local::now(), action, subject, detail).await
    }

    /// Records an event with an explicit timestamp.
    ///
    /// # Errors
    /// - [`AuditError::ColumnsMisconfigured`] if fewer than four audit
    ///   columns are configured, or any configured column has an empty,
    ///   invalid or repeated name
    /// - [`AuditError::TableUnavailable`] if no audit table is configured or
    ///   it does not exist
    /// - [`AuditError::PersistFailed`] if the insert fails
    pub async fn record_at(
        &self,
        timestamp: DateTime<Local>,
        action: &str,
        subject: &AuditSubject,
        detail: Option<&str>,
    ) -> Result<AuditRecord, AuditError> {
        let Some(audit) = self.config.audit() else {
            return Err(AuditError::TableUnavailable {
                reason: "no audit table configured".to_string(),
            });
        };

        let columns = &audit.columns;
        if columns.len() < REQUIRED_AUDIT_COLUMNS {
            return Err(AuditError::ColumnsMisconfigured {
                reason: format!(
                    "{} columns configured for audit table '{}', at least {} required",
                    columns.len(),
                    audit.table,
                    REQUIRED_AUDIT_COLUMNS
                ),
            });
        }

        let unnamed: Vec<String> = columns
            .iter()
            .filter(|c| !c.is_configured())
            .map(|c| c.config_reference(&audit.table))
            .collect();
        if !unnamed.is_empty() {
            return Err(AuditError::ColumnsMisconfigured {
                reason: format!("missing name for {}", unnamed.join(", ")),
            });
        }

        let mut seen = HashSet::new();
        let unusable: Vec<String> = columns
            .iter()
            .filter(|c| !is_valid_identifier(&c.name) || !seen.insert(c.name.to_lowercase()))
            .map(|c| c.config_reference(&audit.table))
            .collect();
        if !unusable.is_empty() {
            return Err(AuditError::ColumnsMisconfigured {
                reason: format!("invalid or repeated name for {}", unusable.join(", ")),
            });
        }

        let used = &columns[..columns.len().min(REQUIRED_AUDIT_COLUMNS + 1)];

        let inspector = CatalogInspector::new(self.adapter);
        match inspector.table_exists(&audit.table).await {
            Ok(true) => {}
            Ok(false) => {
                return Err(AuditError::TableUnavailable {
                    reason: format!("table '{}' does not exist", audit.table),
                });
            }
            Err(error) => {
                return Err(AuditError::TableUnavailable {
                    reason: format!("could not check table '{}': {}", audit.table, error),
                });
            }
        }

        let record = AuditRecord::at(timestamp, action, subject, detail.map(str::to_string));
        let mut values = vec![
            Some(record.date.clone()),
            Some(record.time.clone()),
            Some(record.subject_payload.clone()),
            Some(record.action.clone()),
        ];
        if used.len() > REQUIRED_AUDIT_COLUMNS {
            values.push(record.detail.clone());
        } else if record.detail.is_some() {
            tracing::warn!(
                table = %audit.table,
                "Audit table has no detail column; detail not recorded"
            );
        }

        let names: Vec<&str> = used.iter().map(|c| c.name.as_str()).collect();
        let statement = self
            .adapter
            .dialect()
            .insert_sql(&audit.table, &names)
            .map_err(|error| AuditError::ColumnsMisconfigured {
                reason: error.to_string(),
            })?;

        self.adapter
            .insert_row(&statement, &values)
            .await
            .map_err(|error| AuditError::PersistFailed {
                table: audit.table.clone(),
                source: Box::new(error),
            })?;

        tracing::info!(table = %audit.table, action, "Audit record written");
        Ok(record)
    }
}
