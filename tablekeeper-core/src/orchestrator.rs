//! Request-level reconciliation.
//!
//! A request moves through secret validation, allow-list validation and
//! then reconciles each requested table in caller order. It ends in one of
//! three states:
//!
//! - `Done`: every table was processed; per-table drift or configuration
//!   problems are listed in `errors`
//! - `Denied`: the secret or the allow-list rejected the request and no DDL
//!   ran
//! - `Failed`: at least one table hit a database error
//!
//! Denials and any per-table error produce exactly one audit record.

use crate::{
    Result,
    adapters::DatabaseAdapter,
    audit::AuditRecorder,
    catalog::CatalogInspector,
    config::{ConfigProvider, PermittedTable, ReconcilerConfig},
    error::{AuditError, TableKeeperError},
    executor::SchemaExecutor,
    models::{AuditSubject, ReconciliationPlan, TableChange},
    notify::{NoopNotifier, Notifier, ReconcileEvent},
    planner,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;
use zeroize::Zeroizing;

/// Message returned when nothing had to change.
pub const ALREADY_CONSISTENT: &str = "all tables already consistent";

/// A caller's request to reconcile a set of tables.
#[derive(Clone)]
pub struct ReconcileRequest {
    secret: Zeroizing<String>,
    tables: Vec<String>,
}

impl ReconcileRequest {
    /// Creates a request for `tables`, in caller order.
    pub fn new(secret: impl Into<String>, tables: Vec<String>) -> Self {
        Self {
            secret: Zeroizing::new(secret.into()),
            tables,
        }
    }

    /// Requested table names as supplied.
    pub fn tables(&self) -> &[String] {
        &self.tables
    }
}

impl std::fmt::Debug for ReconcileRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconcileRequest")
            .field("secret", &"****")
            .field("tables", &self.tables)
            .finish()
    }
}

/// Terminal state of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileStatus {
    /// Every table was processed
    Done,
    /// Rejected by the secret or the allow-list
    Denied,
    /// At least one table hit a database error
    Failed,
}

/// What happened to the audit record of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AuditStatus {
    /// Nothing needed auditing
    NotRequired,
    /// The record was written
    Recorded,
    /// No usable audit table; the record was dropped
    Unavailable {
        /// Why the record was dropped
        message: String,
    },
    /// The audit table exists but the record could not be written
    Failed {
        /// Why the write failed
        message: String,
    },
}

impl AuditStatus {
    fn from_result(result: std::result::Result<(), AuditError>) -> Self {
        match result {
            Ok(()) => Self::Recorded,
            Err(error @ (AuditError::TableUnavailable { .. } | AuditError::ColumnsMisconfigured { .. })) => {
                Self::Unavailable {
                    message: error.to_string(),
                }
            }
            Err(error) => Self::Failed {
                message: error.to_string(),
            },
        }
    }

    fn note(&self) -> Option<&str> {
        match self {
            Self::NotRequired | Self::Recorded => None,
            Self::Unavailable { message } | Self::Failed { message } => Some(message),
        }
    }
}

/// Result of one reconciliation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileOutcome {
    /// Identifier shared with the request's logs and events
    pub request_id: Uuid,
    /// Terminal state
    pub status: ReconcileStatus,
    /// Human-readable summary
    pub message: String,
    /// Changes applied, in caller order
    pub changes: Vec<TableChange>,
    /// Per-table or request-level error messages
    pub errors: Vec<String>,
    /// Requested tables missing from the allow-list
    pub denied_tables: Vec<String>,
    /// Fate of the audit record
    pub audit: AuditStatus,
}

impl ReconcileOutcome {
    fn new(request_id: Uuid, status: ReconcileStatus, message: impl Into<String>) -> Self {
        Self {
            request_id,
            status,
            message: message.into(),
            changes: Vec::new(),
            errors: Vec::new(),
            denied_tables: Vec::new(),
            audit: AuditStatus::NotRequired,
        }
    }

    /// Whether the request reached `Done`.
    pub fn is_done(&self) -> bool {
        self.status == ReconcileStatus::Done
    }
}

/// Entry point that sequences validation, planning, execution and audit.
pub struct Reconciler {
    adapter: Arc<dyn DatabaseAdapter>,
    config: Arc<dyn ConfigProvider>,
    notifier: Arc<dyn Notifier>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("database_type", &self.adapter.database_type())
            .field("config", &self.config.describe())
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Creates a reconciler that emits no notifications.
    pub fn new(adapter: Arc<dyn DatabaseAdapter>, config: Arc<dyn ConfigProvider>) -> Self {
        Self {
            adapter,
            config,
            notifier: Arc::new(NoopNotifier),
        }
    }

    /// Sends request events to `notifier`.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Database the reconciler works against.
    pub fn adapter(&self) -> &dyn DatabaseAdapter {
        self.adapter.as_ref()
    }

    /// Handles one request end to end.
    ///
    /// Never returns an error: every failure is folded into the outcome.
    pub async fn reconcile(&self, request: &ReconcileRequest) -> ReconcileOutcome {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "reconcile",
            request_id = %request_id,
            tables = request.tables.len()
        );
        self.reconcile_inner(request_id, request).instrument(span).await
    }

    async fn reconcile_inner(&self, request_id: Uuid, request: &ReconcileRequest) -> ReconcileOutcome {
        let config = match self.config.snapshot() {
            Ok(config) => config,
            Err(error) => {
                tracing::error!(error = %error, source = %self.config.describe(), "Configuration unavailable");
                let mut outcome =
                    ReconcileOutcome::new(request_id, ReconcileStatus::Failed, error.to_string());
                outcome.errors.push(error.to_string());
                outcome.audit = AuditStatus::Unavailable {
                    message: "configuration could not be loaded".to_string(),
                };
                self.notify_failed(&outcome);
                return outcome;
            }
        };

        if !config.secret().matches(&request.secret) {
            tracing::warn!("Rejected request with invalid secret");
            let error = TableKeeperError::InvalidSecret;
            let subject = AuditSubject::Tables(request.tables.clone());
            return self
                .deny(request_id, &config, error, subject, Vec::new())
                .await;
        }

        let tables = dedup_in_order(&request.tables);
        let denied: Vec<String> = tables
            .iter()
            .filter(|table| !config.is_permitted(table))
            .cloned()
            .collect();
        if !denied.is_empty() {
            tracing::warn!(denied = ?denied, "Rejected request for tables outside the allow-list");
            let error = TableKeeperError::TablesNotPermitted {
                tables: denied.clone(),
            };
            let subject = AuditSubject::Tables(denied.clone());
            return self.deny(request_id, &config, error, subject, denied).await;
        }

        let mut changes = Vec::new();
        let mut errors = Vec::new();
        let mut failed_tables = Vec::new();
        let mut database_failure = false;

        for name in &tables {
            let Some(table) = config.permit(name) else {
                continue;
            };

            match self.reconcile_table(table).await {
                Ok(change) => {
                    let message = change
                        .as_ref()
                        .map_or_else(|| format!("table {name} already consistent"), ToString::to_string);
                    self.notifier.notify(ReconcileEvent::TableReconciled {
                        request_id,
                        table: name.clone(),
                        message,
                    });
                    changes.extend(change);
                }
                Err(error) => {
                    database_failure |= error.is_database_failure();
                    if error.is_database_failure() {
                        tracing::error!(table = %name, error = %error, "Table reconciliation failed");
                    } else {
                        tracing::warn!(table = %name, error = %error, "Table skipped");
                    }
                    errors.push(error.to_string());
                    failed_tables.push(name.clone());
                }
            }
        }

        let (status, message) = if database_failure {
            (
                ReconcileStatus::Failed,
                format!("failed to reconcile {} table(s)", failed_tables.len()),
            )
        } else if changes.is_empty() && errors.is_empty() {
            (ReconcileStatus::Done, ALREADY_CONSISTENT.to_string())
        } else if changes.is_empty() {
            (ReconcileStatus::Done, "no changes applied".to_string())
        } else {
            (
                ReconcileStatus::Done,
                changes
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; "),
            )
        };

        let mut outcome = ReconcileOutcome::new(request_id, status, message);
        outcome.changes = changes;
        outcome.errors = errors;

        if !outcome.errors.is_empty() {
            let detail = outcome.errors.join("; ");
            let result = AuditRecorder::new(self.adapter.as_ref(), &config)
                .record(
                    "failed to reconcile tables",
                    &AuditSubject::Tables(failed_tables),
                    Some(&detail),
                )
                .await
                .map(|_| ());
            outcome.audit = AuditStatus::from_result(result);
            if let Some(note) = outcome.audit.note() {
                tracing::error!(audit = %note, "Audit record not written");
                outcome.message = format!("{}; {}", outcome.message, note);
            }
        }

        match outcome.status {
            ReconcileStatus::Failed => self.notify_failed(&outcome),
            _ => tracing::info!(
                changes = outcome.changes.len(),
                errors = outcome.errors.len(),
                "Reconciliation finished"
            ),
        }
        outcome
    }

    /// Plans, creates and extends one table.
    async fn reconcile_table(&self, table: PermittedTable<'_>) -> Result<Option<TableChange>> {
        let adapter = self.adapter.as_ref();
        let inspector = CatalogInspector::new(adapter);
        let executor = SchemaExecutor::new(adapter);

        let live = inspector.inspect(table.name()).await?;
        let mut plan = planner::plan(table.spec(), &live)?;

        if !plan.table_exists {
            match executor.create_table(table).await {
                Ok(change) => return Ok(Some(change)),
                Err(error) if error.is_database_failure() => {
                    // another request may have created it first
                    let live = match inspector.inspect(table.name()).await {
                        Ok(live) if live.exists => live,
                        _ => return Err(error),
                    };
                    tracing::warn!(
                        table = table.name(),
                        "CREATE TABLE failed but the table now exists; continuing"
                    );
                    plan = planner::plan(table.spec(), &live)?;
                }
                Err(error) => return Err(error),
            }
        }

        if let Some(error) = planner::drift_error(&plan) {
            return Err(error);
        }

        executor.add_columns(table, &plan.missing_columns).await
    }

    async fn deny(
        &self,
        request_id: Uuid,
        config: &ReconcilerConfig,
        error: TableKeeperError,
        subject: AuditSubject,
        denied_tables: Vec<String>,
    ) -> ReconcileOutcome {
        let action = match &error {
            TableKeeperError::InvalidSecret => "invalid secret",
            _ => "tables not permitted",
        };
        let result = AuditRecorder::new(self.adapter.as_ref(), config)
            .record(action, &subject, Some(&error.to_string()))
            .await
            .map(|_| ());

        let mut outcome =
            ReconcileOutcome::new(request_id, ReconcileStatus::Denied, error.to_string());
        outcome.errors.push(error.to_string());
        outcome.denied_tables = denied_tables;
        outcome.audit = AuditStatus::from_result(result);
        if let Some(note) = outcome.audit.note() {
            outcome.message = format!("{}; {}", outcome.message, note);
        }

        self.notifier.notify(ReconcileEvent::ReconciliationDenied {
            request_id,
            message: outcome.message.clone(),
            tables: outcome.denied_tables.clone(),
        });
        outcome
    }

    fn notify_failed(&self, outcome: &ReconcileOutcome) {
        self.notifier.notify(ReconcileEvent::ReconciliationFailed {
            request_id: outcome.request_id,
            message: outcome.message.clone(),
            errors: outcome.errors.clone(),
        });
    }

    /// Computes plans without changing anything.
    ///
    /// # Errors
    /// Returns [`TableKeeperError::TablesNotPermitted`] if any table is not
    /// allow-listed, or the first catalog or configuration error.
    pub async fn plan_tables(&self, tables: &[String]) -> Result<Vec<ReconciliationPlan>> {
        let config = self.config.snapshot()?;
        let denied: Vec<String> = tables
            .iter()
            .filter(|table| !config.is_permitted(table))
            .cloned()
            .collect();
        if !denied.is_empty() {
            return Err(TableKeeperError::TablesNotPermitted { tables: denied });
        }

        let inspector = CatalogInspector::new(self.adapter.as_ref());
        let mut plans = Vec::with_capacity(tables.len());
        for name in dedup_in_order(tables) {
            let Some(table) = config.permit(&name) else {
                continue;
            };
            let live = inspector.inspect(table.name()).await?;
            plans.push(planner::plan(table.spec(), &live)?);
        }
        Ok(plans)
    }
}

fn dedup_in_order(tables: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tables
        .iter()
        .filter(|table| seen.insert(table.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::{AuditConfig, Secret, StaticConfigProvider};
    use crate::dialect::Dialect;
    use crate::models::{ColumnSpec, TableSpec};
    use crate::testing::RecordingAdapter;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CollectingNotifier {
        events: Mutex<Vec<ReconcileEvent>>,
    }

    impl Notifier for CollectingNotifier {
        fn notify(&self, event: ReconcileEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    fn config(with_audit: bool) -> ReconcilerConfig {
        let audit = with_audit.then(|| {
            AuditConfig::new(
                "LogErros",
                ["Data", "Hora", "Tabela", "Acao", "Detalhe"]
                    .into_iter()
                    .zip(1u32..)
                    .map(|(name, position)| ColumnSpec::new(position, name))
                    .collect(),
            )
        });
        ReconcilerConfig::new(
            Secret::new("correctpass123"),
            vec![
                TableSpec::from_names("Chamados", ["Nome", "Status"]),
                TableSpec::from_names("Historico", ["A", "B", "C"]),
            ],
            audit,
        )
        .unwrap()
    }

    fn reconciler(adapter: Arc<RecordingAdapter>, config: ReconcilerConfig) -> Reconciler {
        Reconciler::new(adapter, Arc::new(StaticConfigProvider::new(config)))
    }

    fn request(secret: &str, tables: &[&str]) -> ReconcileRequest {
        ReconcileRequest::new(secret, tables.iter().map(|t| t.to_string()).collect())
    }

    fn audit_table(adapter: RecordingAdapter) -> RecordingAdapter {
        adapter.with_column_names("LogErros", &["Data", "Hora", "Tabela", "Acao", "Detalhe"])
    }

    #[tokio::test]
    async fn test_invalid_secret_is_denied_and_audited() {
        let adapter = Arc::new(audit_table(RecordingAdapter::new()));
        let outcome = reconciler(adapter.clone(), config(true))
            .reconcile(&request("wrong", &["Chamados"]))
            .await;

        assert_eq!(outcome.status, ReconcileStatus::Denied);
        assert!(outcome.message.contains("invalid secret"));
        assert_eq!(outcome.audit, AuditStatus::Recorded);
        assert!(adapter.ddl_statements().is_empty());

        let inserts = adapter.inserts();
        assert_eq!(inserts.len(), 1);
        assert_eq!(inserts[0].1[3].as_deref(), Some("invalid secret"));
    }

    #[tokio::test]
    async fn test_not_permitted_lists_exactly_offenders() {
        let adapter = Arc::new(audit_table(RecordingAdapter::new()));
        let outcome = reconciler(adapter.clone(), config(true))
            .reconcile(&request("correctpass123", &["Chamados", "Usuarios", "Senhas"]))
            .await;

        assert_eq!(outcome.status, ReconcileStatus::Denied);
        assert_eq!(outcome.denied_tables, vec!["Usuarios", "Senhas"]);
        assert!(adapter.ddl_statements().is_empty());
        assert_eq!(adapter.inserts().len(), 1);
        assert_eq!(
            adapter.inserts()[0].1[2].as_deref(),
            Some(r#"{"tabelas":["Usuarios","Senhas"]}"#)
        );
    }

    #[tokio::test]
    async fn test_denial_without_audit_table_mentions_it() {
        let adapter = Arc::new(RecordingAdapter::new());
        let outcome = reconciler(adapter, config(true))
            .reconcile(&request("wrong", &["Chamados"]))
            .await;

        assert_eq!(outcome.status, ReconcileStatus::Denied);
        assert!(matches!(outcome.audit, AuditStatus::Unavailable { .. }));
        assert!(outcome.message.contains("Audit table unavailable"));
    }

    #[tokio::test]
    async fn test_creates_absent_table() {
        let adapter = Arc::new(RecordingAdapter::new());
        let notifier = Arc::new(CollectingNotifier::default());
        let outcome = reconciler(adapter.clone(), config(false))
            .with_notifier(notifier.clone())
            .reconcile(&request("correctpass123", &["Chamados"]))
            .await;

        assert_eq!(outcome.status, ReconcileStatus::Done);
        assert_eq!(outcome.message, "table Chamados and its columns were created");
        assert_eq!(
            adapter.ddl_statements(),
            vec!["CREATE TABLE [Chamados] ([Nome] VARCHAR(255), [Status] VARCHAR(255))"]
        );
        assert_eq!(outcome.audit, AuditStatus::NotRequired);

        let events = notifier.events.lock().unwrap();
        assert!(matches!(
            &events[..],
            [ReconcileEvent::TableReconciled { table, .. }] if table == "Chamados"
        ));
    }

    #[tokio::test]
    async fn test_consistent_table_issues_no_ddl() {
        let adapter = Arc::new(RecordingAdapter::new().with_column_names("Chamados", &["Nome", "Status"]));
        let outcome = reconciler(adapter.clone(), config(false))
            .reconcile(&request("correctpass123", &["Chamados"]))
            .await;

        assert_eq!(outcome.message, ALREADY_CONSISTENT);
        assert!(adapter.ddl_statements().is_empty());
    }

    #[tokio::test]
    async fn test_drift_blocks_add_but_not_other_tables() {
        let adapter = Arc::new(
            audit_table(RecordingAdapter::new())
                .with_column_names("Historico", &["A", "B", "Foo"])
                .with_column_names("Chamados", &["Nome"]),
        );
        let outcome = reconciler(adapter.clone(), config(true))
            .reconcile(&request("correctpass123", &["Historico", "Chamados"]))
            .await;

        assert_eq!(outcome.status, ReconcileStatus::Done);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].contains("'C'"));
        assert!(outcome.errors[0].contains("'Foo'"));
        assert_eq!(
            adapter.ddl_statements(),
            vec!["ALTER TABLE [Chamados] ADD [Status] VARCHAR(255)"]
        );
        assert_eq!(outcome.audit, AuditStatus::Recorded);
    }

    #[tokio::test]
    async fn test_database_failure_is_failed_and_audited_once() {
        let adapter = Arc::new(
            audit_table(RecordingAdapter::new())
                .with_column_names("Chamados", &["Nome"])
                .failing_ddl_containing("ALTER TABLE"),
        );
        let notifier = Arc::new(CollectingNotifier::default());
        let outcome = reconciler(adapter.clone(), config(true))
            .with_notifier(notifier.clone())
            .reconcile(&request("correctpass123", &["Chamados", "Historico"]))
            .await;

        assert_eq!(outcome.status, ReconcileStatus::Failed);
        assert_eq!(outcome.errors.len(), 1);
        // Historico was still created after Chamados failed
        assert_eq!(outcome.changes.len(), 1);
        assert_eq!(adapter.inserts().len(), 1);
        assert_eq!(outcome.audit, AuditStatus::Recorded);

        let events = notifier.events.lock().unwrap();
        assert!(matches!(events.last(), Some(ReconcileEvent::ReconciliationFailed { .. })));
    }

    #[tokio::test]
    async fn test_audit_failure_does_not_mask_original_error() {
        let adapter = Arc::new(
            audit_table(RecordingAdapter::new())
                .failing_catalog()
                .failing_inserts(),
        );
        let outcome = reconciler(adapter, config(true))
            .reconcile(&request("correctpass123", &["Chamados"]))
            .await;

        assert_eq!(outcome.status, ReconcileStatus::Failed);
        assert!(outcome.errors[0].contains("Catalog query failed"));
        assert!(matches!(outcome.audit, AuditStatus::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_unconfigured_column_skips_only_that_table() {
        let config = ReconcilerConfig::new(
            Secret::new("correctpass123"),
            vec![
                TableSpec::new(
                    "Historico",
                    vec![
                        ColumnSpec::new(1, "A"),
                        ColumnSpec::new(2, "").with_key("COLUMN_HISTORICO_2"),
                    ],
                ),
                TableSpec::from_names("Chamados", ["Nome", "Status"]),
            ],
            None,
        )
        .unwrap();
        let adapter = Arc::new(RecordingAdapter::new());
        let outcome = reconciler(adapter.clone(), config)
            .reconcile(&request("correctpass123", &["Historico", "Chamados"]))
            .await;

        assert_eq!(outcome.status, ReconcileStatus::Done);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].contains("COLUMN_HISTORICO_2"));
        assert_eq!(outcome.changes.len(), 1);
        assert_eq!(outcome.changes[0].table(), "Chamados");
        assert_eq!(
            adapter.ddl_statements(),
            vec!["CREATE TABLE [Chamados] ([Nome] VARCHAR(255), [Status] VARCHAR(255))"]
        );
    }

    #[tokio::test]
    async fn test_invalid_column_name_keeps_other_tables_and_denials_working() {
        let config = ReconcilerConfig::new(
            Secret::new("correctpass123"),
            vec![
                TableSpec::from_names("Chamados", ["Nome"]),
                TableSpec::from_names("Historico", ["Data Abertura"]),
            ],
            None,
        )
        .unwrap();
        let adapter = Arc::new(RecordingAdapter::new());
        let reconciler = reconciler(adapter.clone(), config);

        let outcome = reconciler
            .reconcile(&request("correctpass123", &["Chamados"]))
            .await;
        assert_eq!(outcome.status, ReconcileStatus::Done);
        assert!(outcome.errors.is_empty());

        let outcome = reconciler
            .reconcile(&request("correctpass123", &["Historico"]))
            .await;
        assert_eq!(outcome.status, ReconcileStatus::Done);
        assert!(outcome.errors[0].contains("Historico[position 1]"));

        let outcome = reconciler.reconcile(&request("wrong", &["Chamados"])).await;
        assert_eq!(outcome.status, ReconcileStatus::Denied);
        assert_eq!(adapter.ddl_statements().len(), 1);
    }

    #[tokio::test]
    async fn test_audit_insert_failure_is_reported_separately() {
        let adapter = Arc::new(audit_table(RecordingAdapter::new()).failing_inserts());
        let outcome = reconciler(adapter.clone(), config(true))
            .reconcile(&request("wrong", &["Chamados"]))
            .await;

        assert_eq!(outcome.status, ReconcileStatus::Denied);
        assert!(outcome.message.starts_with("Permission denied: invalid secret"));
        assert!(outcome.message.contains("Could not persist audit record"));
        assert!(matches!(
            &outcome.audit,
            AuditStatus::Failed { message } if message.contains("LogErros")
        ));

        let adapter = Arc::new(
            audit_table(RecordingAdapter::new())
                .with_column_names("Chamados", &["Nome"])
                .failing_ddl_containing("ALTER TABLE")
                .failing_inserts(),
        );
        let outcome = reconciler(adapter, config(true))
            .reconcile(&request("correctpass123", &["Chamados"]))
            .await;

        assert_eq!(outcome.status, ReconcileStatus::Failed);
        assert_eq!(outcome.errors.len(), 1);
        assert!(!outcome.errors[0].contains("Could not persist audit record"));
        assert!(matches!(outcome.audit, AuditStatus::Failed { .. }));
        assert!(outcome.message.contains("Could not persist audit record"));
    }

    #[tokio::test]
    async fn test_create_race_continues_with_add() {
        let adapter = Arc::new(
            RecordingAdapter::new()
                .with_dialect(Dialect::Sqlite)
                .racing_create("Historico", &["A"]),
        );
        let outcome = reconciler(adapter.clone(), config(false))
            .reconcile(&request("correctpass123", &["Historico"]))
            .await;

        assert_eq!(outcome.status, ReconcileStatus::Done);
        assert_eq!(outcome.message, "columns B, C added to table Historico");
        assert_eq!(adapter.ddl_statements().len(), 3);
    }

    #[tokio::test]
    async fn test_plan_tables_is_read_only() {
        let adapter = Arc::new(RecordingAdapter::new().with_column_names("Historico", &["A"]));
        let reconciler = reconciler(adapter.clone(), config(false));

        let plans = reconciler
            .plan_tables(&["Historico".to_string(), "Chamados".to_string()])
            .await
            .unwrap();

        assert_eq!(plans[0].missing_names(), vec!["B", "C"]);
        assert!(!plans[1].table_exists);
        assert!(adapter.statements().is_empty());

        let denied = reconciler.plan_tables(&["Usuarios".to_string()]).await;
        assert!(matches!(denied, Err(TableKeeperError::TablesNotPermitted { .. })));
    }

    #[test]
    fn test_request_debug_hides_secret() {
        let request = request("correctpass123", &["Chamados"]);
        assert!(!format!("{:?}", request).contains("correctpass123"));
    }
}
