//! Core library for TableKeeper.
//!
//! TableKeeper provisions and repairs the schema of a small set of
//! allow-listed tables. A caller presents a shared secret and a list of
//! tables; the engine inspects the live catalog, plans the missing columns,
//! refuses to touch tables whose column order has drifted, applies
//! `CREATE TABLE` / `ALTER TABLE ... ADD`, and writes an audit record for
//! every denial or failure.
//!
//! # Security Guarantees
//! - DDL only targets allow-listed tables ([`config::PermittedTable`])
//! - Every interpolated identifier is validated and quoted
//! - Catalog lookups and audit inserts use bind parameters
//! - The shared secret and database passwords are never logged
//!
//! # Architecture
//! - [`catalog`] reads existence and column layout
//! - [`planner`] computes the diff (pure)
//! - [`executor`] applies DDL
//! - [`audit`] records denials and failures
//! - [`orchestrator`] sequences a request end to end

pub mod adapters;
pub mod audit;
pub mod catalog;
pub mod config;
pub mod dialect;
pub mod error;
pub mod executor;
pub mod logging;
pub mod models;
pub mod notify;
pub mod orchestrator;
pub mod planner;
pub mod validation;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod testing;

// Re-export commonly used types
pub use adapters::{ConnectionConfig, DatabaseAdapter, create_adapter};
pub use config::{
    ConfigProvider, EnvConfigProvider, FileConfigProvider, ReconcilerConfig, Secret,
    StaticConfigProvider,
};
pub use error::{AuditError, Result, TableKeeperError};
pub use models::{
    AuditRecord, AuditSubject, ColumnSpec, DatabaseType, LiveColumn, LiveTable, PositionMismatch,
    ReconciliationPlan, TableChange, TableSpec,
};
pub use notify::{NoopNotifier, Notifier, ReconcileEvent};
pub use orchestrator::{
    AuditStatus, ReconcileOutcome, ReconcileRequest, ReconcileStatus, Reconciler,
};
