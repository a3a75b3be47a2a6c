//! Fire-and-forget notifications about reconciliation outcomes.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event published when a table is reconciled or a request ends badly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ReconcileEvent {
    /// One table was created, extended or found consistent
    TableReconciled {
        /// Request the table belonged to
        request_id: Uuid,
        /// Reconciled table
        table: String,
        /// What happened to it
        message: String,
    },
    /// The request was rejected before any table was touched
    ReconciliationDenied {
        /// Rejected request
        request_id: Uuid,
        /// Denial message returned to the caller
        message: String,
        /// Tables outside the allow-list, if any
        tables: Vec<String>,
    },
    /// At least one table failed with a database error
    ReconciliationFailed {
        /// Failed request
        request_id: Uuid,
        /// Failure summary returned to the caller
        message: String,
        /// Per-table error messages
        errors: Vec<String>,
    },
}

impl ReconcileEvent {
    /// Request the event belongs to.
    pub fn request_id(&self) -> Uuid {
        match self {
            Self::TableReconciled { request_id, .. }
            | Self::ReconciliationDenied { request_id, .. }
            | Self::ReconciliationFailed { request_id, .. } => *request_id,
        }
    }
}

/// Receiver of reconciliation events.
///
/// Implementations must not block; delivery failures are ignored.
pub trait Notifier: Send + Sync {
    /// Publishes `event`.
    fn notify(&self, event: ReconcileEvent);
}

/// Notifier that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, event: ReconcileEvent) {
        tracing::trace!(request_id = %event.request_id(), "Dropping notification");
    }
}
