//! Reconciliation planning.
//!
//! The planner is pure: it compares a canonical layout with a live one and
//! never touches the database. Comparison is positional. The i-th configured
//! column (by position) is matched against the i-th live column (by ordinal
//! position), so sparse configured positions such as 1, 3, 7 still line up
//! with live ordinals 1, 2, 3.

use crate::{
    Result,
    error::TableKeeperError,
    models::{LiveTable, PositionMismatch, ReconciliationPlan, TableSpec},
    validation::is_valid_identifier,
};
use std::collections::HashSet;

/// Computes the changes needed to bring `live` in line with `spec`.
///
/// Drift does not make this fail: mismatches are part of the returned plan,
/// and the caller decides what to do with them.
///
/// # Errors
/// Returns [`TableKeeperError::ColumnsNotConfigured`] when any canonical
/// column has an empty or invalid name or the same name appears twice, and a
/// configuration error when the table has no columns configured at all.
pub fn plan(spec: &TableSpec, live: &LiveTable) -> Result<ReconciliationPlan> {
    check_columns(spec)?;

    if !live.exists {
        return Ok(ReconciliationPlan {
            table: spec.name.clone(),
            table_exists: false,
            missing_columns: spec.columns.clone(),
            position_mismatches: Vec::new(),
        });
    }

    let mut missing_columns = Vec::new();
    let mut position_mismatches = Vec::new();

    for (index, expected) in spec.columns.iter().enumerate() {
        match live.columns.get(index) {
            None => missing_columns.push(expected.clone()),
            Some(actual) if actual.name == expected.name => {}
            Some(actual) => position_mismatches.push(PositionMismatch {
                position: expected.position,
                expected: expected.name.clone(),
                actual: Some(actual.name.clone()),
            }),
        }
    }

    Ok(ReconciliationPlan {
        table: spec.name.clone(),
        table_exists: true,
        missing_columns,
        position_mismatches,
    })
}

/// Turns a plan with drift into the error reported for that table.
pub fn drift_error(plan: &ReconciliationPlan) -> Option<TableKeeperError> {
    plan.has_drift().then(|| TableKeeperError::Drift {
        table: plan.table.clone(),
        mismatches: plan.position_mismatches.clone(),
    })
}

fn check_columns(spec: &TableSpec) -> Result<()> {
    if spec.columns.is_empty() {
        return Err(TableKeeperError::configuration(format!(
            "no columns configured for table '{}'",
            spec.name
        )));
    }

    let mut offending = Vec::new();
    let mut seen = HashSet::new();
    for column in &spec.columns {
        let usable = column.is_configured()
            && is_valid_identifier(&column.name)
            && seen.insert(column.name.to_lowercase());
        if !usable {
            offending.push(column.config_reference(&spec.name));
        }
    }

    if offending.is_empty() {
        Ok(())
    } else {
        Err(TableKeeperError::ColumnsNotConfigured {
            table: spec.name.clone(),
            keys: offending,
        })
    }
}
