//! Reconciliation reporter.
//!
//! Counts each table after loading and packages the run report. The report is
//! all-or-nothing: a failed run carries only the error, never partial counts.

use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::fmt;

use crate::error::{
    CountRowsSnafu, InvalidCountSnafu, MissingCountSnafu, ReconciliationError, RunError,
};
use crate::sql::{QualifiedName, Statement};
use crate::warehouse::{Session, run_statement};

/// Counts for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableReport {
    pub name: String,
    /// Rows inserted by this run.
    pub loaded: u64,
    /// Rows in the table after the run.
    pub total: u64,
    /// Rows skipped as malformed by this run.
    pub rejected: u64,
}

/// Outcome of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub success: bool,
    pub per_table: Vec<TableReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunReport {
    /// The failure shape: no counts, only the error.
    pub fn failed(error: &RunError) -> Self {
        Self {
            success: false,
            per_table: Vec::new(),
            error: Some(error.to_string()),
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(error) = &self.error {
            return write!(f, "Error: {error}");
        }
        for (i, table) in self.per_table.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(
                f,
                "{}: {} loaded, {} total",
                table.name, table.loaded, table.total
            )?;
        }
        Ok(())
    }
}

/// Rows loaded by this run for one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedTable {
    pub name: String,
    pub loaded: u64,
    pub rejected: u64,
}

/// Count the rows currently in a table.
pub async fn count_rows(
    session: &mut dyn Session,
    table: &QualifiedName,
) -> Result<u64, ReconciliationError> {
    let name = table.display_name();
    let result = run_statement(session, &Statement::CountRows(table.clone()))
        .await
        .context(CountRowsSnafu { table: name.as_str() })?;

    let value = result.scalar();
    value
        .and_then(|cell| cell.trim().parse::<u64>().ok())
        .context(InvalidCountSnafu {
            table: name.as_str(),
            value: value.map(str::to_string),
        })
}

/// Pair loaded counts with table totals into a successful report.
///
/// `totals` holds `(table name, total rows)`; every loaded table must have one.
pub fn build_result(
    loaded: &[LoadedTable],
    totals: &[(String, u64)],
) -> Result<RunReport, ReconciliationError> {
    let per_table = loaded
        .iter()
        .map(|table| {
            let total = totals
                .iter()
                .find(|(name, _)| *name == table.name)
                .map(|(_, total)| *total)
                .context(MissingCountSnafu {
                    table: table.name.as_str(),
                })?;
            Ok(TableReport {
                name: table.name.clone(),
                loaded: table.loaded,
                total,
                rejected: table.rejected,
            })
        })
        .collect::<Result<Vec<_>, ReconciliationError>>()?;

    Ok(RunReport {
        success: true,
        per_table,
        error: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;

    fn loaded(name: &str, loaded: u64) -> LoadedTable {
        LoadedTable {
            name: name.to_string(),
            loaded,
            rejected: 1,
        }
    }

    #[test]
    fn test_build_result() {
        let report = build_result(
            &[loaded("orders", 3), loaded("events", 0)],
            &[("events".to_string(), 10), ("orders".to_string(), 3)],
        )
        .unwrap();

        assert!(report.success);
        assert_eq!(report.per_table[0].total, 3);
        assert_eq!(report.per_table[1].total, 10);
        assert_eq!(
            report.to_string(),
            "orders: 3 loaded, 3 total\nevents: 0 loaded, 10 total"
        );
    }

    #[test]
    fn test_missing_total_is_an_error() {
        let err = build_result(&[loaded("orders", 3)], &[]).unwrap_err();
        assert!(matches!(err, ReconciliationError::MissingCount { .. }));
    }

    #[test]
    fn test_report_json_shape() {
        let report = build_result(&[loaded("orders", 3)], &[("orders".to_string(), 3)]).unwrap();
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            serde_json::json!({
                "success": true,
                "perTable": [{"name": "orders", "loaded": 3, "total": 3, "rejected": 1}],
            })
        );

        let failed = RunReport::failed(&RunError::Config {
            source: ConfigError::MissingSetting {
                setting: "connection.password".to_string(),
            },
        });
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["perTable"], serde_json::json!([]));
        assert!(json["error"].as_str().unwrap().contains("connection.password"));
        assert!(failed.to_string().starts_with("Error: "));
    }
}
