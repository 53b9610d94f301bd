//! Bulk load engine.
//!
//! Issues one `COPY INTO` per job and reads the warehouse's per-file status
//! report. Rows loaded is the sum of the report's `rows_loaded` cells; the
//! table is never re-queried here.

use snafu::prelude::*;
use tracing::{info, warn};

use crate::emit;
use crate::error::{CopySnafu, LoadError};
use crate::metrics::events::{RowsLoaded, RowsRejected};
use crate::model::LoadJob;
use crate::sql::Statement;
use crate::warehouse::{ResultSet, Session, run_statement};

/// Rows inserted and skipped by one copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOutcome {
    pub rows_loaded: u64,
    pub rows_rejected: u64,
}

/// Rows of a staged file were dropped because they failed to parse or convert.
///
/// Non-fatal: the copy continues with the remaining rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowConversionWarning {
    pub table: String,
    pub file: String,
    pub rejected: u64,
    pub first_error: Option<String>,
}

impl RowConversionWarning {
    fn log(&self) {
        warn!(
            table = %self.table,
            file = %self.file,
            rejected = self.rejected,
            first_error = self.first_error.as_deref().unwrap_or("unknown"),
            "Skipped malformed rows"
        );
    }
}

/// Sum the numeric cells of a report column. Missing columns and
/// non-numeric cells count as zero.
fn sum_column(report: &ResultSet, column: &str) -> u64 {
    report
        .column_values(column)
        .into_iter()
        .flatten()
        .filter_map(|cell| cell.trim().parse::<u64>().ok())
        .sum()
}

/// Summarize a copy report.
pub fn summarize(report: &ResultSet) -> LoadOutcome {
    LoadOutcome {
        rows_loaded: sum_column(report, "rows_loaded"),
        rows_rejected: sum_column(report, "errors_seen"),
    }
}

/// Copy one staged file into its table.
pub async fn load(session: &mut dyn Session, job: &LoadJob) -> Result<LoadOutcome, LoadError> {
    let table = job.table.display_name();
    let report = run_statement(session, &Statement::CopyInto(job.clone()))
        .await
        .context(CopySnafu {
            table: table.as_str(),
            file: job.location(),
        })?;

    let outcome = summarize(&report);
    if outcome.rows_rejected > 0 {
        RowConversionWarning {
            table: table.clone(),
            file: job.location(),
            rejected: outcome.rows_rejected,
            first_error: report
                .column_values("first_error")
                .into_iter()
                .flatten()
                .next()
                .map(str::to_string),
        }
        .log();
    }

    emit!(RowsLoaded {
        table: table.clone(),
        count: outcome.rows_loaded,
    });
    emit!(RowsRejected {
        table: table.clone(),
        count: outcome.rows_rejected,
    });

    info!(
        table = %table,
        rows_loaded = outcome.rows_loaded,
        rows_rejected = outcome.rows_rejected,
        "Loaded {}",
        job.location()
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(rows: Vec<Vec<Option<&str>>>) -> ResultSet {
        ResultSet {
            columns: ["file", "status", "ROWS_LOADED", "ERRORS_SEEN"]
                .into_iter()
                .map(String::from)
                .collect(),
            rows: rows
                .into_iter()
                .map(|row| row.into_iter().map(|c| c.map(String::from)).collect())
                .collect(),
        }
    }

    #[test]
    fn test_sums_rows_loaded_by_column_name() {
        let report = report(vec![
            vec![Some("a.csv"), Some("LOADED"), Some("3"), Some("0")],
            vec![Some("b.csv"), Some("PARTIALLY_LOADED"), Some("4"), Some("1")],
        ]);
        assert_eq!(
            summarize(&report),
            LoadOutcome {
                rows_loaded: 7,
                rows_rejected: 1,
            }
        );
    }

    #[test]
    fn test_non_numeric_cells_are_ignored() {
        let report = report(vec![
            vec![Some("a.csv"), Some("LOADED"), Some("n/a"), None],
            vec![Some("b.csv"), Some("LOADED"), Some("2"), Some("0")],
        ]);
        assert_eq!(summarize(&report).rows_loaded, 2);
        assert_eq!(summarize(&report).rows_rejected, 0);
    }

    #[test]
    fn test_no_files_processed_counts_as_zero() {
        let report = ResultSet::status("Copy executed with 0 files processed.");
        assert_eq!(summarize(&report), LoadOutcome::default());
    }
}
