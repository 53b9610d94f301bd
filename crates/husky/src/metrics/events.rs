//! Internal events for husky metrics emission.
//!
//! ## Table Labels
//!
//! Load and reconciliation metrics carry a `table` label so that each target
//! table can be observed on its own.

use metrics::{counter, gauge, histogram};
use std::time::Duration;
use tracing::trace;

pub use husky_core::metrics::events::{InternalEvent, RequestStatus};

/// Event emitted when a warehouse statement completes.
pub struct StatementExecuted {
    pub kind: &'static str,
    pub status: RequestStatus,
}

impl InternalEvent for StatementExecuted {
    fn emit(self) {
        trace!(kind = self.kind, status = self.status.as_str(), "Statement executed");
        counter!(
            "husky_statements_total",
            "kind" => self.kind,
            "status" => self.status.as_str()
        )
        .increment(1);
    }
}

/// Event emitted with the wall-clock duration of a statement.
pub struct StatementDuration {
    pub kind: &'static str,
    pub duration: Duration,
}

impl InternalEvent for StatementDuration {
    fn emit(self) {
        trace!(
            kind = self.kind,
            duration_ms = self.duration.as_millis(),
            "Statement duration"
        );
        histogram!("husky_statement_duration_seconds", "kind" => self.kind)
            .record(self.duration.as_secs_f64());
    }
}

/// Event emitted when a copy inserts rows.
pub struct RowsLoaded {
    pub table: String,
    pub count: u64,
}

impl InternalEvent for RowsLoaded {
    fn emit(self) {
        trace!(table = %self.table, count = self.count, "Rows loaded");
        counter!("husky_rows_loaded_total", "table" => self.table).increment(self.count);
    }
}

/// Event emitted when a copy skips malformed rows.
pub struct RowsRejected {
    pub table: String,
    pub count: u64,
}

impl InternalEvent for RowsRejected {
    fn emit(self) {
        trace!(table = %self.table, count = self.count, "Rows rejected");
        counter!("husky_rows_rejected_total", "table" => self.table).increment(self.count);
    }
}

/// Gauge of the table cardinality observed after a load.
pub struct TableRows {
    pub table: String,
    pub total: u64,
}

impl InternalEvent for TableRows {
    fn emit(self) {
        trace!(table = %self.table, total = self.total, "Table rows");
        gauge!("husky_table_rows", "table" => self.table).set(self.total as f64);
    }
}

/// Event emitted once per run.
pub struct RunCompleted {
    pub success: bool,
}

impl InternalEvent for RunCompleted {
    fn emit(self) {
        let status = if self.success { "success" } else { "failure" };
        trace!(status, "Run completed");
        counter!("husky_runs_total", "status" => status).increment(1);
    }
}
