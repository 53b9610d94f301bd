//! Run orchestration.
//!
//! A run walks `INIT -> NAMESPACE_READY -> FORMATS_READY -> TABLES_READY ->
//! LOADING(1..N) -> RECONCILED -> DONE` over one warehouse session. Any step
//! may fail into `FAILED`, which ends the run with a failure report. The
//! session is closed on every path.

use snafu::prelude::*;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::{Config, TableFailurePolicy};
use crate::emit;
use crate::error::{ConfigError, ConnectSnafu, RunError};
use crate::load::load;
use crate::metrics::events::{RunCompleted, TableRows};
use crate::plan::LoadPlan;
use crate::provision::{ensure_file_format, ensure_namespace, ensure_stage, ensure_table};
use crate::reconcile::{LoadedTable, RunReport, build_result, count_rows};
use crate::warehouse::{self, Session, Warehouse};

/// Where a run is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunPhase {
    Init,
    NamespaceReady,
    FormatsReady,
    TablesReady,
    Loading { table: String, index: usize, of: usize },
    Reconciled,
    Done,
    Failed,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunPhase::Init => write!(f, "INIT"),
            RunPhase::NamespaceReady => write!(f, "NAMESPACE_READY"),
            RunPhase::FormatsReady => write!(f, "FORMATS_READY"),
            RunPhase::TablesReady => write!(f, "TABLES_READY"),
            RunPhase::Loading { table, index, of } => {
                write!(f, "LOADING({index}/{of}: {table})")
            }
            RunPhase::Reconciled => write!(f, "RECONCILED"),
            RunPhase::Done => write!(f, "DONE"),
            RunPhase::Failed => write!(f, "FAILED"),
        }
    }
}

fn enter(phase: RunPhase) {
    info!(phase = %phase, "Run phase");
}

/// Drives one load plan against one warehouse.
pub struct Orchestrator {
    plan: LoadPlan,
    warehouse: Arc<dyn Warehouse>,
}

impl Orchestrator {
    /// Validate the configuration and build the orchestrator.
    ///
    /// Nothing is sent to the warehouse until [`Orchestrator::run`].
    pub fn new(config: &Config, warehouse: Arc<dyn Warehouse>) -> Result<Self, ConfigError> {
        Ok(Self::from_plan(LoadPlan::from_config(config)?, warehouse))
    }

    pub fn from_plan(plan: LoadPlan, warehouse: Arc<dyn Warehouse>) -> Self {
        Self { plan, warehouse }
    }

    pub fn plan(&self) -> &LoadPlan {
        &self.plan
    }

    /// Run the plan. Errors never escape; they become the failure report.
    pub async fn run(&self) -> RunReport {
        enter(RunPhase::Init);
        let report = match self.try_run().await {
            Ok(report) => {
                enter(RunPhase::Done);
                report
            }
            Err(e) => fail(&e),
        };
        emit!(RunCompleted {
            success: report.success,
        });
        report
    }

    async fn try_run(&self) -> Result<RunReport, RunError> {
        let mut session = self.warehouse.connect().await.context(ConnectSnafu)?;
        info!(warehouse = self.warehouse.name(), "Opened warehouse session");

        let result = self.drive(session.as_mut()).await;

        if let Err(e) = session.close().await {
            warn!(error = %e, "Failed to close warehouse session");
        }
        result
    }

    async fn drive(&self, session: &mut dyn Session) -> Result<RunReport, RunError> {
        let plan = &self.plan;

        ensure_namespace(session, &plan.namespace).await?;
        enter(RunPhase::NamespaceReady);

        for format in &plan.file_formats {
            ensure_file_format(session, format).await?;
        }
        ensure_stage(session, &plan.stage).await?;
        enter(RunPhase::FormatsReady);

        for table in &plan.tables {
            ensure_table(session, table).await?;
        }
        enter(RunPhase::TablesReady);

        let mut loaded = Vec::with_capacity(plan.jobs.len());
        let mut failures = Vec::new();
        for (i, job) in plan.jobs.iter().enumerate() {
            let table = job.table.display_name();
            enter(RunPhase::Loading {
                table: table.clone(),
                index: i + 1,
                of: plan.jobs.len(),
            });

            match load(session, job).await {
                Ok(outcome) => loaded.push((
                    job.table.clone(),
                    LoadedTable {
                        name: job.table.name.as_str().to_string(),
                        loaded: outcome.rows_loaded,
                        rejected: outcome.rows_rejected,
                    },
                )),
                Err(e) => match plan.on_table_failure {
                    TableFailurePolicy::Abort => return Err(e.into()),
                    TableFailurePolicy::Continue => {
                        error!(table = %table, error = %e, "Table failed to load, continuing");
                        failures.push(e.to_string());
                    }
                },
            }
        }

        let mut totals = Vec::with_capacity(loaded.len());
        for (name, table) in &loaded {
            let total = count_rows(session, name).await?;
            emit!(TableRows {
                table: name.display_name(),
                total,
            });
            totals.push((table.name.clone(), total));
        }
        enter(RunPhase::Reconciled);

        if !failures.is_empty() {
            return Err(RunError::TablesFailed { failures });
        }

        let loaded: Vec<LoadedTable> = loaded.into_iter().map(|(_, table)| table).collect();
        Ok(build_result(&loaded, &totals)?)
    }
}

fn fail(error: &RunError) -> RunReport {
    error!(phase = %RunPhase::Failed, error = %error, "Run failed");
    RunReport::failed(error)
}

/// Validate the configuration and run it against a warehouse.
pub async fn run(config: &Config, warehouse: Arc<dyn Warehouse>) -> RunReport {
    match Orchestrator::new(config, warehouse) {
        Ok(orchestrator) => orchestrator.run().await,
        Err(e) => rejected(e.into()),
    }
}

/// Validate the configuration, then connect to the warehouse it names and run.
///
/// The warehouse client is only built once the configuration is valid.
pub async fn run_config(config: &Config) -> RunReport {
    let plan = match LoadPlan::from_config(config) {
        Ok(plan) => plan,
        Err(e) => return rejected(e.into()),
    };
    let warehouse = match warehouse::from_config(&config.connection).await {
        Ok(warehouse) => warehouse,
        Err(source) => return rejected(RunError::Connect { source }),
    };
    Orchestrator::from_plan(plan, warehouse).run().await
}

/// The failure report for a configuration that could not be loaded.
pub fn reject_config(source: ConfigError) -> RunReport {
    rejected(RunError::Config { source })
}

fn rejected(error: RunError) -> RunReport {
    let report = fail(&error);
    emit!(RunCompleted { success: false });
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::LocalWarehouse;
    use std::fs;
    use tempfile::TempDir;

    fn config(bucket: &std::path::Path, policy: &str) -> Config {
        Config::parse(&format!(
            r#"
connection:
  type: local
namespace:
  database: ANALYTICS
  schema: RAW
stage:
  name: landing
  bucket: {}
  prefix: processed
file_formats:
  csv:
    skip_header: 1
error_handling:
  on_table_failure: {policy}
tables:
  first:
    file: first.csv
    file_format: csv
    columns:
      - {{ name: id, type: INT }}
  second:
    file: second.csv
    file_format: csv
    columns:
      - {{ name: id, type: INT }}
"#,
            bucket.display()
        ))
        .unwrap()
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(RunPhase::NamespaceReady.to_string(), "NAMESPACE_READY");
        assert_eq!(
            RunPhase::Loading {
                table: "orders".to_string(),
                index: 1,
                of: 2
            }
            .to_string(),
            "LOADING(1/2: orders)"
        );
    }

    #[tokio::test]
    async fn test_success_report() {
        let bucket = TempDir::new().unwrap();
        fs::create_dir_all(bucket.path().join("processed")).unwrap();
        fs::write(bucket.path().join("processed/second.csv"), "id\n1\n2\n").unwrap();
        fs::write(bucket.path().join("processed/first.csv"), "id\n5\n").unwrap();

        let warehouse = Arc::new(LocalWarehouse::in_memory());
        let report = run(&config(bucket.path(), "abort"), warehouse.clone()).await;

        assert!(report.success, "{report:?}");
        assert_eq!(report.to_string(), "first: 1 loaded, 1 total\nsecond: 2 loaded, 2 total");
        assert_eq!(warehouse.active_sessions(), 0);
    }

    #[test]
    fn test_unloadable_config_is_a_failure_report() {
        let yaml = r#"
connection:
  type: snowflake
  account: acct
  user: loader
  password: ${HUSKY_PIPELINE_TEST_UNSET_PASSWORD:?SNOWFLAKE_PASSWORD is required}
"#;
        let err = Config::parse(yaml).unwrap_err();
        let report = reject_config(err);

        assert!(!report.success);
        assert!(report.per_table.is_empty());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["perTable"], serde_json::json!([]));
        assert!(
            json["error"]
                .as_str()
                .unwrap()
                .contains("SNOWFLAKE_PASSWORD is required")
        );
    }

    #[tokio::test]
    async fn test_invalid_config_fails_without_connecting() {
        let bucket = TempDir::new().unwrap();
        let mut config = config(bucket.path(), "abort");
        config.tables.clear();

        let warehouse = Arc::new(LocalWarehouse::in_memory());
        let report = run(&config, warehouse.clone()).await;
        assert!(!report.success);
        assert!(report.per_table.is_empty());
        assert!(report.error.unwrap().contains("at least one table is required"));
    }
}
