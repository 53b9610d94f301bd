//! Validated load plan.
//!
//! Turns a [`Config`] into the catalog objects and jobs a run works through.
//! Every configuration problem is collected so that one error lists them all.

use std::collections::HashSet;

use crate::config::{Config, ConnectionConfig, TableFailurePolicy};
use crate::error::ConfigError;
use crate::model::{ColumnSpec, FileFormatSpec, LoadJob, Namespace, StageSpec, TableSpec};
use crate::sql::{ColumnType, Ident, StagePath, Statement};

/// Everything a run provisions and loads, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadPlan {
    pub namespace: Namespace,
    pub file_formats: Vec<FileFormatSpec>,
    pub stage: StageSpec,
    pub tables: Vec<TableSpec>,
    /// One job per table, in table order.
    pub jobs: Vec<LoadJob>,
    pub on_table_failure: TableFailurePolicy,
}

/// Collects validation messages while building the plan.
#[derive(Default)]
struct Problems(Vec<String>);

impl Problems {
    fn ident(&mut self, setting: &str, value: &str) -> Option<Ident> {
        match Ident::new(value.trim()) {
            Ok(ident) => Some(ident),
            Err(e) => {
                self.0.push(format!("{setting}: {e}"));
                None
            }
        }
    }

    fn require(&mut self, setting: &str, value: &str) {
        if value.trim().is_empty() {
            self.0.push(format!("{setting} must not be empty"));
        }
    }

    fn push(&mut self, message: String) {
        self.0.push(message);
    }
}

impl LoadPlan {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let mut problems = Problems::default();

        if let ConnectionConfig::Snowflake(snowflake) = &config.connection {
            problems.require("connection.account", &snowflake.account);
            problems.require("connection.user", &snowflake.user);
            problems.require("connection.password", &snowflake.password);
            problems.require("connection.warehouse", &snowflake.warehouse);
        }

        let database = problems.ident("namespace.database", &config.namespace.database);
        let schema = problems.ident("namespace.schema", &config.namespace.schema);
        let stage_name = problems.ident("stage.name", &config.stage.name);
        problems.require("stage.bucket", &config.stage.bucket);
        let integration = config
            .stage
            .integration()
            .and_then(|name| problems.ident("stage.storage_integration", name));

        let mut formats = Vec::new();
        for (name, format) in &config.file_formats {
            let setting = format!("file_formats.{name}");
            let ident = problems.ident(&setting, name);
            if !format.field_delimiter.is_ascii() {
                problems.push(format!(
                    "{setting}: field_delimiter must be a single ASCII character"
                ));
            }
            if format.quote.is_some_and(|quote| !quote.is_ascii()) {
                problems.push(format!("{setting}: quote must be a single ASCII character"));
            }
            if format.quote == Some(format.field_delimiter) {
                problems.push(format!(
                    "{setting}: quote and field_delimiter must differ"
                ));
            }
            formats.push((name.as_str(), ident, format));
        }

        if config.tables.is_empty() {
            problems.push("tables: at least one table is required".to_string());
        }

        let mut tables = Vec::new();
        for (name, table) in &config.tables {
            let setting = format!("tables.{name}");
            let table_ident = problems.ident(&setting, name);

            if table.columns.is_empty() {
                problems.push(format!("{setting}: at least one column is required"));
            }

            let mut seen = HashSet::new();
            let mut columns = Vec::with_capacity(table.columns.len());
            for (i, column) in table.columns.iter().enumerate() {
                let column_setting = format!("{setting}.columns[{i}]");
                if !seen.insert(column.name.as_str()) {
                    problems.push(format!(
                        "{column_setting}: duplicate column '{}'",
                        column.name
                    ));
                }
                let column_name = problems.ident(&column_setting, &column.name);
                let ty = match column.ty.parse::<ColumnType>() {
                    Ok(ty) => Some(ty),
                    Err(e) => {
                        problems.push(format!("{column_setting}: {e}"));
                        None
                    }
                };
                if let (Some(name), Some(ty)) = (column_name, ty) {
                    columns.push(ColumnSpec { name, ty });
                }
            }

            let file = match StagePath::new(&table.file) {
                Ok(file) => Some(file),
                Err(e) => {
                    problems.push(format!("{setting}.file: {e}"));
                    None
                }
            };

            let format = formats
                .iter()
                .find(|(format_name, _, _)| *format_name == table.file_format)
                .and_then(|(_, ident, _)| ident.clone());
            if !config.file_formats.contains_key(&table.file_format) {
                problems.push(format!(
                    "{setting}.file_format: '{}' is not declared under file_formats",
                    table.file_format
                ));
            }

            tables.push((table_ident, columns, file, format));
        }

        if !problems.0.is_empty() {
            return Err(ConfigError::Invalid { errors: problems.0 });
        }

        // Every Option below is Some once no problem was recorded.
        let (Some(database), Some(schema), Some(stage_name)) = (database, schema, stage_name)
        else {
            return Err(ConfigError::Invalid {
                errors: vec!["namespace or stage is invalid".to_string()],
            });
        };
        let namespace = Namespace { database, schema };

        let file_formats: Vec<FileFormatSpec> = formats
            .into_iter()
            .filter_map(|(_, ident, format)| {
                Some(FileFormatSpec {
                    name: namespace.qualify(ident?),
                    field_delimiter: format.field_delimiter,
                    quote: format.quote,
                    skip_header: format.skip_header,
                    date_format: format.date_format.clone(),
                    timestamp_format: format.timestamp_format.clone(),
                    null_if: format.null_if.clone(),
                })
            })
            .collect();

        let stage = StageSpec {
            name: namespace.qualify(stage_name),
            url: config.stage.url(),
            storage_integration: integration,
        };

        let mut table_specs = Vec::with_capacity(tables.len());
        let mut jobs = Vec::with_capacity(tables.len());
        for (ident, columns, file, format) in tables {
            let (Some(ident), Some(file), Some(format)) = (ident, file, format) else {
                continue;
            };
            let spec = TableSpec {
                name: namespace.qualify(ident),
                columns,
            };
            jobs.push(LoadJob::for_table(
                &spec,
                stage.name.clone(),
                file,
                namespace.qualify(format),
            ));
            table_specs.push(spec);
        }

        Ok(Self {
            namespace,
            file_formats,
            stage,
            tables: table_specs,
            jobs,
            on_table_failure: config.error_handling.on_table_failure,
        })
    }

    /// The statements a run issues, in order, when every step succeeds.
    pub fn statements(&self) -> Vec<Statement> {
        let database = self.namespace.database.clone();
        let schema = self.namespace.schema.clone();

        let mut statements = vec![
            Statement::CreateDatabase(database.clone()),
            Statement::UseDatabase(database.clone()),
            Statement::CreateSchema {
                database: database.clone(),
                schema: schema.clone(),
            },
            Statement::UseSchema { database, schema },
        ];
        statements.extend(
            self.file_formats
                .iter()
                .cloned()
                .map(Statement::CreateFileFormat),
        );
        statements.push(Statement::CreateStage(self.stage.clone()));
        statements.extend(self.tables.iter().cloned().map(Statement::CreateTable));
        statements.extend(self.jobs.iter().cloned().map(Statement::CopyInto));
        statements.extend(
            self.tables
                .iter()
                .map(|table| Statement::CountRows(table.name.clone())),
        );
        statements
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::StatementKind;

    const CONFIG: &str = r#"
connection:
  type: local
namespace:
  database: ANALYTICS
  schema: RAW
stage:
  name: landing
  bucket: /tmp/husky
file_formats:
  csv:
    skip_header: 1
    date_format: YYYY-MM-DD
tables:
  orders:
    file: orders.csv
    file_format: csv
    columns:
      - { name: id, type: INT }
      - { name: customer, type: VARCHAR(20) }
  events:
    file: events/events.csv
    file_format: csv
    columns:
      - { name: ts, type: TIMESTAMP }
"#;

    #[test]
    fn test_plan_from_config() {
        let config = Config::parse(CONFIG).unwrap();
        let plan = LoadPlan::from_config(&config).unwrap();

        assert_eq!(plan.namespace.to_string(), "ANALYTICS.RAW");
        assert_eq!(plan.file_formats.len(), 1);
        assert_eq!(plan.stage.url, "/tmp/husky/");
        assert_eq!(plan.stage.storage_integration, None);

        let tables: Vec<String> = plan.tables.iter().map(|t| t.name.display_name()).collect();
        assert_eq!(tables, vec!["ANALYTICS.RAW.orders", "ANALYTICS.RAW.events"]);
        assert_eq!(plan.jobs[0].columns.len(), 2);
        assert_eq!(plan.jobs[1].file.as_str(), "events/events.csv");
        assert_eq!(plan.on_table_failure, TableFailurePolicy::Abort);
    }

    #[test]
    fn test_statement_order() {
        let config = Config::parse(CONFIG).unwrap();
        let plan = LoadPlan::from_config(&config).unwrap();
        let kinds: Vec<StatementKind> = plan.statements().iter().map(Statement::kind).collect();

        let mut expected = vec![StatementKind::Namespace; 4];
        expected.push(StatementKind::FileFormat);
        expected.push(StatementKind::Stage);
        expected.extend([StatementKind::Table; 2]);
        expected.extend([StatementKind::Copy; 2]);
        expected.extend([StatementKind::Count; 2]);
        assert_eq!(kinds, expected);
    }

    #[test]
    fn test_every_problem_is_reported() {
        let yaml = r#"
connection:
  type: snowflake
  account: ""
  user: loader
  password: ""
namespace:
  database: ""
  schema: RAW
stage:
  bucket: my-bucket
file_formats:
  csv:
    field_delimiter: '"'
  fancy:
    field_delimiter: '¦'
tables:
  orders:
    file: "orders file.csv"
    file_format: tsv
    columns:
      - { name: id, type: INT }
      - { name: id, type: GEOGRAPHY }
  empty:
    file: empty.csv
    file_format: csv
    columns: []
"#;
        let config = Config::parse(yaml).unwrap();
        let err = LoadPlan::from_config(&config).unwrap_err();
        let ConfigError::Invalid { errors } = err else {
            panic!("expected Invalid, got {err:?}");
        };

        let joined = errors.join("\n");
        for expected in [
            "connection.account must not be empty",
            "connection.password must not be empty",
            "namespace.database: Identifier must not be empty",
            "file_formats.csv: quote and field_delimiter must differ",
            "file_formats.fancy: field_delimiter must be a single ASCII character",
            "tables.orders.columns[1]: duplicate column 'id'",
            "tables.orders.columns[1]: Unknown column type 'GEOGRAPHY'",
            "tables.orders.file: Staged file path 'orders file.csv'",
            "tables.orders.file_format: 'tsv' is not declared",
            "tables.empty: at least one column is required",
        ] {
            assert!(joined.contains(expected), "missing '{expected}' in:\n{joined}");
        }
        assert!(!joined.contains("connection.user"));
    }

    #[test]
    fn test_no_tables_is_invalid() {
        let yaml = r#"
connection:
  type: local
namespace:
  database: ANALYTICS
  schema: RAW
stage:
  bucket: /tmp/husky
"#;
        let config = Config::parse(yaml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("at least one table is required"));
    }
}
