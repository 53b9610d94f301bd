//! Typed statements and their Snowflake rendering.
//!
//! Every statement the loader issues is a [`Statement`] value. Names are
//! [`Ident`]s and are always quoted when rendered, literals go through
//! [`quote_literal`], and the copy's column list comes from the job, so the
//! positional contract between source fields and destination columns lives
//! in exactly one place.

mod ident;
mod types;

pub use ident::{Ident, MAX_IDENT_LEN, QualifiedName, StagePath, quote_literal};
pub use types::ColumnType;

use std::fmt::Write;

use crate::model::{FileFormatSpec, LoadJob, StageSpec, TableSpec};

/// Statement category, used as a log field and metric label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Namespace,
    FileFormat,
    Stage,
    Table,
    Copy,
    Count,
}

impl StatementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatementKind::Namespace => "namespace_ddl",
            StatementKind::FileFormat => "file_format_ddl",
            StatementKind::Stage => "stage_ddl",
            StatementKind::Table => "table_ddl",
            StatementKind::Copy => "bulk_copy",
            StatementKind::Count => "row_count",
        }
    }
}

/// A statement issued against the warehouse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    CreateDatabase(Ident),
    UseDatabase(Ident),
    CreateSchema { database: Ident, schema: Ident },
    UseSchema { database: Ident, schema: Ident },
    CreateFileFormat(FileFormatSpec),
    CreateStage(StageSpec),
    CreateTable(TableSpec),
    CopyInto(LoadJob),
    CountRows(QualifiedName),
}

impl Statement {
    pub fn kind(&self) -> StatementKind {
        match self {
            Statement::CreateDatabase(_)
            | Statement::UseDatabase(_)
            | Statement::CreateSchema { .. }
            | Statement::UseSchema { .. } => StatementKind::Namespace,
            Statement::CreateFileFormat(_) => StatementKind::FileFormat,
            Statement::CreateStage(_) => StatementKind::Stage,
            Statement::CreateTable(_) => StatementKind::Table,
            Statement::CopyInto(_) => StatementKind::Copy,
            Statement::CountRows(_) => StatementKind::Count,
        }
    }

    /// Whether the statement changes the catalog or table contents.
    pub fn is_mutating(&self) -> bool {
        !matches!(
            self,
            Statement::UseDatabase(_) | Statement::UseSchema { .. } | Statement::CountRows(_)
        )
    }

    /// The object the statement acts on, for logs.
    pub fn target(&self) -> String {
        match self {
            Statement::CreateDatabase(db) | Statement::UseDatabase(db) => db.as_str().to_string(),
            Statement::CreateSchema { database, schema }
            | Statement::UseSchema { database, schema } => {
                format!("{}.{}", database.as_str(), schema.as_str())
            }
            Statement::CreateFileFormat(spec) => spec.name.display_name(),
            Statement::CreateStage(spec) => spec.name.display_name(),
            Statement::CreateTable(spec) => spec.name.display_name(),
            Statement::CopyInto(job) => job.table.display_name(),
            Statement::CountRows(table) => table.display_name(),
        }
    }

    /// Render in the Snowflake dialect.
    pub fn to_sql(&self) -> String {
        match self {
            Statement::CreateDatabase(db) => format!("CREATE DATABASE IF NOT EXISTS {db}"),
            Statement::UseDatabase(db) => format!("USE DATABASE {db}"),
            Statement::CreateSchema { database, schema } => {
                format!("CREATE SCHEMA IF NOT EXISTS {database}.{schema}")
            }
            Statement::UseSchema { database, schema } => {
                format!("USE SCHEMA {database}.{schema}")
            }
            Statement::CreateFileFormat(spec) => render_file_format(spec),
            Statement::CreateStage(spec) => render_stage(spec),
            Statement::CreateTable(spec) => render_table(spec),
            Statement::CopyInto(job) => render_copy(job),
            Statement::CountRows(table) => format!("SELECT COUNT(*) FROM {table}"),
        }
    }
}

fn render_file_format(spec: &FileFormatSpec) -> String {
    let mut sql = format!(
        "CREATE FILE FORMAT IF NOT EXISTS {} TYPE = 'CSV' FIELD_DELIMITER = {}",
        spec.name,
        quote_literal(&spec.field_delimiter.to_string())
    );
    if let Some(quote) = spec.quote {
        let _ = write!(
            sql,
            " FIELD_OPTIONALLY_ENCLOSED_BY = {}",
            quote_literal(&quote.to_string())
        );
    }
    let _ = write!(sql, " SKIP_HEADER = {}", spec.skip_header);
    if let Some(format) = &spec.date_format {
        let _ = write!(sql, " DATE_FORMAT = {}", quote_literal(format));
    }
    if let Some(format) = &spec.timestamp_format {
        let _ = write!(sql, " TIMESTAMP_FORMAT = {}", quote_literal(format));
    }
    if !spec.null_if.is_empty() {
        let values: Vec<String> = spec.null_if.iter().map(|v| quote_literal(v)).collect();
        let _ = write!(sql, " NULL_IF = ({})", values.join(", "));
    }
    sql
}

fn render_stage(spec: &StageSpec) -> String {
    let mut sql = format!(
        "CREATE STAGE IF NOT EXISTS {} URL = {}",
        spec.name,
        quote_literal(&spec.url)
    );
    if let Some(integration) = &spec.storage_integration {
        let _ = write!(
            sql,
            " STORAGE_INTEGRATION = {}",
            integration.to_external_sql()
        );
    }
    sql
}

fn render_table(spec: &TableSpec) -> String {
    let columns: Vec<String> = spec
        .columns
        .iter()
        .map(|column| format!("{} {}", column.name, column.ty))
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        spec.name,
        columns.join(", ")
    )
}

fn render_copy(job: &LoadJob) -> String {
    let columns: Vec<String> = job.columns.iter().map(Ident::to_string).collect();
    let fields: Vec<String> = (1..=job.columns.len()).map(|i| format!("${i}")).collect();
    format!(
        "COPY INTO {} ({}) FROM (SELECT {} FROM @{}/{}) FILE_FORMAT = (FORMAT_NAME = {}) ON_ERROR = 'CONTINUE' FORCE = TRUE",
        job.table,
        columns.join(", "),
        fields.join(", "),
        job.stage,
        job.file,
        job.file_format
    )
}
