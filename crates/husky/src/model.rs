//! Catalog objects and load jobs.
//!
//! These are the validated, warehouse-facing forms of the configuration.
//! They are built once by [`crate::plan::LoadPlan`] and never change during a
//! run.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::sql::{ColumnType, Ident, QualifiedName, StagePath};

/// Target database and schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    pub database: Ident,
    pub schema: Ident,
}

impl Namespace {
    /// Qualify an object name with this namespace.
    pub fn qualify(&self, name: Ident) -> QualifiedName {
        QualifiedName::new(self.database.clone(), self.schema.clone(), name)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database.as_str(), self.schema.as_str())
    }
}

/// A named delimited-text file format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFormatSpec {
    pub name: QualifiedName,
    pub field_delimiter: char,
    /// Character that optionally encloses fields.
    pub quote: Option<char>,
    /// Leading lines skipped in every file.
    pub skip_header: u32,
    /// Snowflake-style pattern, e.g. `MM/DD/YYYY HH24:MI`.
    pub date_format: Option<String>,
    pub timestamp_format: Option<String>,
    /// Field values loaded as NULL.
    pub null_if: Vec<String>,
}

/// An external stage pointing at the bucket prefix holding the files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSpec {
    pub name: QualifiedName,
    /// Storage URL, e.g. `s3://bucket/processed/`.
    pub url: String,
    pub storage_integration: Option<Ident>,
}

/// A destination column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: Ident,
    #[serde(rename = "type")]
    pub ty: ColumnType,
}

/// A destination table and its ordered columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    pub name: QualifiedName,
    pub columns: Vec<ColumnSpec>,
}

/// One staged file copied into one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadJob {
    pub table: QualifiedName,
    pub stage: QualifiedName,
    pub file: StagePath,
    pub file_format: QualifiedName,
    /// Source field `i` is written to `columns[i]`.
    pub columns: Vec<Ident>,
}

impl LoadJob {
    /// Build a job whose column list is the table's declared column order.
    pub fn for_table(
        table: &TableSpec,
        stage: QualifiedName,
        file: StagePath,
        file_format: QualifiedName,
    ) -> Self {
        Self {
            table: table.name.clone(),
            stage,
            file,
            file_format,
            columns: table.columns.iter().map(|c| c.name.clone()).collect(),
        }
    }

    /// Human readable source location.
    pub fn location(&self) -> String {
        format!("@{}/{}", self.stage.display_name(), self.file)
    }
}
