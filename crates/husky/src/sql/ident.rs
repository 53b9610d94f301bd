//! Identifiers and literals.

use regex::Regex;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::fmt;
use std::sync::LazyLock;

use crate::error::{
    ControlCharacterSnafu, EmptySnafu, IdentError, StagePathSnafu, TooLongSnafu,
};

/// Longest identifier the warehouse accepts.
pub const MAX_IDENT_LEN: usize = 255;

static STAGE_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_\-./=]+$").expect("Invalid stage path pattern"));

static SIMPLE_IDENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]*$").expect("Invalid identifier pattern"));

/// A validated object or column name.
///
/// Rendered double-quoted with embedded quotes doubled, so the name is used
/// exactly as written.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ident(String);

impl Ident {
    pub fn new(name: impl Into<String>) -> Result<Self, IdentError> {
        let name = name.into();
        ensure!(!name.is_empty(), EmptySnafu);

        let len = name.chars().count();
        ensure!(
            len <= MAX_IDENT_LEN,
            TooLongSnafu {
                name: name.clone(),
                len,
                max: MAX_IDENT_LEN,
            }
        );
        ensure!(
            !name.chars().any(char::is_control),
            ControlCharacterSnafu { name: name.clone() }
        );

        Ok(Self(name))
    }

    /// The raw name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Rendered for a reference to an object created outside this tool.
    ///
    /// Simple names stay unquoted so the warehouse resolves them the same way
    /// it did when they were created; anything else is quoted.
    pub fn to_external_sql(&self) -> String {
        if SIMPLE_IDENT.is_match(&self.0) {
            self.0.clone()
        } else {
            self.to_string()
        }
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self.0.replace('"', "\"\""))
    }
}

impl TryFrom<String> for Ident {
    type Error = IdentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Ident> for String {
    fn from(value: Ident) -> Self {
        value.0
    }
}

/// A database-qualified object name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualifiedName {
    pub database: Ident,
    pub schema: Ident,
    pub name: Ident,
}

impl QualifiedName {
    pub fn new(database: Ident, schema: Ident, name: Ident) -> Self {
        Self {
            database,
            schema,
            name,
        }
    }

    /// Unquoted dotted form for logs and reports.
    pub fn display_name(&self) -> String {
        format!(
            "{}.{}.{}",
            self.database.as_str(),
            self.schema.as_str(),
            self.name.as_str()
        )
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.database, self.schema, self.name)
    }
}

/// A path relative to a stage root, e.g. `orders/orders.csv`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StagePath(String);

impl StagePath {
    pub fn new(path: impl Into<String>) -> Result<Self, IdentError> {
        let path = path.into();
        let trimmed = path.trim_start_matches('/');
        ensure!(
            STAGE_PATH.is_match(trimmed) && !trimmed.split('/').any(|part| part == ".."),
            StagePathSnafu { path: path.clone() }
        );
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StagePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for StagePath {
    type Error = IdentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<StagePath> for String {
    fn from(value: StagePath) -> Self {
        value.0
    }
}

/// Render a single-quoted string literal.
pub fn quote_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\'' => out.push_str("''"),
            '\\' => out.push_str("\\\\"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}
