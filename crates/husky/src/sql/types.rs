//! Semantic column types.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::error::IdentError;

static VARCHAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:VARCHAR|STRING|TEXT|CHAR|CHARACTER)\s*(?:\(\s*(\d+)\s*\))?$")
        .expect("Invalid varchar pattern")
});

/// A destination column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ColumnType {
    /// Text with an optional maximum length in characters.
    Varchar(Option<u32>),
    Integer,
    Float,
    Boolean,
    Date,
    /// Timestamp without time zone.
    Timestamp,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Varchar(Some(len)) => write!(f, "VARCHAR({len})"),
            ColumnType::Varchar(None) => f.write_str("VARCHAR"),
            ColumnType::Integer => f.write_str("INT"),
            ColumnType::Float => f.write_str("FLOAT"),
            ColumnType::Boolean => f.write_str("BOOLEAN"),
            ColumnType::Date => f.write_str("DATE"),
            ColumnType::Timestamp => f.write_str("TIMESTAMP_NTZ"),
        }
    }
}

impl FromStr for ColumnType {
    type Err = IdentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();

        if let Some(caps) = VARCHAR.captures(&normalized) {
            let len = match caps.get(1) {
                Some(m) => Some(m.as_str().parse::<u32>().map_err(|_| {
                    IdentError::ColumnType {
                        value: s.to_string(),
                    }
                })?),
                None => None,
            };
            return Ok(ColumnType::Varchar(len));
        }

        match normalized.as_str() {
            "INT" | "INTEGER" | "BIGINT" | "SMALLINT" | "NUMBER" => Ok(ColumnType::Integer),
            "FLOAT" | "DOUBLE" | "REAL" | "DOUBLE PRECISION" => Ok(ColumnType::Float),
            "BOOLEAN" | "BOOL" => Ok(ColumnType::Boolean),
            "DATE" => Ok(ColumnType::Date),
            "TIMESTAMP" | "TIMESTAMP_NTZ" | "DATETIME" => Ok(ColumnType::Timestamp),
            _ => Err(IdentError::ColumnType {
                value: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for ColumnType {
    type Error = IdentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ColumnType> for String {
    fn from(value: ColumnType) -> Self {
        value.to_string()
    }
}
