//! Delimited-text parsing for `COPY INTO` on the embedded warehouse.
//!
//! Rows that fail to parse are skipped and counted, matching
//! `ON_ERROR = 'CONTINUE'`. The per-file report uses the same column names
//! the warehouse returns for a copy.

use csv::{ByteRecord, ReaderBuilder};

use super::catalog::Value;
use super::datetime;
use crate::error::WarehouseError;
use crate::model::{ColumnSpec, FileFormatSpec};
use crate::sql::{ColumnType, Ident};
use crate::warehouse::ResultSet;

/// Status returned when the named file is not in the stage.
pub const NO_FILES_PROCESSED: &str = "Copy executed with 0 files processed.";

const REPORT_COLUMNS: &[&str] = &[
    "file",
    "status",
    "rows_parsed",
    "rows_loaded",
    "error_limit",
    "errors_seen",
    "first_error",
    "first_error_line",
];

/// Outcome of copying one file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileLoad {
    pub file: String,
    pub rows: Vec<Vec<Value>>,
    pub rows_parsed: u64,
    pub errors_seen: u64,
    pub first_error: Option<String>,
    pub first_error_line: Option<u64>,
}

impl FileLoad {
    pub fn rows_loaded(&self) -> u64 {
        self.rows.len() as u64
    }

    pub fn status(&self) -> &'static str {
        if self.errors_seen == 0 {
            "LOADED"
        } else if self.rows.is_empty() {
            "LOAD_FAILED"
        } else {
            "PARTIALLY_LOADED"
        }
    }

    fn reject(&mut self, line: Option<u64>, message: String) {
        self.errors_seen += 1;
        if self.first_error.is_none() {
            self.first_error = Some(message);
            self.first_error_line = line;
        }
    }

    /// The copy report row set.
    pub fn into_result(self) -> (Vec<Vec<Value>>, ResultSet) {
        let row = vec![
            Some(self.file.clone()),
            Some(self.status().to_string()),
            Some(self.rows_parsed.to_string()),
            Some(self.rows_loaded().to_string()),
            Some(self.rows_parsed.to_string()),
            Some(self.errors_seen.to_string()),
            self.first_error.clone(),
            self.first_error_line.map(|line| line.to_string()),
        ];
        let result = ResultSet {
            columns: REPORT_COLUMNS.iter().map(|c| c.to_string()).collect(),
            rows: vec![row],
        };
        (self.rows, result)
    }
}

/// Map each source field to the index of the table column it is written to.
pub fn column_mapping(
    table_columns: &[ColumnSpec],
    job_columns: &[Ident],
) -> Result<Vec<usize>, WarehouseError> {
    job_columns
        .iter()
        .map(|name| {
            table_columns
                .iter()
                .position(|column| column.name == *name)
                .ok_or_else(|| WarehouseError::Statement {
                    code: "000904".to_string(),
                    sql_state: "42000".to_string(),
                    message: format!("SQL compilation error: error line 1 at position 0\ninvalid identifier '{name}'"),
                })
        })
        .collect()
}

/// Compiled file format.
struct Parser<'a> {
    format: &'a FileFormatSpec,
    date_format: Option<String>,
    timestamp_format: Option<String>,
}

impl<'a> Parser<'a> {
    fn new(format: &'a FileFormatSpec) -> Self {
        Self {
            format,
            date_format: format.date_format.as_deref().and_then(datetime::translate),
            timestamp_format: format
                .timestamp_format
                .as_deref()
                .and_then(datetime::translate),
        }
    }

    fn convert(&self, raw: &str, ty: &ColumnType) -> Result<Value, String> {
        if raw.is_empty() || self.format.null_if.iter().any(|null| null == raw) {
            return Ok(Value::Null);
        }

        match ty {
            ColumnType::Varchar(limit) => {
                if let Some(limit) = limit {
                    let len = raw.chars().count();
                    if len > *limit as usize {
                        return Err(format!(
                            "String '{raw}' is too long and would be truncated"
                        ));
                    }
                }
                Ok(Value::Text(raw.to_string()))
            }
            ColumnType::Integer => {
                let trimmed = raw.trim();
                if let Ok(i) = trimmed.parse::<i64>() {
                    return Ok(Value::Integer(i));
                }
                match trimmed.parse::<f64>() {
                    Ok(f) if f.is_finite() && f.abs() < i64::MAX as f64 => {
                        Ok(Value::Integer(f.round() as i64))
                    }
                    _ => Err(format!("Numeric value '{raw}' is not recognized")),
                }
            }
            ColumnType::Float => match raw.trim().parse::<f64>() {
                Ok(f) => Ok(Value::Float(f)),
                Err(_) => Err(format!("Numeric value '{raw}' is not recognized")),
            },
            ColumnType::Boolean => parse_bool(raw)
                .map(Value::Boolean)
                .ok_or_else(|| format!("Boolean value '{raw}' is not recognized")),
            ColumnType::Date => datetime::parse_date(raw, self.date_format.as_deref())
                .map(Value::Date)
                .ok_or_else(|| format!("Date '{raw}' is not recognized")),
            ColumnType::Timestamp => {
                datetime::parse_timestamp(raw, self.timestamp_format.as_deref())
                    .map(Value::Timestamp)
                    .ok_or_else(|| format!("Timestamp '{raw}' is not recognized"))
            }
        }
    }

    fn row(
        &self,
        record: &ByteRecord,
        table_columns: &[ColumnSpec],
        mapping: &[usize],
    ) -> Result<Vec<Value>, String> {
        if record.len() != mapping.len() {
            return Err(format!(
                "Number of columns in file ({}) does not match that of the corresponding table ({})",
                record.len(),
                mapping.len()
            ));
        }

        let mut row = vec![Value::Null; table_columns.len()];
        for (field, &index) in record.iter().zip(mapping) {
            let raw = String::from_utf8_lossy(field);
            let column = &table_columns[index];
            row[index] = self
                .convert(&raw, &column.ty)
                .map_err(|e| format!("{e} (column {})", column.name.as_str()))?;
        }
        Ok(row)
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "on" | "1" => Some(true),
        "false" | "f" | "no" | "n" | "off" | "0" => Some(false),
        _ => None,
    }
}

fn ascii(c: char, option: &str) -> Result<u8, WarehouseError> {
    u8::try_from(c)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| WarehouseError::Statement {
            code: "002019".to_string(),
            sql_state: "0A000".to_string(),
            message: format!("Unsupported {option} '{c}', only single-byte characters are allowed"),
        })
}

/// Parse a staged file into table rows.
pub fn parse_file(
    file: &str,
    data: &[u8],
    format: &FileFormatSpec,
    table_columns: &[ColumnSpec],
    mapping: &[usize],
) -> Result<FileLoad, WarehouseError> {
    let mut builder = ReaderBuilder::new();
    builder
        .has_headers(false)
        .flexible(true)
        .delimiter(ascii(format.field_delimiter, "FIELD_DELIMITER")?);
    match format.quote {
        Some(quote) => {
            builder.quote(ascii(quote, "FIELD_OPTIONALLY_ENCLOSED_BY")?);
        }
        None => {
            builder.quoting(false);
        }
    }

    let parser = Parser::new(format);
    let mut load = FileLoad {
        file: file.to_string(),
        ..Default::default()
    };

    let mut reader = builder.from_reader(data);
    let mut record = ByteRecord::new();
    let mut skipped = 0u32;
    loop {
        match reader.read_byte_record(&mut record) {
            Ok(false) => break,
            Ok(true) => {}
            Err(e) => {
                load.rows_parsed += 1;
                let line = e.position().map(|p| p.line());
                load.reject(line, e.to_string());
                continue;
            }
        }

        if skipped < format.skip_header {
            skipped += 1;
            continue;
        }

        load.rows_parsed += 1;
        let line = record.position().map(|p| p.line());
        match parser.row(&record, table_columns, mapping) {
            Ok(row) => load.rows.push(row),
            Err(message) => load.reject(line, message),
        }
    }

    Ok(load)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::QualifiedName;

    fn ident(name: &str) -> Ident {
        Ident::new(name).unwrap()
    }

    fn format() -> FileFormatSpec {
        FileFormatSpec {
            name: QualifiedName::new(ident("ANALYTICS"), ident("RAW"), ident("csv")),
            field_delimiter: ',',
            quote: Some('"'),
            skip_header: 1,
            date_format: Some("YYYY-MM-DD".to_string()),
            timestamp_format: Some("MM/DD/YYYY HH24:MI".to_string()),
            null_if: vec!["\\N".to_string()],
        }
    }

    fn columns() -> Vec<ColumnSpec> {
        [
            ("id", ColumnType::Integer),
            ("customer", ColumnType::Varchar(Some(8))),
            ("amount", ColumnType::Float),
            ("shipped", ColumnType::Date),
            ("ordered_at", ColumnType::Timestamp),
        ]
        .into_iter()
        .map(|(name, ty)| ColumnSpec {
            name: ident(name),
            ty,
        })
        .collect()
    }

    fn identity(n: usize) -> Vec<usize> {
        (0..n).collect()
    }

    #[test]
    fn test_parse_valid_rows_and_reject_malformed() {
        let data = b"id,customer,amount,shipped,ordered_at\n\
1,alice,10.5,2017-09-12,1/31/2018 22:56\n\
2,\"bob, jr\",3,2017-09-13,2/01/2018 08:00\n\
3,\\N,,2017-09-14,2/02/2018 09:30\n\
not-a-number,dave,1,2017-09-15,2/03/2018 10:00\n";

        let load = parse_file("orders.csv", data, &format(), &columns(), &identity(5)).unwrap();
        assert_eq!(load.rows_parsed, 4);
        assert_eq!(load.rows_loaded(), 3);
        assert_eq!(load.errors_seen, 1);
        assert_eq!(load.status(), "PARTIALLY_LOADED");
        assert_eq!(load.first_error_line, Some(5));
        assert!(
            load.first_error
                .as_deref()
                .unwrap()
                .contains("Numeric value 'not-a-number' is not recognized")
        );

        assert_eq!(load.rows[1][1], Value::Text("bob, jr".to_string()));
        assert_eq!(load.rows[2][1], Value::Null);
        assert_eq!(load.rows[2][2], Value::Null);
        assert_eq!(
            load.rows[0][4].render().as_deref(),
            Some("2018-01-31 22:56:00")
        );
    }

    #[test]
    fn test_field_count_mismatch_is_rejected() {
        let data = b"header\n1,alice,10.5,2017-09-12,1/31/2018 22:56\n2,bob\n";
        let load = parse_file("orders.csv", data, &format(), &columns(), &identity(5)).unwrap();
        assert_eq!(load.rows_loaded(), 1);
        assert_eq!(load.errors_seen, 1);
        assert!(
            load.first_error
                .as_deref()
                .unwrap()
                .starts_with("Number of columns in file (2)")
        );
    }

    #[test]
    fn test_varchar_length_is_enforced() {
        let data = b"header\n1,a-very-long-name,1,2017-09-12,1/31/2018 22:56\n";
        let load = parse_file("orders.csv", data, &format(), &columns(), &identity(5)).unwrap();
        assert_eq!(load.status(), "LOAD_FAILED");
        assert!(load.first_error.unwrap().contains("too long"));
    }

    #[test]
    fn test_mapping_places_fields_by_job_order() {
        let table = columns();
        let mapping = column_mapping(&table, &[ident("customer"), ident("id")]).unwrap();
        assert_eq!(mapping, vec![1, 0]);

        let mut format = format();
        format.skip_header = 0;
        let load = parse_file("x.csv", b"carol,7\n", &format, &table, &mapping).unwrap();
        assert_eq!(load.rows[0][0], Value::Integer(7));
        assert_eq!(load.rows[0][1], Value::Text("carol".to_string()));
        assert_eq!(load.rows[0][2], Value::Null);

        let err = column_mapping(&table, &[ident("missing")]).unwrap_err();
        assert!(err.to_string().contains("invalid identifier"));
    }

    #[test]
    fn test_report_shape() {
        let data = b"header\n1,alice,10.5,2017-09-12,1/31/2018 22:56\n";
        let load = parse_file("orders.csv", data, &format(), &columns(), &identity(5)).unwrap();
        let (rows, result) = load.into_result();
        assert_eq!(rows.len(), 1);
        assert_eq!(result.column_values("status"), vec![Some("LOADED")]);
        assert_eq!(result.column_values("rows_loaded"), vec![Some("1")]);
        assert_eq!(result.column_values("errors_seen"), vec![Some("0")]);
        assert_eq!(result.column_values("first_error"), vec![None]);
    }

    #[test]
    fn test_booleans_and_integers() {
        assert_eq!(parse_bool("Yes"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);

        let format = format();
        let parser = Parser::new(&format);
        assert_eq!(
            parser.convert("2.6", &ColumnType::Integer),
            Ok(Value::Integer(3))
        );
        assert!(parser.convert("abc", &ColumnType::Float).is_err());
    }
}
