//! In-process catalog: databases, schemas, formats, stages and table rows.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::WarehouseError;
use crate::model::{ColumnSpec, FileFormatSpec, StageSpec, TableSpec};
use crate::sql::{Ident, QualifiedName};

/// A stored cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Text(String),
    Integer(i64),
    Float(#[serde(with = "float")] f64),
    Boolean(bool),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

impl Value {
    /// Text rendering as returned in result sets.
    pub fn render(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Text(s) => Some(s.clone()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Boolean(b) => Some(b.to_string()),
            Value::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            Value::Timestamp(ts) => Some(ts.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
        }
    }
}

/// JSON has no NaN or infinity, so non-finite floats are stored as strings.
mod float {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else {
            serializer.serialize_str(&value.to_string())
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(value) => Ok(value),
            Repr::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// A table's declared columns and stored rows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<ColumnSpec>,
    pub rows: Vec<Vec<Value>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    pub file_formats: BTreeMap<String, FileFormatSpec>,
    pub stages: BTreeMap<String, StageSpec>,
    pub tables: BTreeMap<String, Table>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Database {
    pub schemas: BTreeMap<String, Schema>,
}

/// Whether a create statement made a new object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Created {
    New,
    Existing,
}

impl Created {
    /// The status line the warehouse reports for a create statement.
    pub fn message(&self, kind: &str, name: &str) -> String {
        match self {
            Created::New => format!("{kind} {name} successfully created."),
            Created::Existing => format!("{name} already exists, statement succeeded."),
        }
    }
}

/// Every object the embedded warehouse knows about.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    pub databases: BTreeMap<String, Database>,
}

impl Catalog {
    pub fn create_database(&mut self, name: &Ident) -> Created {
        if self.databases.contains_key(name.as_str()) {
            return Created::Existing;
        }
        self.databases
            .insert(name.as_str().to_string(), Database::default());
        Created::New
    }

    pub fn database(&self, name: &Ident) -> Result<&Database, WarehouseError> {
        self.databases
            .get(name.as_str())
            .ok_or_else(|| WarehouseError::does_not_exist("Database", name.as_str()))
    }

    pub fn create_schema(
        &mut self,
        database: &Ident,
        schema: &Ident,
    ) -> Result<Created, WarehouseError> {
        let db = self
            .databases
            .get_mut(database.as_str())
            .ok_or_else(|| WarehouseError::does_not_exist("Database", database.as_str()))?;

        if db.schemas.contains_key(schema.as_str()) {
            return Ok(Created::Existing);
        }
        db.schemas
            .insert(schema.as_str().to_string(), Schema::default());
        Ok(Created::New)
    }

    pub fn schema(&self, database: &Ident, schema: &Ident) -> Result<&Schema, WarehouseError> {
        self.database(database)?
            .schemas
            .get(schema.as_str())
            .ok_or_else(|| {
                WarehouseError::does_not_exist(
                    "Schema",
                    format!("{}.{}", database.as_str(), schema.as_str()),
                )
            })
    }

    fn schema_mut(
        &mut self,
        database: &Ident,
        schema: &Ident,
    ) -> Result<&mut Schema, WarehouseError> {
        let db = self
            .databases
            .get_mut(database.as_str())
            .ok_or_else(|| WarehouseError::does_not_exist("Database", database.as_str()))?;
        db.schemas.get_mut(schema.as_str()).ok_or_else(|| {
            WarehouseError::does_not_exist(
                "Schema",
                format!("{}.{}", database.as_str(), schema.as_str()),
            )
        })
    }

    pub fn create_file_format(&mut self, spec: &FileFormatSpec) -> Result<Created, WarehouseError> {
        let schema = self.schema_mut(&spec.name.database, &spec.name.schema)?;
        Ok(insert_if_absent(
            &mut schema.file_formats,
            &spec.name.name,
            || spec.clone(),
        ))
    }

    pub fn file_format(&self, name: &QualifiedName) -> Result<&FileFormatSpec, WarehouseError> {
        self.schema(&name.database, &name.schema)?
            .file_formats
            .get(name.name.as_str())
            .ok_or_else(|| WarehouseError::does_not_exist("File format", name.display_name()))
    }

    pub fn create_stage(&mut self, spec: &StageSpec) -> Result<Created, WarehouseError> {
        let schema = self.schema_mut(&spec.name.database, &spec.name.schema)?;
        Ok(insert_if_absent(&mut schema.stages, &spec.name.name, || {
            spec.clone()
        }))
    }

    pub fn stage(&self, name: &QualifiedName) -> Result<&StageSpec, WarehouseError> {
        self.schema(&name.database, &name.schema)?
            .stages
            .get(name.name.as_str())
            .ok_or_else(|| WarehouseError::does_not_exist("Stage", name.display_name()))
    }

    pub fn create_table(&mut self, spec: &TableSpec) -> Result<Created, WarehouseError> {
        let schema = self.schema_mut(&spec.name.database, &spec.name.schema)?;
        Ok(insert_if_absent(&mut schema.tables, &spec.name.name, || {
            Table {
                columns: spec.columns.clone(),
                rows: Vec::new(),
            }
        }))
    }

    pub fn table(&self, name: &QualifiedName) -> Result<&Table, WarehouseError> {
        self.schema(&name.database, &name.schema)?
            .tables
            .get(name.name.as_str())
            .ok_or_else(|| WarehouseError::does_not_exist("Table", name.display_name()))
    }

    pub fn table_mut(&mut self, name: &QualifiedName) -> Result<&mut Table, WarehouseError> {
        self.schema_mut(&name.database, &name.schema)?
            .tables
            .get_mut(name.name.as_str())
            .ok_or_else(|| WarehouseError::does_not_exist("Table", name.display_name()))
    }
}

fn insert_if_absent<T>(map: &mut BTreeMap<String, T>, name: &Ident, make: impl FnOnce() -> T) -> Created {
    if map.contains_key(name.as_str()) {
        return Created::Existing;
    }
    map.insert(name.as_str().to_string(), make());
    Created::New
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::ColumnType;

    fn ident(name: &str) -> Ident {
        Ident::new(name).unwrap()
    }

    fn qualified(name: &str) -> QualifiedName {
        QualifiedName::new(ident("ANALYTICS"), ident("RAW"), ident(name))
    }

    fn orders(columns: &[&str]) -> TableSpec {
        TableSpec {
            name: qualified("orders"),
            columns: columns
                .iter()
                .map(|name| ColumnSpec {
                    name: ident(name),
                    ty: ColumnType::Integer,
                })
                .collect(),
        }
    }

    #[test]
    fn test_create_is_idempotent() {
        let mut catalog = Catalog::default();
        assert_eq!(catalog.create_database(&ident("ANALYTICS")), Created::New);
        assert_eq!(catalog.create_database(&ident("ANALYTICS")), Created::Existing);
        assert_eq!(
            catalog
                .create_schema(&ident("ANALYTICS"), &ident("RAW"))
                .unwrap(),
            Created::New
        );

        assert_eq!(catalog.create_table(&orders(&["id"])).unwrap(), Created::New);
        catalog
            .table_mut(&qualified("orders"))
            .unwrap()
            .rows
            .push(vec![Value::Integer(1)]);

        // Re-creating with a different definition keeps the existing table and its rows.
        assert_eq!(
            catalog.create_table(&orders(&["id", "extra"])).unwrap(),
            Created::Existing
        );
        let table = catalog.table(&qualified("orders")).unwrap();
        assert_eq!(table.columns.len(), 1);
        assert_eq!(table.rows.len(), 1);
    }

    #[test]
    fn test_missing_objects_are_reported() {
        let mut catalog = Catalog::default();
        let err = catalog
            .create_schema(&ident("ANALYTICS"), &ident("RAW"))
            .unwrap_err();
        assert!(
            err.to_string()
                .contains("Database 'ANALYTICS' does not exist or not authorized.")
        );

        catalog.create_database(&ident("ANALYTICS"));
        let err = catalog.table(&qualified("orders")).unwrap_err();
        assert!(err.to_string().contains("Schema 'ANALYTICS.RAW'"));

        catalog
            .create_schema(&ident("ANALYTICS"), &ident("RAW"))
            .unwrap();
        let err = catalog.stage(&qualified("landing")).unwrap_err();
        assert!(err.to_string().contains("Stage 'ANALYTICS.RAW.landing'"));
    }

    #[test]
    fn test_value_rendering() {
        assert_eq!(Value::Null.render(), None);
        assert_eq!(Value::Float(2.5).render().as_deref(), Some("2.5"));
        let ts = NaiveDate::from_ymd_opt(2018, 1, 31)
            .unwrap()
            .and_hms_opt(22, 56, 0)
            .unwrap();
        assert_eq!(
            Value::Timestamp(ts).render().as_deref(),
            Some("2018-01-31 22:56:00")
        );
    }

    #[test]
    fn test_catalog_snapshot_roundtrip() {
        let mut catalog = Catalog::default();
        catalog.create_database(&ident("ANALYTICS"));
        catalog
            .create_schema(&ident("ANALYTICS"), &ident("RAW"))
            .unwrap();
        catalog.create_table(&orders(&["id"])).unwrap();
        catalog
            .table_mut(&qualified("orders"))
            .unwrap()
            .rows
            .push(vec![Value::Text("a".to_string())]);

        let json = serde_json::to_vec(&catalog).unwrap();
        let restored: Catalog = serde_json::from_slice(&json).unwrap();
        assert_eq!(
            restored.table(&qualified("orders")).unwrap().rows,
            vec![vec![Value::Text("a".to_string())]]
        );
    }
}
