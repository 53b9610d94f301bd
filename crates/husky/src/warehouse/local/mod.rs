//! Embedded warehouse.
//!
//! Executes [`Statement`] values against an in-process catalog and reads
//! staged files through the blob store client, so a full run can be exercised
//! without a Snowflake account. When a state URL is configured, the catalog
//! is written back after every mutating statement and reloaded on open.

mod catalog;
mod copy;
mod datetime;

pub use catalog::{Catalog, Table, Value};

use async_trait::async_trait;
use husky_core::storage::{StorageProvider, StorageProviderRef};
use object_store::path::Path;
use snafu::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{ResultSet, Session, Warehouse};
use crate::config::LocalWarehouseConfig;
use crate::error::{SnapshotSnafu, StagedFileSnafu, StorageSnafu, WarehouseError};
use crate::model::LoadJob;
use crate::sql::{Ident, QualifiedName, Statement};

const SNAPSHOT_FILE: &str = "catalog.json";

/// Where the catalog is persisted.
#[derive(Debug, Clone)]
struct Snapshot {
    storage: StorageProviderRef,
    path: Path,
}

impl Snapshot {
    async fn load(&self) -> Result<Catalog, WarehouseError> {
        match self.storage.get(self.path.clone()).await {
            Ok(bytes) => serde_json::from_slice(&bytes).context(SnapshotSnafu),
            Err(e) if e.is_not_found() => Ok(Catalog::default()),
            Err(source) => Err(WarehouseError::Storage { source }),
        }
    }

    async fn save(&self, catalog: &Catalog) -> Result<(), WarehouseError> {
        let content = serde_json::to_vec(catalog).context(SnapshotSnafu)?;
        self.storage
            .atomic_write(&self.path, content)
            .await
            .context(StorageSnafu)
    }
}

/// In-process warehouse. Cloning shares the catalog.
#[derive(Debug, Clone, Default)]
pub struct LocalWarehouse {
    catalog: Arc<Mutex<Catalog>>,
    snapshot: Option<Snapshot>,
    storage_options: HashMap<String, String>,
    sessions: Arc<AtomicUsize>,
}

impl LocalWarehouse {
    /// A warehouse whose catalog lives only in memory.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Options passed to the blob store client when reading stages.
    pub fn with_storage_options(mut self, options: HashMap<String, String>) -> Self {
        self.storage_options = options;
        self
    }

    /// Open the warehouse described by the settings, loading any persisted catalog.
    pub async fn open(config: &LocalWarehouseConfig) -> Result<Self, WarehouseError> {
        let warehouse = Self::in_memory().with_storage_options(config.storage_options.clone());
        let Some(url) = &config.state_url else {
            return Ok(warehouse);
        };

        let storage = StorageProvider::for_url_with_options(url, config.storage_options.clone())
            .await
            .context(StorageSnafu)?;
        let snapshot = Snapshot {
            storage: Arc::new(storage),
            path: Path::from(SNAPSHOT_FILE),
        };
        let catalog = snapshot.load().await?;
        info!(
            "Opened local warehouse at {} with {} database(s)",
            snapshot.storage.canonical_url(),
            catalog.databases.len()
        );

        Ok(Self {
            catalog: Arc::new(Mutex::new(catalog)),
            snapshot: Some(snapshot),
            ..warehouse
        })
    }

    /// Number of sessions currently open.
    pub fn active_sessions(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }

    /// Stored rows of a table, in insertion order.
    pub async fn table_rows(&self, table: &QualifiedName) -> Result<Vec<Vec<Value>>, WarehouseError> {
        let catalog = self.catalog.lock().await;
        Ok(catalog.table(table)?.rows.clone())
    }
}

#[async_trait]
impl Warehouse for LocalWarehouse {
    async fn connect(&self) -> Result<Box<dyn Session>, WarehouseError> {
        self.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(LocalSession {
            warehouse: self.clone(),
            _guard: SessionGuard(self.sessions.clone()),
            database: None,
            schema: None,
        }))
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

/// Decrements the open session count when a session goes away, closed or not.
#[derive(Debug)]
struct SessionGuard(Arc<AtomicUsize>);

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug)]
struct LocalSession {
    warehouse: LocalWarehouse,
    _guard: SessionGuard,
    database: Option<Ident>,
    schema: Option<Ident>,
}

impl LocalSession {
    async fn copy(&self, catalog: &mut Catalog, job: &LoadJob) -> Result<ResultSet, WarehouseError> {
        let table = catalog.table(&job.table)?;
        let columns = table.columns.clone();
        let mapping = copy::column_mapping(&columns, &job.columns)?;
        let format = catalog.file_format(&job.file_format)?.clone();
        let stage_url = catalog.stage(&job.stage)?.url.clone();

        let storage = StorageProvider::for_url_with_options(
            &stage_url,
            self.warehouse.storage_options.clone(),
        )
        .await
        .context(StorageSnafu)?;

        let data = match storage.get(job.file.as_str()).await {
            Ok(data) => data,
            Err(e) if e.is_not_found() => {
                warn!(location = %job.location(), "Staged file not found, nothing to copy");
                return Ok(ResultSet::status(copy::NO_FILES_PROCESSED));
            }
            Err(source) => {
                return Err(source).context(StagedFileSnafu {
                    location: job.location(),
                });
            }
        };

        let load = copy::parse_file(job.file.as_str(), &data, &format, &columns, &mapping)?;
        debug!(
            table = %job.table.display_name(),
            parsed = load.rows_parsed,
            loaded = load.rows_loaded(),
            errors = load.errors_seen,
            "Parsed staged file"
        );

        let (rows, result) = load.into_result();
        catalog.table_mut(&job.table)?.rows.extend(rows);
        Ok(result)
    }

    async fn apply(
        &mut self,
        catalog: &mut Catalog,
        statement: &Statement,
    ) -> Result<ResultSet, WarehouseError> {
        let result = match statement {
            Statement::CreateDatabase(db) => {
                ResultSet::status(catalog.create_database(db).message("Database", db.as_str()))
            }
            Statement::UseDatabase(db) => {
                catalog.database(db)?;
                self.database = Some(db.clone());
                self.schema = None;
                ResultSet::status("Statement executed successfully.")
            }
            Statement::CreateSchema { database, schema } => ResultSet::status(
                catalog
                    .create_schema(database, schema)?
                    .message("Schema", schema.as_str()),
            ),
            Statement::UseSchema { database, schema } => {
                catalog.schema(database, schema)?;
                self.database = Some(database.clone());
                self.schema = Some(schema.clone());
                ResultSet::status("Statement executed successfully.")
            }
            Statement::CreateFileFormat(spec) => ResultSet::status(
                catalog
                    .create_file_format(spec)?
                    .message("File format", spec.name.name.as_str()),
            ),
            Statement::CreateStage(spec) => ResultSet::status(
                catalog
                    .create_stage(spec)?
                    .message("Stage area", spec.name.name.as_str()),
            ),
            Statement::CreateTable(spec) => ResultSet::status(
                catalog
                    .create_table(spec)?
                    .message("Table", spec.name.name.as_str()),
            ),
            Statement::CopyInto(job) => self.copy(catalog, job).await?,
            Statement::CountRows(table) => {
                let count = catalog.table(table)?.rows.len();
                ResultSet {
                    columns: vec!["COUNT(*)".to_string()],
                    rows: vec![vec![Some(count.to_string())]],
                }
            }
        };
        Ok(result)
    }
}

#[async_trait]
impl Session for LocalSession {
    async fn execute(&mut self, statement: &Statement) -> Result<ResultSet, WarehouseError> {
        let warehouse = self.warehouse.clone();
        let mut catalog = warehouse.catalog.lock().await;

        let snapshot = match &warehouse.snapshot {
            Some(snapshot) if statement.is_mutating() => snapshot,
            _ => return self.apply(&mut catalog, statement).await,
        };

        // The shared catalog only changes once the snapshot holds the change.
        let mut staged = catalog.clone();
        let result = self.apply(&mut staged, statement).await?;
        snapshot.save(&staged).await?;
        *catalog = staged;
        Ok(result)
    }

    async fn close(self: Box<Self>) -> Result<(), WarehouseError> {
        debug!(
            database = ?self.database.as_ref().map(Ident::as_str),
            schema = ?self.schema.as_ref().map(Ident::as_str),
            "Closing local session"
        );
        Ok(())
    }
}
