//! Warehouse connections.
//!
//! This module defines the `Warehouse` and `Session` traits that the
//! provisioners, the bulk loader and the reporter talk to. Two
//! implementations ship with the crate: [`SnowflakeWarehouse`] (SQL API over
//! HTTPS) and [`LocalWarehouse`] (an embedded engine reading staged files
//! through the blob store client).

pub mod local;
pub mod snowflake;

pub use local::LocalWarehouse;
pub use snowflake::SnowflakeWarehouse;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::config::ConnectionConfig;
use crate::emit;
use crate::error::WarehouseError;
use crate::metrics::events::{RequestStatus, StatementDuration, StatementExecuted};
use crate::sql::Statement;

/// Tabular statement result. Every cell is the warehouse's text rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl ResultSet {
    /// A single status row, the shape DDL statements return.
    pub fn status(message: impl Into<String>) -> Self {
        Self {
            columns: vec!["status".to_string()],
            rows: vec![vec![Some(message.into())]],
        }
    }

    /// Index of a column, matched case-insensitively.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|column| column.eq_ignore_ascii_case(name))
    }

    /// All cells of a column, in row order.
    pub fn column_values(&self, name: &str) -> Vec<Option<&str>> {
        let index = self.column_index(name);
        self.rows
            .iter()
            .map(|row| {
                index
                    .and_then(|i| row.get(i))
                    .and_then(|cell| cell.as_deref())
            })
            .collect()
    }

    /// First cell of the first row.
    pub fn scalar(&self) -> Option<&str> {
        self.rows.first()?.first()?.as_deref()
    }
}

/// An open connection. Exclusively owned by one run.
#[async_trait]
pub trait Session: Send {
    /// Execute one statement and return its result.
    async fn execute(&mut self, statement: &Statement) -> Result<ResultSet, WarehouseError>;

    /// Release the connection.
    async fn close(self: Box<Self>) -> Result<(), WarehouseError>;
}

/// Something that can open sessions.
#[async_trait]
pub trait Warehouse: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Session>, WarehouseError>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

/// Execute a statement with logging and metrics.
pub async fn run_statement(
    session: &mut dyn Session,
    statement: &Statement,
) -> Result<ResultSet, WarehouseError> {
    let kind = statement.kind().as_str();
    debug!(kind, object = %statement.target(), sql = %statement.to_sql(), "Executing statement");

    let start = Instant::now();
    let result = session.execute(statement).await;

    let status = match &result {
        Ok(_) => RequestStatus::Success,
        Err(e) => {
            debug!(kind, object = %statement.target(), error = %e, "Statement failed");
            RequestStatus::Error
        }
    };
    emit!(StatementExecuted { kind, status });
    emit!(StatementDuration {
        kind,
        duration: start.elapsed(),
    });

    result
}

/// Build the warehouse named by the connection settings.
pub async fn from_config(
    connection: &ConnectionConfig,
) -> Result<Arc<dyn Warehouse>, WarehouseError> {
    match connection {
        ConnectionConfig::Snowflake(config) => {
            Ok(Arc::new(SnowflakeWarehouse::new(config.clone())?))
        }
        ConnectionConfig::Local(config) => Ok(Arc::new(LocalWarehouse::open(config).await?)),
    }
}
