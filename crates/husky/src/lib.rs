//! husky: warehouse ingestion orchestrator.
//!
//! This crate handles:
//! - Provisioning the target database, schema, file formats, stage and tables
//! - Bulk-loading staged files into typed tables, skipping malformed rows
//! - Reconciling loaded-row counts against table totals
//! - Staging local dataset files into the bucket

pub mod cli;
pub mod config;
pub mod dataset;
pub mod error;
pub mod load;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod plan;
pub mod provision;
pub mod reconcile;
pub mod sql;
pub mod warehouse;

// Re-export commonly used items
pub use cli::{CliArgs, Command};
pub use config::Config;
pub use error::RunError;
pub use pipeline::{Orchestrator, RunPhase, reject_config, run, run_config};
pub use plan::LoadPlan;
pub use reconcile::{RunReport, TableReport};
pub use warehouse::{LocalWarehouse, ResultSet, Session, SnowflakeWarehouse, Warehouse};

// Re-export from husky-core
pub use husky_core::{
    LogFormat, StorageProvider, StorageProviderRef, init_tracing, shutdown_signal,
};
