//! husky-core: shared plumbing for the husky loader.
//!
//! - `storage/` - blob store client over S3, GCS and the local filesystem
//! - `metrics/` - `InternalEvent` trait and the `emit!` macro
//! - `config/` - YAML loading with environment variable interpolation
//! - `signal` - signal handling for graceful shutdown
//! - `tracing` - subscriber setup
//! - `error` - storage and configuration errors

pub mod config;
pub mod error;
pub mod metrics;
pub mod signal;
pub mod storage;
pub mod tracing;

pub use error::{ConfigError, StorageError};
pub use signal::shutdown_signal;
pub use storage::{BackendConfig, StorageProvider, StorageProviderRef};
pub use self::tracing::{LogFormat, init_tracing};
