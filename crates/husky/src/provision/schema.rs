//! Database, schema, file format and stage provisioning.

use snafu::prelude::*;
use tracing::{debug, info};

use crate::error::{FileFormatSnafu, NamespaceSnafu, ProvisioningError, StageSnafu};
use crate::model::{FileFormatSpec, Namespace, StageSpec};
use crate::sql::Statement;
use crate::warehouse::{Session, run_statement};

/// Create the database and schema if missing and make them current.
pub async fn ensure_namespace(
    session: &mut dyn Session,
    namespace: &Namespace,
) -> Result<(), ProvisioningError> {
    let statements = [
        Statement::CreateDatabase(namespace.database.clone()),
        Statement::UseDatabase(namespace.database.clone()),
        Statement::CreateSchema {
            database: namespace.database.clone(),
            schema: namespace.schema.clone(),
        },
        Statement::UseSchema {
            database: namespace.database.clone(),
            schema: namespace.schema.clone(),
        },
    ];

    for statement in &statements {
        let result = run_statement(session, statement)
            .await
            .context(NamespaceSnafu {
                namespace: namespace.to_string(),
            })?;
        if let Some(status) = result.scalar() {
            debug!(object = %statement.target(), "{status}");
        }
    }

    info!(namespace = %namespace, "Database and schema ready");
    Ok(())
}

/// Create a named file format if missing.
pub async fn ensure_file_format(
    session: &mut dyn Session,
    format: &FileFormatSpec,
) -> Result<(), ProvisioningError> {
    let name = format.name.display_name();
    run_statement(session, &Statement::CreateFileFormat(format.clone()))
        .await
        .context(FileFormatSnafu { name: name.as_str() })?;

    info!(file_format = %name, "File format ready");
    Ok(())
}

/// Create the external stage if missing.
pub async fn ensure_stage(
    session: &mut dyn Session,
    stage: &StageSpec,
) -> Result<(), ProvisioningError> {
    let name = stage.name.display_name();
    run_statement(session, &Statement::CreateStage(stage.clone()))
        .await
        .context(StageSnafu { name: name.as_str() })?;

    info!(stage = %name, url = %stage.url, "Stage ready");
    Ok(())
}
