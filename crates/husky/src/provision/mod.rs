//! Catalog provisioning.
//!
//! Every step is an `IF NOT EXISTS` create, so provisioning a catalog that
//! already holds the objects changes nothing. Existing tables keep their
//! definition and rows.

mod schema;
mod table;

pub use schema::{ensure_file_format, ensure_namespace, ensure_stage};
pub use table::ensure_table;

use tracing::info;

use crate::error::ProvisioningError;
use crate::plan::LoadPlan;
use crate::warehouse::Session;

/// Ensure the namespace, file formats, stage and tables of a plan exist.
pub async fn provision(session: &mut dyn Session, plan: &LoadPlan) -> Result<(), ProvisioningError> {
    ensure_namespace(session, &plan.namespace).await?;
    for format in &plan.file_formats {
        ensure_file_format(session, format).await?;
    }
    ensure_stage(session, &plan.stage).await?;
    for table in &plan.tables {
        ensure_table(session, table).await?;
    }

    info!(
        namespace = %plan.namespace,
        file_formats = plan.file_formats.len(),
        tables = plan.tables.len(),
        "Provisioned catalog objects"
    );
    Ok(())
}
