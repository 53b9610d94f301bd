//! Destination table provisioning.

use snafu::prelude::*;
use tracing::info;

use crate::error::{ProvisioningError, TableSnafu};
use crate::model::TableSpec;
use crate::sql::Statement;
use crate::warehouse::{Session, run_statement};

/// Create a table with its declared columns if missing.
///
/// An existing table is left as it is, even when its columns differ.
pub async fn ensure_table(
    session: &mut dyn Session,
    table: &TableSpec,
) -> Result<(), ProvisioningError> {
    let name = table.name.display_name();
    run_statement(session, &Statement::CreateTable(table.clone()))
        .await
        .context(TableSnafu { table: name.as_str() })?;

    info!(table = %name, columns = table.columns.len(), "Table ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ColumnSpec, Namespace};
    use crate::provision::ensure_namespace;
    use crate::sql::{ColumnType, Ident};
    use crate::warehouse::{LocalWarehouse, Warehouse};

    fn ident(name: &str) -> Ident {
        Ident::new(name).unwrap()
    }

    #[tokio::test]
    async fn test_table_without_namespace_fails() {
        let warehouse = LocalWarehouse::in_memory();
        let mut session = warehouse.connect().await.unwrap();
        let namespace = Namespace {
            database: ident("ANALYTICS"),
            schema: ident("RAW"),
        };
        let table = TableSpec {
            name: namespace.qualify(ident("orders")),
            columns: vec![ColumnSpec {
                name: ident("id"),
                ty: ColumnType::Integer,
            }],
        };

        let err = ensure_table(session.as_mut(), &table).await.unwrap_err();
        assert!(err.to_string().contains("Failed to create table ANALYTICS.RAW.orders"));

        ensure_namespace(session.as_mut(), &namespace).await.unwrap();
        ensure_table(session.as_mut(), &table).await.unwrap();
        ensure_table(session.as_mut(), &table).await.unwrap();
    }
}
