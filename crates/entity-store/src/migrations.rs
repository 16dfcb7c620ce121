//! SurrealDB table initialization
//!
//! One table per declared entity type, each with a unique index on
//! `entity_id` so a record id can never be stored twice.

use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::StateError;
use crate::schema::StoreSchema;
use crate::Result;

/// Define a table for every entity type in `schema`.
///
/// Safe to call multiple times (idempotent).
pub async fn init_schema(db: &Surreal<Any>, schema: &StoreSchema) -> Result<()> {
    info!("Initializing entity tables");

    for entity_type in schema.entity_types() {
        init_entity_table(db, entity_type).await?;
    }

    info!("Entity schema initialization complete");
    Ok(())
}

/// Schema:
/// ```text
/// TABLE <entity_type> {
///   entity_id:     STRING (unique)
///   attributes:    OBJECT (name -> tagged value)
///   relationships: OBJECT (name -> link)
/// }
/// ```
///
/// Entity type names are validated identifiers (see `StoreSchemaBuilder`),
/// which is what makes interpolating them here sound.
async fn init_entity_table(db: &Surreal<Any>, entity_type: &str) -> Result<()> {
    debug!(entity_type, "Initializing entity table");

    let sql = format!(
        r#"
        DEFINE TABLE IF NOT EXISTS `{table}` SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_{table}_entity_id ON TABLE `{table}` COLUMNS entity_id UNIQUE;
        "#,
        table = entity_type
    );

    db.query(sql)
        .await
        .and_then(|response| response.check())
        .map_err(|e| StateError::SchemaSetup(format!("{entity_type}: {e}")))?;
    Ok(())
}
