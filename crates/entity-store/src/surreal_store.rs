//! SurrealDB-backed EntityStore implementation
//!
//! Each entity type is a table; each record is stored under
//! `<entity_type>:<entity_id>` as `{ entity_id, attributes, relationships }`.
//! Attributes and relationships travel as JSON objects and are converted
//! to/from the typed record at the boundary.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::{Database, Root};
use surrealdb::Surreal;
use tracing::{debug, info, instrument, warn};

use crate::config::{AuthScope, StoreConfig, DEFAULT_DATABASE, DEFAULT_NAMESPACE};
use crate::error::{StateError, StorageError};
use crate::migrations;
use crate::record::{EntityRecord, RecordLink};
use crate::schema::StoreSchema;
use crate::storage_traits::{ChangeSet, EntityStore, StorageResult};
use crate::value::{AttributeValue, EntityId};

/// Row shape as stored in SurrealDB
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DbEntityRow {
    entity_id: String,
    #[serde(default)]
    attributes: serde_json::Value,
    #[serde(default)]
    relationships: serde_json::Value,
}

impl DbEntityRow {
    fn from_record(record: &EntityRecord) -> StorageResult<Self> {
        // JSON has no NaN or infinity; serde would write them as null.
        if let Some((name, _)) = record.attributes.iter().find(|(_, v)| !v.is_finite()) {
            return Err(StorageError::NonFiniteFloat {
                entity_type: record.entity_type.clone(),
                attribute: name.clone(),
            });
        }
        Ok(Self {
            entity_id: record.id.to_string(),
            attributes: serde_json::to_value(&record.attributes)?,
            relationships: serde_json::to_value(&record.relationships)?,
        })
    }

    /// `None` when the row has no resolvable identity or its fields do not
    /// deserialize.
    fn into_record(self, entity_type: &str) -> Option<EntityRecord> {
        let id = match self.entity_id.parse::<EntityId>() {
            Ok(id) => id,
            Err(e) => {
                warn!(entity_type, entity_id = %self.entity_id, error = %e, "skipping row without a valid id");
                return None;
            }
        };
        let attributes = match decode_column::<AttributeValue>(self.attributes) {
            Ok(attributes) => attributes,
            Err(e) => {
                warn!(entity_type, %id, error = %e, "skipping row with malformed attributes");
                return None;
            }
        };
        let relationships = match decode_column::<RecordLink>(self.relationships) {
            Ok(relationships) => relationships,
            Err(e) => {
                warn!(entity_type, %id, error = %e, "skipping row with malformed relationships");
                return None;
            }
        };
        Some(EntityRecord {
            id,
            entity_type: entity_type.to_string(),
            attributes,
            relationships,
        })
    }
}

fn decode_column<T: serde::de::DeserializeOwned>(
    value: serde_json::Value,
) -> serde_json::Result<BTreeMap<String, T>> {
    if value.is_null() {
        return Ok(BTreeMap::new());
    }
    serde_json::from_value(value)
}

/// SurrealDB-backed implementation of [`EntityStore`].
#[derive(Clone)]
pub struct SurrealEntityStore {
    db: Surreal<Any>,
    schema: StoreSchema,
}

impl SurrealEntityStore {
    /// Wrap an already connected database, defining the schema's tables.
    pub async fn new(db: Surreal<Any>, schema: StoreSchema) -> crate::Result<Self> {
        migrations::init_schema(&db, &schema).await?;
        Ok(Self { db, schema })
    }

    /// Create an in-memory instance for testing.
    ///
    /// Connects to `mem://`, selects `entity_graph/main`, and defines tables.
    pub async fn in_memory(schema: StoreSchema) -> crate::Result<Self> {
        let db = connect_url("mem://").await?;
        info!("SurrealEntityStore connected (in-memory)");
        Self::new(db, schema).await
    }

    /// Connect to `config.endpoint`, sign in at the configured scope and
    /// select the namespace and database.
    #[instrument(skip(config, schema), fields(endpoint = %config.endpoint, namespace = %config.namespace, database = %config.database))]
    pub async fn connect(config: StoreConfig, schema: StoreSchema) -> crate::Result<Self> {
        info!(scope = ?config.scope, "connecting to SurrealDB");

        let db = surrealdb::engine::any::connect(&config.endpoint)
            .await
            .map_err(|e| {
                StateError::Connection(format!("cannot reach {}: {e}", config.endpoint))
            })?;

        let signed_in = match config.scope {
            AuthScope::Root => {
                db.signin(Root {
                    username: &config.username,
                    password: &config.password,
                })
                .await
            }
            AuthScope::Database => {
                db.signin(Database {
                    namespace: &config.namespace,
                    database: &config.database,
                    username: &config.username,
                    password: &config.password,
                })
                .await
            }
        };
        signed_in.map_err(|e| {
            StateError::Connection(format!("sign-in as {:?} user rejected: {e}", config.scope))
        })?;

        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await
            .map_err(|e| {
                StateError::Connection(format!(
                    "cannot select {}/{}: {e}",
                    config.namespace, config.database
                ))
            })?;

        Self::new(db, schema).await
    }

    /// Connect using environment variables
    ///
    /// If SURREALDB_ENDPOINT is set, connects with [`StoreConfig::from_env`].
    /// If SURREALDB_URL is set, connects to that URL.
    /// Otherwise, falls back to in-memory.
    #[instrument(skip_all)]
    pub async fn from_env(schema: StoreSchema) -> crate::Result<Self> {
        if let Ok(config) = StoreConfig::from_env() {
            return Self::connect(config, schema).await;
        }

        if let Ok(url) = std::env::var("SURREALDB_URL") {
            info!("SURREALDB_URL found, connecting to {}", url);
            let db = connect_url(&url).await?;
            return Self::new(db, schema).await;
        }

        info!("No SurrealDB config found, using in-memory database");
        Self::in_memory(schema).await
    }

    fn rows_into_records(rows: Vec<DbEntityRow>, entity_type: &str) -> Vec<EntityRecord> {
        rows.into_iter()
            .filter_map(|row| row.into_record(entity_type))
            .collect()
    }
}

async fn connect_url(url: &str) -> crate::Result<Surreal<Any>> {
    let db = surrealdb::engine::any::connect(url)
        .await
        .map_err(|e| StateError::Connection(format!("Failed to connect to {url}: {e}")))?;

    db.use_ns(DEFAULT_NAMESPACE)
        .use_db(DEFAULT_DATABASE)
        .await
        .map_err(|e| StateError::Connection(e.to_string()))?;

    Ok(db)
}

#[async_trait]
impl EntityStore for SurrealEntityStore {
    fn schema(&self) -> &StoreSchema {
        &self.schema
    }

    #[instrument(skip(self))]
    async fn fetch_all(&self, entity_type: &str) -> StorageResult<Vec<EntityRecord>> {
        self.schema.require(entity_type)?;

        let mut res = self
            .db
            .query("SELECT entity_id, attributes, relationships FROM type::table($tb) ORDER BY entity_id")
            .bind(("tb", entity_type.to_string()))
            .await?;
        let rows: Vec<DbEntityRow> = res.take(0)?;

        Ok(Self::rows_into_records(rows, entity_type))
    }

    #[instrument(skip(self), fields(id = %id))]
    async fn fetch_by_id(
        &self,
        entity_type: &str,
        id: &EntityId,
    ) -> StorageResult<Option<EntityRecord>> {
        self.schema.require(entity_type)?;

        let mut res = self
            .db
            .query("SELECT entity_id, attributes, relationships FROM type::thing($tb, $id)")
            .bind(("tb", entity_type.to_string()))
            .bind(("id", id.to_string()))
            .await?;
        let rows: Vec<DbEntityRow> = res.take(0)?;

        Ok(Self::rows_into_records(rows, entity_type).into_iter().next())
    }

    #[instrument(skip(self, changes), fields(records = changes.len()))]
    async fn commit(&self, changes: ChangeSet) -> StorageResult<()> {
        if changes.is_empty() {
            return Ok(());
        }
        for record in changes.records() {
            self.schema.require(&record.entity_type)?;
        }

        let mut sql = String::from("BEGIN TRANSACTION;\n");
        for i in 0..changes.len() {
            sql.push_str(&format!(
                "UPSERT type::thing($tb{i}, $id{i}) CONTENT $row{i};\n"
            ));
        }
        sql.push_str("COMMIT TRANSACTION;");

        let mut query = self.db.query(sql);
        for (i, record) in changes.records().iter().enumerate() {
            let row = DbEntityRow::from_record(record)?;
            query = query
                .bind((format!("tb{i}"), record.entity_type.clone()))
                .bind((format!("id{i}"), record.id.to_string()))
                .bind((format!("row{i}"), row));
        }

        query
            .await
            .and_then(|response| response.check())
            .map_err(|e| StorageError::CommitRejected(e.to_string()))?;

        debug!("transaction committed");
        Ok(())
    }

    #[instrument(skip(self), fields(id = %id))]
    async fn delete(&self, entity_type: &str, id: &EntityId) -> StorageResult<u64> {
        self.schema.require(entity_type)?;

        let mut res = self
            .db
            .query("DELETE type::thing($tb, $id) RETURN BEFORE")
            .bind(("tb", entity_type.to_string()))
            .bind(("id", id.to_string()))
            .await?;
        let removed: Vec<DbEntityRow> = res.take(0)?;

        Ok(removed.len() as u64)
    }
}
