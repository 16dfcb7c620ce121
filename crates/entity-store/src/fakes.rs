//! In-memory entity store
//!
//! Provides `MemoryEntityStore`, which satisfies the [`EntityStore`]
//! contract without any external dependencies. Used by tests and by
//! embedders that do not need durability.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::record::EntityRecord;
use crate::schema::StoreSchema;
use crate::storage_traits::{ChangeSet, EntityStore, StorageResult};
use crate::value::EntityId;

type Tables = HashMap<String, HashMap<EntityId, EntityRecord>>;

/// In-memory store backed by a `HashMap<entity_type, HashMap<id, record>>`.
#[derive(Debug)]
pub struct MemoryEntityStore {
    schema: StoreSchema,
    tables: Mutex<Tables>,
    fail_next_commit: AtomicBool,
    commits: AtomicU64,
}

impl MemoryEntityStore {
    pub fn new(schema: StoreSchema) -> Self {
        Self {
            schema,
            tables: Mutex::new(HashMap::new()),
            fail_next_commit: AtomicBool::new(false),
            commits: AtomicU64::new(0),
        }
    }

    /// Make the next `commit` fail with `CommitRejected` without writing.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Number of records stored for `entity_type`.
    pub fn record_count(&self, entity_type: &str) -> usize {
        self.tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(entity_type)
            .map_or(0, HashMap::len)
    }

    /// Number of successful commits so far.
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }

    /// Store a record as-is, skipping schema validation.
    ///
    /// Lets tests seed data the traversal would never produce (malformed
    /// attributes, dangling links).
    pub fn insert_raw(&self, record: EntityRecord) {
        self.tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(record.entity_type.clone())
            .or_default()
            .insert(record.id, record);
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|e| StorageError::Backend(format!("memory store lock poisoned: {e}")))
    }

    fn validate(&self, record: &EntityRecord) -> StorageResult<()> {
        let descriptor = self.schema.require(&record.entity_type)?;
        for (name, value) in &record.attributes {
            match descriptor.attribute_kind(name) {
                Some(kind) if kind == value.kind() => {}
                Some(kind) => {
                    return Err(StorageError::AttributeKindMismatch {
                        entity_type: record.entity_type.clone(),
                        attribute: name.clone(),
                        expected: kind,
                        actual: value.kind(),
                    })
                }
                None => {
                    return Err(StorageError::UnknownAttribute {
                        entity_type: record.entity_type.clone(),
                        attribute: name.clone(),
                    })
                }
            }
        }
        for name in record.relationships.keys() {
            if descriptor.relationship(name).is_none() {
                return Err(StorageError::UnknownRelationship {
                    entity_type: record.entity_type.clone(),
                    relationship: name.clone(),
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl EntityStore for MemoryEntityStore {
    fn schema(&self) -> &StoreSchema {
        &self.schema
    }

    async fn fetch_all(&self, entity_type: &str) -> StorageResult<Vec<EntityRecord>> {
        self.schema.require(entity_type)?;
        let tables = self.lock()?;
        let mut records: Vec<EntityRecord> = tables
            .get(entity_type)
            .map(|table| table.values().cloned().collect())
            .unwrap_or_default();
        records.sort_by_key(|r| r.id);
        Ok(records)
    }

    async fn fetch_by_id(
        &self,
        entity_type: &str,
        id: &EntityId,
    ) -> StorageResult<Option<EntityRecord>> {
        self.schema.require(entity_type)?;
        let tables = self.lock()?;
        Ok(tables
            .get(entity_type)
            .and_then(|table| table.get(id))
            .cloned())
    }

    async fn commit(&self, changes: ChangeSet) -> StorageResult<()> {
        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            warn!(records = changes.len(), "injected commit failure");
            return Err(StorageError::CommitRejected(
                "injected failure".to_string(),
            ));
        }

        // Validate everything before touching the tables.
        for record in changes.records() {
            self.validate(record)?;
        }

        let mut tables = self.lock()?;
        let written = changes.len();
        for record in changes.into_records() {
            tables
                .entry(record.entity_type.clone())
                .or_default()
                .insert(record.id, record);
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        debug!(records = written, "memory store commit applied");
        Ok(())
    }

    async fn delete(&self, entity_type: &str, id: &EntityId) -> StorageResult<u64> {
        self.schema.require(entity_type)?;
        let mut tables = self.lock()?;
        let removed = tables
            .get_mut(entity_type)
            .and_then(|table| table.remove(id))
            .is_some();
        Ok(u64::from(removed))
    }
}
