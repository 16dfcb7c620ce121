//! Storage trait definitions
//!
//! `EntityStore` is the persistence collaborator the traversal core talks
//! to: fetch records by entity type or identity, commit a staged
//! [`ChangeSet`] atomically, and delete by identity.
//!
//! The trait is async and backend-agnostic. An in-memory implementation is
//! provided in the `fakes` module and a SurrealDB one in `surreal_store`.

use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::EntityRecord;
use crate::schema::StoreSchema;
use crate::value::EntityId;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Records staged by a [`crate::UnitOfWork`], committed as one batch.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    records: Vec<EntityRecord>,
}

impl ChangeSet {
    pub fn new(records: Vec<EntityRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[EntityRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<EntityRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Persistent entity store.
///
/// Guarantees:
/// - At most one record exists per `(entity_type, id)`; committing a record
///   whose id is already stored replaces it in place.
/// - `commit` is all-or-nothing: either every record of the change set is
///   visible afterwards or none is.
/// - `delete` of an absent record is not an error.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Declared schema of this store.
    fn schema(&self) -> &StoreSchema;

    /// Every record of `entity_type`.
    async fn fetch_all(&self, entity_type: &str) -> StorageResult<Vec<EntityRecord>>;

    /// The record of `entity_type` with `id`, if present.
    async fn fetch_by_id(
        &self,
        entity_type: &str,
        id: &EntityId,
    ) -> StorageResult<Option<EntityRecord>>;

    /// Persist every staged record in one atomic step.
    async fn commit(&self, changes: ChangeSet) -> StorageResult<()>;

    /// Remove the records of `entity_type` matching `id`, returning how many
    /// were removed.
    async fn delete(&self, entity_type: &str, id: &EntityId) -> StorageResult<u64>;
}
