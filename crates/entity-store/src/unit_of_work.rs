//! Unit of work over an [`EntityStore`]
//!
//! Stages upserts and field writes in memory, validated against the store
//! schema, and hands them to the store as a single [`ChangeSet`] on
//! [`UnitOfWork::commit`]. Nothing is visible to readers before that.

use std::collections::HashMap;

use tracing::debug;

use crate::error::StorageError;
use crate::record::{EntityRecord, RecordLink, RecordRef};
use crate::schema::Cardinality;
use crate::storage_traits::{ChangeSet, EntityStore, StorageResult};
use crate::value::{AttributeValue, EntityId};

pub struct UnitOfWork<'s, S: EntityStore + ?Sized> {
    store: &'s S,
    staged: HashMap<RecordRef, EntityRecord>,
    // staging order, so change sets are deterministic
    order: Vec<RecordRef>,
}

impl<'s, S: EntityStore + ?Sized> UnitOfWork<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self {
            store,
            staged: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn store(&self) -> &'s S {
        self.store
    }

    /// Stage the record of `entity_type` with `id`: the stored one if it
    /// exists, otherwise a new empty record. Does not commit.
    pub async fn upsert(&mut self, entity_type: &str, id: EntityId) -> StorageResult<RecordRef> {
        self.store.schema().require(entity_type)?;

        let record_ref = RecordRef::new(entity_type, id);
        if self.staged.contains_key(&record_ref) {
            return Ok(record_ref);
        }

        let record = match self.store.fetch_by_id(entity_type, &id).await? {
            Some(existing) => {
                debug!(record = %record_ref, "staging existing record");
                existing
            }
            None => {
                debug!(record = %record_ref, "staging new record");
                EntityRecord::new(entity_type, id)
            }
        };

        self.staged.insert(record_ref.clone(), record);
        self.order.push(record_ref.clone());
        Ok(record_ref)
    }

    /// Set a declared scalar attribute on a staged record.
    pub fn set_attribute(
        &mut self,
        record: &RecordRef,
        name: &str,
        value: AttributeValue,
    ) -> StorageResult<()> {
        let store = self.store;
        let descriptor = store.schema().require(&record.entity_type)?;
        let expected =
            descriptor
                .attribute_kind(name)
                .ok_or_else(|| StorageError::UnknownAttribute {
                    entity_type: record.entity_type.clone(),
                    attribute: name.to_string(),
                })?;
        if expected != value.kind() {
            return Err(StorageError::AttributeKindMismatch {
                entity_type: record.entity_type.clone(),
                attribute: name.to_string(),
                expected,
                actual: value.kind(),
            });
        }
        if !value.is_finite() {
            return Err(StorageError::NonFiniteFloat {
                entity_type: record.entity_type.clone(),
                attribute: name.to_string(),
            });
        }

        self.staged_mut(record)?
            .attributes
            .insert(name.to_string(), value);
        Ok(())
    }

    /// Set a declared relationship on a staged record.
    pub fn set_relationship(
        &mut self,
        record: &RecordRef,
        name: &str,
        link: RecordLink,
    ) -> StorageResult<()> {
        let store = self.store;
        let descriptor = store.schema().require(&record.entity_type)?;
        let relationship =
            descriptor
                .relationship(name)
                .ok_or_else(|| StorageError::UnknownRelationship {
                    entity_type: record.entity_type.clone(),
                    relationship: name.to_string(),
                })?;
        let matches = matches!(
            (relationship.cardinality, &link),
            (Cardinality::ToOne, RecordLink::One(_)) | (Cardinality::ToMany, RecordLink::Many(_))
        );
        if !matches {
            return Err(StorageError::CardinalityMismatch {
                entity_type: record.entity_type.clone(),
                relationship: name.to_string(),
            });
        }

        self.staged_mut(record)?
            .relationships
            .insert(name.to_string(), link);
        Ok(())
    }

    pub fn staged(&self, record: &RecordRef) -> Option<&EntityRecord> {
        self.staged.get(record)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Staged records in staging order.
    pub fn into_change_set(mut self) -> ChangeSet {
        let order = std::mem::take(&mut self.order);
        let records = order
            .iter()
            .filter_map(|record_ref| self.staged.remove(record_ref))
            .collect();
        ChangeSet::new(records)
    }

    /// Commit every staged record at once, returning how many were written.
    pub async fn commit(self) -> StorageResult<usize> {
        let store = self.store;
        let changes = self.into_change_set();
        let written = changes.len();
        store.commit(changes).await?;
        debug!(records = written, "unit of work committed");
        Ok(written)
    }

    fn staged_mut(&mut self, record: &RecordRef) -> StorageResult<&mut EntityRecord> {
        self.staged
            .get_mut(record)
            .ok_or_else(|| StorageError::NotStaged {
                id: record.to_string(),
            })
    }
}
