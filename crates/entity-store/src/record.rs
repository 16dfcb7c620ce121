//! Stored record shapes
//!
//! The store's own object graph: records carry scalar attributes and link to
//! other records by identity. Links may form cycles.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value::{AttributeValue, EntityId};

/// Handle to a stored or staged record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordRef {
    pub entity_type: String,
    pub id: EntityId,
}

impl RecordRef {
    pub fn new(entity_type: impl Into<String>, id: EntityId) -> Self {
        Self {
            entity_type: entity_type.into(),
            id,
        }
    }
}

impl std::fmt::Display for RecordRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.id)
    }
}

/// Value of a relationship field on a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cardinality", content = "ids", rename_all = "snake_case")]
pub enum RecordLink {
    One(EntityId),
    Many(Vec<EntityId>),
}

/// A persisted (or staged) entity record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: EntityId,
    pub entity_type: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
    #[serde(default)]
    pub relationships: BTreeMap<String, RecordLink>,
}

impl EntityRecord {
    /// Empty record of the given type
    pub fn new(entity_type: impl Into<String>, id: EntityId) -> Self {
        Self {
            id,
            entity_type: entity_type.into(),
            attributes: BTreeMap::new(),
            relationships: BTreeMap::new(),
        }
    }

    pub fn record_ref(&self) -> RecordRef {
        RecordRef::new(self.entity_type.clone(), self.id)
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    pub fn link(&self, name: &str) -> Option<&RecordLink> {
        self.relationships.get(name)
    }
}
