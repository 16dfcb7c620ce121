//! Store schema declarations
//!
//! A [`StoreSchema`] names every entity type the store can hold, the scalar
//! attributes each one declares and the relationships it declares towards
//! other entity types. The unit of work validates writes against it and the
//! record-to-node walk uses it to decide which fields to read.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::storage_traits::StorageResult;
use crate::value::ValueKind;

/// Cardinality of a declared relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    ToOne,
    ToMany,
}

/// A relationship declared on an entity type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipDescriptor {
    /// Field name on the owning entity
    pub name: String,
    /// Entity type the relationship points at
    pub target: String,
    pub cardinality: Cardinality,
}

/// Declared shape of one entity type
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityDescriptor {
    name: String,
    attributes: BTreeMap<String, ValueKind>,
    relationships: BTreeMap<String, RelationshipDescriptor>,
    #[serde(skip)]
    conflicts: Vec<String>,
}

impl EntityDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Declare a scalar attribute
    pub fn attribute(mut self, name: impl Into<String>, kind: ValueKind) -> Self {
        let name = name.into();
        if self.relationships.contains_key(&name)
            || self.attributes.insert(name.clone(), kind).is_some()
        {
            self.conflicts.push(name);
        }
        self
    }

    /// Declare a to-one relationship towards `target`
    pub fn to_one(self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.declare_relationship(name.into(), target.into(), Cardinality::ToOne)
    }

    /// Declare a to-many relationship towards `target`
    pub fn to_many(self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.declare_relationship(name.into(), target.into(), Cardinality::ToMany)
    }

    fn declare_relationship(mut self, name: String, target: String, cardinality: Cardinality) -> Self {
        let descriptor = RelationshipDescriptor {
            name: name.clone(),
            target,
            cardinality,
        };
        if self.attributes.contains_key(&name)
            || self.relationships.insert(name.clone(), descriptor).is_some()
        {
            self.conflicts.push(name);
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared scalar attributes, ordered by name
    pub fn attributes(&self) -> impl Iterator<Item = (&str, ValueKind)> {
        self.attributes.iter().map(|(name, kind)| (name.as_str(), *kind))
    }

    pub fn attribute_kind(&self, name: &str) -> Option<ValueKind> {
        self.attributes.get(name).copied()
    }

    /// Declared relationships, ordered by name
    pub fn relationships(&self) -> impl Iterator<Item = &RelationshipDescriptor> {
        self.relationships.values()
    }

    pub fn relationship(&self, name: &str) -> Option<&RelationshipDescriptor> {
        self.relationships.get(name)
    }

    /// The declared relationship called `name` that points at `target`.
    ///
    /// Both the name and the destination type have to agree; a relationship
    /// with the right name towards another entity type does not match.
    pub fn relationship_to(&self, name: &str, target: &str) -> Option<&RelationshipDescriptor> {
        self.relationships
            .get(name)
            .filter(|descriptor| descriptor.target == target)
    }
}

/// Validated set of entity descriptors
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSchema {
    entities: BTreeMap<String, EntityDescriptor>,
}

impl StoreSchema {
    pub fn builder() -> StoreSchemaBuilder {
        StoreSchemaBuilder::default()
    }

    pub fn entity(&self, entity_type: &str) -> Option<&EntityDescriptor> {
        self.entities.get(entity_type)
    }

    /// Look up an entity type, failing with `UnknownEntityType` if absent.
    pub fn require(&self, entity_type: &str) -> StorageResult<&EntityDescriptor> {
        self.entities
            .get(entity_type)
            .ok_or_else(|| StorageError::UnknownEntityType {
                entity_type: entity_type.to_string(),
            })
    }

    /// Relationships declared on `entity_type`.
    pub fn declared_relationships(
        &self,
        entity_type: &str,
    ) -> StorageResult<impl Iterator<Item = &RelationshipDescriptor>> {
        Ok(self.require(entity_type)?.relationships())
    }

    pub fn entity_types(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    pub fn contains(&self, entity_type: &str) -> bool {
        self.entities.contains_key(entity_type)
    }
}

/// Builder for [`StoreSchema`]
#[derive(Debug, Default)]
pub struct StoreSchemaBuilder {
    entities: Vec<EntityDescriptor>,
}

impl StoreSchemaBuilder {
    pub fn entity(mut self, descriptor: EntityDescriptor) -> Self {
        self.entities.push(descriptor);
        self
    }

    /// Validate and build the schema.
    ///
    /// Rejects non-identifier names, duplicate entity types, fields declared
    /// twice and relationships towards undeclared entity types.
    pub fn build(self) -> StorageResult<StoreSchema> {
        let mut entities = BTreeMap::new();

        for descriptor in self.entities {
            check_identifier(&descriptor.name)?;
            if let Some(field) = descriptor.conflicts.first() {
                return Err(StorageError::InvalidSchema(format!(
                    "field {} declared twice on {}",
                    field, descriptor.name
                )));
            }
            for (name, _) in descriptor.attributes() {
                check_identifier(name)?;
            }
            for relationship in descriptor.relationships() {
                check_identifier(&relationship.name)?;
            }
            let name = descriptor.name.clone();
            if entities.insert(name.clone(), descriptor).is_some() {
                return Err(StorageError::InvalidSchema(format!(
                    "entity type {} declared twice",
                    name
                )));
            }
        }

        for descriptor in entities.values() {
            for relationship in descriptor.relationships() {
                if !entities.contains_key(&relationship.target) {
                    return Err(StorageError::InvalidSchema(format!(
                        "{}.{} targets undeclared entity type {}",
                        descriptor.name, relationship.name, relationship.target
                    )));
                }
            }
        }

        Ok(StoreSchema { entities })
    }
}

/// Names end up as table and field names in backends, so keep them plain.
fn check_identifier(name: &str) -> StorageResult<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidSchema(format!(
            "{:?} is not a valid identifier",
            name
        )))
    }
}
