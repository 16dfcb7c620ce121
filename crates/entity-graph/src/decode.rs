//! Node → object traversal
//!
//! [`DecodeContext`] reads from a borrowed [`NodeGraph`] and tracks one slot
//! per visited id. A slot is reserved before the node's relationships are
//! resolved, so a cycle back to it sees [`DecodeError::InProgress`] instead
//! of recursing. Inside a to-many relationship that child is dropped; an
//! optional to-one is left empty; a required to-one fails. Models that need
//! a pointer back up the cycle get it from their parent's
//! [`EntityModel::wire`] hook.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use entity_store::{AttributeType, AttributeValue, EntityId, ValueKind};
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use crate::error::DecodeError;
use crate::model::{EntityModel, FieldDecl, FieldKind, ModelDeclaration, Presence};
use crate::representation::{GraphNode, NodeGraph};

enum Slot {
    Reserved,
    Ready(Arc<dyn Any + Send + Sync>),
    Failed,
}

/// Per-operation decode state.
pub struct DecodeContext<'g> {
    graph: &'g NodeGraph,
    slots: HashMap<EntityId, Slot>,
}

impl<'g> DecodeContext<'g> {
    pub fn new(graph: &'g NodeGraph) -> Self {
        Self {
            graph,
            slots: HashMap::new(),
        }
    }

    pub fn graph(&self) -> &'g NodeGraph {
        self.graph
    }

    /// Number of ids decoded successfully so far.
    pub fn decoded(&self) -> usize {
        self.slots
            .values()
            .filter(|slot| matches!(slot, Slot::Ready(_)))
            .count()
    }

    /// Decode node `id` as `M`, reusing the result of an earlier decode of
    /// the same id.
    pub fn decode_model<M: EntityModel>(&mut self, id: EntityId) -> Result<Arc<M>, DecodeError> {
        let declaration = M::DECLARATION;
        match self.slots.get(&id) {
            Some(Slot::Ready(model)) => {
                trace!(entity_type = declaration.entity_type, %id, "already decoded");
                return Arc::clone(model)
                    .downcast::<M>()
                    .map_err(|_| DecodeError::TypeMismatch {
                        id,
                        expected: declaration.entity_type.to_string(),
                    });
            }
            Some(Slot::Reserved) => return Err(DecodeError::InProgress { id }),
            Some(Slot::Failed) => return Err(DecodeError::PreviouslyFailed { id }),
            None => {}
        }

        let graph = self.graph;
        let node = graph.node(&id).ok_or(DecodeError::MissingNode { id })?;
        if node.entity_type() != declaration.entity_type {
            return Err(DecodeError::EntityTypeMismatch {
                id,
                expected: declaration.entity_type.to_string(),
                found: node.entity_type().to_string(),
            });
        }

        self.slots.insert(id, Slot::Reserved);
        debug!(entity_type = declaration.entity_type, %id, "decoding node");

        let mut reader = NodeReader {
            ctx: self,
            node,
            declaration,
        };
        match M::decode_fields(&mut reader) {
            Ok(model) => {
                let model = Arc::new(model);
                M::wire(&model);
                self.slots.insert(id, Slot::Ready(model.clone()));
                Ok(model)
            }
            Err(err) => {
                debug!(
                    entity_type = declaration.entity_type,
                    %id,
                    error = %err,
                    "node failed to decode"
                );
                self.slots.insert(id, Slot::Failed);
                Err(err)
            }
        }
    }
}

/// Field source handed to [`EntityModel::decode_fields`].
///
/// Fields are looked up by field name and read under their wire name. The
/// method used has to agree with the declared kind and presence, otherwise
/// the read fails with [`DecodeError::Undeclared`].
pub struct NodeReader<'r, 'g> {
    ctx: &'r mut DecodeContext<'g>,
    node: &'g GraphNode,
    declaration: &'static ModelDeclaration,
}

impl<'r, 'g> NodeReader<'r, 'g> {
    pub fn id(&self) -> EntityId {
        self.node.id()
    }

    pub fn node(&self) -> &'g GraphNode {
        self.node
    }

    fn declared(
        &self,
        field: &str,
        presence: Option<Presence>,
        expected: FieldKind,
    ) -> Result<FieldDecl, DecodeError> {
        self.declaration
            .field(field)
            .filter(|decl| decl.kind == expected)
            .filter(|decl| presence.map_or(true, |p| p == decl.presence))
            .copied()
            .ok_or_else(|| DecodeError::Undeclared {
                entity_type: self.declaration.entity_type.to_string(),
                field: field.to_string(),
                expected: expected.describe(),
            })
    }

    /// Read a required scalar. Absent or of another kind is an error.
    pub fn required<T: AttributeType>(&self, field: &str) -> Result<T, DecodeError> {
        let decl = self.declared(field, Some(Presence::Required), FieldKind::Scalar(T::KIND))?;
        let value = self.node.attribute(decl.wire_name).ok_or_else(|| {
            DecodeError::MissingAttribute {
                entity_type: self.declaration.entity_type.to_string(),
                attribute: decl.wire_name.to_string(),
            }
        })?;
        T::from_value(value).ok_or_else(|| DecodeError::AttributeType {
            entity_type: self.declaration.entity_type.to_string(),
            attribute: decl.wire_name.to_string(),
            expected: T::KIND,
            found: value.kind(),
        })
    }

    /// Read an optional scalar. Absent or of another kind reads as `None`.
    pub fn optional<T: AttributeType>(&self, field: &str) -> Result<Option<T>, DecodeError> {
        let decl = self.declared(field, Some(Presence::Optional), FieldKind::Scalar(T::KIND))?;
        Ok(self.node.attribute(decl.wire_name).and_then(T::from_value))
    }

    fn codable_bytes(
        &self,
        field: &str,
        presence: Presence,
    ) -> Result<Option<(&'g [u8], FieldDecl)>, DecodeError> {
        let decl = self.declared(field, Some(presence), FieldKind::Codable)?;
        match self.node.attribute(decl.wire_name) {
            None => Ok(None),
            Some(AttributeValue::Bytes(bytes)) => Ok(Some((bytes.as_slice(), decl))),
            Some(other) => Err(DecodeError::AttributeType {
                entity_type: self.declaration.entity_type.to_string(),
                attribute: decl.wire_name.to_string(),
                expected: ValueKind::Bytes,
                found: other.kind(),
            }),
        }
    }

    fn parse_codable<T: DeserializeOwned>(
        &self,
        bytes: &[u8],
        decl: FieldDecl,
    ) -> Result<T, DecodeError> {
        serde_json::from_slice(bytes).map_err(|err| DecodeError::Codable {
            entity_type: self.declaration.entity_type.to_string(),
            field: decl.field.to_string(),
            message: err.to_string(),
        })
    }

    /// Read a required serde value stored as JSON bytes.
    pub fn codable<T: DeserializeOwned>(&self, field: &str) -> Result<T, DecodeError> {
        match self.codable_bytes(field, Presence::Required)? {
            Some((bytes, decl)) => self.parse_codable(bytes, decl),
            None => Err(DecodeError::MissingAttribute {
                entity_type: self.declaration.entity_type.to_string(),
                attribute: self
                    .declaration
                    .field(field)
                    .map_or(field, |decl| decl.wire_name)
                    .to_string(),
            }),
        }
    }

    /// Read an optional serde value. Absent, not bytes, or not parseable
    /// reads as `None`.
    pub fn optional_codable<T: DeserializeOwned>(
        &self,
        field: &str,
    ) -> Result<Option<T>, DecodeError> {
        let found = match self.codable_bytes(field, Presence::Optional) {
            Ok(found) => found,
            Err(DecodeError::AttributeType { .. }) => None,
            Err(err) => return Err(err),
        };
        Ok(found.and_then(|(bytes, decl)| self.parse_codable(bytes, decl).ok()))
    }

    fn child<M: EntityModel>(
        &mut self,
        decl: &FieldDecl,
        child: EntityId,
    ) -> Result<Arc<M>, DecodeError> {
        self.ctx
            .decode_model::<M>(child)
            .map_err(|err| DecodeError::RelationshipFailed {
                entity_type: self.declaration.entity_type.to_string(),
                relationship: decl.wire_name.to_string(),
                child,
                source: Box::new(err),
            })
    }

    /// Read a required to-one child. Absent, dangling or failing is an error.
    pub fn to_one<M: EntityModel>(&mut self, field: &str) -> Result<Arc<M>, DecodeError> {
        let expected = FieldKind::ToOne {
            entity: M::DECLARATION.entity_type,
        };
        let decl = self.declared(field, Some(Presence::Required), expected)?;
        let child = self.node.to_one.get(decl.wire_name).copied().ok_or_else(|| {
            DecodeError::MissingRelationship {
                entity_type: self.declaration.entity_type.to_string(),
                relationship: decl.wire_name.to_string(),
            }
        })?;
        self.child(&decl, child)
    }

    /// Read an optional to-one child. Absent, dangling or failing reads as
    /// `None`.
    pub fn optional_to_one<M: EntityModel>(
        &mut self,
        field: &str,
    ) -> Result<Option<Arc<M>>, DecodeError> {
        let expected = FieldKind::ToOne {
            entity: M::DECLARATION.entity_type,
        };
        let decl = self.declared(field, Some(Presence::Optional), expected)?;
        let Some(child) = self.node.to_one.get(decl.wire_name).copied() else {
            return Ok(None);
        };
        match self.child::<M>(&decl, child) {
            Ok(model) => Ok(Some(model)),
            Err(err) => {
                debug!(
                    entity_type = self.declaration.entity_type,
                    relationship = decl.wire_name,
                    error = %err,
                    "optional to-one left empty"
                );
                Ok(None)
            }
        }
    }

    /// Read a to-many relationship. Children that fail to decode are
    /// dropped. An absent key is an error when the field is declared
    /// required and an empty collection when optional.
    pub fn to_many<M: EntityModel>(&mut self, field: &str) -> Result<Vec<Arc<M>>, DecodeError> {
        let expected = FieldKind::ToMany {
            entity: M::DECLARATION.entity_type,
        };
        let decl = self.declared(field, None, expected)?;
        let node = self.node;
        let Some(ids) = node.to_many.get(decl.wire_name) else {
            return match decl.presence {
                Presence::Required => Err(DecodeError::MissingRelationship {
                    entity_type: self.declaration.entity_type.to_string(),
                    relationship: decl.wire_name.to_string(),
                }),
                Presence::Optional => Ok(Vec::new()),
            };
        };

        let mut children = Vec::with_capacity(ids.len());
        for id in ids {
            match self.ctx.decode_model::<M>(*id) {
                Ok(child) => children.push(child),
                Err(err) => debug!(
                    entity_type = self.declaration.entity_type,
                    relationship = decl.wire_name,
                    child = %id,
                    error = %err,
                    "dropping child that failed to decode"
                ),
            }
        }
        Ok(children)
    }
}
