//! Object → node traversal
//!
//! [`EncodeContext`] owns the [`NodeGraph`] being built, which doubles as
//! the visited map: a model whose id is already in the graph is not encoded
//! again. The shell node is inserted before any field is written, so a cycle
//! back to a model being encoded stops at its id.

use entity_store::{AttributeType, AttributeValue, EntityId};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, trace, warn};

use crate::model::{EntityModel, FieldDecl, FieldKind, ModelDeclaration, Presence};
use crate::representation::{GraphNode, NodeGraph};

/// Per-operation encode state.
#[derive(Debug, Default)]
pub struct EncodeContext {
    graph: NodeGraph,
}

impl EncodeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn graph(&self) -> &NodeGraph {
        &self.graph
    }

    pub fn into_graph(self) -> NodeGraph {
        self.graph
    }

    /// Encode `model` unless its id is already present.
    pub fn encode_model<M: EntityModel>(&mut self, model: &M) -> EntityId {
        let declaration = M::DECLARATION;
        let id = model.id();
        if self.graph.contains(&id) {
            trace!(entity_type = declaration.entity_type, %id, "already encoded");
            return id;
        }

        self.graph
            .insert(GraphNode::new(id, declaration.entity_type));
        debug!(entity_type = declaration.entity_type, %id, "encoding node");

        let mut writer = NodeWriter::new(self, declaration);
        model.encode_fields(&mut writer);
        let fields = writer.fields;

        if let Some(node) = self.graph.node_mut(&id) {
            node.attributes = fields.attributes;
            node.to_one = fields.to_one;
            node.to_many = fields.to_many;
        }
        id
    }
}

#[derive(Default)]
struct NodeFields {
    attributes: BTreeMap<String, AttributeValue>,
    to_one: BTreeMap<String, EntityId>,
    to_many: BTreeMap<String, Vec<EntityId>>,
}

/// Field sink handed to [`EntityModel::encode_fields`].
///
/// Every method looks the field up in the model's declaration. A field that
/// is not declared, or declared with another kind or presence, is logged and
/// skipped.
pub struct NodeWriter<'c> {
    ctx: &'c mut EncodeContext,
    declaration: &'static ModelDeclaration,
    fields: NodeFields,
}

impl<'c> NodeWriter<'c> {
    fn new(ctx: &'c mut EncodeContext, declaration: &'static ModelDeclaration) -> Self {
        Self {
            ctx,
            declaration,
            fields: NodeFields::default(),
        }
    }

    /// The declaration of `field` if it has the expected kind and, when
    /// given, the expected presence.
    fn declared(
        &self,
        field: &str,
        presence: Option<Presence>,
        matches: impl Fn(FieldKind) -> bool,
    ) -> Option<FieldDecl> {
        match self.declaration.field(field) {
            Some(decl) if presence.map_or(true, |p| p == decl.presence) && matches(decl.kind) => {
                Some(*decl)
            }
            Some(decl) => {
                warn!(
                    entity_type = self.declaration.entity_type,
                    field,
                    declared = decl.kind.describe(),
                    "field written with a different kind or presence than declared; skipping"
                );
                None
            }
            None => {
                warn!(
                    entity_type = self.declaration.entity_type,
                    field, "field is not declared; skipping"
                );
                None
            }
        }
    }

    fn scalar<T: AttributeType>(&mut self, field: &str, presence: Presence, value: Option<T>) {
        let Some(decl) =
            self.declared(field, Some(presence), |kind| kind == FieldKind::Scalar(T::KIND))
        else {
            return;
        };
        if let Some(value) = value {
            self.fields
                .attributes
                .insert(decl.wire_name.to_string(), value.into_value());
        }
    }

    /// Write a required scalar.
    pub fn attribute<T: AttributeType>(&mut self, field: &str, value: T) -> &mut Self {
        self.scalar(field, Presence::Required, Some(value));
        self
    }

    /// Write an optional scalar; `None` leaves the key absent.
    pub fn optional_attribute<T: AttributeType>(
        &mut self,
        field: &str,
        value: Option<T>,
    ) -> &mut Self {
        self.scalar(field, Presence::Optional, value);
        self
    }

    fn codable_value<T: Serialize + ?Sized>(
        &mut self,
        field: &str,
        presence: Presence,
        value: Option<&T>,
    ) {
        let Some(decl) = self.declared(field, Some(presence), |kind| kind == FieldKind::Codable)
        else {
            return;
        };
        let Some(value) = value else {
            return;
        };
        match serde_json::to_vec(value) {
            Ok(bytes) => {
                self.fields
                    .attributes
                    .insert(decl.wire_name.to_string(), AttributeValue::Bytes(bytes));
            }
            Err(err) => warn!(
                entity_type = self.declaration.entity_type,
                field,
                error = %err,
                "codable field failed to serialize; skipping"
            ),
        }
    }

    /// Write a required serde value as JSON bytes.
    pub fn codable<T: Serialize + ?Sized>(&mut self, field: &str, value: &T) -> &mut Self {
        self.codable_value(field, Presence::Required, Some(value));
        self
    }

    pub fn optional_codable<T: Serialize>(&mut self, field: &str, value: Option<&T>) -> &mut Self {
        self.codable_value(field, Presence::Optional, value);
        self
    }

    fn single<M: EntityModel>(&mut self, field: &str, presence: Presence, child: Option<&M>) {
        let target = M::DECLARATION.entity_type;
        let Some(decl) = self.declared(field, Some(presence), |kind| {
            kind == FieldKind::ToOne { entity: target }
        }) else {
            return;
        };
        if let Some(child) = child {
            let child_id = self.ctx.encode_model(child);
            self.fields
                .to_one
                .insert(decl.wire_name.to_string(), child_id);
        }
    }

    /// Write a required to-one child, encoding it first.
    pub fn to_one<M: EntityModel>(&mut self, field: &str, child: &M) -> &mut Self {
        self.single(field, Presence::Required, Some(child));
        self
    }

    pub fn optional_to_one<M: EntityModel>(
        &mut self,
        field: &str,
        child: Option<&M>,
    ) -> &mut Self {
        self.single(field, Presence::Optional, child);
        self
    }

    /// Write a to-many relationship, encoding each child first.
    ///
    /// An empty collection is still written as an empty list.
    pub fn to_many<'m, M, I>(&mut self, field: &str, children: I) -> &mut Self
    where
        M: EntityModel,
        I: IntoIterator<Item = &'m M>,
    {
        let target = M::DECLARATION.entity_type;
        // Presence of a to-many only matters on decode.
        let Some(decl) = self.declared(field, None, |kind| {
            kind == FieldKind::ToMany { entity: target }
        }) else {
            return self;
        };

        let ids: Vec<EntityId> = children
            .into_iter()
            .map(|child| self.ctx.encode_model(child))
            .collect();
        self.fields
            .to_many
            .insert(decl.wire_name.to_string(), ids);
        self
    }
}
