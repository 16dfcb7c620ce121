//! Model contract
//!
//! A model type participates in the traversals by implementing
//! [`EntityModel`]: a static [`ModelDeclaration`] naming its entity type and
//! its persisted fields, plus two functions that write those fields through a
//! [`NodeWriter`] and read them back through a [`NodeReader`]. The generic
//! recursion, identity tracking and cycle handling live in the contexts.
//!
//! Fields the declaration does not list are never encoded; the model fills
//! them itself on decode.

use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use entity_store::{EntityDescriptor, EntityId, ValueKind};

use crate::decode::{DecodeContext, NodeReader};
use crate::encode::{EncodeContext, NodeWriter};
use crate::error::DecodeError;

/// Whether a field must be present on a node for the model to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Required,
    Optional,
}

/// How a declared field is represented in a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// A scalar attribute of the given kind.
    Scalar(ValueKind),
    /// A serde value stored as JSON bytes.
    Codable,
    /// A single child of the named entity type.
    ToOne { entity: &'static str },
    /// A collection of children of the named entity type.
    ToMany { entity: &'static str },
}

impl FieldKind {
    pub(crate) fn describe(&self) -> &'static str {
        match self {
            FieldKind::Scalar(_) => "scalar attribute",
            FieldKind::Codable => "codable attribute",
            FieldKind::ToOne { .. } => "to-one relationship",
            FieldKind::ToMany { .. } => "to-many relationship",
        }
    }
}

/// One persisted field of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDecl {
    /// Name the model code uses.
    pub field: &'static str,
    /// Name the node and the store use.
    pub wire_name: &'static str,
    pub kind: FieldKind,
    pub presence: Presence,
}

impl FieldDecl {
    const fn required(field: &'static str, kind: FieldKind) -> Self {
        Self {
            field,
            wire_name: field,
            kind,
            presence: Presence::Required,
        }
    }

    pub const fn scalar(field: &'static str, kind: ValueKind) -> Self {
        Self::required(field, FieldKind::Scalar(kind))
    }

    pub const fn codable(field: &'static str) -> Self {
        Self::required(field, FieldKind::Codable)
    }

    pub const fn to_one(field: &'static str, entity: &'static str) -> Self {
        Self::required(field, FieldKind::ToOne { entity })
    }

    pub const fn to_many(field: &'static str, entity: &'static str) -> Self {
        Self::required(field, FieldKind::ToMany { entity })
    }

    /// Mark the field optional.
    pub const fn optional(mut self) -> Self {
        self.presence = Presence::Optional;
        self
    }

    /// Store the field under `wire_name` instead of its field name.
    pub const fn renamed(mut self, wire_name: &'static str) -> Self {
        self.wire_name = wire_name;
        self
    }

    pub fn is_optional(&self) -> bool {
        self.presence == Presence::Optional
    }
}

/// Entity type name and persisted fields of a model type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelDeclaration {
    pub entity_type: &'static str,
    pub fields: &'static [FieldDecl],
}

impl ModelDeclaration {
    pub const fn new(entity_type: &'static str, fields: &'static [FieldDecl]) -> Self {
        Self {
            entity_type,
            fields,
        }
    }

    pub fn field(&self, field: &str) -> Option<&FieldDecl> {
        self.fields.iter().find(|decl| decl.field == field)
    }

    /// Store-side descriptor matching this declaration.
    ///
    /// Codable fields are declared as byte attributes.
    pub fn entity_descriptor(&self) -> EntityDescriptor {
        self.fields
            .iter()
            .fold(
                EntityDescriptor::new(self.entity_type),
                |descriptor, decl| match decl.kind {
                    FieldKind::Scalar(kind) => descriptor.attribute(decl.wire_name, kind),
                    FieldKind::Codable => descriptor.attribute(decl.wire_name, ValueKind::Bytes),
                    FieldKind::ToOne { entity } => descriptor.to_one(decl.wire_name, entity),
                    FieldKind::ToMany { entity } => descriptor.to_many(decl.wire_name, entity),
                },
            )
    }
}

/// A persistable model type.
///
/// ```ignore
/// impl EntityModel for Tag {
///     const DECLARATION: &'static ModelDeclaration = &ModelDeclaration::new(
///         "TagEntity",
///         &[
///             FieldDecl::scalar("id", ValueKind::Id),
///             FieldDecl::scalar("label", ValueKind::String),
///         ],
///     );
///
///     fn id(&self) -> EntityId { self.id }
///
///     fn encode_fields(&self, writer: &mut NodeWriter<'_>) {
///         writer.attribute("id", self.id).attribute("label", self.label.clone());
///     }
///
///     fn decode_fields(reader: &mut NodeReader<'_, '_>) -> Result<Self, DecodeError> {
///         Ok(Tag { id: reader.required("id")?, label: reader.required("label")? })
///     }
/// }
/// ```
pub trait EntityModel: Send + Sync + Sized + 'static {
    const DECLARATION: &'static ModelDeclaration;

    fn id(&self) -> EntityId;

    /// Write every declared field through `writer`.
    fn encode_fields(&self, writer: &mut NodeWriter<'_>);

    /// Build the model from the node behind `reader`.
    fn decode_fields(reader: &mut NodeReader<'_, '_>) -> Result<Self, DecodeError>;

    /// Runs once after `this` is decoded and before it becomes visible to
    /// other nodes of the traversal. Parents set their children's
    /// [`BackRef`]s here.
    fn wire(this: &Arc<Self>) {
        let _ = this;
    }

    /// Encode `self` and everything reachable from it into `ctx`.
    fn encode(&self, ctx: &mut EncodeContext) -> EntityId {
        ctx.encode_model(self)
    }

    /// Decode the node `id` from `ctx`'s graph.
    fn decode(id: EntityId, ctx: &mut DecodeContext<'_>) -> Result<Arc<Self>, DecodeError> {
        ctx.decode_model::<Self>(id)
    }
}

/// Write-once weak pointer from a child model to its parent.
///
/// Back-references are not persisted. The parent's [`EntityModel::wire`]
/// hook sets them after decode.
pub struct BackRef<T> {
    target: OnceLock<Weak<T>>,
}

impl<T> BackRef<T> {
    pub fn new() -> Self {
        Self {
            target: OnceLock::new(),
        }
    }

    /// Point at `target`. Returns `false` if already set.
    pub fn set(&self, target: &Arc<T>) -> bool {
        self.target.set(Arc::downgrade(target)).is_ok()
    }

    /// The parent, if set and still alive.
    pub fn get(&self) -> Option<Arc<T>> {
        self.target.get().and_then(Weak::upgrade)
    }

    pub fn is_set(&self) -> bool {
        self.target.get().is_some()
    }
}

impl<T> Default for BackRef<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for BackRef<T> {
    fn clone(&self) -> Self {
        let target = OnceLock::new();
        if let Some(weak) = self.target.get() {
            let _ = target.set(weak.clone());
        }
        Self { target }
    }
}

impl<T> fmt::Debug for BackRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.target.get() {
            None => "unset",
            Some(weak) if weak.strong_count() > 0 => "live",
            Some(_) => "dropped",
        };
        f.debug_tuple("BackRef").field(&state).finish()
    }
}
