//! Error taxonomy for graph traversals and the repository facade.

use entity_store::{EntityId, StorageError, ValueKind};

/// Why a node did not produce a model.
///
/// Decode-shape errors abort the subtree they occur in and propagate as
/// "no model"; a to-many relationship swallows them per child.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("node {id} is not present in the graph")]
    MissingNode { id: EntityId },

    #[error("node {id} has entity type {found}, expected {expected}")]
    EntityTypeMismatch {
        id: EntityId,
        expected: String,
        found: String,
    },

    #[error("{entity_type}.{attribute} is required but absent")]
    MissingAttribute {
        entity_type: String,
        attribute: String,
    },

    #[error("{entity_type}.{attribute} expected {expected}, found {found}")]
    AttributeType {
        entity_type: String,
        attribute: String,
        expected: ValueKind,
        found: ValueKind,
    },

    #[error("{entity_type}.{relationship} is required but absent")]
    MissingRelationship {
        entity_type: String,
        relationship: String,
    },

    #[error("{entity_type}.{relationship} -> {child}: {source}")]
    RelationshipFailed {
        entity_type: String,
        relationship: String,
        child: EntityId,
        #[source]
        source: Box<DecodeError>,
    },

    /// The id is reserved further up the current traversal; its value is
    /// not available yet.
    #[error("{id} is still being decoded")]
    InProgress { id: EntityId },

    #[error("{id} already failed to decode in this traversal")]
    PreviouslyFailed { id: EntityId },

    #[error("{id} was decoded as a model other than {expected}")]
    TypeMismatch { id: EntityId, expected: String },

    /// The model read a field its declaration does not list with that
    /// kind and presence.
    #[error("{entity_type}.{field} is not declared as {expected}")]
    Undeclared {
        entity_type: String,
        field: String,
        expected: &'static str,
    },

    #[error("{entity_type}.{field}: {message}")]
    Codable {
        entity_type: String,
        field: String,
        message: String,
    },
}

/// Failure of the node-to-record walk.
#[derive(Debug, thiserror::Error)]
pub enum BindingError {
    #[error("root node {id} is not present in the graph")]
    MissingRoot { id: EntityId },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Failure reported through a repository operation's result.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("binding error: {0}")]
    Binding(#[from] BindingError),

    #[error("repository task failed: {0}")]
    TaskFailed(String),
}

/// Result type for repository operations.
pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;
