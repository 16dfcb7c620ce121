//! Error types for entity-store

use thiserror::Error;

use crate::value::ValueKind;

/// Errors raised while connecting to or preparing a backend
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),

    /// Configuration error
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::SchemaSetup(err.to_string())
    }
}

/// Errors returned by [`crate::EntityStore`] operations and the unit of work
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("unknown entity type: {entity_type}")]
    UnknownEntityType { entity_type: String },

    #[error("attribute {attribute} is not declared on {entity_type}")]
    UnknownAttribute {
        entity_type: String,
        attribute: String,
    },

    #[error("attribute {entity_type}.{attribute} expects {expected}, got {actual}")]
    AttributeKindMismatch {
        entity_type: String,
        attribute: String,
        expected: ValueKind,
        actual: ValueKind,
    },

    #[error("attribute {entity_type}.{attribute} is not a finite float")]
    NonFiniteFloat {
        entity_type: String,
        attribute: String,
    },

    #[error("relationship {relationship} is not declared on {entity_type}")]
    UnknownRelationship {
        entity_type: String,
        relationship: String,
    },

    #[error("relationship {entity_type}.{relationship} cardinality mismatch")]
    CardinalityMismatch {
        entity_type: String,
        relationship: String,
    },

    #[error("record {id} is not staged in this unit of work")]
    NotStaged { id: String },

    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    #[error("commit rejected: {0}")]
    CommitRejected(String),

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl From<surrealdb::Error> for StorageError {
    fn from(err: surrealdb::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
