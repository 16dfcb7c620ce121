//! Entity-Store: persistence collaborator for entity graphs
//!
//! This crate defines what the traversal core needs from a storage engine
//! and ships two engines that provide it.
//!
//! ## Key Components
//!
//! - `EntityStore`: fetch-by-type, fetch-by-id, atomic commit, delete
//! - `UnitOfWork`: upsert and field writes staged against the `StoreSchema`
//! - `StoreSchema`: declared attributes and relationships per entity type
//! - `MemoryEntityStore`: in-memory engine (see `fakes`)
//! - `SurrealEntityStore`: SurrealDB engine, one table per entity type

mod config;
mod error;
pub mod fakes;
pub mod migrations;
pub mod record;
pub mod schema;
pub mod storage_traits;
pub mod surreal_store;
mod unit_of_work;
pub mod value;

pub use config::{AuthScope, StoreConfig};
pub use error::{StateError, StorageError};
pub use record::{EntityRecord, RecordLink, RecordRef};
pub use schema::{
    Cardinality, EntityDescriptor, RelationshipDescriptor, StoreSchema, StoreSchemaBuilder,
};
pub use storage_traits::{ChangeSet, EntityStore, StorageResult};
pub use surreal_store::SurrealEntityStore;
pub use unit_of_work::UnitOfWork;
pub use value::{AttributeType, AttributeValue, EntityId, ValueKind};

/// Result type for backend setup operations
pub type Result<T> = std::result::Result<T, StateError>;
