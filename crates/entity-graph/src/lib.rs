//! Entity-Graph: cycle-safe object graph persistence
//!
//! Domain models are encoded into a store-agnostic [`NodeGraph`], the graph
//! is bound to records of an [`entity_store::EntityStore`], and stored
//! records are read back into nodes and decoded into models. Each walk
//! registers an id before recursing, so shared subgraphs are processed once
//! and reference cycles terminate.
//!
//! ## Key Components
//!
//! - `EntityModel`: per-model declaration plus field encode/decode
//! - `EncodeContext` / `DecodeContext`: the object ↔ node traversals
//! - `GraphWriter` / `GraphReader`: the node ↔ record traversals
//! - `Repository`: spawned fetch, save and delete returning `Pending`

pub mod binding;
pub mod decode;
pub mod encode;
mod error;
pub mod model;
pub mod obs;
pub mod repository;
pub mod representation;
pub mod telemetry;

pub use binding::{read_graph, write_graph, GraphReader, GraphWriter};
pub use decode::{DecodeContext, NodeReader};
pub use encode::{EncodeContext, NodeWriter};
pub use error::{BindingError, DecodeError, RepositoryError, RepositoryResult};
pub use model::{BackRef, EntityModel, FieldDecl, FieldKind, ModelDeclaration, Presence};
pub use obs::{
    emit_deleted, emit_fetched, emit_record_dropped, emit_save_failed, emit_saved,
    operation_span, TraversalSpan,
};
pub use repository::{Pending, Repository, RepositoryConfig};
pub use representation::{GraphNode, NodeGraph};
