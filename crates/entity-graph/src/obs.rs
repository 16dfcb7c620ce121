//! Structured observability hooks for repository operations.
//!
//! This module provides:
//! - Operation spans for spawned repository tasks via [`operation_span`]
//! - A `TraversalSpan` RAII guard for the synchronous encode and decode walks
//! - Emission functions for operation outcomes: fetched, saved, deleted, dropped
//!
//! Events are emitted at `info!` level; dropped records and failures at `warn!`.

use std::time::Instant;

use entity_store::EntityId;
use tracing::{info, warn};

/// Span attached to one spawned repository task.
pub fn operation_span(operation: &'static str, entity_type: &str) -> tracing::Span {
    tracing::info_span!("entity_graph.operation", operation, entity_type = %entity_type)
}

/// RAII guard that enters a traversal span and records how long it was held.
///
/// Not `Send`; hold it only around synchronous work.
///
/// # Example
///
/// ```ignore
/// let span = TraversalSpan::enter("encode", "CategoryEntity");
/// let root = model.encode(&mut ctx);
/// span.finish(ctx.graph().len());
/// ```
pub struct TraversalSpan {
    kind: &'static str,
    started: Instant,
    _span: tracing::span::EnteredSpan,
}

impl TraversalSpan {
    pub fn enter(kind: &'static str, entity_type: &str) -> Self {
        let span = tracing::debug_span!("entity_graph.traversal", kind, entity_type = %entity_type);
        Self {
            kind,
            started: Instant::now(),
            _span: span.entered(),
        }
    }

    /// Close the span, logging how many nodes the walk touched.
    pub fn finish(self, nodes: usize) {
        tracing::debug!(
            event = "traversal.finished",
            kind = self.kind,
            nodes = nodes,
            duration_us = u64::try_from(self.started.elapsed().as_micros()).unwrap_or(u64::MAX),
        );
    }
}

/// Emit event: fetch completed with returned and dropped counts.
pub fn emit_fetched(entity_type: &str, returned: usize, dropped: usize) {
    info!(
        event = "repository.fetched",
        entity_type = %entity_type,
        returned = returned,
        dropped = dropped,
    );
}

/// Emit event: a model graph was committed.
pub fn emit_saved(entity_type: &str, id: &EntityId, records: usize) {
    info!(
        event = "repository.saved",
        entity_type = %entity_type,
        id = %id,
        records = records,
    );
}

/// Emit event: a save did not commit (warning level).
pub fn emit_save_failed(entity_type: &str, id: &EntityId, error: &dyn std::fmt::Display) {
    warn!(
        event = "repository.save_failed",
        entity_type = %entity_type,
        id = %id,
        error = %error,
    );
}

/// Emit event: delete completed.
pub fn emit_deleted(entity_type: &str, id: &EntityId, removed: u64) {
    info!(
        event = "repository.deleted",
        entity_type = %entity_type,
        id = %id,
        removed = removed,
    );
}

/// Emit event: a stored record could not be turned into a model (warning level).
pub fn emit_record_dropped(entity_type: &str, id: &EntityId, error: &dyn std::fmt::Display) {
    warn!(
        event = "repository.record_dropped",
        entity_type = %entity_type,
        id = %id,
        error = %error,
    );
}
