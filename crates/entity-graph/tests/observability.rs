//! Observability tests for repository operations.
//!
//! These check that the structured events are emitted with the fields
//! log aggregation keys on.

mod support;

use std::sync::Arc;

use entity_graph::{
    emit_deleted, emit_fetched, emit_record_dropped, emit_save_failed, emit_saved,
    operation_span, Repository, TraversalSpan,
};
use entity_store::fakes::MemoryEntityStore;
use entity_store::{EntityId, EntityRecord};
use tokio::runtime::Handle;
use tracing::Instrument;
use tracing_test::traced_test;

use support::{category, item, schema, Category};

#[traced_test]
#[test]
fn emit_saved_logs_entity_type_and_count() {
    let id = EntityId::new();
    emit_saved("CategoryEntity", &id, 3);

    assert!(logs_contain("repository.saved"));
    assert!(logs_contain("CategoryEntity"));
    assert!(logs_contain(&id.to_string()));
}

#[traced_test]
#[test]
fn emit_fetched_logs_counts() {
    emit_fetched("ItemEntity", 4, 1);

    assert!(logs_contain("repository.fetched"));
    assert!(logs_contain("returned=4"));
    assert!(logs_contain("dropped=1"));
}

#[traced_test]
#[test]
fn emit_deleted_logs_removed() {
    emit_deleted("ItemEntity", &EntityId::new(), 0);

    assert!(logs_contain("repository.deleted"));
    assert!(logs_contain("removed=0"));
}

#[traced_test]
#[test]
fn failures_log_at_warn_level() {
    let error_msg = "commit rejected: table locked";
    emit_save_failed("CategoryEntity", &EntityId::new(), &error_msg);
    emit_record_dropped("CategoryEntity", &EntityId::new(), &"name is required");

    assert!(logs_contain("WARN"));
    assert!(logs_contain("repository.save_failed"));
    assert!(logs_contain("table locked"));
    assert!(logs_contain("repository.record_dropped"));
}

#[traced_test]
#[test]
fn traversal_span_finish_reports_nodes() {
    let span = TraversalSpan::enter("encode", "CategoryEntity");
    span.finish(7);

    assert!(logs_contain("traversal.finished"));
    assert!(logs_contain("nodes=7"));
}

#[traced_test]
#[tokio::test]
async fn operation_span_wraps_events() {
    async {
        emit_fetched("PersonEntity", 0, 0);
    }
    .instrument(operation_span("fetch_all", "PersonEntity"))
    .await;

    assert!(logs_contain("entity_graph.operation"));
    assert!(logs_contain("fetch_all"));
}

#[traced_test]
#[tokio::test]
async fn save_and_fetch_emit_lifecycle_events() {
    let store = Arc::new(MemoryEntityStore::new(schema()));
    let repo: Repository<Category, MemoryEntityStore> =
        Repository::new(Arc::clone(&store), Handle::current());

    repo.save(category("Shoes", vec![item("Boots", 89.0)]))
        .await
        .unwrap();
    store.insert_raw(EntityRecord::new("CategoryEntity", EntityId::new()));
    let all = repo.fetch_all().await.unwrap();
    assert_eq!(all.len(), 1);

    assert!(logs_contain("repository.saved"));
    assert!(logs_contain("records=2"));
    assert!(logs_contain("repository.record_dropped"));
    assert!(logs_contain("returned=1"));
}
