//! UnitOfWork staging and validation tests.

use entity_store::fakes::MemoryEntityStore;
use entity_store::{
    AttributeValue, ChangeSet, EntityDescriptor, EntityId, EntityRecord, EntityStore, RecordLink,
    StorageError, StoreSchema, UnitOfWork, ValueKind,
};

fn store() -> MemoryEntityStore {
    let schema = StoreSchema::builder()
        .entity(
            EntityDescriptor::new("FolderEntity")
                .attribute("title", ValueKind::String)
                .attribute("pinned", ValueKind::Boolean)
                .attribute("quota", ValueKind::Float)
                .to_one("parent", "FolderEntity")
                .to_many("children", "FolderEntity"),
        )
        .build()
        .unwrap();
    MemoryEntityStore::new(schema)
}

#[tokio::test]
async fn upsert_stages_new_record_without_committing() {
    let store = store();
    let mut unit = UnitOfWork::new(&store);
    let id = EntityId::new();

    let record = unit.upsert("FolderEntity", id).await.unwrap();
    unit.set_attribute(&record, "title", AttributeValue::String("Inbox".into()))
        .unwrap();

    assert_eq!(unit.len(), 1);
    assert_eq!(store.record_count("FolderEntity"), 0);

    assert_eq!(unit.commit().await.unwrap(), 1);
    assert_eq!(store.record_count("FolderEntity"), 1);
}

#[tokio::test]
async fn upsert_stages_existing_record_in_place() {
    let store = store();
    let id = EntityId::new();
    let mut existing = EntityRecord::new("FolderEntity", id);
    existing
        .attributes
        .insert("pinned".into(), AttributeValue::Boolean(true));
    store.commit(ChangeSet::new(vec![existing])).await.unwrap();

    let mut unit = UnitOfWork::new(&store);
    let record = unit.upsert("FolderEntity", id).await.unwrap();
    unit.set_attribute(&record, "title", AttributeValue::String("Archive".into()))
        .unwrap();
    unit.commit().await.unwrap();

    let stored = store.fetch_by_id("FolderEntity", &id).await.unwrap().unwrap();
    assert_eq!(store.record_count("FolderEntity"), 1);
    assert_eq!(
        stored.attribute("pinned"),
        Some(&AttributeValue::Boolean(true))
    );
    assert_eq!(
        stored.attribute("title"),
        Some(&AttributeValue::String("Archive".into()))
    );
}

#[tokio::test]
async fn upsert_twice_returns_same_staged_record() {
    let store = store();
    let mut unit = UnitOfWork::new(&store);
    let id = EntityId::new();

    let first = unit.upsert("FolderEntity", id).await.unwrap();
    let second = unit.upsert("FolderEntity", id).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(unit.len(), 1);
}

#[tokio::test]
async fn upsert_unknown_entity_type_fails() {
    let store = store();
    let mut unit = UnitOfWork::new(&store);

    let err = unit.upsert("Nope", EntityId::new()).await.unwrap_err();
    assert!(matches!(err, StorageError::UnknownEntityType { .. }));
}

#[tokio::test]
async fn set_attribute_validates_against_schema() {
    let store = store();
    let mut unit = UnitOfWork::new(&store);
    let record = unit.upsert("FolderEntity", EntityId::new()).await.unwrap();

    let err = unit
        .set_attribute(&record, "colour", AttributeValue::String("red".into()))
        .unwrap_err();
    assert!(matches!(err, StorageError::UnknownAttribute { .. }));

    let err = unit
        .set_attribute(&record, "pinned", AttributeValue::String("yes".into()))
        .unwrap_err();
    assert!(matches!(
        err,
        StorageError::AttributeKindMismatch {
            expected: ValueKind::Boolean,
            actual: ValueKind::String,
            ..
        }
    ));
}

#[tokio::test]
async fn set_attribute_rejects_non_finite_floats() {
    let store = store();
    let mut unit = UnitOfWork::new(&store);
    let record = unit.upsert("FolderEntity", EntityId::new()).await.unwrap();

    for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
        let err = unit
            .set_attribute(&record, "quota", AttributeValue::Float(bad))
            .unwrap_err();
        assert!(matches!(err, StorageError::NonFiniteFloat { .. }));
    }
    unit.set_attribute(&record, "quota", AttributeValue::Float(0.5))
        .unwrap();
    assert_eq!(
        unit.staged(&record).unwrap().attribute("quota"),
        Some(&AttributeValue::Float(0.5))
    );
}

#[tokio::test]
async fn set_relationship_checks_cardinality() {
    let store = store();
    let mut unit = UnitOfWork::new(&store);
    let parent = unit.upsert("FolderEntity", EntityId::new()).await.unwrap();
    let child = unit.upsert("FolderEntity", EntityId::new()).await.unwrap();

    let err = unit
        .set_relationship(&child, "parent", RecordLink::Many(vec![parent.id]))
        .unwrap_err();
    assert!(matches!(err, StorageError::CardinalityMismatch { .. }));

    unit.set_relationship(&child, "parent", RecordLink::One(parent.id))
        .unwrap();
    unit.set_relationship(&parent, "children", RecordLink::Many(vec![child.id]))
        .unwrap();

    assert_eq!(
        unit.staged(&child).unwrap().link("parent"),
        Some(&RecordLink::One(parent.id))
    );
}

#[tokio::test]
async fn writes_to_unstaged_record_fail() {
    let store = store();
    let mut unit = UnitOfWork::new(&store);
    let stray = entity_store::RecordRef::new("FolderEntity", EntityId::new());

    let err = unit
        .set_attribute(&stray, "title", AttributeValue::String("x".into()))
        .unwrap_err();
    assert!(matches!(err, StorageError::NotStaged { .. }));
}

#[tokio::test]
async fn change_set_preserves_staging_order() {
    let store = store();
    let mut unit = UnitOfWork::new(&store);
    let ids: Vec<EntityId> = (0..4).map(|_| EntityId::new()).collect();
    for id in &ids {
        unit.upsert("FolderEntity", *id).await.unwrap();
    }

    let staged: Vec<EntityId> = unit
        .into_change_set()
        .records()
        .iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(staged, ids);
}
