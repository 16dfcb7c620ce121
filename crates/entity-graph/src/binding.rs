//! Store binding: node graph ↔ store records
//!
//! [`GraphWriter`] walks a [`NodeGraph`] from a root and stages one record
//! per node in a [`UnitOfWork`]; the caller commits the unit once.
//! [`GraphReader`] walks stored records and rebuilds a [`NodeGraph`],
//! following declared relationships by fetching their targets.
//!
//! Both walks register an id before following its relationships, so shared
//! children are written or read once and cycles terminate. Recursion goes
//! through boxed futures.

use std::collections::{BTreeMap, HashMap};

use entity_store::{
    Cardinality, EntityId, EntityRecord, EntityStore, RecordLink, RecordRef, StorageResult,
    UnitOfWork,
};
use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, trace, warn};

use crate::error::BindingError;
use crate::representation::{GraphNode, NodeGraph};

/// Stages the records for one node graph.
pub struct GraphWriter<'g, 's, S: EntityStore + ?Sized> {
    graph: &'g NodeGraph,
    unit: UnitOfWork<'s, S>,
    visited: HashMap<EntityId, RecordRef>,
}

impl<'g, 's, S: EntityStore + ?Sized> GraphWriter<'g, 's, S> {
    pub fn new(store: &'s S, graph: &'g NodeGraph) -> Self {
        Self {
            graph,
            unit: UnitOfWork::new(store),
            visited: HashMap::new(),
        }
    }

    /// Stage `root` and everything reachable from it.
    pub async fn write(&mut self, root: EntityId) -> Result<RecordRef, BindingError> {
        if !self.graph.contains(&root) {
            return Err(BindingError::MissingRoot { id: root });
        }
        match self.write_node(root).await? {
            Some(record) => Ok(record),
            None => Err(BindingError::MissingRoot { id: root }),
        }
    }

    /// Number of records staged so far.
    pub fn staged(&self) -> usize {
        self.unit.len()
    }

    pub fn into_unit(self) -> UnitOfWork<'s, S> {
        self.unit
    }

    fn write_node(&mut self, id: EntityId) -> BoxFuture<'_, StorageResult<Option<RecordRef>>> {
        async move {
            if let Some(record) = self.visited.get(&id) {
                trace!(record = %record, "already staged");
                return Ok(Some(record.clone()));
            }
            let graph = self.graph;
            let Some(node) = graph.node(&id) else {
                warn!(%id, "relationship points at a node outside the graph; skipping");
                return Ok(None);
            };

            let record = self.unit.upsert(node.entity_type(), id).await?;
            self.visited.insert(id, record.clone());
            debug!(record = %record, "staging node");

            for (name, value) in &node.attributes {
                self.unit.set_attribute(&record, name, value.clone())?;
            }

            for (name, child) in &node.to_one {
                let Some(child) = self.write_node(*child).await? else {
                    continue;
                };
                if self.declares(&record, name, &child.entity_type)? {
                    self.unit
                        .set_relationship(&record, name, RecordLink::One(child.id))?;
                }
            }

            for (name, child_ids) in &node.to_many {
                let mut children = Vec::with_capacity(child_ids.len());
                for child in child_ids {
                    if let Some(child) = self.write_node(*child).await? {
                        children.push(child);
                    }
                }
                let Some(first) = children.first() else {
                    continue;
                };
                if self.declares(&record, name, &first.entity_type)? {
                    let ids = children.iter().map(|child| child.id).collect();
                    self.unit
                        .set_relationship(&record, name, RecordLink::Many(ids))?;
                }
            }

            Ok(Some(record))
        }
        .boxed()
    }

    /// Whether `record`'s entity type declares `name` towards `target`.
    fn declares(&self, record: &RecordRef, name: &str, target: &str) -> StorageResult<bool> {
        let descriptor = self.unit.store().schema().require(&record.entity_type)?;
        if descriptor.relationship_to(name, target).is_some() {
            return Ok(true);
        }
        warn!(
            record = %record,
            relationship = name,
            target,
            "no declared relationship matches; skipping"
        );
        Ok(false)
    }
}

/// Stage `graph` from `root` in a fresh unit of work over `store`.
pub async fn write_graph<'s, S: EntityStore + ?Sized>(
    store: &'s S,
    graph: &NodeGraph,
    root: EntityId,
) -> Result<(RecordRef, UnitOfWork<'s, S>), BindingError> {
    let mut writer = GraphWriter::new(store, graph);
    let record = writer.write(root).await?;
    Ok((record, writer.into_unit()))
}

/// Rebuilds a node graph from stored records.
///
/// One reader may read several roots; nodes reachable from more than one
/// of them are read once.
pub struct GraphReader<'s, S: EntityStore + ?Sized> {
    store: &'s S,
    graph: NodeGraph,
}

impl<'s, S: EntityStore + ?Sized> GraphReader<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self {
            store,
            graph: NodeGraph::new(),
        }
    }

    /// Read `record` and everything reachable from it. Returns the node id.
    pub async fn read(&mut self, record: EntityRecord) -> StorageResult<EntityId> {
        self.read_record(record).await
    }

    pub fn graph(&self) -> &NodeGraph {
        &self.graph
    }

    pub fn into_graph(self) -> NodeGraph {
        self.graph
    }

    fn read_record(&mut self, record: EntityRecord) -> BoxFuture<'_, StorageResult<EntityId>> {
        async move {
            let id = record.id;
            if self.graph.contains(&id) {
                return Ok(id);
            }

            let store = self.store;
            let descriptor = store.schema().require(&record.entity_type)?;
            let mut node = GraphNode::new(id, record.entity_type.as_str());
            for (name, _) in descriptor.attributes() {
                if let Some(value) = record.attributes.get(name) {
                    node.attributes.insert(name.to_string(), value.clone());
                }
            }
            self.graph.insert(node);
            debug!(entity_type = %record.entity_type, %id, "reading record");

            let mut to_one = BTreeMap::new();
            let mut to_many = BTreeMap::new();
            for relationship in descriptor.relationships() {
                // Empty collections are never written, so a declared
                // to-many without a link reads as empty.
                let Some(link) = record.relationships.get(&relationship.name) else {
                    if relationship.cardinality == Cardinality::ToMany {
                        to_many.insert(relationship.name.clone(), Vec::new());
                    }
                    continue;
                };
                match (relationship.cardinality, link) {
                    (Cardinality::ToOne, RecordLink::One(target)) => {
                        if let Some(child) = self.read_link(&relationship.target, *target).await? {
                            to_one.insert(relationship.name.clone(), child);
                        }
                    }
                    (Cardinality::ToMany, RecordLink::Many(targets)) => {
                        let mut children = Vec::with_capacity(targets.len());
                        for target in targets {
                            let child = self.read_link(&relationship.target, *target).await?;
                            children.extend(child);
                        }
                        to_many.insert(relationship.name.clone(), children);
                    }
                    _ => warn!(
                        entity_type = %record.entity_type,
                        %id,
                        relationship = %relationship.name,
                        "stored link does not match declared cardinality; skipping"
                    ),
                }
            }

            if let Some(node) = self.graph.node_mut(&id) {
                node.to_one = to_one;
                node.to_many = to_many;
            }
            Ok(id)
        }
        .boxed()
    }

    /// Resolve one stored link. A dangling link reads as `None`.
    fn read_link<'a>(
        &'a mut self,
        entity_type: &'a str,
        id: EntityId,
    ) -> BoxFuture<'a, StorageResult<Option<EntityId>>> {
        async move {
            if self.graph.contains(&id) {
                return Ok(Some(id));
            }
            match self.store.fetch_by_id(entity_type, &id).await? {
                Some(record) => self.read_record(record).await.map(Some),
                None => {
                    warn!(entity_type, %id, "dangling link; skipping");
                    Ok(None)
                }
            }
        }
        .boxed()
    }
}

/// Rebuild the node graph reachable from `record`.
pub async fn read_graph<S: EntityStore + ?Sized>(
    store: &S,
    record: EntityRecord,
) -> StorageResult<(EntityId, NodeGraph)> {
    let mut reader = GraphReader::new(store);
    let root = reader.read(record).await?;
    Ok((root, reader.into_graph()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use entity_store::fakes::MemoryEntityStore;
    use entity_store::{AttributeValue, EntityDescriptor, StoreSchema, ValueKind};

    fn store() -> MemoryEntityStore {
        let schema = StoreSchema::builder()
            .entity(
                EntityDescriptor::new("ShelfEntity")
                    .attribute("label", ValueKind::String)
                    .to_one("pinned", "BookEntity")
                    .to_many("books", "BookEntity"),
            )
            .entity(EntityDescriptor::new("BookEntity").attribute("title", ValueKind::String))
            .entity(EntityDescriptor::new("BinEntity").attribute("label", ValueKind::String))
            .build()
            .unwrap();
        MemoryEntityStore::new(schema)
    }

    fn book(title: &str) -> GraphNode {
        GraphNode::new(EntityId::new(), "BookEntity").with_attribute("title", title.to_string())
    }

    fn shelf() -> GraphNode {
        GraphNode::new(EntityId::new(), "ShelfEntity").with_attribute("label", "Fiction".to_string())
    }

    #[tokio::test]
    async fn shared_child_is_staged_once() {
        let store = store();
        let dune = book("Dune");
        let emma = book("Emma");
        let root = shelf()
            .with_to_one("pinned", dune.id())
            .with_to_many("books", [dune.id(), emma.id()]);
        let (root_id, dune_id, emma_id) = (root.id(), dune.id(), emma.id());
        let mut graph = NodeGraph::new();
        graph.insert(root);
        graph.insert(dune);
        graph.insert(emma);

        let mut writer = GraphWriter::new(&store, &graph);
        let record = writer.write(root_id).await.unwrap();
        assert_eq!(writer.staged(), 3);

        let unit = writer.into_unit();
        let staged = unit.staged(&record).unwrap();
        assert_eq!(staged.link("pinned"), Some(&RecordLink::One(dune_id)));
        assert_eq!(
            staged.link("books"),
            Some(&RecordLink::Many(vec![dune_id, emma_id]))
        );
        assert_eq!(unit.commit().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn root_outside_the_graph_is_rejected() {
        let store = store();
        let graph = NodeGraph::new();
        let missing = EntityId::new();

        let err = write_graph(&store, &graph, missing).await.err().unwrap();
        assert!(matches!(err, BindingError::MissingRoot { id } if id == missing));
    }

    #[tokio::test]
    async fn child_outside_the_graph_is_skipped() {
        let store = store();
        let dune = book("Dune");
        let root = shelf().with_to_many("books", [dune.id(), EntityId::new()]);
        let (root_id, dune_id) = (root.id(), dune.id());
        let mut graph = NodeGraph::new();
        graph.insert(root);
        graph.insert(dune);

        let (record, unit) = write_graph(&store, &graph, root_id).await.unwrap();
        assert_eq!(unit.len(), 2);
        assert_eq!(
            unit.staged(&record).unwrap().link("books"),
            Some(&RecordLink::Many(vec![dune_id]))
        );
    }

    #[tokio::test]
    async fn relationship_towards_wrong_entity_type_is_skipped() {
        let store = store();
        let bin = GraphNode::new(EntityId::new(), "BinEntity")
            .with_attribute("label", "Returns".to_string());
        let root = shelf().with_to_one("pinned", bin.id());
        let root_id = root.id();
        let mut graph = NodeGraph::new();
        graph.insert(root);
        graph.insert(bin);

        let (record, unit) = write_graph(&store, &graph, root_id).await.unwrap();
        assert_eq!(unit.len(), 2);
        assert!(unit.staged(&record).unwrap().link("pinned").is_none());
    }

    #[tokio::test]
    async fn empty_to_many_is_not_written() {
        let store = store();
        let root = shelf()
            .with_to_many("books", Vec::new())
            .with_to_one("pinned", EntityId::new());
        let root_id = root.id();
        let mut graph = NodeGraph::new();
        graph.insert(root);

        let (_, unit) = write_graph(&store, &graph, root_id).await.unwrap();
        unit.commit().await.unwrap();

        let stored = store
            .fetch_by_id("ShelfEntity", &root_id)
            .await
            .unwrap()
            .unwrap();
        assert!(stored.relationships.is_empty());
        assert_eq!(
            stored.attribute("label"),
            Some(&AttributeValue::String("Fiction".into()))
        );
    }

    #[tokio::test]
    async fn read_graph_follows_links_and_reads_shared_targets_once() {
        let store = store();
        let dune = book("Dune");
        let root = shelf()
            .with_to_one("pinned", dune.id())
            .with_to_many("books", [dune.id()]);
        let (root_id, dune_id) = (root.id(), dune.id());
        let mut graph = NodeGraph::new();
        graph.insert(root);
        graph.insert(dune);
        let (record, unit) = write_graph(&store, &graph, root_id).await.unwrap();
        unit.commit().await.unwrap();

        let stored = store
            .fetch_by_id(&record.entity_type, &record.id)
            .await
            .unwrap()
            .unwrap();
        let (read_root, read) = read_graph(&store, stored).await.unwrap();
        assert_eq!(read_root, root_id);
        assert_eq!(read, graph);
    }

    #[tokio::test]
    async fn stored_link_with_wrong_cardinality_is_skipped() {
        let store = store();
        let dune = book("Dune");
        let dune_id = dune.id();
        let mut dune_record = EntityRecord::new("BookEntity", dune_id);
        dune_record
            .attributes
            .insert("title".into(), AttributeValue::String("Dune".into()));
        store.insert_raw(dune_record);

        let mut shelf_record = EntityRecord::new("ShelfEntity", EntityId::new());
        shelf_record
            .relationships
            .insert("pinned".into(), RecordLink::Many(vec![dune_id]));
        shelf_record
            .relationships
            .insert("books".into(), RecordLink::One(dune_id));

        let mut reader = GraphReader::new(&store);
        let root = reader.read(shelf_record).await.unwrap();
        let node = reader.graph().node(&root).unwrap();
        assert!(node.to_one.is_empty());
        assert!(node.to_many.is_empty());
        assert_eq!(reader.into_graph().len(), 1);
    }

    #[tokio::test]
    async fn declared_to_many_without_link_reads_as_empty() {
        let store = store();
        let record = EntityRecord::new("ShelfEntity", EntityId::new());

        let (root, graph) = read_graph(&store, record).await.unwrap();
        let node = graph.node(&root).unwrap();
        assert_eq!(node.to_many.get("books"), Some(&Vec::new()));
        assert!(node.to_one.is_empty());
    }
}
