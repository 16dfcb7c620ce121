//! Store-agnostic graph representation
//!
//! A [`GraphNode`] is one entity instance: identity, entity type tag, scalar
//! attributes and named relationships to child nodes. Children are referenced
//! by identity into the owning [`NodeGraph`], which holds at most one node per
//! id. The graph is the transport format between the model traversals and the
//! store binding; it is built fresh per operation and never cached.

use std::collections::{BTreeMap, HashMap};

use entity_store::{AttributeType, AttributeValue, EntityId};
use serde::{Deserialize, Serialize};

/// One entity instance in generic form.
///
/// `id` and `entity_type` are fixed at construction. Attributes and
/// relationships are filled in afterwards, because a node is registered in
/// its graph before its children are discovered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    id: EntityId,
    entity_type: String,
    /// Scalar fields by wire name. Absent optional fields are absent keys.
    pub attributes: BTreeMap<String, AttributeValue>,
    /// Relationship name to exactly one child.
    pub to_one: BTreeMap<String, EntityId>,
    /// Relationship name to a collection of children. Order carries no
    /// meaning.
    pub to_many: BTreeMap<String, Vec<EntityId>>,
}

impl GraphNode {
    /// Empty shell node.
    pub fn new(id: EntityId, entity_type: impl Into<String>) -> Self {
        Self {
            id,
            entity_type: entity_type.into(),
            attributes: BTreeMap::new(),
            to_one: BTreeMap::new(),
            to_many: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl AttributeType) -> Self {
        self.attributes.insert(name.into(), value.into_value());
        self
    }

    pub fn with_to_one(mut self, name: impl Into<String>, child: EntityId) -> Self {
        self.to_one.insert(name.into(), child);
        self
    }

    pub fn with_to_many(
        mut self,
        name: impl Into<String>,
        children: impl IntoIterator<Item = EntityId>,
    ) -> Self {
        self.to_many
            .insert(name.into(), children.into_iter().collect());
        self
    }
}

/// Arena of graph nodes keyed by identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeGraph {
    nodes: HashMap<EntityId, GraphNode>,
}

impl NodeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `node` unless a node with its id already exists.
    ///
    /// Returns `false` (and keeps the existing node) on a duplicate id.
    pub fn insert(&mut self, node: GraphNode) -> bool {
        match self.nodes.entry(node.id) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(node);
                true
            }
        }
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node(&self, id: &EntityId) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: &EntityId) -> Option<&mut GraphNode> {
        self.nodes.get_mut(id)
    }

    /// The child behind `node`'s to-one relationship `name`.
    pub fn to_one(&self, node: &GraphNode, name: &str) -> Option<&GraphNode> {
        node.to_one.get(name).and_then(|id| self.nodes.get(id))
    }

    /// The children behind `node`'s to-many relationship `name`, or `None`
    /// if the relationship key is absent. Dangling references are skipped.
    pub fn to_many(&self, node: &GraphNode, name: &str) -> Option<Vec<&GraphNode>> {
        node.to_many
            .get(name)
            .map(|ids| ids.iter().filter_map(|id| self.nodes.get(id)).collect())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }
}
