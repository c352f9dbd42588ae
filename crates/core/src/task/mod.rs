//! Hierarchical task tree payload
//!
//! Task nodes are JSON objects whose shape is constrained by the allow-list in
//! [`schema`]. They are kept as raw field maps (rather than a fixed struct) so
//! that structural validation can see exactly what a writer put there,
//! including unknown or mistyped fields.
//!
//! The tree is an ordered arena of nodes. `Clone` is a full structural copy,
//! which is what the mutation guard uses for snapshot and rollback.

pub mod schema;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::HashSet;

pub use schema::{
    field_spec, is_allowed_field, is_always_writable, validate_node, FieldKind, FieldSpec,
    ALWAYS_WRITABLE, TASK_NODE_FIELDS,
};

/// A single task node
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskNode(Map<String, JsonValue>);

impl TaskNode {
    /// Create a node with the two required fields
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert("id".to_string(), JsonValue::String(id.into()));
        fields.insert("title".to_string(), JsonValue::String(title.into()));
        TaskNode(fields)
    }

    /// Wrap an arbitrary field map (no validation)
    pub fn from_fields(fields: Map<String, JsonValue>) -> Self {
        TaskNode(fields)
    }

    /// Builder-style field setter
    pub fn with(mut self, field: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    /// Set a field, returning the previous value
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<JsonValue>) -> Option<JsonValue> {
        self.0.insert(field.into(), value.into())
    }

    /// Remove a field
    pub fn remove(&mut self, field: &str) -> Option<JsonValue> {
        self.0.remove(field)
    }

    /// Raw field value
    pub fn get(&self, field: &str) -> Option<&JsonValue> {
        self.0.get(field)
    }

    /// All fields
    pub fn fields(&self) -> &Map<String, JsonValue> {
        &self.0
    }

    /// Names of the fields present on this node
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Node id, when present and a string
    pub fn id(&self) -> Option<&str> {
        self.0.get("id").and_then(JsonValue::as_str)
    }

    /// Node title, when present and a string
    pub fn title(&self) -> Option<&str> {
        self.0.get("title").and_then(JsonValue::as_str)
    }

    /// Prerequisite ids (non-string entries are skipped)
    pub fn prerequisites(&self) -> Vec<&str> {
        self.0
            .get("prerequisites")
            .and_then(JsonValue::as_array)
            .map(|items| items.iter().filter_map(JsonValue::as_str).collect())
            .unwrap_or_default()
    }

    /// True if the node is marked completed
    pub fn is_completed(&self) -> bool {
        self.0
            .get("completed")
            .and_then(JsonValue::as_bool)
            .unwrap_or(false)
    }
}

/// The task tree: a goal plus an ordered arena of nodes
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TaskTree {
    /// Goal the tree decomposes
    #[serde(default)]
    pub goal: String,
    #[serde(default)]
    nodes: Vec<TaskNode>,
}

impl TaskTree {
    /// Create an empty tree for a goal
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            nodes: Vec::new(),
        }
    }

    /// Nodes in insertion order
    pub fn nodes(&self) -> &[TaskNode] {
        &self.nodes
    }

    /// Mutable access to the node arena
    pub fn nodes_mut(&mut self) -> &mut Vec<TaskNode> {
        &mut self.nodes
    }

    /// Append a node
    pub fn push(&mut self, node: TaskNode) {
        self.nodes.push(node);
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if the tree has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Find a node by id
    pub fn get(&self, id: &str) -> Option<&TaskNode> {
        self.nodes.iter().find(|n| n.id() == Some(id))
    }

    /// Find a node by id for modification
    pub fn get_mut(&mut self, id: &str) -> Option<&mut TaskNode> {
        self.nodes.iter_mut().find(|n| n.id() == Some(id))
    }

    /// True if a node with this id exists
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Ids of all nodes that have one
    pub fn node_ids(&self) -> HashSet<&str> {
        self.nodes.iter().filter_map(TaskNode::id).collect()
    }

    /// Mark a node completed; returns false if no such node exists
    pub fn mark_completed(&mut self, id: &str) -> bool {
        match self.get_mut(id) {
            Some(node) => {
                node.set("completed", true);
                true
            }
            None => false,
        }
    }

    /// Nodes present in `self` but not in `before`.
    ///
    /// A node is new when its id was not present before. Nodes without a
    /// usable id are new unless an identical id-less node existed before.
    pub fn new_nodes_since<'a>(&'a self, before: &TaskTree) -> Vec<&'a TaskNode> {
        let known = before.node_ids();
        let mut idless_before: Vec<&TaskNode> =
            before.nodes.iter().filter(|n| n.id().is_none()).collect();

        self.nodes
            .iter()
            .filter(|node| match node.id() {
                Some(id) => !known.contains(id),
                None => match idless_before.iter().position(|old| *old == *node) {
                    Some(pos) => {
                        idless_before.swap_remove(pos);
                        false
                    }
                    None => true,
                },
            })
            .collect()
    }
}
