//! Arena-backed document graph.
//!
//! Parsed documents are stored as nodes in one [`Graph`] per operation. A
//! container refers to its children by [`NodeId`], so two positions can hold
//! the same node and a child slot can point back at an ancestor. That is how
//! dereferencing shares targets by identity and keeps circular schemas as real
//! cycles instead of infinite trees.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde_json::{Map, Number, Value};

use crate::error::{Error, Result};
use crate::pointer;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Binary(Vec<u8>),
    Array(Vec<NodeId>),
    Object(IndexMap<String, NodeId>),
}

#[derive(Clone, Debug, Default)]
pub struct Graph {
    nodes: Vec<Node>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn add(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    pub fn null(&mut self) -> NodeId {
        self.add(Node::Null)
    }

    pub fn string(&mut self, value: impl Into<String>) -> NodeId {
        self.add(Node::String(value.into()))
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    /// Copy a JSON value into the arena as a fresh tree.
    pub fn import(&mut self, value: &Value) -> NodeId {
        let node = match value {
            Value::Null => Node::Null,
            Value::Bool(b) => Node::Bool(*b),
            Value::Number(n) => Node::Number(n.clone()),
            Value::String(s) => Node::String(s.clone()),
            Value::Array(items) => {
                let children = items.iter().map(|item| self.import(item)).collect();
                Node::Array(children)
            }
            Value::Object(map) => {
                let mut children = IndexMap::with_capacity(map.len());
                for (key, item) in map {
                    let child = self.import(item);
                    children.insert(key.clone(), child);
                }
                Node::Object(children)
            }
        };
        self.add(node)
    }

    pub fn is_object(&self, id: NodeId) -> bool {
        matches!(self.node(id), Node::Object(_))
    }

    pub fn is_container(&self, id: NodeId) -> bool {
        matches!(self.node(id), Node::Object(_) | Node::Array(_))
    }

    pub fn as_str(&self, id: NodeId) -> Option<&str> {
        match self.node(id) {
            Node::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self, id: NodeId) -> Option<&IndexMap<String, NodeId>> {
        match self.node(id) {
            Node::Object(map) => Some(map),
            _ => None,
        }
    }

    /// The `$ref` string of an object node, if it has one.
    pub fn ref_value(&self, id: NodeId) -> Option<&str> {
        self.as_object(id)
            .and_then(|map| map.get("$ref"))
            .and_then(|child| self.as_str(*child))
    }

    /// Child by object key or decimal array index.
    pub fn get(&self, id: NodeId, key: &str) -> Option<NodeId> {
        match self.node(id) {
            Node::Object(map) => map.get(key).copied(),
            Node::Array(items) => parse_index(key).and_then(|index| items.get(index).copied()),
            _ => None,
        }
    }

    /// Replace or add the child at `key`. Arrays accept existing indices and
    /// `len` (append). Returns false when `id` cannot hold `key`.
    pub fn set_child(&mut self, id: NodeId, key: &str, child: NodeId) -> bool {
        match self.node_mut(id) {
            Node::Object(map) => {
                map.insert(key.to_string(), child);
                true
            }
            Node::Array(items) => match parse_index(key) {
                Some(index) if index < items.len() => {
                    items[index] = child;
                    true
                }
                Some(index) if index == items.len() => {
                    items.push(child);
                    true
                }
                _ if key == "-" => {
                    items.push(child);
                    true
                }
                _ => false,
            },
            _ => false,
        }
    }

    /// Keys of a container in order: object keys, or array indices as strings.
    pub fn children(&self, id: NodeId) -> Vec<(String, NodeId)> {
        match self.node(id) {
            Node::Object(map) => map.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            Node::Array(items) => items
                .iter()
                .enumerate()
                .map(|(index, v)| (index.to_string(), *v))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// New node with the same content; children are shared, not copied.
    pub fn shallow_copy(&mut self, id: NodeId) -> NodeId {
        let node = self.node(id).clone();
        self.add(node)
    }

    /// Whether a parsed value counts as empty: nothing, an empty object or
    /// array, blank text, or zero bytes.
    pub fn is_empty_value(&self, id: NodeId) -> bool {
        match self.node(id) {
            Node::Null => true,
            Node::Object(map) => map.is_empty(),
            Node::Array(items) => items.is_empty(),
            Node::String(s) => s.trim().is_empty(),
            Node::Binary(bytes) => bytes.is_empty(),
            Node::Bool(_) | Node::Number(_) => false,
        }
    }

    /// Whether a cycle is reachable from `id`.
    pub fn is_cyclic(&self, id: NodeId) -> bool {
        fn visit(graph: &Graph, id: NodeId, active: &mut HashSet<NodeId>, done: &mut HashSet<NodeId>) -> bool {
            if active.contains(&id) {
                return true;
            }
            if done.contains(&id) {
                return false;
            }
            active.insert(id);
            for (_, child) in graph.children(id) {
                if visit(graph, child, active, done) {
                    return true;
                }
            }
            active.remove(&id);
            done.insert(id);
            false
        }
        visit(self, id, &mut HashSet::new(), &mut HashSet::new())
    }

    /// Export a node as a JSON tree. Shared nodes are written once per
    /// position; a cycle cannot be written and fails with the pointer where
    /// the cycle closes. Binary content becomes an array of byte values.
    pub fn to_value(&self, id: NodeId) -> Result<Value> {
        let mut active = HashSet::new();
        let mut tokens = Vec::new();
        self.export(id, &mut active, &mut tokens)
    }

    fn export(&self, id: NodeId, active: &mut HashSet<NodeId>, tokens: &mut Vec<String>) -> Result<Value> {
        if active.contains(&id) {
            return Err(Error::Circular {
                path: pointer::format_pointer(tokens),
            });
        }
        let value = match self.node(id) {
            Node::Null => Value::Null,
            Node::Bool(b) => Value::Bool(*b),
            Node::Number(n) => Value::Number(n.clone()),
            Node::String(s) => Value::String(s.clone()),
            Node::Binary(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
            Node::Array(_) | Node::Object(_) => {
                active.insert(id);
                let is_array = matches!(self.node(id), Node::Array(_));
                let mut array = Vec::new();
                let mut object = Map::new();
                for (key, child) in self.children(id) {
                    tokens.push(key.clone());
                    let exported = self.export(child, active, tokens);
                    tokens.pop();
                    let exported = exported?;
                    if is_array {
                        array.push(exported);
                    } else {
                        object.insert(key, exported);
                    }
                }
                active.remove(&id);
                if is_array {
                    Value::Array(array)
                } else {
                    Value::Object(object)
                }
            }
        };
        Ok(value)
    }
}

/// Decimal array index without sign or leading zeros.
pub(crate) fn parse_index(token: &str) -> Option<usize> {
    if token.is_empty() || (token.len() > 1 && token.starts_with('0')) {
        return None;
    }
    if !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn import_then_export_preserves_order() {
        let mut graph = Graph::new();
        let value = json!({"b": 1, "a": [true, null, "x"], "c": {"d": 1.5}});
        let id = graph.import(&value);
        assert_eq!(graph.to_value(id).unwrap(), value);
        let keys: Vec<String> = graph.children(id).into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
    }

    #[test]
    fn cycle_is_detected_on_export() {
        let mut graph = Graph::new();
        let id = graph.import(&json!({"child": {"name": "x"}}));
        let child = graph.get(id, "child").unwrap();
        assert!(graph.set_child(child, "parent", id));
        assert!(graph.is_cyclic(id));
        let err = graph.to_value(id).unwrap_err();
        assert_eq!(err.to_string(), "Circular $ref pointer found at #/child/parent");
    }

    #[test]
    fn shared_nodes_export_twice() {
        let mut graph = Graph::new();
        let id = graph.import(&json!({"a": {"x": 1}}));
        let a = graph.get(id, "a").unwrap();
        graph.set_child(id, "b", a);
        assert!(!graph.is_cyclic(id));
        assert_eq!(
            graph.to_value(id).unwrap(),
            json!({"a": {"x": 1}, "b": {"x": 1}})
        );
    }

    #[test]
    fn array_index_rules() {
        assert_eq!(parse_index("0"), Some(0));
        assert_eq!(parse_index("12"), Some(12));
        assert_eq!(parse_index("01"), None);
        assert_eq!(parse_index("-"), None);
        assert_eq!(parse_index("-1"), None);
    }

    #[test]
    fn empty_values() {
        let mut graph = Graph::new();
        let empty = graph.import(&json!({}));
        let blank = graph.string("  \n");
        let bytes = graph.add(Node::Binary(Vec::new()));
        let number = graph.import(&json!(0));
        assert!(graph.is_empty_value(empty));
        assert!(graph.is_empty_value(blank));
        assert!(graph.is_empty_value(bytes));
        assert!(!graph.is_empty_value(number));
    }
}
