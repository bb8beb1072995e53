//! A single document registered in the store, plus `$ref` node predicates.

use indexmap::IndexMap;

use crate::error::ErrorEntry;
use crate::graph::{Graph, Node, NodeId};
use crate::options::Options;

/// How a document was obtained.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PathType {
    File,
    Http,
    /// A custom reader's name.
    Custom(String),
}

impl PathType {
    pub fn from_reader(name: &str) -> Self {
        match name {
            "file" => PathType::File,
            "http" => PathType::Http,
            other => PathType::Custom(other.to_string()),
        }
    }

    pub fn from_url(url: &str) -> Self {
        if refio::path::is_http(url) {
            PathType::Http
        } else if refio::path::is_file(url) {
            PathType::File
        } else {
            let scheme = url.split(':').next().unwrap_or_default();
            PathType::Custom(scheme.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PathType::File => "file",
            PathType::Http => "http",
            PathType::Custom(name) => name,
        }
    }
}

/// One document known to the store.
///
/// `value` is `None` while the document is still loading and when loading
/// failed; a failure is kept in `failure` so later lookups can treat the
/// document as null without reporting it twice.
#[derive(Clone, Debug)]
pub struct Ref {
    pub(crate) path: String,
    pub(crate) path_type: PathType,
    pub(crate) value: Option<NodeId>,
    pub(crate) content_type: Option<String>,
    pub(crate) failure: Option<ErrorEntry>,
    pub(crate) errors: Vec<ErrorEntry>,
    pub(crate) circular: bool,
}

impl Ref {
    pub(crate) fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        let path_type = PathType::from_url(&path);
        Self {
            path,
            path_type,
            value: None,
            content_type: None,
            failure: None,
            errors: Vec::new(),
            circular: false,
        }
    }

    /// Absolute URL of the document, without fragment.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn path_type(&self) -> &PathType {
        &self.path_type
    }

    pub fn value(&self) -> Option<NodeId> {
        self.value
    }

    /// Name of the parser that produced the value.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn failure(&self) -> Option<&ErrorEntry> {
        self.failure.as_ref()
    }

    pub fn errors(&self) -> &[ErrorEntry] {
        &self.errors
    }

    /// Whether a cycle was found through this document.
    pub fn circular(&self) -> bool {
        self.circular
    }

    /// Record a pointer failure unless an identical one is already recorded.
    pub(crate) fn add_error(&mut self, entry: ErrorEntry) {
        let footprint = entry.footprint();
        if self.errors.iter().any(|known| known.footprint() == footprint) {
            return;
        }
        self.errors.push(entry);
    }
}

/// An object with a string `$ref` member.
pub fn is_ref(graph: &Graph, id: NodeId) -> bool {
    graph.ref_value(id).is_some()
}

/// A `$ref` that names another document.
pub fn is_external_ref(graph: &Graph, id: NodeId) -> bool {
    graph
        .ref_value(id)
        .is_some_and(|value| !value.is_empty() && !value.starts_with('#'))
}

/// A `$ref` the resolver will follow: any JSON Pointer fragment, or an
/// external reference while external resolution is enabled.
pub fn is_allowed_ref(graph: &Graph, id: NodeId, options: &Options) -> bool {
    match graph.ref_value(id) {
        Some(value) if value == "#" || value.starts_with("#/") => true,
        Some(_) => is_external_ref(graph, id) && options.resolve.external,
        None => false,
    }
}

/// A `$ref` object carrying sibling keys next to `$ref`.
pub fn is_extended_ref(graph: &Graph, id: NodeId) -> bool {
    is_ref(graph, id) && graph.as_object(id).is_some_and(|map| map.len() > 1)
}

/// Combine an extended `$ref` with its resolved target.
///
/// Siblings come first and win; target keys they do not mention follow. A
/// plain `$ref`, or a target that is not an object, yields the target itself.
pub fn merge_extended(graph: &mut Graph, ref_id: NodeId, target: NodeId) -> NodeId {
    if !is_extended_ref(graph, ref_id) {
        return target;
    }
    let (Some(siblings), Some(resolved)) = (graph.as_object(ref_id), graph.as_object(target)) else {
        return target;
    };

    let mut merged: IndexMap<String, NodeId> = siblings
        .iter()
        .filter(|(key, _)| key.as_str() != "$ref")
        .map(|(key, id)| (key.clone(), *id))
        .collect();
    for (key, id) in resolved {
        if !merged.contains_key(key) {
            merged.insert(key.clone(), *id);
        }
    }
    graph.add(Node::Object(merged))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn predicates() {
        let mut graph = Graph::new();
        let internal = graph.import(&json!({"$ref": "#/definitions/a"}));
        let external = graph.import(&json!({"$ref": "other.json#/a"}));
        let extended = graph.import(&json!({"$ref": "#/a", "description": "x"}));
        let anchor = graph.import(&json!({"$ref": "#thing"}));
        let not_string = graph.import(&json!({"$ref": 5}));

        assert!(is_ref(&graph, internal));
        assert!(!is_external_ref(&graph, internal));
        assert!(is_external_ref(&graph, external));
        assert!(is_extended_ref(&graph, extended));
        assert!(!is_extended_ref(&graph, internal));
        assert!(!is_ref(&graph, not_string));

        let mut options = Options::default();
        assert!(is_allowed_ref(&graph, internal, &options));
        assert!(is_allowed_ref(&graph, external, &options));
        assert!(!is_allowed_ref(&graph, anchor, &options));
        options.resolve.external = false;
        assert!(!is_allowed_ref(&graph, external, &options));
    }

    #[test]
    fn merge_prefers_siblings() {
        let mut graph = Graph::new();
        let ext = graph.import(&json!({"$ref": "#/a", "description": "mine", "x": 1}));
        let target = graph.import(&json!({"type": "string", "description": "theirs"}));
        let merged = merge_extended(&mut graph, ext, target);
        assert_eq!(
            graph.to_value(merged).unwrap(),
            json!({"description": "mine", "x": 1, "type": "string"})
        );

        let plain = graph.import(&json!({"$ref": "#/a"}));
        assert_eq!(merge_extended(&mut graph, plain, target), target);
    }

    #[test]
    fn path_types() {
        assert_eq!(PathType::from_url("file:///a.json"), PathType::File);
        assert_eq!(PathType::from_url("https://x.test/a.json"), PathType::Http);
        assert_eq!(PathType::from_reader("s3").as_str(), "s3");
    }
}
