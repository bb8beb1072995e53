//! Replaces every `$ref` in the root document with the value it points to.
//!
//! Targets are spliced in by identity: all references to one location end
//! up holding the same node. A reference back into one of its own ancestors
//! becomes a back-edge, so circular schemas stay finite.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use refio::path as url_path;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::graph::{Node, NodeId};
use crate::options::{CircularEvent, CircularKind, CircularPolicy, DereferenceEvent, Options};
use crate::pointer;
use crate::reference;
use crate::refs::Refs;

#[derive(Clone, Copy, Debug)]
struct Crawled {
    value: NodeId,
    circular: bool,
}

struct Dereferencer<'a> {
    refs: &'a mut Refs,
    options: &'a Options,
    /// Containers on the current traversal path.
    parents: HashSet<NodeId>,
    /// Containers already crawled.
    processed: HashSet<NodeId>,
    /// Results of earlier `$ref`s, keyed by canonical target.
    cache: HashMap<String, Crawled>,
    started: Instant,
}

/// Dereference the root document of `refs` in place.
pub(crate) fn dereference(refs: &mut Refs, options: &Options) -> Result<()> {
    let (Some(root_path), Some(root)) = (refs.root_path().map(str::to_string), refs.root_value()) else {
        return Ok(());
    };
    let root_ref = root_reference(refs, root, options);
    let mut walker = Dereferencer {
        refs: &mut *refs,
        options,
        parents: HashSet::new(),
        processed: HashSet::new(),
        cache: HashMap::new(),
        started: Instant::now(),
    };
    let result = walker.crawl(root, &format!("{root_path}#"), "#")?;
    if let Some(raw) = root_ref {
        walker.notify(None, "", root, raw, result.value, "#");
    }
    debug!(
        "Dereferenced {root_path} ({} references cached, circular: {})",
        walker.cache.len(),
        result.circular
    );
    refs.set_root_value(result.value);
    Ok(())
}

/// The raw `$ref` of a root document that is itself a reference.
fn root_reference(refs: &Refs, root: NodeId, options: &Options) -> Option<String> {
    if !reference::is_allowed_ref(refs.graph(), root, options) {
        return None;
    }
    let raw = refs.graph().ref_value(root)?;
    match &options.dereference.is_ref_resolved {
        Some(is_ref_resolved) if is_ref_resolved(raw) => None,
        _ => Some(raw.to_string()),
    }
}

impl Dereferencer<'_> {
    fn policy(&self) -> CircularPolicy {
        self.options.dereference.circular
    }

    fn check_timeout(&self) -> Result<()> {
        let Some(timeout) = self.options.dereference.timeout else {
            return Ok(());
        };
        if self.started.elapsed() >= timeout {
            return Err(Error::Timeout {
                message: format!("Dereferencing timeout reached: {}ms", timeout.as_millis()),
            });
        }
        Ok(())
    }

    fn is_vetoed(&self, id: NodeId) -> bool {
        match (&self.options.dereference.is_ref_resolved, self.refs.graph().ref_value(id)) {
            (Some(is_ref_resolved), Some(raw)) => is_ref_resolved(raw),
            _ => false,
        }
    }

    /// `path` is the `url#pointer` of `id` in its own document and
    /// `path_from_root` its position in the output document.
    fn crawl(&mut self, id: NodeId, path: &str, path_from_root: &str) -> Result<Crawled> {
        let mut result = Crawled {
            value: id,
            circular: false,
        };
        let revisit = self.policy() == CircularPolicy::Ignore;
        if !self.refs.graph().is_container(id) || (!revisit && self.processed.contains(&id)) {
            return Ok(result);
        }

        self.parents.insert(id);
        self.processed.insert(id);

        if reference::is_allowed_ref(self.refs.graph(), id, self.options) && !self.is_vetoed(id) {
            result = self.dereference_ref(id, path, path_from_root)?;
        } else {
            for (key, child) in self.refs.graph().children(id) {
                self.check_timeout()?;
                let key_path = pointer::join(path, &[&key]);
                let key_path_from_root = pointer::join(path_from_root, &[&key]);

                let circular = if reference::is_allowed_ref(self.refs.graph(), child, self.options) {
                    if self.is_vetoed(child) {
                        continue;
                    }
                    let raw = self.refs.graph().ref_value(child).unwrap_or_default().to_string();
                    let crawled = self.dereference_ref(child, &key_path, &key_path_from_root)?;
                    if crawled.value != child {
                        self.refs.graph_mut().set_child(id, &key, crawled.value);
                    }
                    self.notify(Some(id), &key, child, raw, crawled.value, &key_path_from_root);
                    crawled.circular
                } else if !self.parents.contains(&child) {
                    let crawled = self.crawl(child, &key_path, &key_path_from_root)?;
                    if crawled.value != child {
                        self.refs.graph_mut().set_child(id, &key, crawled.value);
                    }
                    crawled.circular
                } else {
                    self.found_circular(&key_path, CircularKind::Indirect)?
                };
                result.circular |= circular;
            }
        }

        self.parents.remove(&id);
        Ok(result)
    }

    fn dereference_ref(&mut self, ref_node: NodeId, path: &str, path_from_root: &str) -> Result<Crawled> {
        let raw = self
            .refs
            .graph()
            .ref_value(ref_node)
            .unwrap_or_default()
            .to_string();
        let extended = reference::is_extended_ref(self.refs.graph(), ref_node);
        let ref_path = url_path::resolve(path, &raw)
            .map(|url| url.to_string())
            .unwrap_or_else(|_| raw.clone());
        let cache_key = pointer::canonical(&ref_path);

        if let Some(cached) = self.cache.get(&cache_key).copied() {
            if !cached.circular {
                trace!("Reusing dereferenced {raw} at {path_from_root}");
                let value = reference::merge_extended(self.refs.graph_mut(), ref_node, cached.value);
                return Ok(Crawled {
                    value,
                    circular: false,
                });
            }
            match self.refs.graph().ref_value(cached.value) {
                Some(cached_raw) if cached_raw == raw => return Ok(cached),
                Some(_) => {}
                None => return Ok(cached),
            }
        }

        let Some(resolved) = self.refs.resolve(&ref_path, path_from_root, self.options)? else {
            let null = self.refs.graph_mut().null();
            return Ok(Crawled {
                value: null,
                circular: false,
            });
        };

        let direct = resolved.circular;
        let ancestor = self.parents.contains(&resolved.value);
        let mut circular = direct || ancestor;
        if circular {
            let kind = if pointer::same_location(&ref_path, path) {
                CircularKind::SelfReference
            } else if ancestor {
                CircularKind::Ancestor
            } else {
                CircularKind::Indirect
            };
            self.found_circular(path, kind)?;
        }

        let value = if circular && self.policy() == CircularPolicy::Ignore {
            ref_node
        } else if resolved.target == ref_node {
            // Siblings of a reference to itself have nothing to attach to.
            let pointer = self.refs.graph_mut().string(path_from_root);
            *self.refs.graph_mut().node_mut(ref_node) = Node::Object([("$ref".to_string(), pointer)].into_iter().collect());
            ref_node
        } else if direct {
            // The chain ends on a `$ref` to itself, possibly in another
            // document. Point the copy at the position it now occupies.
            let merged = reference::merge_extended(self.refs.graph_mut(), ref_node, resolved.value);
            let copy = self.refs.graph_mut().shallow_copy(merged);
            let pointer = self.refs.graph_mut().string(path_from_root);
            self.refs.graph_mut().set_child(copy, "$ref", pointer);
            copy
        } else {
            let merged = reference::merge_extended(self.refs.graph_mut(), ref_node, resolved.value);
            let mut value = self.strip_id(merged);
            if !circular {
                let crawled = self.crawl(value, &resolved.path, path_from_root)?;
                circular = crawled.circular;
                value = crawled.value;
            }
            value
        };

        trace!("Dereferenced {raw} at {path_from_root}");
        let crawled = Crawled { value, circular };
        if !extended {
            self.cache.insert(cache_key, crawled);
        }
        Ok(crawled)
    }

    /// Targets carrying `$id` are inlined as a copy without it, unless
    /// `preserve_id` is set.
    fn strip_id(&mut self, id: NodeId) -> NodeId {
        if self.options.dereference.preserve_id {
            return id;
        }
        let graph = self.refs.graph_mut();
        let has_id = graph.as_object(id).is_some_and(|map| map.contains_key("$id"));
        if !has_id {
            return id;
        }
        let copy = graph.shallow_copy(id);
        if let Node::Object(map) = graph.node_mut(copy) {
            map.shift_remove("$id");
        }
        copy
    }

    fn found_circular(&mut self, path: &str, kind: CircularKind) -> Result<bool> {
        warn!("Circular $ref ({}) at {path}", kind.as_str());
        self.refs.mark_circular(path);
        if let Some(on_circular) = &self.options.dereference.on_circular {
            on_circular(&CircularEvent {
                path: path.to_string(),
                kind,
            });
        }
        if self.policy() == CircularPolicy::Error {
            return Err(Error::Circular {
                path: path.to_string(),
            });
        }
        Ok(true)
    }

    fn notify(&self, parent: Option<NodeId>, key: &str, ref_node: NodeId, reference: String, value: NodeId, path_from_root: &str) {
        let Some(on_dereference) = &self.options.dereference.on_dereference else {
            return;
        };
        on_dereference(&DereferenceEvent {
            path: path_from_root.to_string(),
            reference,
            ref_node,
            value,
            parent,
            key: key.to_string(),
        });
    }
}
