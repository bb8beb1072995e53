//! Rewrites a multi-file schema into one self-contained document.
//!
//! Every value reached through an external `$ref` is moved into a container
//! of the root document (`definitions`, `$defs`, `components/schemas`, ...)
//! and each `$ref` is rewritten to a `#/...` pointer into the root. Unlike
//! dereferencing, `$ref`s stay in place, so cycles need no special care.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use refio::path::{self as url_path, strip_hash};
use tracing::debug;

use crate::error::{Error, Result};
use crate::graph::{Graph, Node, NodeId, parse_index};
use crate::options::{BundleRoot, Options};
use crate::pointer;
use crate::reference;
use crate::refs::Refs;

/// One `$ref` found while crawling from the root.
#[derive(Clone, Debug)]
struct Entry {
    ref_node: NodeId,
    /// Document holding the `$ref`.
    referrer_file: String,
    /// Position of the `$ref` in the output document.
    position: Vec<String>,
    /// What the `$ref` itself names, before following chains.
    own_file: String,
    own_tokens: Vec<String>,
    /// Where its value finally lives.
    file: String,
    tokens: Vec<String>,
    target: NodeId,
}

#[derive(Clone, Debug)]
struct Target {
    node: NodeId,
    position: Vec<String>,
}

type Coordinate = (String, Vec<String>);

pub(crate) fn bundle(refs: &mut Refs, options: &Options) -> Result<()> {
    let (Some(root_path), Some(root)) = (refs.root_path().map(str::to_string), refs.root_value()) else {
        return Ok(());
    };
    let roots = match &options.bundle.roots {
        Some(roots) if !roots.is_empty() => roots.clone(),
        _ => default_roots(refs.graph(), root),
    };

    let mut inventory = Vec::new();
    let mut crawler = Crawler {
        refs: &mut *refs,
        options,
        seen: HashSet::new(),
        inventory: &mut inventory,
    };
    crawler.crawl(root, &format!("{root_path}#"), &mut Vec::new())?;
    debug!("Found {} $refs to bundle in {root_path}", inventory.len());

    remap(refs, &root_path, root, &roots, &inventory)
}

/// Containers promoted targets go to, chosen by the root's dialect.
pub fn default_roots(graph: &Graph, root: NodeId) -> Vec<BundleRoot> {
    let Some(map) = graph.as_object(root) else {
        return vec![BundleRoot::new("definitions", &[])];
    };
    if map.contains_key("openapi") {
        return vec![
            BundleRoot::new(
                "components/parameters",
                &["paths/*/parameters/*", "paths/*/*/parameters/*"],
            ),
            BundleRoot::new("components/responses", &["paths/*/*/responses/*"]),
            BundleRoot::new("components/requestBodies", &["paths/*/*/requestBody"]),
            BundleRoot::new("components/schemas", &[]),
        ];
    }
    if map.contains_key("swagger") {
        return vec![
            BundleRoot::new("parameters", &["paths/*/parameters/*", "paths/*/*/parameters/*"]),
            BundleRoot::new("responses", &["paths/*/*/responses/*"]),
            BundleRoot::new("definitions", &[]),
        ];
    }

    let dialect = map
        .get("$schema")
        .and_then(|id| graph.as_str(*id))
        .unwrap_or_default();
    let container = if map.contains_key("$defs") {
        "$defs"
    } else if map.contains_key("definitions") {
        "definitions"
    } else if dialect.contains("2019-09") || dialect.contains("2020-12") {
        "$defs"
    } else {
        "definitions"
    };
    vec![BundleRoot::new(container, &[])]
}

struct Crawler<'a> {
    refs: &'a mut Refs,
    options: &'a Options,
    seen: HashSet<NodeId>,
    inventory: &'a mut Vec<Entry>,
}

impl Crawler<'_> {
    /// `path` is the `url#pointer` of `id`; `position` its place in the
    /// output document.
    fn crawl(&mut self, id: NodeId, path: &str, position: &mut Vec<String>) -> Result<()> {
        if !self.refs.graph().is_container(id) || !self.seen.insert(id) {
            return Ok(());
        }
        if reference::is_allowed_ref(self.refs.graph(), id, self.options) {
            self.inventory_ref(id, path, position)?;
        }
        for (key, child) in self.refs.graph().children(id) {
            if key == "$ref" {
                continue;
            }
            position.push(key.clone());
            let result = self.crawl(child, &pointer::join(path, &[&key]), position);
            position.pop();
            result?;
        }
        Ok(())
    }

    fn inventory_ref(&mut self, id: NodeId, path: &str, position: &mut Vec<String>) -> Result<()> {
        let raw = self
            .refs
            .graph()
            .ref_value(id)
            .unwrap_or_default()
            .to_string();
        let own = match url_path::resolve(path, &raw) {
            Ok(url) => url.to_string(),
            Err(err) if self.options.continue_on_error => {
                debug!("Leaving unresolvable $ref {raw}: {err}");
                return Ok(());
            }
            Err(err) => {
                return Err(Error::resolver(
                    &raw,
                    format!("Error resolving $ref pointer \"{raw}\": {err}"),
                ));
            }
        };

        let from_root = pointer::format_pointer(position);
        // Failures recorded under continue_on_error leave the $ref untouched.
        let Some(resolved) = self.refs.resolve(&own, &from_root, self.options)? else {
            return Ok(());
        };

        let file = strip_hash(&resolved.path).to_string();
        let external = self.refs.root_path() != Some(file.as_str());
        self.inventory.push(Entry {
            ref_node: id,
            referrer_file: strip_hash(path).to_string(),
            position: position.clone(),
            own_file: strip_hash(&own).to_string(),
            own_tokens: pointer::to_path(&own),
            file,
            tokens: pointer::to_path(&resolved.path),
            target: resolved.target,
        });

        if external {
            self.crawl(resolved.target, &resolved.path, position)?;
        }
        Ok(())
    }
}

fn remap(refs: &mut Refs, root_path: &str, root: NodeId, roots: &[BundleRoot], inventory: &[Entry]) -> Result<()> {
    let mut targets: IndexMap<Coordinate, Target> = IndexMap::new();
    for entry in inventory.iter().filter(|entry| entry.file != root_path) {
        targets
            .entry((entry.file.clone(), entry.tokens.clone()))
            .or_insert_with(|| Target {
                node: entry.target,
                position: entry.position.clone(),
            });
    }

    let mut locations: HashMap<Coordinate, Vec<String>> = HashMap::new();
    let mut by_node: HashMap<NodeId, Vec<String>> = HashMap::new();
    let mut used: HashMap<Vec<String>, HashSet<String>> = HashMap::new();

    // Outermost targets move; anything inside one of them moves along.
    for (coordinate, target) in &targets {
        if outermost_ancestor(&targets, coordinate).is_some() {
            continue;
        }
        let location = match by_node.get(&target.node) {
            Some(location) => location.clone(),
            None => {
                let container = select_root(roots, &target.position);
                let names = used
                    .entry(container.path.clone())
                    .or_insert_with(|| existing_keys(refs.graph(), root, &container.path));
                let key = unique_key(names, &coordinate.0, &coordinate.1);
                names.insert(key.clone());

                let mut location = container.path.clone();
                location.push(key);
                insert_at(refs.graph_mut(), root, &location, target.node)?;
                debug!(
                    "Moved {} to {}",
                    pointer::join(&coordinate.0, &coordinate.1),
                    pointer::format_pointer(&location)
                );
                by_node.insert(target.node, location.clone());
                location
            }
        };
        locations.insert(coordinate.clone(), location);
    }

    for coordinate in targets.keys() {
        if locations.contains_key(coordinate) {
            continue;
        }
        let Some(ancestor) = outermost_ancestor(&targets, coordinate) else {
            continue;
        };
        let Some(base) = locations.get(ancestor) else {
            continue;
        };
        let mut location = base.clone();
        location.extend(coordinate.1[ancestor.1.len()..].iter().cloned());
        locations.insert(coordinate.clone(), location);
    }

    for entry in inventory {
        let tokens = if entry.referrer_file == root_path && entry.own_file == root_path {
            let raw = refs.graph().ref_value(entry.ref_node).unwrap_or_default();
            if raw.starts_with('#') && !pointer::has_needless_escapes(raw) {
                continue;
            }
            &entry.own_tokens
        } else if entry.file == root_path {
            &entry.tokens
        } else {
            match locations.get(&(entry.file.clone(), entry.tokens.clone())) {
                Some(location) => location,
                None => continue,
            }
        };
        let rewritten = pointer::format_pointer(tokens);
        let graph = refs.graph_mut();
        let value = graph.string(rewritten);
        if let Node::Object(map) = graph.node_mut(entry.ref_node) {
            map.insert("$ref".to_string(), value);
        }
    }
    Ok(())
}

/// The shortest other target in the same document that contains this one.
fn outermost_ancestor<'a>(targets: &'a IndexMap<Coordinate, Target>, coordinate: &Coordinate) -> Option<&'a Coordinate> {
    targets
        .keys()
        .filter(|(file, tokens)| {
            *file == coordinate.0 && tokens.len() < coordinate.1.len() && coordinate.1.starts_with(tokens)
        })
        .min_by_key(|(_, tokens)| tokens.len())
}

/// First root whose conditions match, else the last one.
fn select_root(roots: &[BundleRoot], position: &[String]) -> BundleRoot {
    roots
        .iter()
        .find(|root| root.matches(position))
        .or_else(|| roots.last())
        .cloned()
        .unwrap_or_else(|| BundleRoot::new("definitions", &[]))
}

fn existing_keys(graph: &Graph, root: NodeId, container: &[String]) -> HashSet<String> {
    let mut current = Some(root);
    for token in container {
        current = current.and_then(|id| graph.get(id, token));
    }
    current
        .and_then(|id| graph.as_object(id))
        .map(|map| map.keys().cloned().collect())
        .unwrap_or_default()
}

fn insert_at(graph: &mut Graph, root: NodeId, location: &[String], value: NodeId) -> Result<()> {
    let Some((last, parents)) = location.split_last() else {
        return Ok(());
    };
    let mut current = root;
    for (index, token) in parents.iter().enumerate() {
        current = match graph.get(current, token) {
            Some(child) => child,
            None => {
                let child = graph.add(Node::Object(IndexMap::new()));
                if !graph.set_child(current, token, child) {
                    return Err(not_a_container(&parents[..index]));
                }
                child
            }
        };
    }
    if !graph.is_object(current) || !graph.set_child(current, last, value) {
        return Err(not_a_container(parents));
    }
    Ok(())
}

fn not_a_container(tokens: &[String]) -> Error {
    Error::syntax(format!(
        "Unable to bundle: \"{}\" is not an object",
        pointer::format_pointer(tokens)
    ))
}

/// A free key in `names` for the target `tokens` of `file`: its last
/// non-index token (or the file name), then the file name as a prefix,
/// then the URL query as a suffix, then a counter.
fn unique_key(names: &HashSet<String>, file: &str, tokens: &[String]) -> String {
    let stem = sanitize(&file_stem(file));
    let named = tokens
        .iter()
        .rev()
        .find(|token| parse_index(token).is_none() && !token.is_empty())
        .map(|token| sanitize(token));
    let base = match named {
        Some(name) => name,
        None if tokens.is_empty() => stem.clone(),
        None => format!("{stem}_{}", tokens.join("_")),
    };

    let mut candidates = vec![base.clone()];
    if stem != base {
        candidates.push(format!("{stem}_{base}"));
    }
    if let Some(query) = url_path::query(file) {
        candidates.push(format!("{base}_{}", sanitize(&query)));
    }
    if let Some(free) = candidates.into_iter().find(|name| !names.contains(name)) {
        return free;
    }
    let mut counter = 2;
    loop {
        let name = format!("{base}_{counter}");
        if !names.contains(&name) {
            return name;
        }
        counter += 1;
    }
}

fn file_stem(file: &str) -> String {
    let name = url_path::file_name(file);
    match name.rfind('.') {
        Some(index) if index > 0 => name[..index].to_string(),
        _ if name.is_empty() => "schema".to_string(),
        _ => name,
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, ' ' | '.' | '_' | '$' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
