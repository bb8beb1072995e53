//! The document store: every document reached from the root, keyed by its
//! URL without fragment, over one shared [`Graph`].

use std::collections::HashSet;

use indexmap::IndexMap;
use refio::path::{self as url_path, get_hash, strip_hash, to_file_system_path};
use serde_json::Value;
use tracing::warn;

use crate::error::{Error, ErrorEntry, Result};
use crate::graph::{Graph, Node, NodeId};
use crate::options::Options;
use crate::pointer;
use crate::reference::{self, PathType, Ref};

/// Outcome of resolving a `url#pointer` against the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolved {
    /// Final coordinate after following `$ref`s along the way.
    pub path: String,
    /// The value; for an extended `$ref` this is the merged object.
    pub value: NodeId,
    /// The node stored at `path`.
    pub target: NodeId,
    /// The pointer ended on a `$ref` that points back at itself.
    pub circular: bool,
    /// How many `$ref`s were followed.
    pub indirections: usize,
}

#[derive(Clone, Debug, Default)]
pub struct Refs {
    graph: Graph,
    entries: IndexMap<String, Ref>,
    circular: bool,
}

struct Walk {
    path: String,
    value: NodeId,
    target: NodeId,
    circular: bool,
    indirections: usize,
}

impl Walk {
    fn start(document: &str, value: NodeId) -> Self {
        Self {
            path: format!("{document}#"),
            value,
            target: value,
            circular: false,
            indirections: 0,
        }
    }

    fn finish(self) -> Resolved {
        Resolved {
            path: self.path,
            value: self.value,
            target: self.target,
            circular: self.circular,
            indirections: self.indirections,
        }
    }
}

impl Refs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    /// Whether any circular reference was found.
    pub fn circular(&self) -> bool {
        self.circular
    }

    pub(crate) fn mark_circular(&mut self, path: &str) {
        self.circular = true;
        if let Some(entry) = self.entries.get_mut(strip_hash(path)) {
            entry.circular = true;
        }
    }

    /// URL of the first registered document.
    pub fn root_path(&self) -> Option<&str> {
        self.entries.keys().next().map(String::as_str)
    }

    pub fn root(&self) -> Option<&Ref> {
        self.entries.values().next()
    }

    pub fn root_value(&self) -> Option<NodeId> {
        self.root().and_then(Ref::value)
    }

    pub(crate) fn set_root_value(&mut self, value: NodeId) {
        if let Some(entry) = self.entries.values_mut().next() {
            entry.value = Some(value);
        }
    }

    /// The document holding `url`, ignoring any fragment.
    pub fn entry(&self, url: &str) -> Option<&Ref> {
        self.entries.get(strip_hash(url))
    }

    pub(crate) fn entry_mut(&mut self, url: &str) -> Option<&mut Ref> {
        self.entries.get_mut(strip_hash(url))
    }

    pub fn entries(&self) -> impl Iterator<Item = &Ref> {
        self.entries.values()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.entries.contains_key(strip_hash(url))
    }

    /// Register a document that is about to be loaded. The first registered
    /// document becomes the root.
    pub(crate) fn register(&mut self, url: &str) -> &mut Ref {
        let key = strip_hash(url).to_string();
        self.entries
            .entry(key.clone())
            .or_insert_with(|| Ref::new(key))
    }

    pub(crate) fn set_document(&mut self, url: &str, value: NodeId, reader: Option<&str>, content_type: Option<&str>) {
        let entry = self.register(url);
        entry.value = Some(value);
        if let Some(reader) = reader {
            entry.path_type = PathType::from_reader(reader);
        }
        entry.content_type = content_type.map(str::to_string);
    }

    /// Add a document by value. Adding the same value again is a no-op;
    /// adding a different value under a known URL fails.
    pub fn add(&mut self, url: &str, value: &Value) -> Result<NodeId> {
        let absolute = match self.root_path() {
            Some(_) => self.absolute(url)?,
            None => url_path::to_url(url)
                .map_err(|err| Error::resolver(url, format!("Invalid document URL \"{url}\": {err}")))?
                .to_string(),
        };
        let key = strip_hash(&absolute).to_string();
        if let Some(existing) = self.entries.get(&key).and_then(Ref::value) {
            if self.graph.to_value(existing).ok().as_ref() == Some(value) {
                return Ok(existing);
            }
            return Err(Error::resolver(
                &key,
                format!("Document \"{key}\" is already registered with a different value"),
            ));
        }
        let id = self.graph.import(value);
        self.set_document(&key, id, None, None);
        Ok(id)
    }

    /// Document URLs, optionally limited to some path types. Local files are
    /// listed as filesystem paths.
    pub fn paths(&self, types: &[PathType]) -> Vec<String> {
        self.filtered(types)
            .map(|entry| to_file_system_path(&entry.path))
            .collect()
    }

    /// Document values keyed like [`Refs::paths`]. Documents that failed to
    /// load are null.
    pub fn values(&self, types: &[PathType]) -> Result<IndexMap<String, Value>> {
        let mut values = IndexMap::new();
        for entry in self.filtered(types) {
            let value = match entry.value {
                Some(id) => self.graph.to_value(id)?,
                None => Value::Null,
            };
            values.insert(to_file_system_path(&entry.path), value);
        }
        Ok(values)
    }

    pub fn to_json(&self) -> Result<IndexMap<String, Value>> {
        self.values(&[])
    }

    fn filtered<'a>(&'a self, types: &'a [PathType]) -> impl Iterator<Item = &'a Ref> {
        self.entries
            .values()
            .filter(move |entry| types.is_empty() || types.contains(&entry.path_type))
    }

    /// Whether `path` (relative to the root) resolves to a value.
    pub fn exists(&mut self, path: &str) -> bool {
        self.get(path).is_ok()
    }

    /// The value at `path`, relative to the root document.
    pub fn get(&mut self, path: &str) -> Result<NodeId> {
        let options = Options::default();
        let absolute = self.absolute(path)?;
        self.check_document(path, &absolute)?;
        let resolved = self.resolve_pointer(&absolute, &options, &mut Vec::new())?;
        Ok(resolved.value)
    }

    pub fn get_value(&mut self, path: &str) -> Result<Value> {
        let id = self.get(path)?;
        self.graph.to_value(id)
    }

    /// Assign `value` at `path`, creating missing objects along the way.
    pub fn set(&mut self, path: &str, value: NodeId) -> Result<()> {
        let options = Options::default();
        let absolute = self.absolute(path)?;
        self.check_document(path, &absolute)?;
        let key = strip_hash(&absolute).to_string();
        let tokens = pointer::parse(&absolute)?;

        let Some((last, parents)) = tokens.split_last() else {
            if let Some(entry) = self.entries.get_mut(&key) {
                entry.value = Some(value);
            }
            return Ok(());
        };
        let root = self
            .entries
            .get(&key)
            .and_then(Ref::value)
            .ok_or_else(|| not_loaded(&absolute, &key))?;

        let mut walk = Walk::start(&key, root);
        for token in parents {
            self.follow(&mut walk, &options, &mut Vec::new())?;
            let next = match self.graph.get(walk.value, token) {
                Some(child) => child,
                None => {
                    let child = self.graph.add(Node::Object(IndexMap::new()));
                    if !self.graph.set_child(walk.value, token, child) {
                        return Err(cannot_assign(path, token));
                    }
                    child
                }
            };
            walk.path = pointer::join(&walk.path, &[token]);
            walk.value = next;
        }
        self.follow(&mut walk, &options, &mut Vec::new())?;
        if !self.graph.set_child(walk.value, last, value) {
            return Err(cannot_assign(path, last));
        }
        Ok(())
    }

    pub fn set_value(&mut self, path: &str, value: &Value) -> Result<()> {
        let id = self.graph.import(value);
        self.set(path, id)
    }

    /// Every recorded failure without duplicates: documents that failed to
    /// load first, then pointers that failed to resolve.
    pub fn errors(&self) -> Vec<ErrorEntry> {
        let failures = self.entries.values().filter_map(|entry| entry.failure.as_ref());
        let pointers = self.entries.values().flat_map(|entry| entry.errors.iter());
        let mut seen = HashSet::new();
        failures
            .chain(pointers)
            .filter(|error| seen.insert(error.footprint()))
            .cloned()
            .collect()
    }

    /// Resolve `path` for the position `path_from_root` of the output
    /// document.
    ///
    /// With `continue_on_error`, recoverable failures are recorded on the
    /// target document and `None` is returned so the caller can substitute
    /// null. References into a document that already failed to load give
    /// `None` without another record.
    pub(crate) fn resolve(&mut self, path: &str, path_from_root: &str, options: &Options) -> Result<Option<Resolved>> {
        let absolute = self.absolute(path)?;
        let failed = self
            .entry(&absolute)
            .is_some_and(|entry| entry.failure.is_some());
        if failed && options.continue_on_error {
            return Ok(None);
        }

        let result = self
            .check_document(path, &absolute)
            .and_then(|_| self.resolve_pointer(&absolute, options, &mut Vec::new()));
        match result {
            Ok(resolved) => Ok(Some(resolved)),
            Err(err) if options.continue_on_error && err.is_recoverable() => {
                let origin = self.absolute(path_from_root).unwrap_or_else(|_| path_from_root.to_string());
                warn!("Ignoring unresolved $ref {path}: {err}");
                let record = ErrorEntry::new(
                    err,
                    pointer::to_path(&origin),
                    to_file_system_path(strip_hash(&origin)),
                );
                let key = if self.contains(&absolute) {
                    absolute
                } else {
                    origin
                };
                if let Some(entry) = self.entry_mut(&key) {
                    entry.add_error(record);
                }
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// `path` made absolute against the root document's URL.
    pub(crate) fn absolute(&self, path: &str) -> Result<String> {
        let root = self
            .root_path()
            .ok_or_else(|| Error::resolver(path, "No documents have been registered"))?;
        url_path::resolve(root, path)
            .map(|url| url.to_string())
            .map_err(|err| Error::resolver(path, format!("Error resolving $ref pointer \"{path}\": {err}")))
    }

    fn check_document(&self, path: &str, absolute: &str) -> Result<()> {
        let key = strip_hash(absolute);
        if self.entries.contains_key(key) {
            Ok(())
        } else {
            Err(Error::resolver(
                key,
                format!("Error resolving $ref pointer \"{path}\". \"{key}\" not found."),
            ))
        }
    }

    /// Walk the pointer of `absolute`, following `$ref`s found on the way and
    /// a `$ref` found at the end. `chain` holds the coordinates currently
    /// being resolved; reaching one of them again stops as circular.
    fn resolve_pointer(&mut self, absolute: &str, options: &Options, chain: &mut Vec<String>) -> Result<Resolved> {
        chain.push(pointer::canonical(absolute));
        let result = self.walk_pointer(absolute, options, chain);
        chain.pop();
        result
    }

    fn walk_pointer(&mut self, absolute: &str, options: &Options, chain: &mut Vec<String>) -> Result<Resolved> {
        let key = strip_hash(absolute).to_string();
        let entry = self.entries.get(&key).ok_or_else(|| {
            Error::resolver(
                &key,
                format!("Error resolving $ref pointer \"{absolute}\". \"{key}\" not found."),
            )
        })?;
        if let Some(failure) = &entry.failure {
            return Err(failure.error.clone());
        }
        let root = entry.value.ok_or_else(|| not_loaded(absolute, &key))?;
        let tokens = pointer::parse(absolute)?;

        let mut walk = Walk::start(&key, root);
        let mut index = 0;
        while index < tokens.len() {
            self.follow(&mut walk, options, chain)?;
            if reference::is_ref(&self.graph, walk.value) {
                // A `$ref` that cannot be followed; the walk stops on it.
                return Ok(walk.finish());
            }

            let token = &tokens[index];
            let (child, key, consumed) = match self.graph.get(walk.value, token) {
                Some(child) => (child, token.clone(), 1),
                None => self
                    .joined_token(walk.value, &tokens[index..])
                    .ok_or_else(|| Error::MissingPointer {
                        token: token.clone(),
                        pointer: get_hash(absolute).to_string(),
                    })?,
            };
            walk.path = pointer::join(&walk.path, &[key]);
            walk.value = child;
            walk.target = child;
            index += consumed;
        }

        self.follow(&mut walk, options, chain)?;
        Ok(walk.finish())
    }

    /// Keys may themselves contain `/` (`"/pets/{id}"` under `paths`). Try the
    /// longest run of remaining tokens joined back together first.
    fn joined_token(&self, id: NodeId, tokens: &[String]) -> Option<(NodeId, String, usize)> {
        (2..=tokens.len()).rev().find_map(|count| {
            let key = tokens[..count].join("/");
            self.graph.get(id, &key).map(|child| (child, key, count))
        })
    }

    /// Replace the walk's value by the target of its `$ref`, if it has one
    /// that may be followed. Extended refs are merged, not followed.
    fn follow(&mut self, walk: &mut Walk, options: &Options, chain: &mut Vec<String>) -> Result<()> {
        if !reference::is_allowed_ref(&self.graph, walk.value, options) {
            return Ok(());
        }
        let Some(raw) = self.graph.ref_value(walk.value).map(str::to_string) else {
            return Ok(());
        };
        let ref_path = url_path::resolve(&walk.path, &raw)
            .map_err(|err| Error::resolver(&raw, format!("Error resolving $ref pointer \"{raw}\": {err}")))?
            .to_string();

        if pointer::same_location(&ref_path, &walk.path) || chain.contains(&pointer::canonical(&ref_path)) {
            walk.circular = true;
            return Ok(());
        }

        let resolved = self.resolve_pointer(&ref_path, options, chain)?;
        walk.indirections += resolved.indirections + 1;
        if reference::is_extended_ref(&self.graph, walk.value) {
            walk.value = reference::merge_extended(&mut self.graph, walk.value, resolved.value);
        } else {
            walk.path = resolved.path;
            walk.value = resolved.value;
            walk.target = resolved.target;
            walk.circular |= resolved.circular;
        }
        Ok(())
    }
}

fn not_loaded(absolute: &str, key: &str) -> Error {
    Error::resolver(
        key,
        format!("Error resolving $ref pointer \"{absolute}\". \"{key}\" has not been loaded."),
    )
}

fn cannot_assign(path: &str, token: &str) -> Error {
    Error::syntax(format!(
        "Error assigning $ref pointer \"{path}\". Cannot set \"{token}\" of a non-object."
    ))
}
