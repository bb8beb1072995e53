//! Options shared by parse, resolve, dereference and bundle.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use refio::{HttpOptions, Reader, default_readers};

use crate::graph::NodeId;
use crate::parsers::{Parser, default_parsers};

/// What the dereferencer does with a circular `$ref`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CircularPolicy {
    /// Splice the target in and keep the cycle in the graph.
    #[default]
    Allow,
    /// Leave the `$ref` object as it is.
    Ignore,
    /// Fail with [`crate::Error::Circular`].
    Error,
}

impl std::str::FromStr for CircularPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allow" | "true" => Ok(CircularPolicy::Allow),
            "ignore" => Ok(CircularPolicy::Ignore),
            "error" | "false" => Ok(CircularPolicy::Error),
            other => Err(format!("Invalid circular policy: {other}")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CircularKind {
    /// The `$ref` points at itself.
    SelfReference,
    /// The target is an ancestor of the `$ref` in the current traversal.
    Ancestor,
    /// A chain of references loops, or ends on a reference to itself.
    Indirect,
}

impl CircularKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircularKind::SelfReference => "self",
            CircularKind::Ancestor => "ancestor",
            CircularKind::Indirect => "indirect",
        }
    }
}

/// Reported after a `$ref` has been replaced by its value.
#[derive(Clone, Debug)]
pub struct DereferenceEvent {
    /// Root-relative pointer of the replaced position.
    pub path: String,
    /// The raw `$ref` string.
    pub reference: String,
    /// The `$ref` object that was replaced.
    pub ref_node: NodeId,
    pub value: NodeId,
    /// `None` when the root document is itself a `$ref`; `key` is then empty.
    pub parent: Option<NodeId>,
    pub key: String,
}

#[derive(Clone, Debug)]
pub struct CircularEvent {
    /// Full `url#pointer` where the cycle was found.
    pub path: String,
    pub kind: CircularKind,
}

pub type OnDereference = Arc<dyn Fn(&DereferenceEvent) + Send + Sync>;
pub type OnCircular = Arc<dyn Fn(&CircularEvent) + Send + Sync>;
/// Return true to leave a `$ref` (given as its raw string) untouched.
pub type IsRefResolved = Arc<dyn Fn(&str) -> bool + Send + Sync>;

#[derive(Clone)]
pub struct ParseOptions {
    pub parsers: Vec<Arc<dyn Parser>>,
    /// Per-parser `allow_empty` overrides, keyed by parser name.
    pub allow_empty: HashMap<String, bool>,
}

impl ParseOptions {
    pub fn allows_empty(&self, parser: &dyn Parser) -> bool {
        self.allow_empty
            .get(parser.name())
            .copied()
            .unwrap_or_else(|| parser.allow_empty())
    }
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            parsers: default_parsers(),
            allow_empty: HashMap::new(),
        }
    }
}

impl fmt::Debug for ParseOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.parsers.iter().map(|p| p.name()).collect();
        f.debug_struct("ParseOptions")
            .field("parsers", &names)
            .field("allow_empty", &self.allow_empty)
            .finish()
    }
}

#[derive(Clone)]
pub struct ResolveOptions {
    /// Follow references to other documents.
    pub external: bool,
    /// Do not crawl into objects whose `$ref` is internal.
    pub skip_internal: bool,
    /// Replaces the built-in readers when set.
    pub readers: Option<Vec<Arc<dyn Reader>>>,
    pub http: HttpOptions,
}

impl ResolveOptions {
    pub fn readers(&self) -> Vec<Arc<dyn Reader>> {
        match &self.readers {
            Some(readers) => readers.clone(),
            None => default_readers(self.http.clone()),
        }
    }
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            external: true,
            skip_internal: false,
            readers: None,
            http: HttpOptions::default(),
        }
    }
}

impl fmt::Debug for ResolveOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let readers: Option<Vec<&str>> = self
            .readers
            .as_ref()
            .map(|readers| readers.iter().map(|r| r.name()).collect());
        f.debug_struct("ResolveOptions")
            .field("external", &self.external)
            .field("skip_internal", &self.skip_internal)
            .field("readers", &readers)
            .field("http", &self.http)
            .finish()
    }
}

#[derive(Clone, Default)]
pub struct DereferenceOptions {
    pub circular: CircularPolicy,
    pub on_dereference: Option<OnDereference>,
    pub on_circular: Option<OnCircular>,
    pub is_ref_resolved: Option<IsRefResolved>,
    /// Keep `$id` on inlined targets instead of removing it.
    pub preserve_id: bool,
    /// Overall time budget for one dereference run.
    pub timeout: Option<Duration>,
}

impl fmt::Debug for DereferenceOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DereferenceOptions")
            .field("circular", &self.circular)
            .field("on_dereference", &self.on_dereference.is_some())
            .field("on_circular", &self.on_circular.is_some())
            .field("is_ref_resolved", &self.is_ref_resolved.is_some())
            .field("preserve_id", &self.preserve_id)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// A container in the bundled document that receives promoted targets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BundleRoot {
    /// Tokens of the container, e.g. `["components", "schemas"]`.
    pub path: Vec<String>,
    /// Slash-separated patterns over the referencing position. `*` matches
    /// one token and a trailing `**` matches the rest. An empty list matches
    /// everything.
    pub conditions: Vec<String>,
}

impl BundleRoot {
    pub fn new(path: &str, conditions: &[&str]) -> Self {
        Self {
            path: path
                .split('/')
                .filter(|token| !token.is_empty())
                .map(str::to_string)
                .collect(),
            conditions: conditions.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn matches(&self, position: &[String]) -> bool {
        self.conditions.is_empty()
            || self
                .conditions
                .iter()
                .any(|pattern| pattern_matches(pattern, position))
    }
}

fn pattern_matches(pattern: &str, position: &[String]) -> bool {
    let parts: Vec<&str> = pattern.split('/').filter(|p| !p.is_empty()).collect();
    let mut index = 0;
    for (i, part) in parts.iter().enumerate() {
        if *part == "**" && i == parts.len() - 1 {
            return true;
        }
        match position.get(index) {
            Some(token) if *part == "*" || *part == token.as_str() => index += 1,
            _ => return false,
        }
    }
    index == position.len()
}

#[derive(Clone, Debug, Default)]
pub struct BundleOptions {
    /// Replaces the dialect-based defaults when set.
    pub roots: Option<Vec<BundleRoot>>,
}

#[derive(Clone, Debug, Default)]
pub struct Options {
    pub parse: ParseOptions,
    pub resolve: ResolveOptions,
    pub dereference: DereferenceOptions,
    pub bundle: BundleOptions,
    /// Record recoverable failures and raise them together at the end.
    pub continue_on_error: bool,
}
