//! jsref: resolve, dereference and bundle JSON Schema `$ref`s.
//!
//! Documents are loaded into one [`Graph`] per operation and indexed by URL
//! in [`Refs`]. [`RefParser`] drives the four operations:
//!
//! - `parse` reads the root document only;
//! - `resolve` also loads every external document it references;
//! - `dereference` replaces each `$ref` by its value, sharing nodes by
//!   identity and keeping cycles as back-edges;
//! - `bundle` moves external values into the root and rewrites `$ref`s to
//!   local pointers.

pub mod error;
pub mod graph;
pub mod options;
pub mod parsers;
pub mod pointer;
pub mod reference;
pub mod refs;

mod bundle;
mod dereference;
mod resolve;

pub use bundle::default_roots;
pub use error::{Error, ErrorEntry, ErrorGroup, Result};
pub use graph::{Graph, Node, NodeId};
pub use options::{
    BundleOptions, BundleRoot, CircularEvent, CircularKind, CircularPolicy, DereferenceEvent,
    DereferenceOptions, Options, ParseOptions, ResolveOptions,
};
pub use reference::{PathType, Ref};
pub use refs::{Refs, Resolved};

use std::path::{Path, PathBuf};

use refio::path::{self as url_path, strip_hash, to_file_system_path};
use serde_json::Value;
use tracing::{debug, info};

/// Where the root schema comes from.
#[derive(Clone, Debug, PartialEq)]
pub enum Source {
    /// A filesystem path or URL.
    Path(String),
    /// An in-memory schema. Relative `$ref`s resolve against `path`, or the
    /// current directory when it is `None`.
    Value { value: Value, path: Option<String> },
}

impl From<&str> for Source {
    fn from(path: &str) -> Self {
        Source::Path(path.to_string())
    }
}

impl From<String> for Source {
    fn from(path: String) -> Self {
        Source::Path(path)
    }
}

impl From<&Path> for Source {
    fn from(path: &Path) -> Self {
        Source::Path(path.to_string_lossy().to_string())
    }
}

impl From<PathBuf> for Source {
    fn from(path: PathBuf) -> Self {
        Source::from(path.as_path())
    }
}

impl From<Value> for Source {
    fn from(value: Value) -> Self {
        Source::Value { value, path: None }
    }
}

/// Holds the result of the last operation: the root schema node and the
/// store of every document involved.
#[derive(Clone, Debug, Default)]
pub struct RefParser {
    schema: Option<NodeId>,
    refs: Refs,
}

impl RefParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schema(&self) -> Option<NodeId> {
        self.schema
    }

    pub fn refs(&self) -> &Refs {
        &self.refs
    }

    pub fn refs_mut(&mut self) -> &mut Refs {
        &mut self.refs
    }

    pub fn graph(&self) -> &Graph {
        self.refs.graph()
    }

    /// Export the schema as JSON. Fails when it contains a cycle.
    pub fn to_value(&self) -> Result<Value> {
        let schema = self
            .schema
            .ok_or_else(|| Error::syntax("No schema has been parsed"))?;
        self.refs.graph().to_value(schema)
    }

    /// Read and parse the root document, without following any `$ref`.
    pub async fn parse(&mut self, source: impl Into<Source>, options: &Options) -> Result<NodeId> {
        self.refs = Refs::new();
        self.schema = None;

        let document = match source.into() {
            Source::Path(path) => {
                let url = url_path::to_url(&path)
                    .map_err(|err| Error::resolver(&path, format!("Invalid schema path \"{path}\": {err}")))?;
                let document = strip_hash(url.as_str()).to_string();
                self.refs.register(&document);
                let loaded = resolve::load(&document, &options.resolve.readers(), &options.parse).await?;
                let id = loaded.parsed.into_graph(self.refs.graph_mut());
                self.refs
                    .set_document(&document, id, Some(&loaded.reader), Some(&loaded.parser));
                document
            }
            Source::Value { value, path } => {
                let url = match &path {
                    Some(path) => url_path::to_url(path),
                    None => url_path::cwd(),
                }
                .map_err(|err| Error::resolver(path.clone().unwrap_or_default(), err.to_string()))?;
                let document = strip_hash(url.as_str()).to_string();
                let id = self.refs.graph_mut().import(&value);
                self.refs.set_document(&document, id, None, None);
                document
            }
        };

        let root = self
            .refs
            .root_value()
            .filter(|id| self.refs.graph().is_container(*id))
            .ok_or_else(|| {
                Error::syntax(format!(
                    "\"{}\" is not a valid JSON Schema",
                    to_file_system_path(&document)
                ))
            })?;
        debug!("Parsed root document {document}");
        self.schema = Some(root);
        Ok(root)
    }

    /// Parse the root and load every external document it references.
    pub async fn resolve(&mut self, source: impl Into<Source>, options: &Options) -> Result<&Refs> {
        self.parse(source, options).await?;
        resolve::resolve_external(&mut self.refs, options).await?;
        self.finish()?;
        Ok(&self.refs)
    }

    /// Resolve, then replace every `$ref` by its value.
    pub async fn dereference(&mut self, source: impl Into<Source>, options: &Options) -> Result<NodeId> {
        self.parse(source, options).await?;
        resolve::resolve_external(&mut self.refs, options).await?;
        dereference::dereference(&mut self.refs, options)?;
        self.schema = self.refs.root_value();
        info!(
            "Dereferenced {} document(s), circular: {}",
            self.refs.entries().count(),
            self.refs.circular()
        );
        self.finish()?;
        self.schema
            .ok_or_else(|| Error::syntax("No schema has been parsed"))
    }

    /// Resolve, then move external values into the root document.
    pub async fn bundle(&mut self, source: impl Into<Source>, options: &Options) -> Result<NodeId> {
        self.parse(source, options).await?;
        resolve::resolve_external(&mut self.refs, options).await?;
        bundle::bundle(&mut self.refs, options)?;
        self.schema = self.refs.root_value();
        info!("Bundled {} document(s)", self.refs.entries().count());
        self.finish()?;
        self.schema
            .ok_or_else(|| Error::syntax("No schema has been parsed"))
    }

    /// Raise failures recorded under `continue_on_error`, all at once.
    fn finish(&self) -> Result<()> {
        let errors = self.refs.errors();
        if errors.is_empty() {
            return Ok(());
        }
        Err(Error::Group(Box::new(ErrorGroup {
            errors,
            refs: self.refs.clone(),
        })))
    }
}

pub async fn parse(source: impl Into<Source>, options: &Options) -> Result<RefParser> {
    let mut parser = RefParser::new();
    parser.parse(source, options).await?;
    Ok(parser)
}

pub async fn resolve(source: impl Into<Source>, options: &Options) -> Result<RefParser> {
    let mut parser = RefParser::new();
    parser.resolve(source, options).await?;
    Ok(parser)
}

pub async fn dereference(source: impl Into<Source>, options: &Options) -> Result<RefParser> {
    let mut parser = RefParser::new();
    parser.dereference(source, options).await?;
    Ok(parser)
}

pub async fn bundle(source: impl Into<Source>, options: &Options) -> Result<RefParser> {
    let mut parser = RefParser::new();
    parser.bundle(source, options).await?;
    Ok(parser)
}
