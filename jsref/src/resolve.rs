//! Discovers and loads every external document reachable from the root.

use std::collections::HashSet;
use std::sync::Arc;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use refio::path::{self as url_path, strip_hash, to_file_system_path};
use refio::{ReadRequest, Reader};
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, ErrorEntry, Result};
use crate::graph::NodeId;
use crate::options::{Options, ParseOptions};
use crate::parsers::{FileInfo, Parsed, parse_file};
use crate::pointer;
use crate::reference;
use crate::refs::Refs;

/// A document that was referenced and still needs loading.
#[derive(Clone, Debug)]
struct Pending {
    /// Absolute URL without fragment.
    url: String,
    /// `url#pointer` of the `$ref` that first named it.
    referrer: String,
}

pub(crate) struct Loaded {
    pub reader: String,
    pub parser: String,
    pub parsed: Parsed,
}

/// Read and parse one document.
pub(crate) async fn load(url: &str, readers: &[Arc<dyn Reader>], parse: &ParseOptions) -> Result<Loaded> {
    let parsed_url =
        Url::parse(url).map_err(|err| Error::resolver(url, format!("Unable to resolve \"{url}\": {err}")))?;
    let request = ReadRequest::new(parsed_url);
    let output = refio::read(readers, &request).await?;
    let file = FileInfo::new(url, output.data);
    let (parser, parsed) = parse_file(&file, parse).await?;
    Ok(Loaded {
        reader: output.reader,
        parser,
        parsed,
    })
}

async fn load_pending(pending: Pending, readers: &[Arc<dyn Reader>], parse: &ParseOptions) -> (Pending, Result<Loaded>) {
    let result = load(&pending.url, readers, parse).await;
    (pending, result)
}

/// Load every external document reachable from the root, concurrently.
///
/// Each document is registered before its load starts, so a URL referenced
/// from many places (or from itself) is read once. Without
/// `continue_on_error` the first failure aborts and the remaining loads are
/// dropped.
pub(crate) async fn resolve_external(refs: &mut Refs, options: &Options) -> Result<()> {
    if !options.resolve.external {
        return Ok(());
    }
    let (Some(root_path), Some(root)) = (refs.root_path().map(str::to_string), refs.root_value()) else {
        return Ok(());
    };

    let readers = options.resolve.readers();
    let mut seen = HashSet::new();
    let mut found = Vec::new();
    crawl(refs, root, &format!("{root_path}#"), options, &mut seen, &mut found)?;

    let mut loads = FuturesUnordered::new();
    for pending in found.drain(..) {
        loads.push(load_pending(pending, &readers, &options.parse));
    }

    while let Some((pending, result)) = loads.next().await {
        match result {
            Ok(loaded) => {
                debug!("Loaded {} via {} as {}", pending.url, loaded.reader, loaded.parser);
                let id = loaded.parsed.into_graph(refs.graph_mut());
                refs.set_document(&pending.url, id, Some(&loaded.reader), Some(&loaded.parser));
                crawl(refs, id, &format!("{}#", pending.url), options, &mut seen, &mut found)?;
                for next in found.drain(..) {
                    loads.push(load_pending(next, &readers, &options.parse));
                }
            }
            Err(err) if options.continue_on_error && err.is_recoverable() => {
                warn!("Failed to load {}: {err}", pending.url);
                let record = ErrorEntry::new(
                    err,
                    pointer::to_path(&pending.referrer),
                    to_file_system_path(strip_hash(&pending.referrer)),
                );
                if let Some(entry) = refs.entry_mut(&pending.url) {
                    entry.failure = Some(record);
                }
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

/// Find external `$ref`s under `id`, registering each new document.
/// `path` is the `url#pointer` of `id`.
fn crawl(
    refs: &mut Refs,
    id: NodeId,
    path: &str,
    options: &Options,
    seen: &mut HashSet<NodeId>,
    found: &mut Vec<Pending>,
) -> Result<()> {
    if !refs.graph().is_container(id) || !seen.insert(id) {
        return Ok(());
    }

    if reference::is_external_ref(refs.graph(), id) {
        let raw = refs.graph().ref_value(id).unwrap_or_default().to_string();
        match url_path::resolve(path, &raw) {
            Ok(url) => {
                let document = strip_hash(url.as_str()).to_string();
                if !refs.contains(&document) {
                    debug!("Discovered {document} from {path}");
                    refs.register(&document);
                    found.push(Pending {
                        url: document,
                        referrer: path.to_string(),
                    });
                }
            }
            Err(err) => {
                let err = Error::resolver(&raw, format!("Unable to resolve $ref \"{raw}\": {err}"));
                if !(options.continue_on_error && err.is_recoverable()) {
                    return Err(err);
                }
                let record = ErrorEntry::new(
                    err,
                    pointer::to_path(path),
                    to_file_system_path(strip_hash(path)),
                );
                if let Some(entry) = refs.entry_mut(path) {
                    entry.add_error(record);
                }
            }
        }
    } else if options.resolve.skip_internal && reference::is_ref(refs.graph(), id) {
        return Ok(());
    }

    for (key, child) in refs.graph().children(id) {
        crawl(refs, child, &pointer::join(path, &[key]), options, seen, found)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn crawl_registers_each_document_once() {
        let mut refs = Refs::new();
        let root = refs
            .add(
                "file:///s/root.json",
                &json!({
                    "a": {"$ref": "pet.yaml"},
                    "b": {"$ref": "pet.yaml#/definitions/x"},
                    "c": [{"$ref": "https://example.com/s.json#/y"}],
                    "d": {"$ref": "#/a"}
                }),
            )
            .unwrap();

        let mut found = Vec::new();
        crawl(
            &mut refs,
            root,
            "file:///s/root.json#",
            &Options::default(),
            &mut HashSet::new(),
            &mut found,
        )
        .unwrap();

        let urls: Vec<&str> = found.iter().map(|p| p.url.as_str()).collect();
        assert_eq!(urls, vec!["file:///s/pet.yaml", "https://example.com/s.json"]);
        assert_eq!(found[0].referrer, "file:///s/root.json#/a");
        assert_eq!(found[1].referrer, "file:///s/root.json#/c/0");
        assert!(refs.contains("file:///s/pet.yaml#/definitions/x"));
    }

    #[test]
    fn skip_internal_stops_at_internal_refs() {
        let mut refs = Refs::new();
        let root = refs
            .add(
                "file:///s/root.json",
                &json!({"a": {"$ref": "#/b", "items": {"$ref": "other.json"}}}),
            )
            .unwrap();
        let mut options = Options::default();
        options.resolve.skip_internal = true;

        let mut found = Vec::new();
        crawl(&mut refs, root, "file:///s/root.json#", &options, &mut HashSet::new(), &mut found).unwrap();
        assert!(found.is_empty());
    }
}
