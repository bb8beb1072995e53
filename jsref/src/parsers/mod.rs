//! Parsers turn the raw bytes of a document into a value.
//!
//! Parsers are tried in ascending `order`. Only those whose `can_parse`
//! accepts the file are tried; when none does, all of them are tried. The
//! first success wins.

mod binary;
mod json;
mod text;
mod yaml;

pub use binary::BinaryParser;
pub use json::JsonParser;
pub use text::TextParser;
pub use yaml::YamlParser;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::graph::{Graph, Node, NodeId};
use crate::options::ParseOptions;

/// A document handed to parsers.
#[derive(Clone, Debug)]
pub struct FileInfo {
    /// Absolute URL without fragment.
    pub url: String,
    /// Lower-cased extension including the dot, or empty.
    pub extension: String,
    pub data: Vec<u8>,
}

impl FileInfo {
    pub fn new(url: impl Into<String>, data: Vec<u8>) -> Self {
        let url = url.into();
        let extension = refio::path::extension(&url);
        Self {
            url,
            extension,
            data,
        }
    }

    /// The content as UTF-8 text, lossy, without a byte order mark.
    pub fn text(&self) -> String {
        let text = String::from_utf8_lossy(&self.data);
        text.strip_prefix('\u{feff}').unwrap_or(text.as_ref()).to_string()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Parsed {
    /// The document held nothing at all.
    Empty,
    Json(Value),
    Text(String),
    Binary(Vec<u8>),
}

impl Parsed {
    pub fn is_empty(&self) -> bool {
        match self {
            Parsed::Empty | Parsed::Json(Value::Null) => true,
            Parsed::Json(Value::Object(map)) => map.is_empty(),
            Parsed::Json(Value::Array(items)) => items.is_empty(),
            Parsed::Json(Value::String(s)) | Parsed::Text(s) => s.trim().is_empty(),
            Parsed::Json(_) => false,
            Parsed::Binary(bytes) => bytes.is_empty(),
        }
    }

    pub(crate) fn into_graph(self, graph: &mut Graph) -> NodeId {
        match self {
            Parsed::Empty => graph.null(),
            Parsed::Json(value) => graph.import(&value),
            Parsed::Text(text) => graph.add(Node::String(text)),
            Parsed::Binary(bytes) => graph.add(Node::Binary(bytes)),
        }
    }
}

#[async_trait]
pub trait Parser: Send + Sync {
    /// Name used in error messages and as the document's content type.
    fn name(&self) -> &str;
    /// Parsers with a lower order are tried first.
    fn order(&self) -> i32;
    /// Whether an empty result counts as success.
    fn allow_empty(&self) -> bool {
        true
    }
    fn can_parse(&self, file: &FileInfo) -> bool;
    async fn parse(&self, file: &FileInfo) -> Result<Parsed>;
}

/// JSON, YAML, text and binary, in that order.
pub fn default_parsers() -> Vec<Arc<dyn Parser>> {
    vec![
        Arc::new(JsonParser::default()) as Arc<dyn Parser>,
        Arc::new(YamlParser::default()) as Arc<dyn Parser>,
        Arc::new(TextParser::default()) as Arc<dyn Parser>,
        Arc::new(BinaryParser::default()) as Arc<dyn Parser>,
    ]
}

/// Parse a file with the configured parsers. Returns the winning parser's
/// name with the value.
pub async fn parse_file(file: &FileInfo, options: &ParseOptions) -> Result<(String, Parsed)> {
    let mut all: Vec<&Arc<dyn Parser>> = options.parsers.iter().collect();
    all.sort_by_key(|parser| parser.order());
    if all.is_empty() {
        return Err(Error::UnmatchedParser {
            url: file.url.clone(),
        });
    }

    let matching: Vec<&Arc<dyn Parser>> = all
        .iter()
        .copied()
        .filter(|parser| parser.can_parse(file))
        .collect();
    let candidates = if matching.is_empty() { all } else { matching };

    let mut last_error = None;
    for parser in candidates {
        match parser.parse(file).await {
            Ok(parsed) => {
                if parsed.is_empty() && !options.allows_empty(parser.as_ref()) {
                    return Err(Error::syntax(format!(
                        "Error parsing \"{}\" as {}. Parsed value is empty",
                        file.url,
                        parser.name()
                    )));
                }
                debug!("Parsed {} as {}", file.url, parser.name());
                return Ok((parser.name().to_string(), parsed));
            }
            Err(err) => {
                debug!("{} parser rejected {}: {err}", parser.name(), file.url);
                last_error = Some(err);
            }
        }
    }

    Err(match last_error {
        Some(err @ Error::Parser { .. }) => err,
        Some(err) => Error::Parser {
            url: file.url.clone(),
            message: err.to_string(),
        },
        None => Error::UnmatchedParser {
            url: file.url.clone(),
        },
    })
}

/// Extension check shared by the built-in parsers. `FileInfo::extension` is
/// already lower-cased.
pub(crate) fn has_extension(file: &FileInfo, extensions: &[&str]) -> bool {
    extensions.iter().any(|ext| file.extension == *ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn picks_parser_by_extension() {
        let options = ParseOptions::default();
        let file = FileInfo::new("file:///a.yaml", b"type: string\n".to_vec());
        let (name, parsed) = parse_file(&file, &options).await.unwrap();
        assert_eq!(name, "yaml");
        assert_eq!(parsed, Parsed::Json(serde_json::json!({"type": "string"})));
    }

    #[tokio::test]
    async fn unknown_extension_tries_everything() {
        let options = ParseOptions::default();
        let file = FileInfo::new("file:///a.schema", b"{\"a\": 1}".to_vec());
        let (name, _) = parse_file(&file, &options).await.unwrap();
        assert_eq!(name, "json");

        let file = FileInfo::new("file:///notes", b"just: [words".to_vec());
        let (name, parsed) = parse_file(&file, &options).await.unwrap();
        assert_eq!(name, "text");
        assert_eq!(parsed, Parsed::Text("just: [words".to_string()));
    }

    #[tokio::test]
    async fn empty_is_rejected_when_not_allowed() {
        let mut options = ParseOptions::default();
        let file = FileInfo::new("file:///empty.yaml", Vec::new());
        let (_, parsed) = parse_file(&file, &options).await.unwrap();
        assert_eq!(parsed, Parsed::Empty);

        options.allow_empty.insert("yaml".to_string(), false);
        let err = parse_file(&file, &options).await.unwrap_err();
        assert_eq!(err.name(), "SyntaxError");
        assert_eq!(
            err.to_string(),
            "Error parsing \"file:///empty.yaml\" as yaml. Parsed value is empty"
        );
    }

    #[tokio::test]
    async fn malformed_json_reports_parser_error() {
        let options = ParseOptions {
            parsers: vec![Arc::new(JsonParser::default()) as Arc<dyn Parser>],
            ..ParseOptions::default()
        };
        let file = FileInfo::new("file:///bad.json", b"{\"a\": ".to_vec());
        let err = parse_file(&file, &options).await.unwrap_err();
        assert_eq!(err.name(), "ParserError");
        assert!(err.to_string().starts_with("Error parsing file:///bad.json: "));
    }

    #[tokio::test]
    async fn no_parsers_is_unmatched() {
        let options = ParseOptions {
            parsers: Vec::new(),
            ..ParseOptions::default()
        };
        let file = FileInfo::new("file:///a.json", b"{}".to_vec());
        let err = parse_file(&file, &options).await.unwrap_err();
        assert_eq!(err.name(), "UnmatchedParserError");
    }
}
