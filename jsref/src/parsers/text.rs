use async_trait::async_trait;
use regex::Regex;

use super::{FileInfo, Parsed, Parser};
use crate::error::{Error, Result};

const TEXT_EXTENSIONS: &str = r"(?i)\.(txt|htm|html|md|xml|js|min|map|css|scss|less|svg)$";

/// UTF-8 text, returned as a string value.
#[derive(Clone, Debug)]
pub struct TextParser {
    pub allow_empty: bool,
    pattern: Option<Regex>,
}

impl Default for TextParser {
    fn default() -> Self {
        Self {
            allow_empty: true,
            pattern: Regex::new(TEXT_EXTENSIONS).ok(),
        }
    }
}

#[async_trait]
impl Parser for TextParser {
    fn name(&self) -> &str {
        "text"
    }

    fn order(&self) -> i32 {
        300
    }

    fn allow_empty(&self) -> bool {
        self.allow_empty
    }

    fn can_parse(&self, file: &FileInfo) -> bool {
        let path = refio::path::strip_hash(&file.url);
        let path = path.split('?').next().unwrap_or(path);
        self.pattern.as_ref().is_some_and(|re| re.is_match(path))
    }

    async fn parse(&self, file: &FileInfo) -> Result<Parsed> {
        String::from_utf8(file.data.clone())
            .map(Parsed::Text)
            .map_err(|err| Error::Parser {
                url: file.url.clone(),
                message: err.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_text_extensions() {
        let parser = TextParser::default();
        assert!(parser.can_parse(&FileInfo::new("file:///doc/README.md", Vec::new())));
        assert!(parser.can_parse(&FileInfo::new("https://x.test/a.HTML?v=1", Vec::new())));
        assert!(!parser.can_parse(&FileInfo::new("file:///a.json", Vec::new())));
    }
}
