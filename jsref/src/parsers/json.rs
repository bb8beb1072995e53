use async_trait::async_trait;

use super::{FileInfo, Parsed, Parser, has_extension};
use crate::error::{Error, Result};

/// Strict JSON. A leading byte order mark is ignored.
#[derive(Clone, Debug)]
pub struct JsonParser {
    pub allow_empty: bool,
}

impl Default for JsonParser {
    fn default() -> Self {
        Self { allow_empty: true }
    }
}

#[async_trait]
impl Parser for JsonParser {
    fn name(&self) -> &str {
        "json"
    }

    fn order(&self) -> i32 {
        100
    }

    fn allow_empty(&self) -> bool {
        self.allow_empty
    }

    fn can_parse(&self, file: &FileInfo) -> bool {
        has_extension(file, &[".json"])
    }

    async fn parse(&self, file: &FileInfo) -> Result<Parsed> {
        let text = file.text();
        if text.trim().is_empty() {
            return Ok(Parsed::Empty);
        }
        serde_json::from_str(&text)
            .map(Parsed::Json)
            .map_err(|err| Error::Parser {
                url: file.url.clone(),
                message: err.to_string(),
            })
    }
}
