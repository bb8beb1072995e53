use async_trait::async_trait;

use super::{FileInfo, Parsed, Parser, has_extension};
use crate::error::Result;

/// Raw bytes, kept as a binary value. Accepts common image formats, and
/// anything else as a last resort.
#[derive(Clone, Debug)]
pub struct BinaryParser {
    pub allow_empty: bool,
}

impl Default for BinaryParser {
    fn default() -> Self {
        Self { allow_empty: true }
    }
}

#[async_trait]
impl Parser for BinaryParser {
    fn name(&self) -> &str {
        "binary"
    }

    fn order(&self) -> i32 {
        400
    }

    fn allow_empty(&self) -> bool {
        self.allow_empty
    }

    fn can_parse(&self, file: &FileInfo) -> bool {
        has_extension(file, &[".jpeg", ".jpg", ".gif", ".png", ".bmp", ".ico"])
    }

    async fn parse(&self, file: &FileInfo) -> Result<Parsed> {
        Ok(Parsed::Binary(file.data.clone()))
    }
}
