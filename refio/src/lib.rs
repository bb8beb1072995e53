//! refio: fetching raw schema documents by URL.

pub mod file;
pub mod http;
pub mod path;

mod constant;
mod error;

pub use constant::{VERSION, user_agent};
pub use error::ReadError;
pub use file::FileReader;
pub use http::{HttpOptions, HttpReader};

use std::sync::Arc;

use tracing::debug;
use url::Url;

/// Describes one document to be read. Readers decide applicability from it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadRequest {
    /// Absolute URL without fragment.
    pub url: Url,
    /// Lower-cased file extension including the dot, or empty.
    pub extension: String,
}

impl ReadRequest {
    pub fn new(url: Url) -> Self {
        let extension = path::extension(url.as_str());
        Self { url, extension }
    }
}

/// Bytes produced by a reader, tagged with the reader that produced them.
#[derive(Clone, Debug)]
pub struct ReadOutput {
    pub reader: String,
    pub data: Vec<u8>,
}

/// A source of raw document bytes keyed by URL scheme.
#[async_trait::async_trait]
pub trait Reader: Send + Sync {
    fn name(&self) -> &str;
    /// Readers with a lower order are tried first.
    fn order(&self) -> i32;
    fn can_read(&self, request: &ReadRequest) -> bool;
    async fn read(&self, request: &ReadRequest) -> Result<Vec<u8>, ReadError>;
}

/// The built-in file and HTTP readers.
pub fn default_readers(http: HttpOptions) -> Vec<Arc<dyn Reader>> {
    vec![
        Arc::new(FileReader::new()) as Arc<dyn Reader>,
        Arc::new(HttpReader::new(http)) as Arc<dyn Reader>,
    ]
}

/// Try every applicable reader in ascending order until one succeeds.
///
/// Ties in `order` keep declaration order. When no reader claims the URL the
/// result is [`ReadError::Unmatched`]; when all applicable readers fail, the
/// last failure is returned.
pub async fn read(readers: &[Arc<dyn Reader>], request: &ReadRequest) -> Result<ReadOutput, ReadError> {
    let mut candidates: Vec<&Arc<dyn Reader>> = readers
        .iter()
        .filter(|reader| reader.can_read(request))
        .collect();
    candidates.sort_by_key(|reader| reader.order());

    let mut last_error = None;
    for reader in candidates {
        debug!("Reading {} with the {} reader", request.url, reader.name());
        match reader.read(request).await {
            Ok(data) => {
                return Ok(ReadOutput {
                    reader: reader.name().to_string(),
                    data,
                });
            }
            Err(err) => last_error = Some(err),
        }
    }

    Err(last_error.unwrap_or_else(|| ReadError::Unmatched {
        url: request.url.to_string(),
    }))
}
