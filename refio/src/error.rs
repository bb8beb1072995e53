use thiserror::Error;

/// Failure to fetch a document. Causes are kept as text so the error stays `Clone`.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ReadError {
    #[error("Error opening file \"{path}\": {message}")]
    Io { path: String, message: String },
    #[error("Error downloading {url}: {message}")]
    Download { url: String, message: String },
    #[error("Error downloading {url}: HTTP ERROR {status}")]
    Status { url: String, status: u16 },
    #[error("Error downloading {}. Too many redirects: {}", chain.first().map(String::as_str).unwrap_or(""), chain.join(" -> "))]
    TooManyRedirects { chain: Vec<String> },
    #[error("Error downloading {url}: HTTP {status} redirect with no location header")]
    MissingLocation { url: String, status: u16 },
    #[error("Error downloading {url}: request timed out after {timeout_ms}ms")]
    Timeout { url: String, timeout_ms: u64 },
    #[error("Could not find resolver for \"{url}\"")]
    Unmatched { url: String },
}

impl ReadError {
    /// The URL or path the failure is about.
    pub fn url(&self) -> &str {
        match self {
            ReadError::Io { path, .. } => path,
            ReadError::Download { url, .. }
            | ReadError::Status { url, .. }
            | ReadError::MissingLocation { url, .. }
            | ReadError::Timeout { url, .. }
            | ReadError::Unmatched { url } => url,
            ReadError::TooManyRedirects { chain } => {
                chain.first().map(String::as_str).unwrap_or("")
            }
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ReadError::Timeout { .. })
    }
}
