use std::fmt;

use refio::ReadError;
use refio::path::to_file_system_path;
use thiserror::Error;

use crate::refs::Refs;

/// Every failure the resolver can report. Each variant names the URL or
/// pointer it is about, so messages stay useful across multi-file graphs.
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// No usable value, or content that is malformed for its format.
    #[error("{message}")]
    Syntax { message: String },
    /// A read failed, or the store has no document for a URL.
    #[error("{message}")]
    Resolver { url: String, message: String },
    #[error("Error parsing {url}: {message}")]
    Parser { url: String, message: String },
    #[error("Could not find resolver for \"{url}\"")]
    UnmatchedResolver { url: String },
    #[error("Could not find parser for \"{url}\"")]
    UnmatchedParser { url: String },
    #[error("Missing $ref pointer \"{pointer}\". Token \"{token}\" does not exist.")]
    MissingPointer { token: String, pointer: String },
    #[error("Invalid $ref pointer \"{pointer}\". Pointers must begin with \"#/\"")]
    InvalidPointer { pointer: String },
    /// Raised only when circular references are configured to be an error.
    #[error("Circular $ref pointer found at {path}")]
    Circular { path: String },
    #[error("{message}")]
    Timeout { message: String },
    #[error("{0}")]
    Group(Box<ErrorGroup>),
}

impl Error {
    pub fn syntax(message: impl Into<String>) -> Self {
        Error::Syntax {
            message: message.into(),
        }
    }

    pub fn resolver(url: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Resolver {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Error::Syntax { .. } => "SyntaxError",
            Error::Resolver { .. } => "ResolverError",
            Error::Parser { .. } => "ParserError",
            Error::UnmatchedResolver { .. } => "UnmatchedResolverError",
            Error::UnmatchedParser { .. } => "UnmatchedParserError",
            Error::MissingPointer { .. } => "MissingPointerError",
            Error::InvalidPointer { .. } => "InvalidPointerError",
            Error::Circular { .. } => "ReferenceError",
            Error::Timeout { .. } => "TimeoutError",
            Error::Group(_) => "JSONParserErrorGroup",
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Error::Syntax { .. } => "ESYNTAX",
            Error::Resolver { .. } => "ERESOLVER",
            Error::Parser { .. } => "EPARSER",
            Error::UnmatchedResolver { .. } => "EUNMATCHEDRESOLVER",
            Error::UnmatchedParser { .. } => "EUNMATCHEDPARSER",
            Error::MissingPointer { .. } => "EMISSINGPOINTER",
            Error::InvalidPointer { .. } => "EINVALIDPOINTER",
            Error::Circular { .. } => "ECIRCULAR",
            Error::Timeout { .. } => "ETIMEOUT",
            Error::Group(_) => "EGROUP",
        }
    }

    /// Whether `continue_on_error` may record this error and keep going.
    /// Syntax and circular errors abort, and so does running out of the
    /// dereference time budget. Read timeouts are resolver errors.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Resolver { .. }
                | Error::Parser { .. }
                | Error::UnmatchedResolver { .. }
                | Error::UnmatchedParser { .. }
                | Error::MissingPointer { .. }
                | Error::InvalidPointer { .. }
        )
    }

    pub fn as_group(&self) -> Option<&ErrorGroup> {
        match self {
            Error::Group(group) => Some(group),
            _ => None,
        }
    }
}

impl From<ReadError> for Error {
    fn from(err: ReadError) -> Self {
        match err {
            ReadError::Unmatched { url } => Error::UnmatchedResolver { url },
            other => Error::Resolver {
                url: other.url().to_string(),
                message: other.to_string(),
            },
        }
    }
}

/// One failure recorded while `continue_on_error` is set.
#[derive(Clone, Debug)]
pub struct ErrorEntry {
    pub error: Error,
    /// Location of the failing `$ref` inside the referencing document.
    pub path: Vec<String>,
    /// The referencing document.
    pub source: String,
}

impl ErrorEntry {
    pub fn new(error: Error, path: Vec<String>, source: impl Into<String>) -> Self {
        Self {
            error,
            path,
            source: source.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.error.name()
    }

    pub fn message(&self) -> String {
        self.error.to_string()
    }

    pub(crate) fn footprint(&self) -> String {
        format!(
            "{}+{}+{}+{}",
            self.path.join(":"),
            self.source,
            self.error.code(),
            self.error
        )
    }
}

/// All failures of a `continue_on_error` run, raised together at the end.
/// The partially populated store stays available for inspection.
#[derive(Clone, Debug)]
pub struct ErrorGroup {
    pub errors: Vec<ErrorEntry>,
    pub refs: Refs,
}

impl ErrorGroup {
    pub fn root_path(&self) -> String {
        to_file_system_path(self.refs.root_path().unwrap_or_default())
    }
}

impl fmt::Display for ErrorGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.errors.len();
        let plural = if count == 1 { "" } else { "s" };
        write!(
            f,
            "{count} error{plural} occurred while reading '{}'",
            self.root_path()
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
