use thiserror::Error;

/// Problems with a `--config` string or `--config-file`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration text cannot be empty")]
    Empty,
    #[error("Failed to read config file {path}: {message}")]
    Read { path: String, message: String },
    #[error("Invalid {format} in configuration {origin}: {message}")]
    Format {
        format: &'static str,
        origin: &'static str,
        message: String,
    },
    #[error("Invalid configuration text: {json}; {toml}")]
    Unparsable { json: String, toml: String },
    /// A field holds a value outside its allowed range.
    #[error("{field} {message}")]
    Field { field: String, message: String },
    #[error("Invalid configuration {origin}: {source}")]
    Invalid {
        origin: &'static str,
        source: Box<ConfigError>,
    },
}

impl ConfigError {
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::Field {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Attribute a validation failure to the file or text it came from.
    pub fn invalid(origin: &'static str, err: ConfigError) -> Self {
        ConfigError::Invalid {
            origin,
            source: Box::new(err),
        }
    }
}
