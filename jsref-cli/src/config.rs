use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use jsref::{BundleRoot, CircularPolicy, Options};
use refio::HttpOptions;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::exception::ConfigError;

const MAX_REDIRECTS: usize = 100;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircularSetting {
    #[default]
    Allow,
    Ignore,
    Error,
}

impl From<CircularSetting> for CircularPolicy {
    fn from(setting: CircularSetting) -> Self {
        match setting {
            CircularSetting::Allow => CircularPolicy::Allow,
            CircularSetting::Ignore => CircularPolicy::Ignore,
            CircularSetting::Error => CircularPolicy::Error,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_redirects")]
    pub redirects: usize,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            redirects: default_redirects(),
            headers: BTreeMap::new(),
        }
    }
}

impl HttpConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms < 1 {
            return Err(ConfigError::field("resolve.http.timeout_ms", "must be >= 1"));
        }
        if self.redirects > MAX_REDIRECTS {
            return Err(ConfigError::field(
                "resolve.http.redirects",
                format!("must be <= {MAX_REDIRECTS}"),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveConfig {
    #[serde(default = "default_external")]
    pub external: bool,
    #[serde(default)]
    pub skip_internal: bool,
    #[serde(default)]
    pub http: HttpConfig,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            external: default_external(),
            skip_internal: false,
            http: HttpConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseConfig {
    /// Per-parser overrides, e.g. `yaml = false`.
    #[serde(default)]
    pub allow_empty: BTreeMap<String, bool>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DereferenceConfig {
    #[serde(default)]
    pub circular: CircularSetting,
    #[serde(default)]
    pub preserve_id: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleRootConfig {
    pub path: String,
    #[serde(default)]
    pub conditions: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleConfig {
    #[serde(default)]
    pub roots: Vec<BundleRootConfig>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub continue_on_error: bool,
    #[serde(default)]
    pub parse: ParseConfig,
    #[serde(default)]
    pub resolve: ResolveConfig,
    #[serde(default)]
    pub dereference: DereferenceConfig,
    #[serde(default)]
    pub bundle: BundleConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.resolve.http.validate()?;
        if self.dereference.timeout_ms == Some(0) {
            return Err(ConfigError::field("dereference.timeout_ms", "must be >= 1"));
        }
        if let Some(root) = self.bundle.roots.iter().find(|root| root.path.trim_matches('/').is_empty()) {
            return Err(ConfigError::field(
                "bundle.roots.path",
                format!("\"{}\" must name a container", root.path),
            ));
        }
        Ok(())
    }

    pub fn to_options(&self) -> Options {
        let mut options = Options::default();
        options.continue_on_error = self.continue_on_error;
        options.parse.allow_empty = self
            .parse
            .allow_empty
            .iter()
            .map(|(name, allow)| (name.clone(), *allow))
            .collect();

        options.resolve.external = self.resolve.external;
        options.resolve.skip_internal = self.resolve.skip_internal;
        options.resolve.http = HttpOptions {
            timeout: Duration::from_millis(self.resolve.http.timeout_ms),
            redirects: self.resolve.http.redirects,
            headers: self.resolve.http.headers.clone(),
        };

        options.dereference.circular = self.dereference.circular.into();
        options.dereference.preserve_id = self.dereference.preserve_id;
        options.dereference.timeout = self.dereference.timeout_ms.map(Duration::from_millis);

        if !self.bundle.roots.is_empty() {
            let roots = self
                .bundle
                .roots
                .iter()
                .map(|root| {
                    let conditions: Vec<&str> = root.conditions.iter().map(String::as_str).collect();
                    BundleRoot::new(&root.path, &conditions)
                })
                .collect();
            options.bundle.roots = Some(roots);
        }
        options
    }
}

fn default_timeout_ms() -> u64 {
    60_000
}

fn default_redirects() -> usize {
    5
}

fn default_external() -> bool {
    true
}

pub async fn load_config(config_file: &Path) -> Result<Config, ConfigError> {
    debug!("Loading config from file: {}", config_file.display());
    let config_text = tokio::fs::read_to_string(config_file)
        .await
        .map_err(|err| ConfigError::Read {
            path: config_file.display().to_string(),
            message: err.to_string(),
        })?;

    let config: Config = if config_file
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
    {
        serde_json::from_str(&config_text).map_err(|err| ConfigError::Format {
            format: "JSON",
            origin: "file",
            message: err.to_string(),
        })?
    } else {
        toml::from_str(&config_text).map_err(|err| ConfigError::Format {
            format: "TOML",
            origin: "file",
            message: err.to_string(),
        })?
    };

    config
        .validate()
        .map_err(|err| ConfigError::invalid("file", err))?;
    Ok(config)
}

pub fn load_config_from_string(config_string: &str) -> Result<Config, ConfigError> {
    if config_string.trim().is_empty() {
        return Err(ConfigError::Empty);
    }

    let json_error = match serde_json::from_str::<serde_json::Value>(config_string) {
        Ok(value) => {
            let config: Config = serde_json::from_value(value).map_err(|err| ConfigError::Format {
                format: "JSON",
                origin: "text",
                message: err.to_string(),
            })?;
            config
                .validate()
                .map_err(|err| ConfigError::invalid("text", err))?;
            return Ok(config);
        }
        Err(err) => err.to_string(),
    };

    match toml::from_str::<Config>(config_string) {
        Ok(config) => {
            config
                .validate()
                .map_err(|err| ConfigError::invalid("text", err))?;
            Ok(config)
        }
        Err(toml_error) => Err(ConfigError::Unparsable {
            json: json_error,
            toml: toml_error.to_string(),
        }),
    }
}
