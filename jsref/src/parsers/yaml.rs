use async_trait::async_trait;
use serde_json::{Map, Number, Value};
use serde_yaml::Value as Yaml;

use super::{FileInfo, Parsed, Parser, has_extension};
use crate::error::{Error, Result};

/// YAML 1.2. Also accepts `.json`, since JSON is a subset.
#[derive(Clone, Debug)]
pub struct YamlParser {
    pub allow_empty: bool,
}

impl Default for YamlParser {
    fn default() -> Self {
        Self { allow_empty: true }
    }
}

#[async_trait]
impl Parser for YamlParser {
    fn name(&self) -> &str {
        "yaml"
    }

    fn order(&self) -> i32 {
        200
    }

    fn allow_empty(&self) -> bool {
        self.allow_empty
    }

    fn can_parse(&self, file: &FileInfo) -> bool {
        has_extension(file, &[".yaml", ".yml", ".json"])
    }

    async fn parse(&self, file: &FileInfo) -> Result<Parsed> {
        let text = file.text();
        if text.trim().is_empty() {
            return Ok(Parsed::Empty);
        }
        let parse_error = |message: String| Error::Parser {
            url: file.url.clone(),
            message,
        };
        let yaml: Yaml = serde_yaml::from_str(&text).map_err(|err| parse_error(err.to_string()))?;
        if yaml.is_null() {
            return Ok(Parsed::Empty);
        }
        to_json(yaml).map(Parsed::Json).map_err(parse_error)
    }
}

/// YAML mapping keys may be numbers or booleans (`200:` in a responses
/// map); they become strings.
fn to_json(yaml: Yaml) -> std::result::Result<Value, String> {
    Ok(match yaml {
        Yaml::Null => Value::Null,
        Yaml::Bool(b) => Value::Bool(b),
        Yaml::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                let f = n.as_f64().unwrap_or(f64::NAN);
                Value::Number(
                    Number::from_f64(f).ok_or_else(|| format!("{f} is not a valid JSON number"))?,
                )
            }
        }
        Yaml::String(s) => Value::String(s),
        Yaml::Sequence(items) => Value::Array(items.into_iter().map(to_json).collect::<std::result::Result<_, _>>()?),
        Yaml::Mapping(mapping) => {
            let mut map = Map::new();
            for (key, value) in mapping {
                map.insert(key_string(key)?, to_json(value)?);
            }
            Value::Object(map)
        }
        Yaml::Tagged(tagged) => to_json(tagged.value)?,
    })
}

fn key_string(key: Yaml) -> std::result::Result<String, String> {
    match key {
        Yaml::String(s) => Ok(s),
        Yaml::Number(n) => Ok(n.to_string()),
        Yaml::Bool(b) => Ok(b.to_string()),
        Yaml::Null => Ok("null".to_string()),
        other => Err(format!("unsupported mapping key {other:?}")),
    }
}
