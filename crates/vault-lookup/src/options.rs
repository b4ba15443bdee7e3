//! Lookup options supplied by the host for each call
//!
//! The host hands over a loosely typed mapping. [`LookupOptions::from_value`]
//! validates it before any I/O happens and compiles the key patterns once, so
//! a single `LookupOptions` can be reused for many keys.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::env::{Environment, ADDR_VAR};
use crate::error::ConfigError;
use crate::filter::KeyFilter;

/// Address used when neither the options nor `VAULT_ADDR` provide one
pub const DEFAULT_ADDRESS: &str = "https://127.0.0.1:8200";

/// Per-request timeout when `timeout` is not set
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How the extracted `default_field` value is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldParse {
    /// Returned as stored
    #[default]
    String,
    /// String values are parsed as JSON, falling back to the raw string
    Json,
}

impl FieldParse {
    fn parse(value: Option<&str>) -> Result<Self, ConfigError> {
        match value {
            None | Some("string") => Ok(Self::String),
            Some("json") => Ok(Self::Json),
            Some(other) => Err(ConfigError::InvalidChoice {
                option: "default_field_parse",
                value: other.to_string(),
                allowed: "'string','json'",
            }),
        }
    }
}

/// What to do around the `default_field`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldBehavior {
    /// Secrets lacking the field are treated as not found
    Ignore,
    /// The field is unwrapped only when it is the secret's sole field
    Only,
}

impl FieldBehavior {
    fn parse(value: Option<&str>) -> Result<Option<Self>, ConfigError> {
        match value {
            None => Ok(None),
            Some("ignore") => Ok(Some(Self::Ignore)),
            Some("only") => Ok(Some(Self::Only)),
            Some(other) => Err(ConfigError::InvalidChoice {
                option: "default_field_behavior",
                value: other.to_string(),
                allowed: "'ignore','only'",
            }),
        }
    }
}

/// KV secret engine API shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KvVersion {
    /// `<mount>/<path>`, payload under `data`
    V1,
    /// `<mount>/data/<path>`, payload under `data.data`
    V2,
}

impl KvVersion {
    /// Interpret the `options.version` string of a mount's metadata
    pub fn from_metadata(version: Option<&str>) -> Self {
        match version {
            Some("2") => Self::V2,
            _ => Self::V1,
        }
    }
}

/// Configured engine version for every mount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VersionSetting {
    /// Ask the store for each mount's version
    #[default]
    Auto,
    /// Assume this version without probing
    Fixed(KvVersion),
}

impl VersionSetting {
    fn parse(value: Option<&Value>) -> Result<Self, ConfigError> {
        let text = match value {
            None | Some(Value::Null) => return Ok(Self::Auto),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        };

        match text.as_str() {
            "auto" => Ok(Self::Auto),
            "1" => Ok(Self::Fixed(KvVersion::V1)),
            "2" => Ok(Self::Fixed(KvVersion::V2)),
            _ => Err(ConfigError::InvalidChoice {
                option: "kv_version",
                value: text,
                allowed: "'auto','1','2'",
            }),
        }
    }
}

/// A secret engine mount and the prefixes searched under it, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub name: String,
    pub prefixes: Vec<String>,
}

impl Mount {
    pub fn new(name: impl Into<String>, prefixes: &[&str]) -> Self {
        Self {
            name: name.into(),
            prefixes: prefixes.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// Options as they arrive from the host, before validation
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawOptions {
    address: Option<String>,
    token: Option<String>,
    mounts: Option<Map<String, Value>>,
    confine_to_keys: Option<Value>,
    strip_from_keys: Option<Value>,
    default_field: Option<String>,
    default_field_parse: Option<String>,
    default_field_behavior: Option<String>,
    continue_if_not_found: Option<bool>,
    kv_version: Option<Value>,
    ssl_verify: Option<bool>,
    ssl_ca_cert: Option<PathBuf>,
    timeout: Option<f64>,
}

/// Validated options for one or more lookups
#[derive(Debug, Clone)]
pub struct LookupOptions {
    /// Store address; see [`LookupOptions::address`] for the fallbacks
    pub address: Option<String>,
    /// Literal token, path to a token file, or the skip sentinel
    pub token: Option<String>,
    /// Mounts in the order they are searched
    pub mounts: Vec<Mount>,
    /// Compiled `confine_to_keys` / `strip_from_keys`
    pub key_filter: KeyFilter,
    pub default_field: Option<String>,
    pub default_field_parse: FieldParse,
    pub default_field_behavior: Option<FieldBehavior>,
    /// Keep searching after a store error instead of failing the lookup
    pub continue_if_not_found: bool,
    pub kv_version: VersionSetting,
    pub ssl_verify: bool,
    pub ssl_ca_cert: Option<PathBuf>,
    pub timeout: Duration,
}

impl Default for LookupOptions {
    fn default() -> Self {
        Self {
            address: None,
            token: None,
            mounts: Vec::new(),
            key_filter: KeyFilter::default(),
            default_field: None,
            default_field_parse: FieldParse::default(),
            default_field_behavior: None,
            continue_if_not_found: false,
            kv_version: VersionSetting::default(),
            ssl_verify: true,
            ssl_ca_cert: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl LookupOptions {
    /// Validate a host-supplied options mapping
    ///
    /// Checks run in a fixed order (`default_field_parse`,
    /// `default_field_behavior`, `confine_to_keys`, `strip_from_keys`, then
    /// everything else) so the first reported error is predictable.
    pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
        if !value.is_object() {
            return Err(ConfigError::invalid_option(
                "options",
                format!("expected a mapping, got {}", value),
            ));
        }
        let raw = RawOptions::deserialize(value)?;

        let default_field_parse = FieldParse::parse(raw.default_field_parse.as_deref())?;
        let default_field_behavior = FieldBehavior::parse(raw.default_field_behavior.as_deref())?;
        let confine = pattern_list("confine_to_keys", raw.confine_to_keys)?;
        let strip = pattern_list("strip_from_keys", raw.strip_from_keys)?;
        let key_filter = KeyFilter::new(&confine, &strip)?;

        let mounts = parse_mounts(raw.mounts)?;
        let kv_version = VersionSetting::parse(raw.kv_version.as_ref())?;

        let timeout = match raw.timeout {
            None => DEFAULT_TIMEOUT,
            Some(secs) if secs.is_finite() && secs > 0.0 => Duration::from_secs_f64(secs),
            Some(secs) => {
                return Err(ConfigError::invalid_option(
                    "timeout",
                    format!("must be a positive number of seconds, got {}", secs),
                ))
            }
        };

        Ok(Self {
            address: raw.address.filter(|a| !a.is_empty()),
            token: raw.token,
            mounts,
            key_filter,
            default_field: raw.default_field,
            default_field_parse,
            default_field_behavior,
            continue_if_not_found: raw.continue_if_not_found.unwrap_or(false),
            kv_version,
            ssl_verify: raw.ssl_verify.unwrap_or(true),
            ssl_ca_cert: raw.ssl_ca_cert,
            timeout,
        })
    }

    /// Store address: option, then `VAULT_ADDR`, then [`DEFAULT_ADDRESS`]
    pub fn address(&self, env: &impl Environment) -> String {
        self.address
            .clone()
            .or_else(|| env.var(ADDR_VAR).filter(|a| !a.is_empty()))
            .unwrap_or_else(|| DEFAULT_ADDRESS.to_string())
            .trim_end_matches('/')
            .to_string()
    }
}

fn pattern_list(option: &'static str, value: Option<Value>) -> Result<Vec<String>, ConfigError> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(pattern) => Ok(pattern),
                other => Err(ConfigError::invalid_option(
                    option,
                    format!("patterns must be strings, got {}", other),
                )),
            })
            .collect(),
        Some(_) => Err(ConfigError::NotAnArray { option }),
    }
}

fn parse_mounts(value: Option<Map<String, Value>>) -> Result<Vec<Mount>, ConfigError> {
    value
        .unwrap_or_default()
        .into_iter()
        .map(|(name, prefixes)| {
            let prefixes = match prefixes {
                Value::Null => Vec::new(),
                Value::String(prefix) => vec![prefix],
                Value::Array(items) => items
                    .into_iter()
                    .map(|item| match item {
                        Value::String(prefix) => Ok(prefix),
                        other => Err(ConfigError::invalid_option(
                            "mounts",
                            format!("prefix under '{}' must be a string, got {}", name, other),
                        )),
                    })
                    .collect::<Result<Vec<_>, _>>()?,
                other => {
                    return Err(ConfigError::invalid_option(
                        "mounts",
                        format!("prefixes for '{}' must be a list, got {}", name, other),
                    ))
                }
            };
            Ok(Mount { name, prefixes })
        })
        .collect()
}
