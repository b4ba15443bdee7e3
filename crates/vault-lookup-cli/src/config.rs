//! Lookup options for the command line
//!
//! Options are resolved in this order (first found wins):
//! 1. Command-line flags
//! 2. Options file (`--config`, `VAULT_LOOKUP_CONFIG`, or the default path)
//! 3. Backend defaults (`VAULT_ADDR`, `VAULT_TOKEN`, ...)

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde_json::{Map, Value};

/// Environment variable naming the options file
const CONFIG_ENV: &str = "VAULT_LOOKUP_CONFIG";

/// Flag values that override the options file
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub address: Option<String>,
    pub token: Option<String>,
    /// `(mount, prefix)` pairs; when present they replace the file's mounts
    pub mounts: Vec<(String, String)>,
    pub default_field: Option<String>,
    pub default_field_parse: Option<String>,
    pub default_field_behavior: Option<String>,
    pub continue_if_not_found: bool,
}

/// Get the default options file path
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vault-lookup")
        .join("options.toml")
}

/// Options file to read: flag, then environment, then the default if it exists
fn options_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Ok(path) = env::var(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }
    let default = default_path();
    default.exists().then_some(default)
}

/// Load an options file into an options mapping
pub fn load_file(path: &Path) -> anyhow::Result<Map<String, Value>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read options file {}", path.display()))?;
    let table: toml::Table = toml::from_str(&content)
        .with_context(|| format!("Failed to parse options file {}", path.display()))?;

    match serde_json::to_value(table)? {
        Value::Object(map) => {
            tracing::info!("Loaded options from {}", path.display());
            Ok(map)
        }
        other => bail!("Options file must contain a table, got {}", other),
    }
}

/// Build the options mapping handed to the backend
pub fn resolve(explicit: Option<&Path>, overrides: &Overrides) -> anyhow::Result<Value> {
    let mut options = match options_path(explicit) {
        Some(path) => load_file(&path)?,
        None => {
            tracing::debug!("No options file, using flags and environment only");
            Map::new()
        }
    };

    apply_overrides(&mut options, overrides);
    Ok(Value::Object(options))
}

fn apply_overrides(options: &mut Map<String, Value>, overrides: &Overrides) {
    let strings = [
        ("address", &overrides.address),
        ("token", &overrides.token),
        ("default_field", &overrides.default_field),
        ("default_field_parse", &overrides.default_field_parse),
        ("default_field_behavior", &overrides.default_field_behavior),
    ];
    for (name, value) in strings {
        if let Some(value) = value {
            options.insert(name.to_string(), Value::String(value.clone()));
        }
    }

    if overrides.continue_if_not_found {
        options.insert("continue_if_not_found".to_string(), Value::Bool(true));
    }

    if !overrides.mounts.is_empty() {
        let mut mounts = Map::new();
        for (mount, prefix) in &overrides.mounts {
            let prefixes = mounts
                .entry(mount.clone())
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(prefixes) = prefixes {
                prefixes.push(Value::String(prefix.clone()));
            }
        }
        options.insert("mounts".to_string(), Value::Object(mounts));
    }
}

/// Parse a `MOUNT=PREFIX` flag value
pub fn parse_mount(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((mount, prefix)) if !mount.is_empty() => {
            Ok((mount.to_string(), prefix.to_string()))
        }
        _ => Err(format!("expected MOUNT=PREFIX, got '{}'", value)),
    }
}
