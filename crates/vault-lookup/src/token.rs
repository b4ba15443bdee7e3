//! Access token resolution
//!
//! The `token` option is either the skip sentinel, a path to a file holding
//! the token, or the token itself. Without it the `VAULT_TOKEN` environment
//! variable is used. Token files are re-read on every call so rotated tokens
//! are picked up.

use std::path::Path;

use crate::env::{Environment, TOKEN_VAR};
use crate::error::ConfigError;

/// Token value that disables the backend: lookups report "not found"
/// without contacting the store
pub const IGNORE_VAULT: &str = "IGNORE-VAULT";

/// Outcome of token resolution
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Token to send with every request
    Token(String),
    /// The sentinel was configured; skip the store entirely
    Ignore,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::Token(_) => f.write_str("Token(<redacted>)"),
            Credential::Ignore => f.write_str("Ignore"),
        }
    }
}

impl Credential {
    fn from_value(value: String) -> Self {
        if value == IGNORE_VAULT {
            Credential::Ignore
        } else {
            Credential::Token(value)
        }
    }

    /// Token source for logging
    fn source_name(option: Option<&str>) -> &'static str {
        match option {
            Some(value) if !value.is_empty() => "option",
            _ => "environment",
        }
    }
}

/// Resolve the token for one lookup
pub fn resolve(option: Option<&str>, env: &impl Environment) -> Result<Credential, ConfigError> {
    tracing::debug!(source = Credential::source_name(option), "Resolving token");

    match option {
        Some(value) if !value.is_empty() => {
            if value == IGNORE_VAULT {
                return Ok(Credential::Ignore);
            }

            let expanded = shellexpand::tilde(value);
            let path = Path::new(expanded.as_ref());
            if path.is_file() {
                return read_token_file(path).map(Credential::from_value);
            }

            Ok(Credential::Token(value.to_string()))
        }
        _ => env
            .var(TOKEN_VAR)
            .filter(|token| !token.is_empty())
            .map(Credential::from_value)
            .ok_or(ConfigError::MissingToken),
    }
}

/// First line of the file, trimmed
fn read_token_file(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::token_file(path, e.to_string()))?;

    let token = content.lines().next().unwrap_or("").trim();
    if token.is_empty() {
        return Err(ConfigError::token_file(path, "file is empty"));
    }

    tracing::debug!(path = %path.display(), "Read token from file");
    Ok(token.to_string())
}
