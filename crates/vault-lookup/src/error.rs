use std::path::PathBuf;

use thiserror::Error;

/// Invalid lookup configuration. Always fatal, never retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Option value outside its allowed set
    #[error("invalid value for {option}: '{value}', should be one of {allowed}")]
    InvalidChoice {
        option: &'static str,
        value: String,
        allowed: &'static str,
    },

    /// Pattern list option given as something other than a list
    #[error("{option} must be an array")]
    NotAnArray { option: &'static str },

    /// Pattern that does not compile
    #[error("creating regexp for {option} failed with: {source}: /{pattern}/")]
    InvalidPattern {
        option: &'static str,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Neither the `token` option nor `VAULT_TOKEN` supplied a token
    #[error("no token set in options and no token in VAULT_TOKEN")]
    MissingToken,

    /// Token file exists but could not be used
    #[error("Failed to read token file '{path}': {message}")]
    TokenFile { path: PathBuf, message: String },

    /// CA bundle for TLS could not be loaded
    #[error("Failed to load CA certificate '{path}': {reason}")]
    CaCert { path: PathBuf, reason: String },

    /// Option present with an unusable shape or value
    #[error("invalid option {option}: {reason}")]
    InvalidOption { option: &'static str, reason: String },

    /// Options mapping could not be deserialized
    #[error("malformed lookup options: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl ConfigError {
    /// Create an invalid option error
    pub fn invalid_option(option: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidOption {
            option,
            reason: reason.into(),
        }
    }

    /// Create a token file error
    pub fn token_file(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::TokenFile {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Failure talking to the secret store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Network, TLS, or timeout failure
    #[error("{0}")]
    Transport(#[from] ureq::Error),

    /// Non-success status other than "no such secret"
    #[error("{message} (HTTP {status})")]
    Api { status: u16, message: String },

    /// Success status with a body that is not a secret envelope
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Error returned from a lookup
#[derive(Debug, Error)]
pub enum LookupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Could not read secret {path}: {source}")]
    Store {
        path: String,
        #[source]
        source: StoreError,
    },
}

impl LookupError {
    /// Attach the attempted storage path to a store failure
    pub fn store(path: impl Into<String>, source: StoreError) -> Self {
        Self::Store {
            path: path.into(),
            source,
        }
    }

    /// Whether this is a configuration error (as opposed to a store failure)
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}
