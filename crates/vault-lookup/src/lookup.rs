//! Lookup orchestration
//!
//! One call walks these steps:
//!
//! 1. validate options (fatal on error, before any I/O)
//! 2. answer from the host cache if it already has the key
//! 3. resolve the token; the `IGNORE-VAULT` sentinel reports "not found"
//! 4. apply `confine_to_keys` / `strip_from_keys` to the key
//! 5. read each candidate path in order, stopping at the first payload
//! 6. shape the payload and hand it to the host through `interpolate`/`cache`
//!
//! Store errors are fatal unless `continue_if_not_found` is set, in which
//! case the next candidate is tried. Candidates are read strictly one after
//! another.

use serde_json::Value;

use crate::client::{SecretStore, VaultClient};
use crate::context::LookupContext;
use crate::env::{Environment, ProcessEnv};
use crate::error::{ConfigError, LookupError};
use crate::options::{KvVersion, LookupOptions, Mount, VersionSetting};
use crate::paths;
use crate::shaper::{self, Shaping};
use crate::token::{self, Credential, IGNORE_VAULT};

/// Look up `key` with the process environment and a Vault HTTP client
pub fn lookup_key(
    key: &str,
    options: &Value,
    context: &dyn LookupContext,
) -> Result<Option<Value>, LookupError> {
    VaultLookup::new().lookup_key(key, options, context)
}

/// Lookup backend bound to an environment for token and address fallbacks
#[derive(Debug, Default, Clone)]
pub struct VaultLookup<E = ProcessEnv> {
    env: E,
}

impl VaultLookup<ProcessEnv> {
    /// Backend reading the real process environment
    pub fn new() -> Self {
        Self { env: ProcessEnv }
    }
}

impl<E: Environment> VaultLookup<E> {
    /// Backend reading environment variables from `env`
    pub fn with_env(env: E) -> Self {
        Self { env }
    }

    /// Validate a raw options mapping, then look up `key`
    pub fn lookup_key(
        &self,
        key: &str,
        options: &Value,
        context: &dyn LookupContext,
    ) -> Result<Option<Value>, LookupError> {
        let options = LookupOptions::from_value(options)?;
        self.lookup(key, &options, context)
    }

    /// Look up `key` against the store at the configured address
    pub fn lookup(
        &self,
        key: &str,
        options: &LookupOptions,
        context: &dyn LookupContext,
    ) -> Result<Option<Value>, LookupError> {
        let address = options.address(&self.env);
        self.lookup_with(key, options, context, move |token| {
            VaultClient::new(options, address, token)
        })
    }

    /// Look up `key`, creating the store with `connect` once a token is known
    ///
    /// `connect` is not called when the lookup ends before the store is
    /// needed (cache hit, skip sentinel, confined key).
    pub fn lookup_with<S, F>(
        &self,
        key: &str,
        options: &LookupOptions,
        context: &dyn LookupContext,
        connect: F,
    ) -> Result<Option<Value>, LookupError>
    where
        S: SecretStore,
        F: FnOnce(String) -> Result<S, ConfigError>,
    {
        if context.cache_has_key(key) {
            if let Some(value) = context.cached_value(key) {
                tracing::debug!(key = %key, "Answered from host cache");
                return Ok(Some(value));
            }
        }

        let token = match token::resolve(options.token.as_deref(), &self.env)? {
            Credential::Token(token) => token,
            Credential::Ignore => {
                context.explain(&|| format!("token set to {} - Quitting early", IGNORE_VAULT));
                context.not_found();
                return Ok(None);
            }
        };

        let Some(filtered) = options.key_filter.apply(key) else {
            context.explain(&|| format!("{} not allowed by confine_to_keys", key));
            context.not_found();
            return Ok(None);
        };

        if filtered.processed.is_empty() {
            context.explain(&|| format!("{} is empty after strip_from_keys", key));
            context.not_found();
            return Ok(None);
        }

        let store = connect(token)?;
        let mounts = interpolate_mounts(&options.mounts, context);
        let candidates = paths::build(&mounts, &filtered.processed, |mount| {
            mount_version(&store, options.kv_version, mount)
        });

        let mut tried = 0usize;
        for candidate in candidates {
            tried += 1;
            context.explain(&|| {
                format!("Looking in path {} for {}", candidate.secret_path(), key)
            });

            let payload = match store.read(&candidate.storage_path, candidate.version) {
                Ok(Some(payload)) => payload,
                Ok(None) => {
                    tracing::debug!(path = %candidate.storage_path, "No secret at path");
                    continue;
                }
                Err(source) => {
                    tracing::debug!(path = %candidate.storage_path, "Read failed: {}", source);
                    let err = LookupError::store(candidate.secret_path(), source);
                    context.explain(&|| err.to_string());
                    if options.continue_if_not_found {
                        tracing::warn!("{}, trying next path", err);
                        continue;
                    }
                    return Err(err);
                }
            };

            context.explain(&|| format!("Read secret: {}", key));

            return match shaper::shape(payload, &Shaping::from(options)) {
                Some(value) => {
                    let value = context.interpolate(value);
                    Ok(Some(context.cache(key, value)))
                }
                None => {
                    context.explain(&|| {
                        format!(
                            "Secret {} has no field {}, ignoring it",
                            candidate.storage_path,
                            options.default_field.as_deref().unwrap_or_default()
                        )
                    });
                    context.not_found();
                    Ok(None)
                }
            };
        }

        tracing::debug!(key = %key, candidates = tried, "Key not found");
        context.not_found();
        Ok(None)
    }
}

/// Engine version for `mount`, probing the store when not configured
fn mount_version<S: SecretStore>(store: &S, setting: VersionSetting, mount: &str) -> KvVersion {
    match setting {
        VersionSetting::Fixed(version) => version,
        VersionSetting::Auto => store.kv_version(mount).unwrap_or_else(|e| {
            tracing::warn!(mount = %mount, "Could not determine KV version, assuming v1: {}", e);
            KvVersion::V1
        }),
    }
}

/// Run every prefix through the host's interpolation
fn interpolate_mounts(mounts: &[Mount], context: &dyn LookupContext) -> Vec<Mount> {
    mounts
        .iter()
        .map(|mount| Mount {
            name: mount.name.clone(),
            prefixes: mount
                .prefixes
                .iter()
                .map(|prefix| match context.interpolate(Value::String(prefix.clone())) {
                    Value::String(expanded) => expanded,
                    _ => prefix.clone(),
                })
                .collect(),
        })
        .collect()
}
