//! Data-lookup backend that resolves configuration keys from a Vault-style
//! KV secret store.
//!
//! A host hierarchy resolver calls [`lookup_key`] once per requested key with
//! a mapping of options and a [`LookupContext`]. The backend either returns a
//! value or reports "not found" so the host can continue with its other
//! backends.
//!
//! Per call the pipeline is:
//!
//! - **Options** ([`LookupOptions`]): validated up front, patterns compiled once
//! - **Credential** ([`token`]): `token` option, token file, or `VAULT_TOKEN`;
//!   the `IGNORE-VAULT` sentinel short-circuits to "not found"
//! - **Candidates** ([`paths`]): one storage path per mount/prefix pair, laid
//!   out for KV v1 (`<mount>/<prefix>/<key>`) or v2 (`<mount>/data/<prefix>/<key>`)
//! - **Key filter** ([`KeyFilter`]): `confine_to_keys` / `strip_from_keys`
//! - **Read** ([`SecretStore`], [`VaultClient`]): blocking HTTP, both KV
//!   envelopes normalised to one payload mapping
//! - **Shaping** ([`shaper`]): `default_field`, JSON re-parsing, behavior modes
//!
//! # Example
//!
//! ```rust,ignore
//! use vault_lookup::{lookup_key, MemoryContext};
//!
//! let options = serde_json::json!({
//!     "address": "https://vault.example.com:8200",
//!     "token": "/etc/puppetlabs/vault-token",
//!     "mounts": { "puppet": ["nodes/web01", "common"] },
//!     "default_field": "value",
//! });
//!
//! let context = MemoryContext::new();
//! let value = lookup_key("profile::db::password", &options, &context)?;
//! ```

pub mod client;
pub mod context;
pub mod env;
mod error;
pub mod filter;
pub mod lookup;
pub mod options;
pub mod paths;
pub mod shaper;
pub mod token;

pub use client::{SecretPayload, SecretStore, VaultClient};
pub use context::{LookupContext, MemoryContext};
pub use env::{Environment, ProcessEnv};
pub use error::{ConfigError, LookupError, StoreError};
pub use filter::KeyFilter;
pub use lookup::{lookup_key, VaultLookup};
pub use options::{FieldBehavior, FieldParse, KvVersion, LookupOptions, Mount, VersionSetting};
pub use token::{Credential, IGNORE_VAULT};
