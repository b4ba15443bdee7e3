//! Secret store access
//!
//! [`SecretStore`] is what the lookup depends on; [`VaultClient`] implements
//! it over the Vault HTTP API with a blocking `ureq` agent. Both KV engine
//! envelopes are normalised to a flat [`SecretPayload`]:
//!
//! - v1: `{ "data": { <fields> } }`
//! - v2: `{ "data": { "data": { <fields> }, "metadata": { .. } } }`

use serde_json::{Map, Value};
use ureq::tls::{PemItem, RootCerts, TlsConfig};
use ureq::Agent;

use crate::error::{ConfigError, StoreError};
use crate::options::{KvVersion, LookupOptions};

/// Field name to value mapping of one secret
pub type SecretPayload = Map<String, Value>;

/// Header carrying the access token
const TOKEN_HEADER: &str = "X-Vault-Token";

/// Read access to a KV secret store
pub trait SecretStore {
    /// Read the secret at `path`; `Ok(None)` when there is no such secret
    fn read(&self, path: &str, version: KvVersion) -> Result<Option<SecretPayload>, StoreError>;

    /// Engine version of `mount`
    fn kv_version(&self, mount: &str) -> Result<KvVersion, StoreError>;
}

impl<S: SecretStore + ?Sized> SecretStore for &S {
    fn read(&self, path: &str, version: KvVersion) -> Result<Option<SecretPayload>, StoreError> {
        (**self).read(path, version)
    }

    fn kv_version(&self, mount: &str) -> Result<KvVersion, StoreError> {
        (**self).kv_version(mount)
    }
}

/// Vault HTTP API client bound to one address and token
#[derive(Clone)]
pub struct VaultClient {
    agent: Agent,
    address: String,
    token: String,
}

impl std::fmt::Debug for VaultClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultClient")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl VaultClient {
    /// Build the user-agent string from crate version
    fn user_agent() -> String {
        format!("vault-lookup/{}", env!("CARGO_PKG_VERSION"))
    }

    /// Create a client using the connection settings in `options`
    pub fn new(
        options: &LookupOptions,
        address: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let agent: Agent = Agent::config_builder()
            .timeout_global(Some(options.timeout))
            .http_status_as_error(false)
            .tls_config(tls_config(options)?)
            .build()
            .into();

        Ok(Self {
            agent,
            address: address.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    /// Base address requests are sent to
    pub fn address(&self) -> &str {
        &self.address
    }

    /// GET `/v1/<path>`; `Ok(None)` on 404 and 204
    fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let url = format!("{}/v1/{}", self.address, encode_path(path));
        tracing::debug!(path = %path, "GET secret store");

        let mut response = self
            .agent
            .get(&url)
            .header(TOKEN_HEADER, &self.token)
            .header("Accept", "application/json")
            .header("User-Agent", Self::user_agent())
            .call()?;

        let status = response.status();
        match status.as_u16() {
            200 => {
                let body = response.body_mut().read_to_string()?;
                serde_json::from_str(&body)
                    .map(Some)
                    .map_err(|e| StoreError::Malformed(e.to_string()))
            }
            204 | 404 => Ok(None),
            code => {
                let body = response.body_mut().read_to_string().unwrap_or_default();
                let message = api_errors(&body)
                    .or_else(|| status.canonical_reason().map(str::to_string))
                    .unwrap_or_else(|| "unexpected response".to_string());
                Err(StoreError::Api {
                    status: code,
                    message,
                })
            }
        }
    }
}

impl SecretStore for VaultClient {
    fn read(&self, path: &str, version: KvVersion) -> Result<Option<SecretPayload>, StoreError> {
        match self.get(path)? {
            Some(body) => unwrap_payload(body, version),
            None => Ok(None),
        }
    }

    fn kv_version(&self, mount: &str) -> Result<KvVersion, StoreError> {
        let path = format!("sys/internal/ui/mounts/{}", mount.trim_matches('/'));
        let body = self
            .get(&path)?
            .ok_or_else(|| StoreError::Malformed(format!("no metadata for mount '{}'", mount)))?;

        let version = body.pointer("/data/options/version").and_then(Value::as_str);
        Ok(KvVersion::from_metadata(version))
    }
}

/// TLS settings: verification toggle and optional CA bundle
fn tls_config(options: &LookupOptions) -> Result<TlsConfig, ConfigError> {
    let mut builder = TlsConfig::builder().disable_verification(!options.ssl_verify);

    if let Some(path) = &options.ssl_ca_cert {
        let ca_error = |reason: String| ConfigError::CaCert {
            path: path.clone(),
            reason,
        };

        let pem = std::fs::read(path).map_err(|e| ca_error(e.to_string()))?;
        let mut certs = Vec::new();
        for item in ureq::tls::parse_pem(&pem) {
            match item.map_err(|e| ca_error(e.to_string()))? {
                PemItem::Certificate(cert) => certs.push(cert.to_owned()),
                _ => continue,
            }
        }
        if certs.is_empty() {
            return Err(ca_error("no certificates found".to_string()));
        }

        builder = builder.root_certs(RootCerts::new_with_certs(&certs));
    }

    Ok(builder.build())
}

/// Extract the payload from a read response
///
/// A missing or null envelope (for v2, a deleted or destroyed version) is
/// "no such secret".
pub fn unwrap_payload(
    mut body: Value,
    version: KvVersion,
) -> Result<Option<SecretPayload>, StoreError> {
    let pointer = match version {
        KvVersion::V1 => "/data",
        KvVersion::V2 => "/data/data",
    };

    match body.pointer_mut(pointer).map(Value::take) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(payload)) => Ok(Some(payload)),
        Some(other) => Err(StoreError::Malformed(format!(
            "expected an object at {}, got {}",
            pointer, other
        ))),
    }
}

/// Join the `errors` list of an API error body
fn api_errors(body: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(body).ok()?;
    let errors: Vec<&str> = parsed
        .get("errors")?
        .as_array()?
        .iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .collect();

    if errors.is_empty() {
        None
    } else {
        Some(errors.join(", "))
    }
}

/// Percent-encode a single URL path component
fn percent_encode_component(input: &str) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";

    let mut out = String::with_capacity(input.len());
    for b in input.bytes() {
        let safe = b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~');
        if safe {
            out.push(b as char);
        } else {
            out.push('%');
            out.push(HEX[(b >> 4) as usize] as char);
            out.push(HEX[(b & 0x0F) as usize] as char);
        }
    }
    out
}

/// Percent-encode each segment of a slash-delimited path
fn encode_path(path: &str) -> String {
    path.trim_matches('/')
        .split('/')
        .map(percent_encode_component)
        .collect::<Vec<_>>()
        .join("/")
}
