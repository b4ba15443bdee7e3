//! End-to-end test utilities for the vault-lookup backend
//!
//! This crate runs lookups against an in-process mock of the Vault HTTP API
//! so the whole path (options, token, HTTP, envelopes, shaping) is exercised
//! without a real Vault server.

pub mod mock_vault;

pub use mock_vault::{MockVault, RecordedRequest};

use std::collections::HashMap;

use serde_json::{json, Value};
use vault_lookup::{KvVersion, VaultLookup};

/// Initialize tracing for tests (safe to call more than once)
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("vault_lookup=debug,vault_lookup_e2e=debug")
        .with_test_writer()
        .try_init();
}

/// Backend with an empty environment, so the host's `VAULT_TOKEN` and
/// `VAULT_ADDR` never leak into a test
pub fn isolated_backend() -> VaultLookup<HashMap<String, String>> {
    VaultLookup::with_env(HashMap::new())
}

/// Backend seeing only the given environment variables
pub fn backend_with_env(vars: &[(&str, &str)]) -> VaultLookup<HashMap<String, String>> {
    VaultLookup::with_env(
        vars.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    )
}

/// Mock store seeded with the `common` secrets under `mount`
pub fn seeded_vault(mount: &str, version: KvVersion) -> MockVault {
    let vault = MockVault::start();
    vault.mount(mount, version);

    let secrets = [
        ("test_key", json!({ "value": "default" })),
        ("array_key", json!({ "value": "[\"a\", \"b\", \"c\"]" })),
        ("hash_key", json!({ "value": "{\"a\": 1, \"b\": 2, \"c\": 3}" })),
        ("multiple_values_key", json!({ "a": 1, "b": 2, "c": 3 })),
        ("values_key", json!({ "value": 123, "a": 1, "b": 2, "c": 3 })),
        ("broken_json_key", json!({ "value": "[," })),
        ("confined_vault_key", json!({ "value": "find_me" })),
        ("stripped_key", json!({ "value": "regexed_key" })),
        (
            "complex_structure_key",
            json!({
                "hash": { "a": 1 },
                "array": [1, 2],
                "hash_with_array": { "a": [1, 2] },
                "array_with_hash": [{ "a": 1 }, { "b": 2 }]
            }),
        ),
    ];
    for (key, data) in secrets {
        vault.write(&format!("{}/common/{}", mount, key), data);
    }

    vault
}

/// Options pointing at `vault` with a single mount searched under `common`
pub fn options_for(vault: &MockVault, mount: &str) -> Value {
    json!({
        "address": vault.address(),
        "token": vault.root_token(),
        "mounts": { mount: ["common"] }
    })
}

/// `base` with the entries of `extra` added or replaced
pub fn merge(base: &Value, extra: Value) -> Value {
    let mut merged = base.clone();
    if let (Value::Object(target), Value::Object(extra)) = (&mut merged, extra) {
        target.extend(extra);
    }
    merged
}
