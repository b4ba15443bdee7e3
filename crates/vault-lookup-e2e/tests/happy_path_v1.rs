//! Lookups against a KV v1 mount

use std::io::Write;

use serde_json::json;
use vault_lookup::{KvVersion, MemoryContext};
use vault_lookup_e2e::{
    backend_with_env, init_test, isolated_backend, merge, options_for, seeded_vault,
};

const MOUNT: &str = "puppet";

fn token_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("Failed to create token file");
    writeln!(file, "{}", contents).expect("Failed to write token file");
    file
}

#[test]
fn test_ignore_vault_from_environment() {
    init_test();
    let vault = seeded_vault(MOUNT, KvVersion::V1);
    let context = MemoryContext::new();

    let backend = backend_with_env(&[("VAULT_TOKEN", "IGNORE-VAULT")]);
    let options = merge(&options_for(&vault, MOUNT), json!({ "token": null }));

    let result = backend.lookup_key("test_key", &options, &context).unwrap();
    assert_eq!(result, None);
    assert_eq!(context.not_found_count(), 1);
    assert!(context.explained("token set to IGNORE-VAULT - Quitting early"));
    assert!(vault.get_requests().is_empty());
}

#[test]
fn test_ignore_vault_from_option() {
    init_test();
    let vault = seeded_vault(MOUNT, KvVersion::V1);
    let context = MemoryContext::new();

    let options = merge(&options_for(&vault, MOUNT), json!({ "token": "IGNORE-VAULT" }));
    let result = isolated_backend()
        .lookup_key("test_key", &options, &context)
        .unwrap();

    assert_eq!(result, None);
    assert_eq!(context.not_found_count(), 1);
    assert!(context.explained("Quitting early"));
    assert!(vault.get_requests().is_empty());
}

#[test]
fn test_ignore_vault_from_token_file() {
    init_test();
    let vault = seeded_vault(MOUNT, KvVersion::V1);
    let context = MemoryContext::new();
    let file = token_file("IGNORE-VAULT");

    let options = merge(
        &options_for(&vault, MOUNT),
        json!({ "token": file.path().to_str().unwrap() }),
    );
    let result = isolated_backend()
        .lookup_key("test_key", &options, &context)
        .unwrap();

    assert_eq!(result, None);
    assert!(context.explained("token set to IGNORE-VAULT - Quitting early"));
    assert!(vault.get_requests().is_empty());
}

#[test]
fn test_token_from_file() {
    init_test();
    let vault = seeded_vault(MOUNT, KvVersion::V1);
    let context = MemoryContext::new();
    let file = token_file(vault.root_token());

    let options = merge(
        &options_for(&vault, MOUNT),
        json!({ "token": file.path().to_str().unwrap() }),
    );
    let result = isolated_backend()
        .lookup_key("test_key", &options, &context)
        .unwrap();

    assert_eq!(result, Some(json!({ "value": "default" })));
    assert!(context.explained("Read secret: test_key"));
}

#[test]
fn test_token_and_address_from_environment() {
    init_test();
    let vault = seeded_vault(MOUNT, KvVersion::V1);
    let context = MemoryContext::new();
    let address = vault.address();

    let backend = backend_with_env(&[
        ("VAULT_TOKEN", vault.root_token()),
        ("VAULT_ADDR", address.as_str()),
    ]);
    let options = json!({ "mounts": { MOUNT: ["common"] } });

    let result = backend.lookup_key("test_key", &options, &context).unwrap();
    assert_eq!(result, Some(json!({ "value": "default" })));
}

#[test]
fn test_returns_whole_secret_without_default_field() {
    init_test();
    let vault = seeded_vault(MOUNT, KvVersion::V1);
    let context = MemoryContext::new();

    let result = isolated_backend()
        .lookup_key("test_key", &options_for(&vault, MOUNT), &context)
        .unwrap();

    assert_eq!(result, Some(json!({ "value": "default" })));
    assert_eq!(vault.secret_reads(), vec!["/v1/puppet/common/test_key"]);
}

#[test]
fn test_confined_key_is_read() {
    init_test();
    let vault = seeded_vault(MOUNT, KvVersion::V1);
    let context = MemoryContext::new();

    let options = merge(
        &options_for(&vault, MOUNT),
        json!({ "confine_to_keys": ["^confined_.*$", "vault"] }),
    );
    let result = isolated_backend()
        .lookup_key("confined_vault_key", &options, &context)
        .unwrap();

    assert_eq!(result, Some(json!({ "value": "find_me" })));
}

#[test]
fn test_unconfined_key_is_not_read() {
    init_test();
    let vault = seeded_vault(MOUNT, KvVersion::V1);
    let context = MemoryContext::new();

    let options = merge(
        &options_for(&vault, MOUNT),
        json!({ "confine_to_keys": ["^vault.*$"] }),
    );
    let result = isolated_backend()
        .lookup_key("puppet/data/test_key", &options, &context)
        .unwrap();

    assert_eq!(result, None);
    assert_eq!(context.not_found_count(), 1);
    assert!(vault.get_requests().is_empty());
}

#[test]
fn test_missing_key_is_not_found() {
    init_test();
    let vault = seeded_vault(MOUNT, KvVersion::V1);
    let context = MemoryContext::new();

    let result = isolated_backend()
        .lookup_key("doesnt_exist", &options_for(&vault, MOUNT), &context)
        .unwrap();

    assert_eq!(result, None);
    assert_eq!(context.not_found_count(), 1);
}

#[test]
fn test_default_field_value() {
    init_test();
    let vault = seeded_vault(MOUNT, KvVersion::V1);
    let context = MemoryContext::new();

    let options = merge(&options_for(&vault, MOUNT), json!({ "default_field": "value" }));
    let result = isolated_backend()
        .lookup_key("test_key", &options, &context)
        .unwrap();

    assert_eq!(result, Some(json!("default")));
}

#[test]
fn test_secret_without_default_field_is_returned_whole() {
    init_test();
    let vault = seeded_vault(MOUNT, KvVersion::V1);
    let context = MemoryContext::new();

    let options = merge(&options_for(&vault, MOUNT), json!({ "default_field": "value" }));
    let result = isolated_backend()
        .lookup_key("multiple_values_key", &options, &context)
        .unwrap();

    assert_eq!(result, Some(json!({ "a": 1, "b": 2, "c": 3 })));
}

#[test]
fn test_json_parsing() {
    init_test();
    let vault = seeded_vault(MOUNT, KvVersion::V1);
    let backend = isolated_backend();
    let options = merge(
        &options_for(&vault, MOUNT),
        json!({ "default_field": "value", "default_field_parse": "json" }),
    );

    let context = MemoryContext::new();
    assert_eq!(
        backend.lookup_key("array_key", &options, &context).unwrap(),
        Some(json!(["a", "b", "c"]))
    );
    assert_eq!(
        backend.lookup_key("hash_key", &options, &context).unwrap(),
        Some(json!({ "a": 1, "b": 2, "c": 3 }))
    );
    assert_eq!(
        backend.lookup_key("broken_json_key", &options, &context).unwrap(),
        Some(json!("[,"))
    );
}

#[test]
fn test_only_behavior() {
    init_test();
    let vault = seeded_vault(MOUNT, KvVersion::V1);
    let backend = isolated_backend();
    let only = merge(
        &options_for(&vault, MOUNT),
        json!({ "default_field": "value", "default_field_behavior": "only" }),
    );
    let unset = merge(&options_for(&vault, MOUNT), json!({ "default_field": "value" }));

    assert_eq!(
        backend
            .lookup_key("test_key", &only, &MemoryContext::new())
            .unwrap(),
        Some(json!("default"))
    );
    assert_eq!(
        backend
            .lookup_key("values_key", &only, &MemoryContext::new())
            .unwrap(),
        Some(json!({ "a": 1, "b": 2, "c": 3, "value": 123 }))
    );
    assert_eq!(
        backend
            .lookup_key("values_key", &unset, &MemoryContext::new())
            .unwrap(),
        Some(json!(123))
    );
}

#[test]
fn test_ignore_behavior_without_field() {
    init_test();
    let vault = seeded_vault(MOUNT, KvVersion::V1);
    let context = MemoryContext::new();

    let options = merge(
        &options_for(&vault, MOUNT),
        json!({ "default_field": "value", "default_field_behavior": "ignore" }),
    );
    let result = isolated_backend()
        .lookup_key("multiple_values_key", &options, &context)
        .unwrap();

    assert_eq!(result, None);
    assert_eq!(context.not_found_count(), 1);
}

#[test]
fn test_continue_if_not_found_on_miss() {
    init_test();
    let vault = seeded_vault(MOUNT, KvVersion::V1);
    let context = MemoryContext::new();

    let options = merge(
        &options_for(&vault, MOUNT),
        json!({ "continue_if_not_found": true }),
    );
    let result = isolated_backend()
        .lookup_key("doesnt_exist", &options, &context)
        .unwrap();

    assert_eq!(result, None);
    assert_eq!(context.not_found_count(), 1);
}

#[test]
fn test_strip_from_keys() {
    init_test();
    let vault = seeded_vault(MOUNT, KvVersion::V1);
    let context = MemoryContext::new();

    let options = merge(
        &options_for(&vault, MOUNT),
        json!({ "strip_from_keys": ["[0-9]*"], "default_field": "value" }),
    );
    let result = isolated_backend()
        .lookup_key("stripped_key12345", &options, &context)
        .unwrap();

    assert_eq!(result, Some(json!("regexed_key")));
    assert_eq!(vault.secret_reads(), vec!["/v1/puppet/common/stripped_key"]);
}

#[test]
fn test_prefixes_searched_in_order() {
    init_test();
    let vault = seeded_vault(MOUNT, KvVersion::V1);
    vault.write("puppet/nodes/web01/test_key", json!({ "value": "node" }));
    let backend = isolated_backend();

    let options = merge(
        &options_for(&vault, MOUNT),
        json!({ "mounts": { MOUNT: ["nodes/web01", "common"] }, "default_field": "value" }),
    );

    let context = MemoryContext::new();
    assert_eq!(
        backend.lookup_key("test_key", &options, &context).unwrap(),
        Some(json!("node"))
    );
    assert_eq!(
        backend.lookup_key("array_key", &options, &context).unwrap(),
        Some(json!("[\"a\", \"b\", \"c\"]"))
    );
    assert_eq!(
        vault.secret_reads(),
        vec![
            "/v1/puppet/nodes/web01/test_key",
            "/v1/puppet/nodes/web01/array_key",
            "/v1/puppet/common/array_key",
        ]
    );
}

#[test]
fn test_repeated_lookup_is_stable() {
    init_test();
    let vault = seeded_vault(MOUNT, KvVersion::V1);
    let backend = isolated_backend();
    let options = options_for(&vault, MOUNT);

    let first = backend
        .lookup_key("values_key", &options, &MemoryContext::new())
        .unwrap();
    let second = backend
        .lookup_key("values_key", &options, &MemoryContext::new())
        .unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_cached_value_skips_store() {
    init_test();
    let vault = seeded_vault(MOUNT, KvVersion::V1);
    let backend = isolated_backend();
    let options = options_for(&vault, MOUNT);
    let context = MemoryContext::new();

    let first = backend.lookup_key("test_key", &options, &context).unwrap();
    vault.clear_requests();
    let second = backend.lookup_key("test_key", &options, &context).unwrap();

    assert_eq!(first, second);
    assert!(vault.get_requests().is_empty());
}
