//! Host callbacks used during a lookup

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use serde_json::Value;

/// Capabilities the host resolver offers to the backend for one lookup
pub trait LookupContext {
    /// Whether the host already holds a value for `key`
    fn cache_has_key(&self, key: &str) -> bool;

    /// The value previously cached for `key`
    fn cached_value(&self, key: &str) -> Option<Value>;

    /// Cache `value` under `key` and return it
    fn cache(&self, key: &str, value: Value) -> Value;

    /// Record a diagnostic; `message` is only called if the host wants it
    fn explain(&self, message: &dyn Fn() -> String);

    /// Report that this backend has no value for the key
    fn not_found(&self);

    /// Expand host variables in `value`
    fn interpolate(&self, value: Value) -> Value;
}

/// In-memory context: caches values, keeps every explanation, counts
/// not-found reports, and interpolates nothing
#[derive(Debug, Default)]
pub struct MemoryContext {
    cache: RwLock<HashMap<String, Value>>,
    explanations: RwLock<Vec<String>>,
    not_found: AtomicUsize,
}

impl MemoryContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// All explanations recorded so far, oldest first
    pub fn explanations(&self) -> Vec<String> {
        self.explanations.read().clone()
    }

    /// Whether any explanation contains `needle`
    pub fn explained(&self, needle: &str) -> bool {
        self.explanations.read().iter().any(|e| e.contains(needle))
    }

    /// Number of not-found reports
    pub fn not_found_count(&self) -> usize {
        self.not_found.load(Ordering::SeqCst)
    }

    /// Forget cached values (explanations are kept)
    pub fn clear_cache(&self) {
        self.cache.write().clear();
    }
}

impl LookupContext for MemoryContext {
    fn cache_has_key(&self, key: &str) -> bool {
        self.cache.read().contains_key(key)
    }

    fn cached_value(&self, key: &str) -> Option<Value> {
        self.cache.read().get(key).cloned()
    }

    fn cache(&self, key: &str, value: Value) -> Value {
        self.cache.write().insert(key.to_string(), value.clone());
        value
    }

    fn explain(&self, message: &dyn Fn() -> String) {
        let message = message();
        tracing::debug!(target: "vault_lookup::explain", "{}", message);
        self.explanations.write().push(message);
    }

    fn not_found(&self) {
        self.not_found.fetch_add(1, Ordering::SeqCst);
    }

    fn interpolate(&self, value: Value) -> Value {
        value
    }
}
