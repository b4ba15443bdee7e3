//! Process environment access
//!
//! Token and address fallbacks read the environment through [`Environment`]
//! so callers (and tests) can substitute it without touching process state.

use std::collections::HashMap;

/// Variable holding the fallback access token
pub const TOKEN_VAR: &str = "VAULT_TOKEN";

/// Variable holding the fallback store address
pub const ADDR_VAR: &str = "VAULT_ADDR";

/// Read-only view of environment variables
pub trait Environment {
    /// Value of `name`, or `None` when unset or not valid unicode
    fn var(&self, name: &str) -> Option<String>;
}

/// The real process environment
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnv;

impl Environment for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl Environment for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

impl<E: Environment + ?Sized> Environment for &E {
    fn var(&self, name: &str) -> Option<String> {
        (**self).var(name)
    }
}
