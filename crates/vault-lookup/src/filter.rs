//! Key confinement and stripping
//!
//! `confine_to_keys` decides whether a key may be looked up at all, matched
//! against the key as the host requested it. `strip_from_keys` rewrites the
//! key that ends up in the storage path.

use std::borrow::Cow;

use regex::Regex;

use crate::error::ConfigError;

/// Compiled `confine_to_keys` and `strip_from_keys` patterns
#[derive(Debug, Clone, Default)]
pub struct KeyFilter {
    confine: Vec<Regex>,
    strip: Vec<Regex>,
}

/// A key admitted by the filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilteredKey<'a> {
    /// Key as requested, used for confinement and diagnostics
    pub original: &'a str,
    /// Key after stripping, used as the last storage path segment
    pub processed: Cow<'a, str>,
}

impl KeyFilter {
    /// Compile both pattern lists, failing on the first invalid pattern
    pub fn new(confine: &[String], strip: &[String]) -> Result<Self, ConfigError> {
        Ok(Self {
            confine: compile("confine_to_keys", confine)?,
            strip: compile("strip_from_keys", strip)?,
        })
    }

    /// Whether `key` passes `confine_to_keys` (always true without patterns)
    pub fn admits(&self, key: &str) -> bool {
        self.confine.is_empty() || self.confine.iter().any(|re| re.is_match(key))
    }

    /// Remove every match of every strip pattern, in list order
    pub fn strip<'a>(&self, key: &'a str) -> Cow<'a, str> {
        let mut processed = Cow::Borrowed(key);
        for re in &self.strip {
            let stripped = match re.replace_all(&processed, "") {
                Cow::Owned(stripped) => Some(stripped),
                Cow::Borrowed(_) => None,
            };
            if let Some(stripped) = stripped {
                processed = Cow::Owned(stripped);
            }
        }
        processed
    }

    /// Confine then strip; `None` means the key must not be looked up
    pub fn apply<'a>(&self, key: &'a str) -> Option<FilteredKey<'a>> {
        if !self.admits(key) {
            return None;
        }
        Some(FilteredKey {
            original: key,
            processed: self.strip(key),
        })
    }
}

fn compile(option: &'static str, patterns: &[String]) -> Result<Vec<Regex>, ConfigError> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
                option,
                pattern: pattern.clone(),
                source,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns(list: &[&str]) -> Vec<String> {
        list.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_no_patterns_admits_everything() {
        let filter = KeyFilter::default();
        let key = filter.apply("anything::at::all").unwrap();
        assert_eq!(key.original, "anything::at::all");
        assert_eq!(key.processed, "anything::at::all");
    }

    #[test]
    fn test_confine_to_keys() {
        let filter = KeyFilter::new(&patterns(&["^vault.*$", "^secret::"]), &[]).unwrap();
        assert!(filter.admits("vault_password"));
        assert!(filter.admits("secret::db"));
        assert!(!filter.admits("puppet/data/test_key"));
        assert!(filter.apply("confined_vault_key").is_none());
    }

    #[test]
    fn test_strip_digit_runs() {
        let filter = KeyFilter::new(&[], &patterns(&["[0-9]*"])).unwrap();
        let key = filter.apply("stripped_key12345").unwrap();
        assert_eq!(key.processed, "stripped_key");
        assert_eq!(key.original, "stripped_key12345");
    }

    #[test]
    fn test_strip_applies_in_order() {
        let filter = KeyFilter::new(&[], &patterns(&["^profile::", "::"])).unwrap();
        assert_eq!(filter.strip("profile::db::password"), "dbpassword");
    }

    #[test]
    fn test_confinement_uses_original_key() {
        let filter = KeyFilter::new(&patterns(&["^vault_"]), &patterns(&["^vault_"])).unwrap();
        let key = filter.apply("vault_token").unwrap();
        assert_eq!(key.processed, "token");
    }

    #[test]
    fn test_strip_without_match_borrows() {
        let filter = KeyFilter::new(&[], &patterns(&["[0-9]+"])).unwrap();
        assert!(matches!(filter.strip("plain_key"), Cow::Borrowed("plain_key")));
    }

    #[test]
    fn test_invalid_pattern_names_option_and_pattern() {
        let err = KeyFilter::new(&patterns(&["["]), &[]).unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("creating regexp for confine_to_keys failed with: "));
        assert!(message.ends_with(": /[/"));
        assert!(matches!(
            err,
            ConfigError::InvalidPattern { option: "confine_to_keys", .. }
        ));
    }

    #[test]
    fn test_invalid_strip_pattern() {
        let err = KeyFilter::new(&[], &patterns(&["(unclosed"])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidPattern { option: "strip_from_keys", .. }
        ));
    }
}
