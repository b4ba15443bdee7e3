//! Candidate storage paths
//!
//! One candidate per mount/prefix pair, in the configured order. The layout
//! depends on the mount's KV engine version:
//!
//! - v1: `<mount>/<prefix>/<key>`
//! - v2: `<mount>/data/<prefix>/<key>`

use crate::options::{KvVersion, Mount};

/// A concrete storage path to probe for one key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidatePath {
    pub mount: String,
    pub prefix: String,
    pub version: KvVersion,
    /// Path relative to the store API root, e.g. `puppet/data/common/db`
    pub storage_path: String,
}

impl CandidatePath {
    /// `<mount>/<prefix>` without the engine-specific segment
    pub fn secret_path(&self) -> String {
        join(&[&self.mount, &self.prefix])
    }
}

/// Ordered candidates for `key`, produced lazily
///
/// `version_of` is asked once per mount that has at least one prefix, when
/// the iterator reaches that mount's first candidate. Mounts without
/// prefixes contribute nothing.
pub fn build<'a>(
    mounts: &'a [Mount],
    key: &'a str,
    mut version_of: impl FnMut(&str) -> KvVersion + 'a,
) -> impl Iterator<Item = CandidatePath> + 'a {
    mounts
        .iter()
        .filter(|mount| {
            if mount.prefixes.is_empty() {
                tracing::debug!(mount = %mount.name, "Mount has no prefixes, skipping");
            }
            !mount.prefixes.is_empty()
        })
        .flat_map(move |mount| {
            let version = version_of(&mount.name);
            mount.prefixes.iter().map(move |prefix| CandidatePath {
                mount: mount.name.clone(),
                prefix: prefix.clone(),
                version,
                storage_path: storage_path(&mount.name, prefix, key, version),
            })
        })
}

/// Storage path for a key under one mount/prefix pair
pub fn storage_path(mount: &str, prefix: &str, key: &str, version: KvVersion) -> String {
    match version {
        KvVersion::V1 => join(&[mount, prefix, key]),
        KvVersion::V2 => join(&[mount, "data", prefix, key]),
    }
}

/// Join path pieces, dropping empty segments and stray slashes
fn join(pieces: &[&str]) -> String {
    pieces
        .iter()
        .flat_map(|piece| piece.split('/'))
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_v1_and_v2_layouts() {
        assert_eq!(
            storage_path("puppet", "common", "test_key", KvVersion::V1),
            "puppet/common/test_key"
        );
        assert_eq!(
            storage_path("puppetv2", "common", "test_key", KvVersion::V2),
            "puppetv2/data/common/test_key"
        );
    }

    #[test]
    fn test_empty_and_slashed_segments() {
        assert_eq!(storage_path("puppet/", "", "key", KvVersion::V1), "puppet/key");
        assert_eq!(
            storage_path("/secret/team/", "/nodes/web01/", "key", KvVersion::V2),
            "secret/team/data/nodes/web01/key"
        );
    }

    #[test]
    fn test_candidate_order_follows_mounts_then_prefixes() {
        let mounts = vec![
            Mount::new("puppetv2", &["nodes/web01", "common"]),
            Mount::new("empty", &[]),
            Mount::new("puppet", &["common"]),
        ];

        let candidates: Vec<CandidatePath> = build(&mounts, "db_password", |mount| {
            if mount == "puppetv2" {
                KvVersion::V2
            } else {
                KvVersion::V1
            }
        })
        .collect();

        let paths: Vec<&str> = candidates.iter().map(|c| c.storage_path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "puppetv2/data/nodes/web01/db_password",
                "puppetv2/data/common/db_password",
                "puppet/common/db_password",
            ]
        );
        assert_eq!(candidates[0].secret_path(), "puppetv2/nodes/web01");
    }

    #[test]
    fn test_version_asked_once_per_mount_with_prefixes() {
        let mounts = vec![
            Mount::new("a", &["one", "two", "three"]),
            Mount::new("b", &[]),
        ];
        let mut asked = Vec::new();
        let candidates: Vec<CandidatePath> = build(&mounts, "key", |mount| {
            asked.push(mount.to_string());
            KvVersion::V1
        })
        .collect();

        assert_eq!(candidates.len(), 3);
        assert_eq!(asked, vec!["a".to_string()]);
    }

    #[test]
    fn test_version_asked_when_mount_is_reached() {
        let mounts = vec![Mount::new("a", &["one", "two"]), Mount::new("b", &["one"])];
        let mut asked = Vec::new();
        {
            let mut candidates = build(&mounts, "key", |mount| {
                asked.push(mount.to_string());
                KvVersion::V1
            });
            assert_eq!(candidates.next().map(|c| c.storage_path), Some("a/one/key".to_string()));
            assert_eq!(candidates.next().map(|c| c.storage_path), Some("a/two/key".to_string()));
        }
        assert_eq!(asked, vec!["a".to_string()]);
    }

    #[test]
    fn test_no_mounts_no_candidates() {
        assert_eq!(build(&[], "key", |_| KvVersion::V1).count(), 0);
    }
}
