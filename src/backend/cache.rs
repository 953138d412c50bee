//! In-memory repository lookup cache.
//!
//! Scoped to one [`Discovery`](crate::discovery::Discovery) instance and kept
//! for the lifetime of the process run; there is no expiry. A cached `None`
//! records that a repository is known to be absent or excluded, which is
//! different from not having looked it up at all.

use crate::types::{Platform, Repository};
use dashmap::DashMap;

/// Result of a cache lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    /// Never stored (or caching disabled)
    Miss,
    /// Stored; `None` means known absent or excluded
    Hit(Option<Repository>),
}

/// Repository memo keyed by [`cache_key`].
#[derive(Debug, Default)]
pub struct RepositoryCache {
    entries: DashMap<String, Option<Repository>>,
    enabled: bool,
}

impl RepositoryCache {
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            entries: DashMap::new(),
            enabled,
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> CacheLookup {
        if !self.enabled {
            return CacheLookup::Miss;
        }
        self.entries
            .get(key)
            .map_or(CacheLookup::Miss, |entry| CacheLookup::Hit(entry.value().clone()))
    }

    /// Store a lookup result. Last write wins.
    pub fn set(&self, key: String, value: Option<Repository>) {
        if self.enabled {
            self.entries.insert(key, value);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Build a collision-free key from `(platform, operation, parts...)`.
///
/// `%` and `:` are escaped inside each component, so `("a:b", "c")` and
/// `("a", "b:c")` never produce the same key.
#[must_use]
pub fn cache_key(platform: Platform, operation: &str, parts: &[&str]) -> String {
    let mut key = format!("{}:{}", platform.as_str(), escape(operation));
    for part in parts {
        key.push(':');
        key.push_str(&escape(part));
    }
    key
}

fn escape(component: &str) -> String {
    component.replace('%', "%25").replace(':', "%3A")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Visibility;

    fn repo(name: &str) -> Repository {
        Repository {
            owner: "acme".to_string(),
            name: name.to_string(),
            full_name: format!("acme/{name}"),
            default_branch: Some("main".to_string()),
            archived: false,
            visibility: Visibility::Public,
            url: format!("https://github.com/acme/{name}"),
            clone_url: format!("https://github.com/acme/{name}.git"),
        }
    }

    #[test]
    fn test_miss_hit_and_known_absent_are_distinct() {
        let cache = RepositoryCache::new(true);
        let key = cache_key(Platform::GitHub, "repo", &["acme", "infra"]);
        assert_eq!(cache.get(&key), CacheLookup::Miss);

        cache.set(key.clone(), None);
        assert_eq!(cache.get(&key), CacheLookup::Hit(None));

        cache.set(key.clone(), Some(repo("infra")));
        assert_eq!(cache.get(&key), CacheLookup::Hit(Some(repo("infra"))));
    }

    #[test]
    fn test_disabled_cache_always_misses() {
        let cache = RepositoryCache::new(false);
        let key = cache_key(Platform::GitLab, "repo", &["group", "proj"]);
        cache.set(key.clone(), Some(repo("proj")));
        assert_eq!(cache.get(&key), CacheLookup::Miss);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_keys_do_not_collide() {
        let a = cache_key(Platform::GitHub, "repo", &["a:b", "c"]);
        let b = cache_key(Platform::GitHub, "repo", &["a", "b:c"]);
        assert_ne!(a, b);

        let c = cache_key(Platform::GitHub, "repo", &["a%3Ab", "c"]);
        assert_ne!(a, c);

        let gh = cache_key(Platform::GitHub, "repo", &["x", "y"]);
        let gl = cache_key(Platform::GitLab, "repo", &["x", "y"]);
        assert_ne!(gh, gl);
    }

    #[test]
    fn test_key_format() {
        assert_eq!(
            cache_key(Platform::GitLab, "repo", &["group/sub", "proj"]),
            "gitlab:repo:group/sub:proj"
        );
    }
}
