//! Versioned plugin registry.
//!
//! One entry per logical key (module, name), holding a bounded, ordered set
//! of versions. Each mutation of an entry happens under that entry's
//! exclusive guard, so readers never observe a half-applied upsert or an
//! entry emptied by retention.
//!
//! An entry emptied by explicit removal is kept as a retired tombstone:
//! lookups on it report "not found". An entry that is empty without having
//! been retired is an internal consistency failure and panics.

use std::collections::BTreeMap;

use dashmap::DashMap;
use semver::Version;
use serde::Serialize;
use tracing::debug;

use plughost_sdk::{PluginIdentity, PluginKey};

use crate::descriptor::TypeDescriptor;

/// Per-key entry: description plus retained versions.
#[derive(Debug, Clone)]
pub struct PluginClassEntry<D> {
    description: String,
    versions: BTreeMap<Version, D>,
    retired: bool,
}

impl<D> PluginClassEntry<D> {
    fn new(description: &str) -> Self {
        Self {
            description: description.to_string(),
            versions: BTreeMap::new(),
            retired: false,
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn is_retired(&self) -> bool {
        self.retired
    }

    pub fn versions(&self) -> impl Iterator<Item = &Version> {
        self.versions.keys()
    }

    /// Panics if the entry is empty without having been retired.
    fn check(&self, key: &PluginKey) -> bool {
        if self.versions.is_empty() {
            assert!(
                self.retired,
                "registry entry {} has no versions but was never retired",
                key
            );
            return false;
        }
        true
    }
}

/// Listing snapshot of one logical plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginSummary {
    pub module: String,
    pub name: String,
    pub description: String,
    /// Ascending
    pub versions: Vec<Version>,
}

/// Concurrent registry of plugin versions with per-key retention.
pub struct VersionedPluginRegistry<D = TypeDescriptor> {
    entries: DashMap<PluginKey, PluginClassEntry<D>>,
    max_versions: usize,
}

impl<D: Clone> VersionedPluginRegistry<D> {
    /// Create a registry keeping at most `max_versions` versions per key (minimum 1).
    pub fn new(max_versions: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_versions: max_versions.max(1),
        }
    }

    pub fn max_versions(&self) -> usize {
        self.max_versions
    }

    /// Insert or replace one version, then evict the lowest versions above the limit.
    ///
    /// Returns the evicted versions. The entry's description is overwritten
    /// by the latest upsert.
    pub fn upsert(&self, identity: &PluginIdentity, description: &str, descriptor: D) -> Vec<Version> {
        let mut entry = self
            .entries
            .entry(identity.key().clone())
            .or_insert_with(|| PluginClassEntry::new(description));

        if entry.description != description {
            entry.description = description.to_string();
        }
        entry.retired = false;
        entry.versions.insert(identity.version().clone(), descriptor);

        let mut evicted = Vec::new();
        while entry.versions.len() > self.max_versions {
            if let Some((version, _)) = entry.versions.pop_first() {
                evicted.push(version);
            }
        }

        if !evicted.is_empty() {
            debug!(
                category = "plugins",
                plugin = %identity.key(),
                evicted = ?evicted,
                "Retention evicted old versions"
            );
        }
        evicted
    }

    /// Exact version lookup.
    pub fn try_get_version(&self, identity: &PluginIdentity) -> Option<D> {
        let entry = self.entries.get(identity.key())?;
        if !entry.check(identity.key()) {
            return None;
        }
        entry.versions.get(identity.version()).cloned()
    }

    /// Highest version for a key.
    pub fn get_newest(&self, key: &PluginKey) -> Option<(Version, D)> {
        let entry = self.entries.get(key)?;
        if !entry.check(key) {
            return None;
        }
        entry
            .versions
            .last_key_value()
            .map(|(v, d)| (v.clone(), d.clone()))
    }

    /// Remove one version. The entry stays behind, retired once empty.
    pub fn remove_version(&self, identity: &PluginIdentity) -> bool {
        let Some(mut entry) = self.entries.get_mut(identity.key()) else {
            return false;
        };
        let removed = entry.versions.remove(identity.version()).is_some();
        if entry.versions.is_empty() {
            entry.retired = true;
        }
        removed
    }

    /// Remove a whole key.
    pub fn remove_entry(&self, key: &PluginKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drop every descriptor for which `keep` returns false. Returns how many were dropped.
    pub fn compact<F>(&self, keep: F) -> usize
    where
        F: Fn(&D) -> bool,
    {
        let mut dropped = 0;
        for mut entry in self.entries.iter_mut() {
            let before = entry.versions.len();
            entry.versions.retain(|_, d| keep(d));
            let removed = before - entry.versions.len();
            if removed > 0 && entry.versions.is_empty() {
                entry.retired = true;
            }
            dropped += removed;
        }
        dropped
    }

    /// Snapshot of every non-retired key, sorted by key.
    pub fn list_all(&self) -> Vec<PluginSummary> {
        let mut summaries: Vec<PluginSummary> = self
            .entries
            .iter()
            .filter(|e| e.value().check(e.key()))
            .map(|e| PluginSummary {
                module: e.key().module().to_string(),
                name: e.key().name().to_string(),
                description: e.value().description.clone(),
                versions: e.value().versions.keys().cloned().collect(),
            })
            .collect();
        summaries.sort_by(|a, b| (&a.module, &a.name).cmp(&(&b.module, &b.name)));
        summaries
    }

    /// Retained versions for a key, ascending.
    pub fn versions(&self, key: &PluginKey) -> Option<Vec<Version>> {
        self.entries
            .get(key)
            .map(|e| e.versions.keys().cloned().collect())
    }

    /// Whether a key has an entry (retired or not).
    pub fn contains_key(&self, key: &PluginKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Whether the key's entry exists and is a retired tombstone.
    pub fn is_retired(&self, key: &PluginKey) -> bool {
        self.entries
            .get(key)
            .map(|e| e.retired && e.versions.is_empty())
            .unwrap_or(false)
    }

    /// Number of entries, tombstones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<D: Clone> Default for VersionedPluginRegistry<D> {
    fn default() -> Self {
        Self::new(crate::config::defaults::MAX_VERSIONS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(version: &str) -> PluginIdentity {
        PluginIdentity::parse("Test", "Alpha", version).unwrap()
    }

    fn key() -> PluginKey {
        PluginKey::new("Test", "Alpha").unwrap()
    }

    #[test]
    fn test_upsert_and_lookup() {
        let registry: VersionedPluginRegistry<&'static str> = VersionedPluginRegistry::new(3);
        registry.upsert(&id("1.0.0"), "alpha", "one");
        registry.upsert(&id("1.2.0"), "alpha v2", "two");

        assert_eq!(registry.try_get_version(&id("1.0.0")), Some("one"));
        assert_eq!(registry.try_get_version(&id("9.9.9")), None);
        assert_eq!(registry.get_newest(&key()), Some((Version::new(1, 2, 0), "two")));

        let all = registry.list_all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].description, "alpha v2");
        assert_eq!(all[0].versions, vec![Version::new(1, 0, 0), Version::new(1, 2, 0)]);
    }

    #[test]
    fn test_same_version_replaces() {
        let registry: VersionedPluginRegistry<u32> = VersionedPluginRegistry::new(3);
        registry.upsert(&id("1.0.0"), "", 1);
        registry.upsert(&id("1.0.0"), "", 2);
        assert_eq!(registry.try_get_version(&id("1.0.0")), Some(2));
        assert_eq!(registry.versions(&key()).unwrap().len(), 1);
    }

    #[test]
    fn test_retention_evicts_lowest() {
        let registry: VersionedPluginRegistry<u32> = VersionedPluginRegistry::new(2);
        assert!(registry.upsert(&id("1.10.0"), "", 3).is_empty());
        assert!(registry.upsert(&id("1.9.0"), "", 2).is_empty());
        let evicted = registry.upsert(&id("1.0.0-beta.1"), "", 1);

        assert_eq!(evicted, vec![Version::parse("1.0.0-beta.1").unwrap()]);
        assert_eq!(
            registry.versions(&key()).unwrap(),
            vec![Version::new(1, 9, 0), Version::new(1, 10, 0)]
        );
    }

    #[test]
    fn test_prerelease_ranks_below_release() {
        let registry: VersionedPluginRegistry<u32> = VersionedPluginRegistry::new(3);
        registry.upsert(&id("2.0.0"), "", 2);
        registry.upsert(&id("2.0.0-rc.1"), "", 1);
        assert_eq!(registry.get_newest(&key()).unwrap().1, 2);
    }

    #[test]
    fn test_retention_minimum_is_one() {
        let registry: VersionedPluginRegistry<u32> = VersionedPluginRegistry::new(0);
        assert_eq!(registry.max_versions(), 1);
        registry.upsert(&id("1.0.0"), "", 1);
        registry.upsert(&id("1.1.0"), "", 2);
        assert_eq!(registry.versions(&key()).unwrap(), vec![Version::new(1, 1, 0)]);
    }

    #[test]
    fn test_remove_last_version_leaves_tombstone() {
        let registry: VersionedPluginRegistry<u32> = VersionedPluginRegistry::new(3);
        registry.upsert(&id("1.0.0"), "", 1);

        assert!(registry.remove_version(&id("1.0.0")));
        assert!(!registry.remove_version(&id("1.0.0")));
        assert!(registry.contains_key(&key()));
        assert!(registry.is_retired(&key()));
        assert!(registry.get_newest(&key()).is_none());
        assert!(registry.try_get_version(&id("1.0.0")).is_none());
        assert!(registry.list_all().is_empty());

        // Re-adding revives the entry
        registry.upsert(&id("1.1.0"), "", 2);
        assert!(!registry.is_retired(&key()));
        assert_eq!(registry.get_newest(&key()).unwrap().1, 2);
    }

    #[test]
    fn test_compact_and_remove_entry() {
        let registry: VersionedPluginRegistry<u32> = VersionedPluginRegistry::new(3);
        registry.upsert(&id("1.0.0"), "", 1);
        registry.upsert(&id("1.1.0"), "", 2);

        assert_eq!(registry.compact(|d| *d != 1), 1);
        assert_eq!(registry.versions(&key()).unwrap(), vec![Version::new(1, 1, 0)]);
        assert_eq!(registry.compact(|_| false), 1);
        assert!(registry.is_retired(&key()));

        assert!(registry.remove_entry(&key()));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_missing_key() {
        let registry: VersionedPluginRegistry<u32> = VersionedPluginRegistry::default();
        assert!(registry.get_newest(&key()).is_none());
        assert!(!registry.remove_version(&id("1.0.0")));
        assert!(registry.versions(&key()).is_none());
    }
}
