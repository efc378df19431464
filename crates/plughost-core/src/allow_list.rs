//! Admission allow-list.

use std::collections::HashSet;

use plughost_sdk::{PluginIdentity, PluginKey};

/// Set of identities admitted into the registry.
///
/// An empty list admits every discovered plugin.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    entries: HashSet<PluginIdentity>,
}

impl AllowList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the identity was already present.
    pub fn allow(&mut self, identity: PluginIdentity) -> bool {
        self.entries.insert(identity)
    }

    /// Returns `false` if the identity was not present.
    pub fn disallow(&mut self, identity: &PluginIdentity) -> bool {
        self.entries.remove(identity)
    }

    pub fn contains(&self, identity: &PluginIdentity) -> bool {
        self.entries.contains(identity)
    }

    /// Whether `identity` may be registered.
    pub fn admits(&self, identity: &PluginIdentity) -> bool {
        self.entries.is_empty() || self.entries.contains(identity)
    }

    /// Whether any version of `key` is listed explicitly.
    pub fn lists_key(&self, key: &PluginKey) -> bool {
        self.entries.iter().any(|id| id.key() == key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in identity order.
    pub fn identities(&self) -> Vec<PluginIdentity> {
        let mut ids: Vec<_> = self.entries.iter().cloned().collect();
        ids.sort();
        ids
    }
}

impl FromIterator<PluginIdentity> for AllowList {
    fn from_iter<I: IntoIterator<Item = PluginIdentity>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
