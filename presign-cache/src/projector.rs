//! Projection of relevant resources onto the keys that need a signed URL.

use std::collections::{BTreeMap, BTreeSet};

use presign_core::types::{LogicalKey, ResourceDescriptor, ResourcePath};

/// Keys that currently need a signed URL and the path behind each key.
///
/// Built only by [`project`]; compares equal for any permutation of the input.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Projection {
    keys: BTreeSet<LogicalKey>,
    key_to_path: BTreeMap<LogicalKey, ResourcePath>,
}

impl Projection {
    /// Keys that need a URL.
    pub fn keys(&self) -> &BTreeSet<LogicalKey> {
        &self.keys
    }

    /// Key → path mapping.
    pub fn key_to_path(&self) -> &BTreeMap<LogicalKey, ResourcePath> {
        &self.key_to_path
    }

    /// Path currently behind `key`.
    pub fn path_for(&self, key: &str) -> Option<&ResourcePath> {
        self.key_to_path.get(key)
    }

    /// Returns true if `key` is part of the projection.
    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// Distinct paths to request.
    pub fn paths(&self) -> BTreeSet<ResourcePath> {
        self.key_to_path.values().cloned().collect()
    }

    /// Keys backed by `path`.
    pub fn keys_for(&self, path: &ResourcePath) -> Vec<&LogicalKey> {
        self.key_to_path
            .iter()
            .filter(|(_, p)| *p == path)
            .map(|(k, _)| k)
            .collect()
    }

    /// Pairs that are new relative to `previous` or whose path changed.
    pub fn changed_since<'a>(
        &'a self,
        previous: &Projection,
    ) -> Vec<(&'a LogicalKey, &'a ResourcePath)> {
        self.key_to_path
            .iter()
            .filter(|(key, path)| previous.key_to_path.get(*key) != Some(*path))
            .collect()
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true if no key needs a URL.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Derives the minimal key set from the currently relevant resources.
///
/// Resources without a path (or with a blank key/path) are skipped. If the
/// same key appears with different paths, the smallest path wins so that
/// input order never matters.
pub fn project<'a, I>(resources: I) -> Projection
where
    I: IntoIterator<Item = &'a ResourceDescriptor>,
{
    let mut key_to_path: BTreeMap<LogicalKey, ResourcePath> = BTreeMap::new();

    for resource in resources {
        let Some(path) = resource.path.as_ref() else {
            continue;
        };
        if resource.key.is_blank() || path.is_blank() {
            continue;
        }

        key_to_path
            .entry(resource.key.clone())
            .and_modify(|existing| {
                if path < existing {
                    *existing = path.clone();
                }
            })
            .or_insert_with(|| path.clone());
    }

    Projection {
        keys: key_to_path.keys().cloned().collect(),
        key_to_path,
    }
}
