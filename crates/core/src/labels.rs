// SPDX-License-Identifier: MIT

//! Label map carried on every [`crate::record::LogRecord`].
//!
//! Invariant (spec.md §3, §8 property 1): labels are never aliased between
//! concurrently dispatched records. `LabelMap` has no interior mutability and
//! no `Arc`-backed storage for exactly this reason — cloning a `LabelMap`
//! always produces an independent `BTreeMap` allocation.

use std::collections::BTreeMap;

/// A fresh, owned copy of record labels. Insertion order is irrelevant
/// (spec.md §3), so this is a `BTreeMap` for stable iteration in tests and
/// snapshot output rather than a `HashMap`.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LabelMap(BTreeMap<String, String>);

impl LabelMap {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn merge(&mut self, other: &LabelMap) -> &mut Self {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Removes every key matching the denylist, by exact name or by prefix
    /// (a denylist entry ending in `*` matches a prefix). Used to filter
    /// high-cardinality or vendor-internal labels before a record is
    /// dispatched (spec.md §6).
    pub fn retain_allowed(&mut self, denylist: &[String]) {
        self.0.retain(|k, _| {
            !denylist.iter().any(|d| {
                if let Some(prefix) = d.strip_suffix('*') {
                    k.starts_with(prefix)
                } else {
                    k == d
                }
            })
        });
    }
}

impl From<BTreeMap<String, String>> for LabelMap {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, String)> for LabelMap {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_never_aliases() {
        let mut a = LabelMap::new();
        a.insert("service", "ltap");
        let b = a.clone();
        a.insert("service", "mutated");
        assert_eq!(b.get("service"), Some("ltap"));
    }

    #[test]
    fn retain_allowed_filters_exact_and_prefix() {
        let mut labels = LabelMap::new();
        labels.insert("com.docker.compose.project", "x");
        labels.insert("container_label_env", "prod");
        labels.insert("secret_token", "abc");
        labels.retain_allowed(&["com.docker.compose.*".into(), "secret_token".into()]);
        assert_eq!(labels.len(), 1);
        assert_eq!(labels.get("container_label_env"), Some("prod"));
    }

    #[cfg(feature = "test-support")]
    proptest::proptest! {
        #[test]
        fn clone_then_mutate_never_affects_source(
            keys in proptest::collection::vec("[a-z]{1,8}", 0..8),
            vals in proptest::collection::vec("[a-z]{1,8}", 0..8),
        ) {
            let mut a = LabelMap::new();
            for (k, v) in keys.iter().zip(vals.iter()) {
                a.insert(k.clone(), v.clone());
            }
            let b = a.clone();
            a.insert("mutated-after-clone", "x");
            proptest::prop_assert!(b.get("mutated-after-clone").is_none());
            proptest::prop_assert_eq!(a.len(), b.len() + 1);
        }
    }
}
