//! Definitions of the workloads a [`Driver`](crate::Driver) executes.
//!
//! A flat workload ([`WorkloadSpec`]) addresses `object_count` objects of `object_size` bytes
//! under a key prefix. A hierarchical workload ([`HierarchySpec`]) builds a three-level tree of
//! groups below a root group, with leaf objects in the innermost level.

use std::collections::{BTreeMap, BTreeSet};

use bytes::Bytes;
use storebench_backend::path;

use crate::verify::VerifyMode;

/// Produces the keys of a flat workload: `{prefix}/{index:05}.bin`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KeyPattern {
    prefix: String,
}

impl KeyPattern {
    /// Creates a pattern below `prefix`. Trailing separators are ignored.
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            prefix: prefix.trim_end_matches(path::SEPARATOR).to_owned(),
        }
    }

    /// The prefix all keys share, without trailing separator.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The prefix to pass to a listing to find exactly the keys of this pattern.
    pub fn list_prefix(&self) -> String {
        path::child_prefix(&self.prefix)
    }

    /// The key of the object at `index`.
    pub fn key(&self, index: u64) -> String {
        path::join(&self.prefix, &format!("{index:05}.bin"))
    }
}

/// A flat workload of equally sized objects.
#[derive(Clone, Debug)]
pub struct WorkloadSpec {
    /// Where the objects live.
    pub pattern: KeyPattern,
    /// Size of every object in bytes.
    pub object_size: u64,
    /// Number of objects.
    pub object_count: u64,
}

impl WorkloadSpec {
    /// Creates a workload of `object_count` objects of `object_size` bytes below `prefix`.
    pub fn new(prefix: impl Into<String>, object_size: u64, object_count: u64) -> Self {
        Self {
            pattern: KeyPattern::new(prefix),
            object_size,
            object_count,
        }
    }

    /// All keys of this workload, in index order.
    pub fn keys(&self) -> impl Iterator<Item = String> + '_ {
        (0..self.object_count).map(|index| self.pattern.key(index))
    }

    /// Bytes written or read by one complete pass.
    pub fn total_bytes(&self) -> u64 {
        self.object_size.saturating_mul(self.object_count)
    }
}

/// Shape of a three-level group hierarchy.
#[derive(Clone, Debug)]
pub struct HierarchySpec {
    /// Path of the root group.
    pub root: String,
    /// Number of groups directly below the root.
    pub top_groups: u32,
    /// Number of subgroups in every top-level group.
    pub sub_groups: u32,
    /// Number of leaf objects in every subgroup.
    pub leaves: u32,
    /// Size of every leaf in bytes.
    pub leaf_size: u64,
}

impl HierarchySpec {
    /// Number of leaves a complete hierarchy contains.
    pub fn expected_leaves(&self) -> u64 {
        u64::from(self.top_groups) * u64::from(self.sub_groups) * u64::from(self.leaves)
    }

    /// Paths of all top-level groups.
    pub fn top_group_paths(&self) -> impl Iterator<Item = String> + '_ {
        (0..self.top_groups).map(|i| path::join(&self.root, &top_group_name(i)))
    }

    /// Paths of the subgroups of the given top-level group.
    pub fn sub_group_paths<'a>(&'a self, top: &'a str) -> impl Iterator<Item = String> + 'a {
        (0..self.sub_groups).map(move |j| path::join(top, &sub_group_name(j)))
    }

    /// Keys of the leaves of the given subgroup.
    pub fn leaf_keys<'a>(&'a self, sub: &'a str) -> impl Iterator<Item = String> + 'a {
        (0..self.leaves).map(move |k| path::join(sub, &leaf_name(k)))
    }
}

/// Name of the `i`-th top-level group.
pub fn top_group_name(i: u32) -> String {
    format!("group_{i:02}")
}

/// Name of the `j`-th subgroup.
pub fn sub_group_name(j: u32) -> String {
    format!("subgroup_{j:02}")
}

/// Name of the `k`-th leaf.
pub fn leaf_name(k: u32) -> String {
    format!("array_{k:02}")
}

/// The leaves a hierarchy is expected to contain.
///
/// Created from a [`HierarchySpec`] when the hierarchy is populated, and kept in sync with
/// deletions through [`remove_subtree`](Self::remove_subtree).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HierarchyLayout {
    root: String,
    leaves: BTreeSet<String>,
}

impl HierarchyLayout {
    /// The layout of a completely populated hierarchy.
    pub fn from_spec(spec: &HierarchySpec) -> Self {
        let leaves = spec
            .top_group_paths()
            .flat_map(|top| {
                spec.sub_group_paths(&top)
                    .flat_map(|sub| spec.leaf_keys(&sub).collect::<Vec<_>>())
                    .collect::<Vec<_>>()
            })
            .collect();

        Self {
            root: spec.root.trim_end_matches(path::SEPARATOR).to_owned(),
            leaves,
        }
    }

    /// Path of the root group.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Resolves a path relative to the root, e.g. `group_00/subgroup_00`.
    pub fn path(&self, relative: &str) -> String {
        path::join(&self.root, relative.trim_start_matches(path::SEPARATOR))
    }

    /// Keys of all expected leaves.
    pub fn leaves(&self) -> &BTreeSet<String> {
        &self.leaves
    }

    /// Number of expected leaves.
    pub fn expected_count(&self) -> u64 {
        self.leaves.len() as u64
    }

    /// Forgets every leaf at or below `path`, returning how many were removed.
    pub fn remove_subtree(&mut self, path: &str) -> u64 {
        let subtree = path::child_prefix(path);
        let before = self.leaves.len();
        self.leaves
            .retain(|leaf| leaf != path && !leaf.starts_with(subtree.as_str()));
        (before - self.leaves.len()) as u64
    }
}

/// What a read is compared against.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Expected {
    /// The full payload that was written.
    Payload(Bytes),
    /// Only the length of the payload that was written.
    Size(u64),
}

/// Record of the objects a write run stored, used to verify a later read run.
#[derive(Clone, Debug, Default)]
pub struct Manifest {
    entries: BTreeMap<String, Expected>,
}

impl Manifest {
    /// Records a written payload according to the verification mode.
    pub fn record(&mut self, key: String, payload: Bytes, mode: VerifyMode) {
        let expected = match mode {
            VerifyMode::Content => Expected::Payload(payload),
            VerifyMode::Size => Expected::Size(payload.len() as u64),
        };
        self.entries.insert(key, expected);
    }

    /// The expectation for `key`, if it was written.
    pub fn get(&self, key: &str) -> Option<&Expected> {
        self.entries.get(key)
    }

    /// Keys of all written objects.
    pub fn keys(&self) -> BTreeSet<String> {
        self.entries.keys().cloned().collect()
    }

    /// Number of written objects.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing was written.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_pattern_ignores_trailing_separator() {
        let pattern = KeyPattern::new("bench/");
        assert_eq!(pattern.prefix(), "bench");
        assert_eq!(pattern.key(7), "bench/00007.bin");
        assert_eq!(pattern.list_prefix(), "bench/");
    }

    #[test]
    fn workload_keys() {
        let spec = WorkloadSpec::new("bench", 1024, 3);
        let keys: Vec<_> = spec.keys().collect();
        assert_eq!(
            keys,
            ["bench/00000.bin", "bench/00001.bin", "bench/00002.bin"]
        );
        assert_eq!(spec.total_bytes(), 3072);
    }

    fn spec() -> HierarchySpec {
        HierarchySpec {
            root: "tree".into(),
            top_groups: 2,
            sub_groups: 2,
            leaves: 3,
            leaf_size: 16,
        }
    }

    #[test]
    fn layout_contains_every_leaf() {
        let layout = HierarchyLayout::from_spec(&spec());
        assert_eq!(layout.expected_count(), 12);
        assert_eq!(spec().expected_leaves(), 12);
        assert!(layout.leaves().contains("tree/group_01/subgroup_01/array_02"));
    }

    #[test]
    fn removing_subtree_drops_its_leaves() {
        let mut layout = HierarchyLayout::from_spec(&spec());
        let target = layout.path("group_00/subgroup_00");
        assert_eq!(target, "tree/group_00/subgroup_00");

        assert_eq!(layout.remove_subtree(&target), 3);
        assert_eq!(layout.expected_count(), 9);
        assert_eq!(layout.remove_subtree(&target), 0);
    }

    #[test]
    fn manifest_respects_mode() {
        let mut manifest = Manifest::default();
        manifest.record("a".into(), Bytes::from_static(b"abc"), VerifyMode::Content);
        manifest.record("b".into(), Bytes::from_static(b"abcd"), VerifyMode::Size);

        assert_eq!(
            manifest.get("a"),
            Some(&Expected::Payload(Bytes::from_static(b"abc")))
        );
        assert_eq!(manifest.get("b"), Some(&Expected::Size(4)));
        assert_eq!(manifest.len(), 2);
    }
}
