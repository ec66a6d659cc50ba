//! Mapping of group hierarchies onto flat object keys.
//!
//! Groups and leaves are addressed by paths whose segments are joined with [`SEPARATOR`]:
//!
//! ```text
//! hierarchy/.group                          <- root group marker
//! hierarchy/group_00/.group                 <- top-level group marker
//! hierarchy/group_00/subgroup_00/.group     <- subgroup marker
//! hierarchy/group_00/subgroup_00/array_00   <- leaf object
//! ```
//!
//! A group exists when its marker object ([`GROUP_MARKER`]) exists. Its direct children are the
//! keys one segment below its path: deeper keys contribute their first segment as a child group,
//! and the marker itself is never reported as a child. Deleting a group removes every key with
//! the group's path as prefix.

use std::collections::BTreeSet;

use crate::Children;

/// Separator between path segments.
pub const SEPARATOR: char = '/';

/// Name of the zero-length object that marks a group.
pub const GROUP_MARKER: &str = ".group";

/// Joins a parent path and a child name. An empty parent denotes the namespace root.
pub fn join(parent: &str, name: &str) -> String {
    let parent = parent.trim_end_matches(SEPARATOR);
    if parent.is_empty() {
        name.to_owned()
    } else {
        format!("{parent}{SEPARATOR}{name}")
    }
}

/// Returns the prefix shared by all descendants of `group`.
pub fn child_prefix(group: &str) -> String {
    let group = group.trim_end_matches(SEPARATOR);
    if group.is_empty() {
        String::new()
    } else {
        format!("{group}{SEPARATOR}")
    }
}

/// Returns the key of the marker object for `group`.
pub fn group_marker(group: &str) -> String {
    join(group, GROUP_MARKER)
}

/// Returns `true` if `key` is a group marker.
pub fn is_group_marker(key: &str) -> bool {
    name(key) == GROUP_MARKER
}

/// Returns the last segment of `path`.
pub fn name(path: &str) -> &str {
    let path = path.trim_end_matches(SEPARATOR);
    match path.rfind(SEPARATOR) {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Splits a flat listing of everything below `group` into its direct children.
///
/// Keys that do not start with the group's prefix are ignored.
pub fn direct_children(group: &str, keys: impl IntoIterator<Item = String>) -> Children {
    let prefix = child_prefix(group);
    let mut groups = BTreeSet::new();
    let mut objects = BTreeSet::new();

    for key in keys {
        let Some(rest) = key.strip_prefix(prefix.as_str()) else {
            continue;
        };
        match rest.split_once(SEPARATOR) {
            Some((segment, _)) if !segment.is_empty() => {
                groups.insert(format!("{prefix}{segment}"));
            }
            Some(_) => {}
            None if rest == GROUP_MARKER || rest.is_empty() => {}
            None => {
                objects.insert(key);
            }
        }
    }

    Children { groups, objects }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_segments() {
        assert_eq!(join("", "group_00"), "group_00");
        assert_eq!(join("root/", "group_00"), "root/group_00");
        assert_eq!(join("root/group_00", "array_01"), "root/group_00/array_01");
        assert_eq!(group_marker("root"), "root/.group");
        assert_eq!(group_marker(""), ".group");
        assert_eq!(child_prefix(""), "");
        assert_eq!(child_prefix("root"), "root/");
    }

    #[test]
    fn names() {
        assert_eq!(name("root/group_00/array_01"), "array_01");
        assert_eq!(name("root/group_00/"), "group_00");
        assert_eq!(name("leaf"), "leaf");
        assert!(is_group_marker("root/group_00/.group"));
        assert!(!is_group_marker("root/group_00/array_00"));
    }

    #[test]
    fn splits_children() {
        let keys = [
            "root/.group",
            "root/group_00/.group",
            "root/group_00/subgroup_00/.group",
            "root/group_00/subgroup_00/array_00",
            "root/group_01/.group",
            "root/loose_leaf",
            "rootless/other",
        ]
        .map(String::from);

        let children = direct_children("root", keys);

        assert_eq!(
            children.groups,
            BTreeSet::from(["root/group_00".into(), "root/group_01".into()])
        );
        assert_eq!(children.objects, BTreeSet::from(["root/loose_leaf".into()]));
    }
}
