use std::collections::{BTreeSet, HashSet};

use super::Layout;
use crate::views::ViewNode;

fn matches(node: &ViewNode, needle: &str) -> bool {
    [&node.label, &node.file_path, &node.kind]
        .iter()
        .any(|field| field.to_lowercase().contains(needle))
}

/// Case-insensitive substring search over label, file path and kind.
///
/// In exclude mode the result is every positioned node that does not match,
/// minus all descendants of matching groups. A blank query matches nothing
/// in either mode.
pub fn search_matches(layout: &Layout<'_>, query: &str, exclude: bool) -> BTreeSet<String> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return BTreeSet::new();
    }

    let hits: Vec<&ViewNode> = layout.nodes().filter(|n| matches(n, &needle)).collect();
    if !exclude {
        return hits.into_iter().map(|n| n.id.clone()).collect();
    }

    let mut removed: HashSet<&str> = hits.iter().map(|n| n.id.as_str()).collect();
    for group in hits.iter().filter(|n| n.is_group) {
        removed.extend(layout.descendants(&group.id));
    }
    layout
        .nodes()
        .filter(|n| !removed.contains(n.id.as_str()))
        .map(|n| n.id.clone())
        .collect()
}
