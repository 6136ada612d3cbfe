//! Cross-version match keys for positioned nodes.
//!
//! Ids are snapshot-scoped, so the old and new layouts are correlated by a
//! key built from kind, scope and label. Repeated `(kind, scope, label)`
//! triples are numbered in declaration order.

use std::collections::{BTreeMap, HashMap};

use super::Layout;
use crate::views::ViewNode;

fn scope(layout: &Layout<'_>, node: &ViewNode) -> String {
    let parent = node
        .parent_id
        .as_deref()
        .and_then(|id| layout.node(id))
        .map_or("", |p| p.label.as_str());
    format!("{}:{}", node.file_path, parent)
}

pub fn match_keys(layout: &Layout<'_>) -> BTreeMap<String, String> {
    let mut groups: HashMap<(String, String, String), Vec<&ViewNode>> = HashMap::new();
    for node in layout.nodes() {
        groups
            .entry((node.kind.clone(), scope(layout, node), node.label.clone()))
            .or_default()
            .push(node);
    }

    let mut keys = BTreeMap::new();
    for ((kind, scope, label), mut nodes) in groups {
        nodes.sort_by(|a, b| {
            (a.start_line, a.end_line, &a.id).cmp(&(b.start_line, b.end_line, &b.id))
        });
        for (n, node) in nodes.into_iter().enumerate() {
            keys.insert(node.id.clone(), format!("{kind}|{scope}|{label}#{n}"));
        }
    }
    keys
}
