//! Graph delta computation between two snapshots.
//!
//! Nodes are bucketed by a lexical key, then paired inside each bucket:
//! first by signature (exact position preferred), then positionally. The
//! positional pass is a greedy heuristic and can pair unrelated nodes when a
//! bucket has several unmatched nodes on both sides without signature
//! agreement.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::model::*;
use crate::signature::{normalize_snippet, strip_instance_suffix, strip_positional_suffix};

/// Status maps covering every node and edge id of both graphs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphDelta {
    pub old_graph: Arc<SnapshotGraph>,
    pub new_graph: Arc<SnapshotGraph>,
    pub node_status: HashMap<String, DiffStatus>,
    pub edge_status: HashMap<String, DiffStatus>,
    /// Both directions of every `unchanged` / `modified` node pairing.
    pub counterparts: HashMap<String, String>,
}

impl GraphDelta {
    pub fn node_status(&self, id: &str) -> Option<DiffStatus> {
        self.node_status.get(id).copied()
    }

    pub fn edge_status(&self, id: &str) -> Option<DiffStatus> {
        self.edge_status.get(id).copied()
    }

    pub fn counterpart(&self, id: &str) -> Option<&str> {
        self.counterparts.get(id).map(String::as_str)
    }

    /// Check if this delta carries no changes at all.
    pub fn is_empty(&self) -> bool {
        self.node_status.values().all(|s| !s.is_changed())
            && self.edge_status.values().all(|s| !s.is_changed())
    }

    /// Count of nodes per status, for logging and summaries.
    pub fn node_counts(&self) -> BTreeMap<DiffStatus, usize> {
        let mut counts = BTreeMap::new();
        for status in self.node_status.values() {
            *counts.entry(*status).or_insert(0) += 1;
        }
        counts
    }
}

/// Grouping key for node correspondence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum NodeKey {
    Symbol {
        qualified_name: String,
        kind: NodeKind,
    },
    Branch {
        owner: String,
        branch_type: String,
        content: String,
    },
}

fn node_key(node: &GraphNode) -> NodeKey {
    if node.kind == NodeKind::Branch {
        let owner = node
            .meta("owner")
            .map(strip_instance_suffix)
            .unwrap_or_else(|| strip_instance_suffix(branch_owner_from_name(&node.qualified_name)));
        let branch_type = node.meta("branchType").unwrap_or("branch").to_string();
        let content = match &node.signature_hash {
            Some(hash) => hash.clone(),
            None => normalize_snippet(node.meta("snippet").unwrap_or(&node.name)),
        };
        NodeKey::Branch {
            owner,
            branch_type,
            content,
        }
    } else {
        NodeKey::Symbol {
            qualified_name: strip_positional_suffix(&node.qualified_name),
            kind: node.kind,
        }
    }
}

fn branch_owner_from_name(qualified_name: &str) -> &str {
    qualified_name
        .rsplit_once("::")
        .map_or(qualified_name, |(owner, _)| owner)
}

/// Snapshot-independent identity of an edge endpoint.
fn endpoint_identity(node: &GraphNode) -> (NodeKind, String, String) {
    (
        node.kind,
        node.file_path.clone(),
        strip_positional_suffix(&node.qualified_name),
    )
}

type EdgeKey = (EdgeKind, (NodeKind, String, String), (NodeKind, String, String), Option<FlowType>);

/// Compute the delta between two snapshots. Total over schema-valid input.
pub fn match_graphs(old_graph: Arc<SnapshotGraph>, new_graph: Arc<SnapshotGraph>) -> GraphDelta {
    let mut node_status = HashMap::with_capacity(old_graph.nodes.len() + new_graph.nodes.len());
    let mut counterparts = HashMap::new();

    let mut buckets: BTreeMap<NodeKey, (Vec<&GraphNode>, Vec<&GraphNode>)> = BTreeMap::new();
    for node in &old_graph.nodes {
        buckets.entry(node_key(node)).or_default().0.push(node);
    }
    for node in &new_graph.nodes {
        buckets.entry(node_key(node)).or_default().1.push(node);
    }

    let bucket_count = buckets.len();
    for (_, (old_side, new_side)) in buckets {
        match_bucket(old_side, new_side, &mut node_status, &mut counterparts);
    }

    let edge_status = match_edges(&old_graph, &new_graph);

    tracing::debug!(
        "Matched {} buckets: {} node statuses, {} edge statuses",
        bucket_count,
        node_status.len(),
        edge_status.len()
    );

    GraphDelta {
        old_graph,
        new_graph,
        node_status,
        edge_status,
        counterparts,
    }
}

fn by_position(a: &&GraphNode, b: &&GraphNode) -> std::cmp::Ordering {
    a.position().cmp(&b.position()).then_with(|| a.id.cmp(&b.id))
}

fn match_bucket(
    mut old_side: Vec<&GraphNode>,
    mut new_side: Vec<&GraphNode>,
    node_status: &mut HashMap<String, DiffStatus>,
    counterparts: &mut HashMap<String, String>,
) {
    if old_side.is_empty() {
        for node in new_side {
            node_status.insert(node.id.clone(), DiffStatus::Added);
        }
        return;
    }
    if new_side.is_empty() {
        for node in old_side {
            node_status.insert(node.id.clone(), DiffStatus::Removed);
        }
        return;
    }

    old_side.sort_by(by_position);
    new_side.sort_by(by_position);

    let mut pair = |old: &GraphNode, new: &GraphNode, status: DiffStatus| {
        node_status.insert(old.id.clone(), status);
        node_status.insert(new.id.clone(), status);
        counterparts.insert(old.id.clone(), new.id.clone());
        counterparts.insert(new.id.clone(), old.id.clone());
    };

    // Signature candidates on the new side. Nodes with no signature share
    // the `None` group, so two unsigned nodes count as signature-equal.
    let mut candidates: HashMap<Option<&str>, Vec<&GraphNode>> = HashMap::new();
    for &node in &new_side {
        candidates
            .entry(node.signature_hash.as_deref())
            .or_default()
            .push(node);
    }

    let mut old_matched = vec![false; old_side.len()];

    // Exact-position pass first so duplicates resolve the same way regardless
    // of iteration order.
    for (i, old) in old_side.iter().enumerate() {
        let Some(pool) = candidates.get_mut(&old.signature_hash.as_deref()) else {
            continue;
        };
        if let Some(at) = pool.iter().position(|new| new.position() == old.position()) {
            let new = pool.remove(at);
            pair(*old, new, DiffStatus::Unchanged);
            old_matched[i] = true;
        }
    }

    // First-available pass.
    for (i, old) in old_side.iter().enumerate() {
        if old_matched[i] {
            continue;
        }
        let Some(pool) = candidates.get_mut(&old.signature_hash.as_deref()) else {
            continue;
        };
        if !pool.is_empty() {
            let new = pool.remove(0);
            pair(*old, new, DiffStatus::Unchanged);
            old_matched[i] = true;
        }
    }

    let mut unmatched_old: Vec<&GraphNode> = old_side
        .iter()
        .zip(&old_matched)
        .filter(|(_, matched)| !**matched)
        .map(|(node, _)| *node)
        .collect();
    let mut unmatched_new: Vec<&GraphNode> = candidates.into_values().flatten().collect();
    unmatched_old.sort_by(by_position);
    unmatched_new.sort_by(by_position);

    let paired = unmatched_old.len().min(unmatched_new.len());
    for (old, new) in unmatched_old.iter().zip(&unmatched_new) {
        pair(*old, *new, DiffStatus::Modified);
    }
    for node in &unmatched_old[paired..] {
        node_status.insert(node.id.clone(), DiffStatus::Removed);
    }
    for node in &unmatched_new[paired..] {
        node_status.insert(node.id.clone(), DiffStatus::Added);
    }
}

/// Multiset edge correspondence: a key present `k` times on each side pairs
/// `min` occurrences as unchanged; the surplus is added or removed.
fn match_edges(old_graph: &SnapshotGraph, new_graph: &SnapshotGraph) -> HashMap<String, DiffStatus> {
    let mut status = HashMap::with_capacity(old_graph.edges.len() + new_graph.edges.len());

    let old_keys = edge_keys(old_graph);
    let mut new_keys = edge_keys(new_graph);

    for (key, old_ids) in old_keys {
        let new_ids = new_keys.remove(&key).unwrap_or_default();
        let paired = old_ids.len().min(new_ids.len());
        for id in &old_ids[..paired] {
            status.insert(id.clone(), DiffStatus::Unchanged);
        }
        for id in &new_ids[..paired] {
            status.insert(id.clone(), DiffStatus::Unchanged);
        }
        for id in &old_ids[paired..] {
            status.insert(id.clone(), DiffStatus::Removed);
        }
        for id in &new_ids[paired..] {
            status.insert(id.clone(), DiffStatus::Added);
        }
    }
    for (_, new_ids) in new_keys {
        for id in new_ids {
            status.insert(id, DiffStatus::Added);
        }
    }
    status
}

fn edge_keys(graph: &SnapshotGraph) -> HashMap<EdgeKey, Vec<String>> {
    let nodes: HashMap<&str, &GraphNode> = graph.nodes.iter().map(|n| (n.id.as_str(), n)).collect();
    let mut keys: HashMap<EdgeKey, Vec<String>> = HashMap::new();
    for edge in &graph.edges {
        let identity = |id: &str| match nodes.get(id) {
            Some(node) => endpoint_identity(node),
            // Dangling endpoint: fall back to the raw id so the edge still gets a status.
            None => (NodeKind::Module, String::new(), id.to_string()),
        };
        let key = (
            edge.kind,
            identity(&edge.source),
            identity(&edge.target),
            edge.flow_type(),
        );
        keys.entry(key).or_default().push(edge.id.clone());
    }
    for ids in keys.values_mut() {
        ids.sort();
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::SnapshotBuilder;

    fn branch(b: &mut SnapshotBuilder, owner: &str, idx: u32, sig: &str, line: u32) -> String {
        b.branch(owner, "if", idx, Some(sig), (line, line))
    }

    #[test]
    fn duplicate_signatures_pair_by_signature_not_order() {
        let mut old = SnapshotBuilder::new("old");
        old.function("m.f", (1, 10), Some("F"));
        let old_a = branch(&mut old, "m.f", 0, "S1", 3);
        let old_b = branch(&mut old, "m.f", 1, "S2", 5);

        let mut new = SnapshotBuilder::new("new");
        new.function("m.f", (1, 10), Some("F"));
        let new_b = branch(&mut new, "m.f", 0, "S2", 3);
        let new_a = branch(&mut new, "m.f", 1, "S1", 5);

        let delta = match_graphs(Arc::new(old.build()), Arc::new(new.build()));
        for id in [&old_a, &old_b, &new_a, &new_b] {
            assert_eq!(delta.node_status(id), Some(DiffStatus::Unchanged), "{id}");
        }
        assert_eq!(delta.counterpart(&old_a), Some(new_a.as_str()));
        assert_eq!(delta.counterpart(&old_b), Some(new_b.as_str()));
    }

    #[test]
    fn exact_position_wins_among_identical_signatures() {
        let mut old = SnapshotBuilder::new("old");
        old.function("m.f", (1, 20), Some("F"));
        let first = branch(&mut old, "m.f", 0, "S", 4);
        let second = branch(&mut old, "m.f", 1, "S", 9);

        let mut new = SnapshotBuilder::new("new");
        new.function("m.f", (1, 20), Some("F"));
        let only = branch(&mut new, "m.f", 0, "S", 9);

        let delta = match_graphs(Arc::new(old.build()), Arc::new(new.build()));
        assert_eq!(delta.counterpart(&second), Some(only.as_str()));
        assert_eq!(delta.node_status(&first), Some(DiffStatus::Removed));
    }

    #[test]
    fn leftovers_pair_positionally_as_modified() {
        let mut old = SnapshotBuilder::new("old");
        let f_old = old.function("m.f", (1, 5), Some("A"));
        let mut new = SnapshotBuilder::new("new");
        let f_new = new.function("m.f", (1, 6), Some("B"));

        let delta = match_graphs(Arc::new(old.build()), Arc::new(new.build()));
        assert_eq!(delta.node_status(&f_old), Some(DiffStatus::Modified));
        assert_eq!(delta.node_status(&f_new), Some(DiffStatus::Modified));
    }

    #[test]
    fn callbacks_keep_identity_across_line_shifts() {
        let mut old = SnapshotBuilder::new("old");
        let cb_old = old.function("m.App.useEffect$callback@L12", (12, 14), Some("CB"));
        let mut new = SnapshotBuilder::new("new");
        let cb_new = new.function("m.App.useEffect$callback@L15", (15, 17), Some("CB"));

        let delta = match_graphs(Arc::new(old.build()), Arc::new(new.build()));
        assert_eq!(delta.node_status(&cb_old), Some(DiffStatus::Unchanged));
        assert_eq!(delta.counterpart(&cb_new), Some(cb_old.as_str()));
    }

    #[test]
    fn unsigned_nodes_match_each_other() {
        let mut old = SnapshotBuilder::new("old");
        let a = old.function("m.f", (1, 2), None);
        let mut new = SnapshotBuilder::new("new");
        let b = new.function("m.f", (1, 2), None);

        let delta = match_graphs(Arc::new(old.build()), Arc::new(new.build()));
        assert_eq!(delta.node_status(&a), Some(DiffStatus::Unchanged));
        assert_eq!(delta.node_status(&b), Some(DiffStatus::Unchanged));
    }

    #[test]
    fn duplicate_edges_match_by_count() {
        let mut old = SnapshotBuilder::new("old");
        let f = old.function("m.f", (1, 5), Some("F"));
        let g = old.function("m.g", (6, 9), Some("G"));
        old.call(&f, &g);

        let mut new = SnapshotBuilder::new("new");
        let f2 = new.function("m.f", (1, 5), Some("F"));
        let g2 = new.function("m.g", (6, 9), Some("G"));
        let kept = new.call(&f2, &g2);
        let flow = new.flow(&f2, &g2, FlowType::Next);

        let delta = match_graphs(Arc::new(old.build()), Arc::new(new.build()));
        assert_eq!(delta.edge_status(&kept), Some(DiffStatus::Unchanged));
        assert_eq!(delta.edge_status(&flow), Some(DiffStatus::Added));
    }
}
