//! Read-only index over a [`SnapshotGraph`] backed by petgraph

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;

use crate::model::*;

/// Adjacency index for one snapshot. Node and edge weights are positions in
/// the snapshot's `nodes` / `edges` vectors, so the index borrows rather than
/// copies.
pub struct GraphIndex<'g> {
    snapshot: &'g SnapshotGraph,
    inner: DiGraph<usize, usize>,
    by_id: HashMap<&'g str, NodeIndex>,
}

impl std::fmt::Debug for GraphIndex<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphIndex")
            .field("snapshot", &self.snapshot.snapshot_id)
            .field("node_count", &self.inner.node_count())
            .field("edge_count", &self.inner.edge_count())
            .finish()
    }
}

impl<'g> GraphIndex<'g> {
    /// Edges whose endpoints are missing are skipped rather than indexed.
    pub fn new(snapshot: &'g SnapshotGraph) -> Self {
        let mut inner = DiGraph::with_capacity(snapshot.nodes.len(), snapshot.edges.len());
        let mut by_id = HashMap::with_capacity(snapshot.nodes.len());
        for (position, node) in snapshot.nodes.iter().enumerate() {
            let idx = inner.add_node(position);
            by_id.insert(node.id.as_str(), idx);
        }
        for (position, edge) in snapshot.edges.iter().enumerate() {
            let (Some(&source), Some(&target)) =
                (by_id.get(edge.source.as_str()), by_id.get(edge.target.as_str()))
            else {
                tracing::debug!("Skipping dangling edge {}", edge.id);
                continue;
            };
            inner.add_edge(source, target, position);
        }
        GraphIndex { snapshot, inner, by_id }
    }

    /// Get a node by ID.
    pub fn node(&self, id: &str) -> Option<&'g GraphNode> {
        let idx = self.by_id.get(id)?;
        Some(&self.snapshot.nodes[self.inner[*idx]])
    }

    /// Get all outgoing edges from a node.
    pub fn edges_from(&self, source: &str) -> impl Iterator<Item = &'g GraphEdge> + '_ {
        self.edges_directed(source, Direction::Outgoing)
    }

    /// Get all incoming edges to a node.
    pub fn edges_to(&self, target: &str) -> impl Iterator<Item = &'g GraphEdge> + '_ {
        self.edges_directed(target, Direction::Incoming)
    }

    fn edges_directed(&self, id: &str, direction: Direction) -> impl Iterator<Item = &'g GraphEdge> + '_ {
        let snapshot = self.snapshot;
        self.by_id
            .get(id)
            .into_iter()
            .flat_map(move |&idx| self.inner.edges_directed(idx, direction))
            .map(move |edge_ref| &snapshot.edges[*edge_ref.weight()])
    }

    /// Direct children along `DECLARES` edges.
    pub fn declared_children(&self, id: &str) -> impl Iterator<Item = &'g GraphNode> + '_ {
        self.edges_from(id)
            .filter(|edge| edge.kind == EdgeKind::Declares)
            .filter_map(|edge| self.node(&edge.target))
    }

    /// The declaring parent, if any.
    pub fn declaring_parent(&self, id: &str) -> Option<&'g GraphNode> {
        self.edges_to(id)
            .find(|edge| edge.kind == EdgeKind::Declares)
            .and_then(|edge| self.node(&edge.source))
    }

    /// All transitive ancestors along `DECLARES`, nearest first.
    pub fn ancestors(&self, id: &str) -> Vec<&'g GraphNode> {
        let mut ancestors = Vec::new();
        let mut seen = HashSet::new();
        let mut current = id;
        while let Some(parent) = self.declaring_parent(current) {
            if !seen.insert(parent.id.as_str()) {
                break;
            }
            ancestors.push(parent);
            current = parent.id.as_str();
        }
        ancestors
    }

    /// All transitive `DECLARES` descendants, breadth-first.
    pub fn descendants(&self, id: &str) -> Vec<&'g GraphNode> {
        let mut out = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut queue = VecDeque::from([id]);
        seen.insert(id);
        while let Some(current) = queue.pop_front() {
            for child in self.declared_children(current) {
                if seen.insert(child.id.as_str()) {
                    out.push(child);
                    queue.push_back(child.id.as_str());
                }
            }
        }
        out
    }

    /// Symbol-level calls into `id`. Flow edges and call-site edges from
    /// branches are excluded so each caller counts once.
    pub fn incoming_calls(&self, id: &str) -> usize {
        self.edges_to(id)
            .filter(|edge| edge.kind == EdgeKind::Calls && !edge.is_flow() && !edge.is_call_site())
            .count()
    }

    pub fn outgoing_calls(&self, id: &str) -> usize {
        self.edges_from(id)
            .filter(|edge| edge.kind == EdgeKind::Calls && !edge.is_flow() && !edge.is_call_site())
            .count()
    }

    /// Declared children that are themselves symbols (branches excluded).
    pub fn owned_declarations(&self, id: &str) -> usize {
        self.declared_children(id)
            .filter(|child| child.kind.is_symbol())
            .count()
    }
}
