//! Perspective-specific projections of a [`GraphDelta`] for presentation.
//!
//! Each builder projects the node/edge kinds relevant to its perspective,
//! copies diff status from the delta unchanged, and nests nodes under group
//! nodes through `parent_id`.

pub mod components;
pub mod control_flow;
pub mod declarations;

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::diff::GraphDelta;
use crate::model::*;

pub use components::ComponentViewBuilder;
pub use control_flow::ControlFlowViewBuilder;
pub use declarations::DeclarationViewBuilder;

/// Kind label carried by synthetic group nodes.
pub const GROUP_KIND: &str = "group";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Perspective {
    ControlFlow,
    Declarations,
    Components,
}

impl Perspective {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ControlFlow => "control-flow",
            Self::Declarations => "declarations",
            Self::Components => "components",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "control-flow" => Some(Self::ControlFlow),
            "declarations" => Some(Self::Declarations),
            "components" => Some(Self::Components),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relation {
    Flow,
    Invoke,
    Hierarchy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewNode {
    pub id: String,
    pub label: String,
    pub kind: String,
    pub file_path: String,
    pub start_line: Option<u32>,
    pub end_line: Option<u32>,
    pub diff_status: DiffStatus,
    pub parent_id: Option<String>,
    pub is_group: bool,
    pub branch_type: Option<String>,
    /// Underlying snapshot node; differs from `id` for synthetic groups.
    pub symbol_id: String,
}

impl ViewNode {
    pub fn from_graph_node(node: &GraphNode, status: DiffStatus) -> Self {
        let label = match node.kind {
            NodeKind::Branch => node.meta("snippet").unwrap_or(&node.name).to_string(),
            _ => node.name.clone(),
        };
        ViewNode {
            id: node.id.clone(),
            label,
            kind: node.kind.as_str().to_string(),
            file_path: node.file_path.clone(),
            start_line: node.start_line,
            end_line: node.end_line,
            diff_status: status,
            parent_id: None,
            is_group: false,
            branch_type: node.meta("branchType").map(str::to_string),
            symbol_id: node.id.clone(),
        }
    }

    /// Key used to pick a neighborhood strategy.
    pub fn strategy_key(&self) -> &str {
        if self.is_group { GROUP_KIND } else { &self.kind }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub relation: Relation,
    pub flow_type: Option<FlowType>,
    pub diff_status: DiffStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewGraph {
    pub graph_id: String,
    pub perspective: Perspective,
    pub nodes: Vec<ViewNode>,
    pub edges: Vec<ViewEdge>,
}

impl ViewGraph {
    pub fn new(graph: &SnapshotGraph, perspective: Perspective) -> Self {
        ViewGraph {
            graph_id: format!("{}:{}:{}", graph.repo_id, graph.snapshot_id, perspective.as_str()),
            perspective,
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn node(&self, id: &str) -> Option<&ViewNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Changes-only filtering: changed nodes, unchanged nodes reached by a
    /// flow edge from a changed node, and every ancestor group of a kept node.
    pub fn changes_only(&self) -> ViewGraph {
        let parents: HashMap<&str, &str> = self
            .nodes
            .iter()
            .filter_map(|n| n.parent_id.as_deref().map(|p| (n.id.as_str(), p)))
            .collect();

        let mut keep: HashSet<&str> = self
            .nodes
            .iter()
            .filter(|n| n.diff_status.is_changed())
            .map(|n| n.id.as_str())
            .collect();

        let context: Vec<&str> = self
            .edges
            .iter()
            .filter(|e| e.relation == Relation::Flow && keep.contains(e.source.as_str()))
            .map(|e| e.target.as_str())
            .collect();
        keep.extend(context);

        let mut pending: Vec<&str> = keep.iter().copied().collect();
        while let Some(id) = pending.pop() {
            if let Some(parent) = parents.get(id) {
                if keep.insert(parent) {
                    pending.push(parent);
                }
            }
        }

        ViewGraph {
            graph_id: format!("{}:changes", self.graph_id),
            perspective: self.perspective,
            nodes: self
                .nodes
                .iter()
                .filter(|n| keep.contains(n.id.as_str()))
                .cloned()
                .collect(),
            edges: self
                .edges
                .iter()
                .filter(|e| keep.contains(e.source.as_str()) && keep.contains(e.target.as_str()))
                .cloned()
                .collect(),
        }
    }
}

/// Old and new projection for one perspective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewPair {
    pub old_view: ViewGraph,
    pub new_view: ViewGraph,
}

/// One builder per perspective.
pub trait ViewBuilder: Send + Sync {
    fn perspective(&self) -> Perspective;

    /// Project one side of the delta.
    fn project(&self, graph: &SnapshotGraph, delta: &GraphDelta) -> ViewGraph;

    fn build(&self, delta: &GraphDelta) -> ViewPair {
        ViewPair {
            old_view: self.project(&delta.old_graph, delta),
            new_view: self.project(&delta.new_graph, delta),
        }
    }
}

/// All built-in builders, in presentation order.
pub fn builders() -> Vec<Box<dyn ViewBuilder>> {
    vec![
        Box::new(ControlFlowViewBuilder),
        Box::new(DeclarationViewBuilder),
        Box::new(ComponentViewBuilder),
    ]
}

pub fn build_all(delta: &GraphDelta) -> HashMap<Perspective, ViewPair> {
    builders()
        .iter()
        .map(|builder| (builder.perspective(), builder.build(delta)))
        .collect()
}

pub(crate) fn status_of(delta: &GraphDelta, id: &str) -> DiffStatus {
    delta.node_status(id).unwrap_or(DiffStatus::Unchanged)
}

pub(crate) fn edge_status_of(delta: &GraphDelta, id: &str) -> DiffStatus {
    delta.edge_status(id).unwrap_or(DiffStatus::Unchanged)
}

pub(crate) fn view_edge(edge: &GraphEdge, source: String, target: String, relation: Relation, delta: &GraphDelta) -> ViewEdge {
    ViewEdge {
        id: edge.id.clone(),
        source,
        target,
        relation,
        flow_type: edge.flow_type(),
        diff_status: edge_status_of(delta, &edge.id),
    }
}
