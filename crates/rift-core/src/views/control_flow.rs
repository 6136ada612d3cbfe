//! Function-level control-flow view.
//!
//! Every callable becomes a synthetic group `group:{id}` holding its branch
//! nodes. Flow edges connect branches; call-site edges become invoke edges
//! from the calling branch to the callee's group.

use crate::diff::GraphDelta;
use crate::graph::GraphIndex;
use crate::model::*;

use super::{GROUP_KIND, Perspective, Relation, ViewBuilder, ViewGraph, ViewNode, status_of, view_edge};

pub struct ControlFlowViewBuilder;

pub fn group_id(symbol_id: &str) -> String {
    format!("group:{symbol_id}")
}

/// Nearest enclosing callable, used for nesting callbacks and inner functions.
fn enclosing_callable<'g>(index: &GraphIndex<'g>, id: &str) -> Option<&'g GraphNode> {
    index.ancestors(id).into_iter().find(|a| a.kind.is_callable())
}

impl ViewBuilder for ControlFlowViewBuilder {
    fn perspective(&self) -> Perspective {
        Perspective::ControlFlow
    }

    fn project(&self, graph: &SnapshotGraph, delta: &GraphDelta) -> ViewGraph {
        let index = GraphIndex::new(graph);
        let mut view = ViewGraph::new(graph, self.perspective());

        for node in &graph.nodes {
            if node.kind.is_callable() {
                let mut group = ViewNode::from_graph_node(node, status_of(delta, &node.id));
                group.id = group_id(&node.id);
                group.kind = GROUP_KIND.to_string();
                group.is_group = true;
                group.parent_id = enclosing_callable(&index, &node.id).map(|p| group_id(&p.id));
                view.nodes.push(group);
            } else if node.kind == NodeKind::Branch {
                let mut branch = ViewNode::from_graph_node(node, status_of(delta, &node.id));
                branch.parent_id = index
                    .declaring_parent(&node.id)
                    .filter(|owner| owner.kind.is_callable())
                    .map(|owner| group_id(&owner.id));
                view.nodes.push(branch);
            }
        }

        for edge in &graph.edges {
            let (Some(source), Some(target)) = (index.node(&edge.source), index.node(&edge.target)) else {
                continue;
            };
            if edge.is_flow() && source.kind == NodeKind::Branch && target.kind == NodeKind::Branch {
                view.edges.push(view_edge(
                    edge,
                    source.id.clone(),
                    target.id.clone(),
                    Relation::Flow,
                    delta,
                ));
            } else if edge.is_call_site() && source.kind == NodeKind::Branch && target.kind.is_callable() {
                view.edges.push(view_edge(
                    edge,
                    source.id.clone(),
                    group_id(&target.id),
                    Relation::Invoke,
                    delta,
                ));
            }
        }

        tracing::debug!(
            "Control-flow view {}: {} nodes, {} edges",
            view.graph_id,
            view.nodes.len(),
            view.edges.len()
        );
        view
    }
}
