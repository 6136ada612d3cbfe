//! UI component and hook view. Files holding components become groups.

use std::collections::HashSet;

use crate::diff::GraphDelta;
use crate::graph::GraphIndex;
use crate::model::*;

use super::{Perspective, Relation, ViewBuilder, ViewGraph, ViewNode, status_of, view_edge};

pub struct ComponentViewBuilder;

fn is_component_like(kind: NodeKind) -> bool {
    matches!(kind, NodeKind::Component | NodeKind::Hook)
}

impl ViewBuilder for ComponentViewBuilder {
    fn perspective(&self) -> Perspective {
        Perspective::Components
    }

    fn project(&self, graph: &SnapshotGraph, delta: &GraphDelta) -> ViewGraph {
        let index = GraphIndex::new(graph);
        let mut view = ViewGraph::new(graph, self.perspective());

        let members: Vec<&GraphNode> = graph.nodes.iter().filter(|n| is_component_like(n.kind)).collect();
        let files: HashSet<&str> = members
            .iter()
            .filter_map(|n| index.ancestors(&n.id).into_iter().find(|a| a.kind == NodeKind::File))
            .map(|file| file.id.as_str())
            .collect();

        for node in graph.nodes.iter().filter(|n| files.contains(n.id.as_str())) {
            let mut group = ViewNode::from_graph_node(node, status_of(delta, &node.id));
            group.is_group = true;
            view.nodes.push(group);
        }
        for node in &members {
            let mut view_node = ViewNode::from_graph_node(node, status_of(delta, &node.id));
            view_node.parent_id = index
                .ancestors(&node.id)
                .into_iter()
                .find(|a| a.kind == NodeKind::File)
                .map(|file| file.id.clone());
            view.nodes.push(view_node);
        }

        let member_ids: HashSet<&str> = members.iter().map(|n| n.id.as_str()).collect();
        for edge in &graph.edges {
            if !member_ids.contains(edge.source.as_str()) || !member_ids.contains(edge.target.as_str()) {
                continue;
            }
            let relation = match edge.kind {
                EdgeKind::Renders => Relation::Hierarchy,
                EdgeKind::UsesHook => Relation::Invoke,
                EdgeKind::Calls if !edge.is_flow() && !edge.is_call_site() => Relation::Invoke,
                _ => continue,
            };
            view.edges.push(view_edge(edge, edge.source.clone(), edge.target.clone(), relation, delta));
        }
        view
    }
}
