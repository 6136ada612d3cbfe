//! Declaration and call view: files, modules and symbols with their call and
//! type relationships. Branches are left to the control-flow view.

use std::collections::HashSet;

use crate::diff::GraphDelta;
use crate::graph::GraphIndex;
use crate::model::*;

use super::{Perspective, Relation, ViewBuilder, ViewGraph, ViewNode, status_of, view_edge};

pub struct DeclarationViewBuilder;

fn relation_for(edge: &GraphEdge) -> Option<Relation> {
    match edge.kind {
        EdgeKind::Calls if edge.is_flow() || edge.is_call_site() => None,
        EdgeKind::Calls | EdgeKind::UsesHook => Some(Relation::Invoke),
        EdgeKind::Extends
        | EdgeKind::Implements
        | EdgeKind::Imports
        | EdgeKind::ExposesEndpoint
        | EdgeKind::Renders => Some(Relation::Hierarchy),
        // nesting is expressed through parent_id
        EdgeKind::Declares => None,
    }
}

impl ViewBuilder for DeclarationViewBuilder {
    fn perspective(&self) -> Perspective {
        Perspective::Declarations
    }

    fn project(&self, graph: &SnapshotGraph, delta: &GraphDelta) -> ViewGraph {
        let index = GraphIndex::new(graph);
        let mut view = ViewGraph::new(graph, self.perspective());

        let included: HashSet<&str> = graph
            .nodes
            .iter()
            .filter(|n| n.kind != NodeKind::Branch)
            .map(|n| n.id.as_str())
            .collect();

        for node in graph.nodes.iter().filter(|n| included.contains(n.id.as_str())) {
            let mut view_node = ViewNode::from_graph_node(node, status_of(delta, &node.id));
            view_node.parent_id = index
                .declaring_parent(&node.id)
                .filter(|parent| included.contains(parent.id.as_str()))
                .map(|parent| parent.id.clone());
            view_node.is_group = index
                .declared_children(&node.id)
                .any(|child| included.contains(child.id.as_str()));
            view.nodes.push(view_node);
        }

        for edge in &graph.edges {
            if !included.contains(edge.source.as_str()) || !included.contains(edge.target.as_str()) {
                continue;
            }
            if let Some(relation) = relation_for(edge) {
                view.edges.push(view_edge(
                    edge,
                    edge.source.clone(),
                    edge.target.clone(),
                    relation,
                    delta,
                ));
            }
        }
        view
    }
}
