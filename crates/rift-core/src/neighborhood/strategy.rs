//! Per-kind hover strategies resolved through a lookup table.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::{Layout, Neighborhood};
use crate::views::{GROUP_KIND, ViewNode};

/// How a node kind expands into its hover neighborhood.
pub trait NeighborhoodStrategy: Send + Sync {
    /// The directly highlighted nodes and edges.
    fn direct(&self, layout: &Layout<'_>, focus: &ViewNode) -> Neighborhood;

    /// Whether the backward flow walk may pass through `candidate`. `direct`
    /// is this strategy's own result for `focus`, computed once per focus.
    fn admits(&self, direct: &Neighborhood, focus: &ViewNode, candidate: &ViewNode) -> bool;
}

/// Self plus graph neighbors; the walk stays within the focus's container.
#[derive(Debug, Default, Clone, Copy)]
pub struct LeafStrategy;

impl NeighborhoodStrategy for LeafStrategy {
    fn direct(&self, layout: &Layout<'_>, focus: &ViewNode) -> Neighborhood {
        let mut result = Neighborhood::default();
        result.keep_node_ids.insert(focus.id.clone());
        for edge in layout.incident_edges(&focus.id) {
            result.keep_edge_ids.insert(edge.id.clone());
            result.keep_node_ids.insert(edge.source.clone());
            result.keep_node_ids.insert(edge.target.clone());
        }
        result
    }

    fn admits(&self, _direct: &Neighborhood, focus: &ViewNode, candidate: &ViewNode) -> bool {
        candidate.parent_id == focus.parent_id
    }
}

/// Self plus every transitive descendant; the walk stays inside them.
#[derive(Debug, Default, Clone, Copy)]
pub struct GroupStrategy;

impl NeighborhoodStrategy for GroupStrategy {
    fn direct(&self, layout: &Layout<'_>, focus: &ViewNode) -> Neighborhood {
        let mut members: HashSet<&str> = layout.descendants(&focus.id).into_iter().collect();
        members.insert(focus.id.as_str());

        let mut result = Neighborhood::default();
        for &member in &members {
            for edge in layout.incident_edges(member) {
                if members.contains(edge.source.as_str()) && members.contains(edge.target.as_str()) {
                    result.keep_edge_ids.insert(edge.id.clone());
                }
            }
        }
        result.keep_node_ids = members.into_iter().map(str::to_string).collect();
        result
    }

    /// The direct set is exactly the group and its descendants.
    fn admits(&self, direct: &Neighborhood, _focus: &ViewNode, candidate: &ViewNode) -> bool {
        direct.keep_node_ids.contains(&candidate.id)
    }
}

/// Strategy lookup keyed by [`ViewNode::strategy_key`], with a default for
/// keys that have no override.
#[derive(Clone)]
pub struct StrategyTable {
    overrides: HashMap<String, Arc<dyn NeighborhoodStrategy>>,
    fallback: Arc<dyn NeighborhoodStrategy>,
}

impl StrategyTable {
    pub fn new(fallback: Arc<dyn NeighborhoodStrategy>) -> Self {
        Self {
            overrides: HashMap::new(),
            fallback,
        }
    }

    pub fn register(&mut self, key: impl Into<String>, strategy: Arc<dyn NeighborhoodStrategy>) -> &mut Self {
        self.overrides.insert(key.into(), strategy);
        self
    }

    pub fn resolve(&self, key: &str) -> &dyn NeighborhoodStrategy {
        self.overrides.get(key).unwrap_or(&self.fallback).as_ref()
    }
}

impl Default for StrategyTable {
    fn default() -> Self {
        let mut table = Self::new(Arc::new(LeafStrategy));
        table.register(GROUP_KIND, Arc::new(GroupStrategy));
        table
    }
}

impl std::fmt::Debug for StrategyTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<&String> = self.overrides.keys().collect();
        keys.sort();
        f.debug_struct("StrategyTable").field("overrides", &keys).finish()
    }
}
