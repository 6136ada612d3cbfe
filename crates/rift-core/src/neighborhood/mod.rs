//! Interaction-time derivations over a positioned view: hover neighborhoods,
//! search matches and cross-version match keys.
//!
//! The engine is polymorphic over node kinds through a [`StrategyTable`] and
//! memoizes whole derivations in an injected [`DerivationCache`].

pub mod match_key;
pub mod search;
pub mod strategy;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cache::{DerivationCache, content_key};
use crate::views::{Relation, ViewEdge, ViewGraph, ViewNode};

pub use match_key::match_keys;
pub use search::search_matches;
pub use strategy::{GroupStrategy, LeafStrategy, NeighborhoodStrategy, StrategyTable};

/// Everything a derivation depends on. Its serialized form is the cache key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivationInput {
    pub graph_id: String,
    /// Nodes actually positioned by the layout.
    pub nodes: Vec<ViewNode>,
    pub edges: Vec<ViewEdge>,
    pub query: String,
    pub exclude: bool,
}

impl DerivationInput {
    /// Use every node and edge of a view as the positioned set.
    pub fn from_view(view: &ViewGraph, query: impl Into<String>, exclude: bool) -> Self {
        DerivationInput {
            graph_id: view.graph_id.clone(),
            nodes: view.nodes.clone(),
            edges: view.edges.clone(),
            query: query.into(),
            exclude,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Neighborhood {
    pub keep_node_ids: BTreeSet<String>,
    pub keep_edge_ids: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Derivation {
    pub match_keys: BTreeMap<String, String>,
    pub neighborhoods: BTreeMap<String, Neighborhood>,
    pub search_match_ids: BTreeSet<String>,
}

/// Lookup structure over the positioned subset. Edges with an endpoint
/// outside the subset are ignored.
pub struct Layout<'a> {
    nodes: HashMap<&'a str, &'a ViewNode>,
    order: Vec<&'a ViewNode>,
    children: HashMap<&'a str, Vec<&'a str>>,
    incident: HashMap<&'a str, Vec<&'a ViewEdge>>,
    incoming_flow: HashMap<&'a str, Vec<&'a ViewEdge>>,
}

impl<'a> Layout<'a> {
    pub fn new(nodes: &'a [ViewNode], edges: &'a [ViewEdge]) -> Self {
        let by_id: HashMap<&str, &ViewNode> = nodes.iter().map(|n| (n.id.as_str(), n)).collect();
        let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
        for node in nodes {
            if let Some(parent) = node.parent_id.as_deref() {
                if by_id.contains_key(parent) {
                    children.entry(parent).or_default().push(node.id.as_str());
                }
            }
        }
        let mut incident: HashMap<&str, Vec<&ViewEdge>> = HashMap::new();
        let mut incoming_flow: HashMap<&str, Vec<&ViewEdge>> = HashMap::new();
        for edge in edges {
            if !by_id.contains_key(edge.source.as_str()) || !by_id.contains_key(edge.target.as_str()) {
                continue;
            }
            incident.entry(edge.source.as_str()).or_default().push(edge);
            if edge.source != edge.target {
                incident.entry(edge.target.as_str()).or_default().push(edge);
            }
            if edge.relation == Relation::Flow {
                incoming_flow.entry(edge.target.as_str()).or_default().push(edge);
            }
        }
        Layout {
            nodes: by_id,
            order: nodes.iter().collect(),
            children,
            incident,
            incoming_flow,
        }
    }

    pub fn node(&self, id: &str) -> Option<&'a ViewNode> {
        self.nodes.get(id).copied()
    }

    /// Positioned nodes in input order.
    pub fn nodes(&self) -> impl Iterator<Item = &'a ViewNode> + '_ {
        self.order.iter().copied()
    }

    pub fn incident_edges(&self, id: &str) -> &[&'a ViewEdge] {
        self.incident.get(id).map_or(&[], Vec::as_slice)
    }

    pub fn incoming_flow(&self, id: &str) -> &[&'a ViewEdge] {
        self.incoming_flow.get(id).map_or(&[], Vec::as_slice)
    }

    /// Transitive children through `parent_id`, breadth-first, excluding `id`.
    pub fn descendants(&self, id: &str) -> Vec<&'a str> {
        let mut out = Vec::new();
        let mut seen: HashSet<&str> = HashSet::from([id]);
        let mut queue: VecDeque<&str> = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            for &child in self.children.get(current).into_iter().flatten() {
                if seen.insert(child) {
                    out.push(child);
                    queue.push_back(child);
                }
            }
        }
        out
    }
}

/// Derives hover neighborhoods, search matches and match keys for one input.
pub struct NeighborhoodEngine {
    strategies: StrategyTable,
    cache: DerivationCache<Derivation>,
}

impl NeighborhoodEngine {
    pub fn new(strategies: StrategyTable, cache: DerivationCache<Derivation>) -> Self {
        Self { strategies, cache }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(StrategyTable::default(), DerivationCache::new(capacity))
    }

    pub fn strategies_mut(&mut self) -> &mut StrategyTable {
        &mut self.strategies
    }

    pub fn cache(&self) -> &DerivationCache<Derivation> {
        &self.cache
    }

    /// Memoized derivation. Inputs that fail to serialize are computed uncached.
    pub fn derive(&mut self, input: &DerivationInput) -> Arc<Derivation> {
        match content_key(input) {
            Ok(key) => {
                let strategies = &self.strategies;
                self.cache.get_or_insert_with(key, || compute(strategies, input))
            }
            Err(err) => {
                tracing::warn!("Derivation input not cacheable: {}", err);
                Arc::new(compute(&self.strategies, input))
            }
        }
    }
}

impl Default for NeighborhoodEngine {
    fn default() -> Self {
        Self::new(StrategyTable::default(), DerivationCache::default())
    }
}

/// Uncached derivation.
pub fn compute(strategies: &StrategyTable, input: &DerivationInput) -> Derivation {
    let layout = Layout::new(&input.nodes, &input.edges);
    let neighborhoods = layout
        .nodes()
        .map(|node| (node.id.clone(), neighborhood(strategies, &layout, node)))
        .collect();
    Derivation {
        match_keys: match_keys(&layout),
        neighborhoods,
        search_match_ids: search_matches(&layout, &input.query, input.exclude),
    }
}

/// The traversal driver: direct set from the node's strategy, then a
/// backward walk over incoming flow edges limited by the strategy's scope.
pub fn neighborhood(strategies: &StrategyTable, layout: &Layout<'_>, focus: &ViewNode) -> Neighborhood {
    let strategy = strategies.resolve(focus.strategy_key());
    let direct = strategy.direct(layout, focus);
    let mut result = direct.clone();

    let mut queue: VecDeque<String> = result.keep_node_ids.iter().cloned().collect();
    let mut visited: HashSet<String> = result.keep_node_ids.clone().into_iter().collect();
    while let Some(current) = queue.pop_front() {
        for edge in layout.incoming_flow(&current) {
            let Some(source) = layout.node(&edge.source) else {
                continue;
            };
            if !strategy.admits(&direct, focus, source) {
                continue;
            }
            result.keep_edge_ids.insert(edge.id.clone());
            if visited.insert(source.id.clone()) {
                result.keep_node_ids.insert(source.id.clone());
                queue.push_back(source.id.clone());
            }
        }
    }
    result
}
