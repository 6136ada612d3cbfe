//! Rift Core — snapshot graph model, delta matcher, views, and derivations

pub mod cache;
pub mod config;
pub mod diff;
pub mod error;
pub mod graph;
pub mod model;
pub mod neighborhood;
pub mod risk;
pub mod signature;
pub mod views;


#[cfg(test)]
pub(crate) mod test_utils;

pub use cache::{CacheStats, DerivationCache, content_key};
pub use config::RiftConfig;
pub use diff::{GraphDelta, match_graphs};
pub use error::{ConfigError, GraphError};
pub use graph::GraphIndex;
pub use model::{
    CALL_SITE_KEY, DiffStatus, EdgeKind, FLOW_TYPE_KEY, FlowType, GraphEdge, GraphNode, Language, NodeKind,
    SnapshotGraph,
};
pub use neighborhood::{Derivation, DerivationInput, Neighborhood, NeighborhoodEngine, StrategyTable};
pub use risk::{FileChangeStatus, RiskLevel, SymbolRisk, file_score, score_symbols, symbol_score};
pub use views::{Perspective, Relation, ViewBuilder, ViewEdge, ViewGraph, ViewNode, ViewPair, build_all};
