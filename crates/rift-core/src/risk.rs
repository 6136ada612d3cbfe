//! Heuristic risk scoring for changed symbols and files.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::diff::GraphDelta;
use crate::graph::GraphIndex;
use crate::model::*;

/// Number of highest-scoring symbols summed into a file's score.
pub const FILE_TOP_SYMBOLS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_score(score: u32) -> Self {
        match score {
            s if s >= 25 => RiskLevel::High,
            s if s >= 12 => RiskLevel::Medium,
            _ => RiskLevel::Low,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        })
    }
}

/// Textual change status of a file as reported by the hunk provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileChangeStatus {
    Added,
    Deleted,
    #[default]
    Modified,
    Renamed,
    TypeChanged,
    Unchanged,
}

impl FileChangeStatus {
    pub fn bonus(self) -> u32 {
        match self {
            Self::Renamed | Self::Added | Self::Deleted => 2,
            Self::TypeChanged => 3,
            Self::Modified | Self::Unchanged => 0,
        }
    }
}

/// Structural inputs to a symbol score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SymbolStats {
    pub incoming_calls: usize,
    pub outgoing_calls: usize,
    pub owned_declarations: usize,
    pub line_span: u32,
    pub public: bool,
}

impl SymbolStats {
    pub fn collect(index: &GraphIndex<'_>, node: &GraphNode) -> Self {
        SymbolStats {
            incoming_calls: index.incoming_calls(&node.id),
            outgoing_calls: index.outgoing_calls(&node.id),
            owned_declarations: index.owned_declarations(&node.id),
            line_span: node.line_span(),
            public: is_public(&node.name),
        }
    }
}

/// Names starting with `_` (Python) or `#` (JS private fields) are private.
pub fn is_public(name: &str) -> bool {
    !name.starts_with('_') && !name.starts_with('#')
}

fn status_weight(status: DiffStatus) -> u32 {
    match status {
        DiffStatus::Added | DiffStatus::Removed => 3,
        DiffStatus::Modified => 4,
        DiffStatus::Unchanged => 0,
    }
}

fn kind_weight(kind: NodeKind) -> u32 {
    match kind {
        NodeKind::Class => 4,
        NodeKind::Function | NodeKind::Component | NodeKind::Hook => 3,
        NodeKind::Method => 2,
        _ => 2,
    }
}

fn span_weight(span: u32) -> u32 {
    match span {
        s if s >= 200 => 3,
        s if s >= 80 => 2,
        s if s >= 25 => 1,
        _ => 0,
    }
}

/// Score one symbol. Unchanged symbols always score 0; changed ones score at least 1.
pub fn symbol_score(status: DiffStatus, kind: NodeKind, stats: &SymbolStats) -> u32 {
    if !status.is_changed() {
        return 0;
    }
    let fan_in = (stats.incoming_calls / 2).min(5) as u32;
    let fan_out = (stats.outgoing_calls / 3).min(3) as u32;
    let ownership = (stats.owned_declarations / 4).min(2) as u32;
    let public = u32::from(stats.public);
    let total = status_weight(status) + kind_weight(kind) + span_weight(stats.line_span) + fan_in + fan_out + ownership + public;
    total.max(1)
}

/// Risk entry for a changed symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolRisk {
    pub id: String,
    pub name: String,
    pub qualified_name: String,
    pub kind: NodeKind,
    pub file_path: String,
    pub status: DiffStatus,
    pub score: u32,
    pub level: RiskLevel,
    pub incoming_calls: usize,
}

/// Score every changed symbol of a delta. Removed symbols are measured in the
/// old graph, everything else in the new graph. Sorted by score descending.
pub fn score_symbols(delta: &GraphDelta) -> Vec<SymbolRisk> {
    let old_index = GraphIndex::new(&delta.old_graph);
    let new_index = GraphIndex::new(&delta.new_graph);

    let removed = delta
        .old_graph
        .nodes
        .iter()
        .filter(|n| delta.node_status(&n.id) == Some(DiffStatus::Removed))
        .map(|n| (n, &old_index));
    let current = delta
        .new_graph
        .nodes
        .iter()
        .filter(|n| delta.node_status(&n.id).is_some_and(DiffStatus::is_changed))
        .map(|n| (n, &new_index));

    let mut risks: Vec<SymbolRisk> = removed
        .chain(current)
        .filter(|(node, _)| node.kind.is_symbol())
        .map(|(node, index)| {
            let status = delta.node_status(&node.id).unwrap_or(DiffStatus::Unchanged);
            let stats = SymbolStats::collect(index, node);
            let score = symbol_score(status, node.kind, &stats);
            SymbolRisk {
                id: node.id.clone(),
                name: node.name.clone(),
                qualified_name: node.qualified_name.clone(),
                kind: node.kind,
                file_path: node.file_path.clone(),
                status,
                score,
                level: RiskLevel::from_score(score),
                incoming_calls: stats.incoming_calls,
            }
        })
        .collect();
    risks.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
    risks
}

/// File score from its changed symbols, textual churn and change status.
pub fn file_score(symbols: &[SymbolRisk], churn: usize, status: FileChangeStatus) -> u32 {
    let mut scores: Vec<u32> = symbols.iter().map(|s| s.score).collect();
    scores.sort_unstable_by(|a, b| b.cmp(a));
    let top: u32 = scores.iter().take(FILE_TOP_SYMBOLS).sum();
    let churn_weight = (churn / 15).min(10) as u32;
    let max_fan_in = symbols.iter().map(|s| s.incoming_calls).max().unwrap_or(0);
    let fan_in_weight = (max_fan_in / 2).min(6) as u32;
    top + churn_weight + fan_in_weight + status.bonus()
}
