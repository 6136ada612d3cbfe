//! Core data structures for snapshot graphs

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::GraphError;

/// Discriminates what kind of code entity a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeKind {
    // ── Structural ──────────────────────────────────────────
    File,
    Module,

    // ── Code entities (tree-sitter extracted) ───────────────
    Class,
    Function,
    Method,
    Branch,

    // ── Service surface ─────────────────────────────────────
    Endpoint,
    Controller,
    Service,

    // ── UI-component-like symbols ───────────────────────────
    Component,
    Hook,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::File => "File",
            Self::Module => "Module",
            Self::Class => "Class",
            Self::Function => "Function",
            Self::Method => "Method",
            Self::Branch => "Branch",
            Self::Endpoint => "Endpoint",
            Self::Controller => "Controller",
            Self::Service => "Service",
            Self::Component => "Component",
            Self::Hook => "Hook",
        }
    }

    /// Named code entities that get risk scores and appear in symbol listings.
    pub fn is_symbol(self) -> bool {
        !matches!(self, Self::File | Self::Module | Self::Branch)
    }

    /// Kinds that own a control-flow skeleton.
    pub fn is_callable(self) -> bool {
        matches!(
            self,
            Self::Function | Self::Method | Self::Component | Self::Hook
        )
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supported languages for syntax-aware parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    TypeScript,
    Tsx,
    JavaScript,
    Unknown,
}

impl Language {
    /// Detect language from file extension.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("py") | Some("pyi") => Language::Python,
            Some("ts") | Some("mts") | Some("cts") => Language::TypeScript,
            Some("tsx") => Language::Tsx,
            Some("js") | Some("jsx") | Some("mjs") | Some("cjs") => Language::JavaScript,
            _ => Language::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::TypeScript => "typescript",
            Self::Tsx => "tsx",
            Self::JavaScript => "javascript",
            Self::Unknown => "unknown",
        }
    }
}

/// What kind of relationship this edge represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeKind {
    Imports,
    Declares,
    Calls,
    Extends,
    Implements,
    Renders,
    UsesHook,
    ExposesEndpoint,
}

impl EdgeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Imports => "IMPORTS",
            Self::Declares => "DECLARES",
            Self::Calls => "CALLS",
            Self::Extends => "EXTENDS",
            Self::Implements => "IMPLEMENTS",
            Self::Renders => "RENDERS",
            Self::UsesHook => "USES_HOOK",
            Self::ExposesEndpoint => "EXPOSES_ENDPOINT",
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Branch semantics of an intra-function flow edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowType {
    True,
    False,
    Next,
}

impl FlowType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::True => "true",
            Self::False => "false",
            Self::Next => "next",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "true" => Some(Self::True),
            "false" => Some(Self::False),
            "next" => Some(Self::Next),
            _ => None,
        }
    }
}

/// Metadata key carrying an edge's [`FlowType`].
pub const FLOW_TYPE_KEY: &str = "flowType";
/// Metadata key marking a call-site branch → callee edge.
pub const CALL_SITE_KEY: &str = "callSite";

/// A single node in a snapshot graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: String,
    pub kind: NodeKind,
    pub name: String,
    pub qualified_name: String,
    pub file_path: String,
    pub language: Language,
    pub start_line: Option<u32>,
    pub end_line: Option<u32>,
    pub signature_hash: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub snapshot_id: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
}

impl GraphNode {
    /// Build the snapshot-scoped id for a symbol.
    pub fn make_id(snapshot_id: &str, kind: NodeKind, file_path: &str, qualified_name: &str) -> String {
        format!("{snapshot_id}:{kind}:{file_path}:{qualified_name}")
    }

    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// `(start, end)` with missing lines treated as 0.
    pub fn position(&self) -> (u32, u32) {
        (self.start_line.unwrap_or(0), self.end_line.unwrap_or(0))
    }

    /// Inclusive number of source lines the node covers, 0 when unknown.
    pub fn line_span(&self) -> u32 {
        match (self.start_line, self.end_line) {
            (Some(start), Some(end)) if end >= start => end - start + 1,
            _ => 0,
        }
    }
}

/// A directed edge in a snapshot graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub kind: EdgeKind,
    pub file_path: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub snapshot_id: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
}

impl GraphEdge {
    pub fn make_id(kind: EdgeKind, source: &str, target: &str, flow: Option<FlowType>) -> String {
        match flow {
            Some(flow) => format!("{kind}:{source}->{target}:{}", flow.as_str()),
            None => format!("{kind}:{source}->{target}"),
        }
    }

    pub fn flow_type(&self) -> Option<FlowType> {
        self.metadata
            .get(FLOW_TYPE_KEY)
            .and_then(|value| FlowType::parse(value))
    }

    /// Intra-function control-flow edge (a `CALLS` edge carrying a flow type).
    pub fn is_flow(&self) -> bool {
        self.kind == EdgeKind::Calls && self.flow_type().is_some()
    }

    pub fn is_call_site(&self) -> bool {
        self.metadata.get(CALL_SITE_KEY).is_some_and(|v| v == "true")
    }
}

/// One parsed version of a codebase. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotGraph {
    pub repo_id: String,
    pub snapshot_id: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl SnapshotGraph {
    pub fn new(repo_id: impl Into<String>, snapshot_id: impl Into<String>, git_ref: impl Into<String>) -> Self {
        SnapshotGraph {
            repo_id: repo_id.into(),
            snapshot_id: snapshot_id.into(),
            git_ref: git_ref.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Check id uniqueness and that every edge endpoint exists.
    pub fn validate(&self) -> Result<(), GraphError> {
        let mut ids = std::collections::HashSet::with_capacity(self.nodes.len());
        for node in &self.nodes {
            if !ids.insert(node.id.as_str()) {
                return Err(GraphError::DuplicateNode(node.id.clone()));
            }
        }
        let mut edge_ids = std::collections::HashSet::with_capacity(self.edges.len());
        for edge in &self.edges {
            if !edge_ids.insert(edge.id.as_str()) {
                return Err(GraphError::DuplicateEdge(edge.id.clone()));
            }
            for endpoint in [&edge.source, &edge.target] {
                if !ids.contains(endpoint.as_str()) {
                    return Err(GraphError::DanglingEdge {
                        edge: edge.id.clone(),
                        endpoint: endpoint.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Diff classification of a node or edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffStatus {
    Added,
    Removed,
    Modified,
    Unchanged,
}

impl DiffStatus {
    pub fn is_changed(self) -> bool {
        self != DiffStatus::Unchanged
    }

    /// The label this status carries when old and new are swapped.
    pub fn reversed(self) -> Self {
        match self {
            Self::Added => Self::Removed,
            Self::Removed => Self::Added,
            other => other,
        }
    }
}

impl fmt::Display for DiffStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Added => "added",
            Self::Removed => "removed",
            Self::Modified => "modified",
            Self::Unchanged => "unchanged",
        })
    }
}
