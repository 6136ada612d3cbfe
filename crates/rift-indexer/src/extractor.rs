//! Language extractor trait and the per-file graph builder they write into.

use std::collections::{BTreeMap, HashMap, HashSet};

use rift_core::signature::hash_text;
use rift_core::{CALL_SITE_KEY, EdgeKind, FLOW_TYPE_KEY, FlowType, GraphEdge, GraphNode, Language, NodeKind};
use serde::{Deserialize, Serialize};
use tree_sitter::{Node, Tree};

use crate::error::AnalyzeError;
use crate::signature::{line_span, node_signature, symbol_signature};

/// Identity of the snapshot being analyzed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMeta {
    pub repo_id: String,
    pub snapshot_id: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
}

impl SnapshotMeta {
    pub fn new(repo_id: impl Into<String>, snapshot_id: impl Into<String>, git_ref: impl Into<String>) -> Self {
        Self {
            repo_id: repo_id.into(),
            snapshot_id: snapshot_id.into(),
            git_ref: git_ref.into(),
        }
    }
}

/// One input file. Paths are repository-relative with `/` separators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: String,
    pub content: Vec<u8>,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExtractionResult {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

pub trait LanguageExtractor: Send + Sync {
    /// Populate `file` from a parsed, error-free tree.
    fn extract(&self, file: &mut FileBuilder<'_>, tree: &Tree) -> Result<(), AnalyzeError>;
}

/// How a by-name reference should be turned into an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reference {
    Call,
    CallSite,
    Extends,
    Implements,
    Renders,
}

impl Reference {
    fn accepts(self, kind: NodeKind) -> bool {
        let class_like = matches!(kind, NodeKind::Class | NodeKind::Controller | NodeKind::Service);
        match self {
            Reference::Call | Reference::CallSite => kind.is_callable() || class_like,
            Reference::Extends | Reference::Implements => class_like,
            Reference::Renders => kind == NodeKind::Component,
        }
    }
}

/// A symbol as actually recorded, after any duplicate-name suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declared {
    pub id: String,
    pub qualified_name: String,
}

#[derive(Debug, Clone)]
struct PendingReference {
    reference: Reference,
    source: String,
    /// Declaring parent of the referring symbol, for sibling preference.
    scope: String,
    name: String,
}

/// Accumulates one file's nodes and edges. Names are resolved to same-file
/// symbols in [`FileBuilder::finish`]; unresolved names are dropped.
pub struct FileBuilder<'a> {
    meta: &'a SnapshotMeta,
    path: &'a str,
    source: &'a str,
    language: Language,
    module_path: String,
    file_id: String,
    nodes: Vec<GraphNode>,
    node_ids: HashSet<String>,
    edges: Vec<GraphEdge>,
    edge_ids: HashSet<String>,
    parents: HashMap<String, String>,
    modules: HashMap<String, String>,
    pending: Vec<PendingReference>,
}

impl<'a> FileBuilder<'a> {
    pub fn new(meta: &'a SnapshotMeta, path: &'a str, language: Language, source: &'a str) -> Self {
        let file_id = GraphNode::make_id(&meta.snapshot_id, NodeKind::File, path, path);
        let line_count = source.lines().count().max(1) as u32;
        let file_node = GraphNode {
            id: file_id.clone(),
            kind: NodeKind::File,
            name: file_name(path).to_string(),
            qualified_name: path.to_string(),
            file_path: path.to_string(),
            language,
            start_line: Some(1),
            end_line: Some(line_count),
            signature_hash: Some(hash_text(source)),
            metadata: BTreeMap::new(),
            snapshot_id: meta.snapshot_id.clone(),
            git_ref: meta.git_ref.clone(),
        };
        let mut builder = FileBuilder {
            meta,
            path,
            source,
            language,
            module_path: module_path(path),
            file_id: file_id.clone(),
            nodes: Vec::new(),
            node_ids: HashSet::new(),
            edges: Vec::new(),
            edge_ids: HashSet::new(),
            parents: HashMap::new(),
            modules: HashMap::new(),
            pending: Vec::new(),
        };
        builder.push_node(file_node);
        builder
    }

    /// A file that could not be analyzed: a bare `File` node of unknown language.
    pub fn degraded(meta: &SnapshotMeta, path: &str, content: &[u8], error: &AnalyzeError) -> ExtractionResult {
        let text = String::from_utf8_lossy(content);
        let mut builder = FileBuilder::new(meta, path, Language::Unknown, &text);
        if let Some(file) = builder.nodes.first_mut() {
            file.metadata.insert("error".to_string(), error.to_string());
        }
        builder.finish()
    }

    pub fn source(&self) -> &'a str {
        self.source
    }

    pub fn path(&self) -> &'a str {
        self.path
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn module_path(&self) -> &str {
        &self.module_path
    }

    pub fn file_id(&self) -> &str {
        &self.file_id
    }

    pub fn text(&self, node: Node<'_>) -> &'a str {
        self.source.get(node.byte_range()).unwrap_or_default()
    }

    /// Replace the file node's raw-text signature with a token signature.
    pub fn set_file_signature(&mut self, root: Node<'_>) {
        let signature = node_signature(root, self.source);
        if let Some(file) = self.nodes.first_mut() {
            file.signature_hash = Some(signature);
        }
    }

    /// Add a declared symbol under `parent`. A qualified name already taken
    /// in this file gets a positional `@L{line}` suffix.
    pub fn add_symbol(
        &mut self,
        kind: NodeKind,
        name: &str,
        qualified_name: &str,
        node: Node<'_>,
        parent: &str,
        metadata: BTreeMap<String, String>,
    ) -> Declared {
        let (start, end) = line_span(node);
        let signature = symbol_signature(node, self.source);
        let mut qualified = qualified_name.to_string();
        let mut id = GraphNode::make_id(&self.meta.snapshot_id, kind, self.path, &qualified);
        if self.node_ids.contains(&id) {
            qualified = format!("{qualified_name}@L{start}");
            id = GraphNode::make_id(&self.meta.snapshot_id, kind, self.path, &qualified);
        }
        self.push_node(GraphNode {
            id: id.clone(),
            kind,
            name: name.to_string(),
            qualified_name: qualified.clone(),
            file_path: self.path.to_string(),
            language: self.language,
            start_line: Some(start),
            end_line: Some(end),
            signature_hash: Some(signature),
            metadata,
            snapshot_id: self.meta.snapshot_id.clone(),
            git_ref: self.meta.git_ref.clone(),
        });
        self.declare(parent, &id);
        Declared {
            id,
            qualified_name: qualified,
        }
    }

    /// Add a branch node with explicit content; used by the flow builder.
    pub(crate) fn add_branch(
        &mut self,
        qualified_name: String,
        name: String,
        lines: (u32, u32),
        signature: String,
        metadata: BTreeMap<String, String>,
        owner: &str,
    ) -> String {
        let id = GraphNode::make_id(&self.meta.snapshot_id, NodeKind::Branch, self.path, &qualified_name);
        self.push_node(GraphNode {
            id: id.clone(),
            kind: NodeKind::Branch,
            name,
            qualified_name,
            file_path: self.path.to_string(),
            language: self.language,
            start_line: Some(lines.0),
            end_line: Some(lines.1),
            signature_hash: Some(signature),
            metadata,
            snapshot_id: self.meta.snapshot_id.clone(),
            git_ref: self.meta.git_ref.clone(),
        });
        self.declare(owner, &id);
        id
    }

    /// `IMPORTS` edge from the file to a per-file `Module` node.
    pub fn add_import(&mut self, module: &str) {
        let module = module.trim();
        if module.is_empty() || self.modules.contains_key(module) {
            return;
        }
        let id = GraphNode::make_id(&self.meta.snapshot_id, NodeKind::Module, self.path, module);
        self.push_node(GraphNode {
            id: id.clone(),
            kind: NodeKind::Module,
            name: module.rsplit(['.', '/']).next().unwrap_or(module).to_string(),
            qualified_name: module.to_string(),
            file_path: self.path.to_string(),
            language: self.language,
            start_line: None,
            end_line: None,
            signature_hash: Some(hash_text(module)),
            metadata: BTreeMap::new(),
            snapshot_id: self.meta.snapshot_id.clone(),
            git_ref: self.meta.git_ref.clone(),
        });
        self.modules.insert(module.to_string(), id.clone());
        let file_id = self.file_id.clone();
        self.add_edge(EdgeKind::Imports, &file_id, &id, None, false);
    }

    pub fn add_edge(&mut self, kind: EdgeKind, source: &str, target: &str, flow: Option<FlowType>, call_site: bool) {
        let id = GraphEdge::make_id(kind, source, target, flow);
        if !self.edge_ids.insert(id.clone()) {
            return;
        }
        let mut metadata = BTreeMap::new();
        if let Some(flow) = flow {
            metadata.insert(FLOW_TYPE_KEY.to_string(), flow.as_str().to_string());
        }
        if call_site {
            metadata.insert(CALL_SITE_KEY.to_string(), "true".to_string());
        }
        self.edges.push(GraphEdge {
            id,
            source: source.to_string(),
            target: target.to_string(),
            kind,
            file_path: Some(self.path.to_string()),
            metadata,
            snapshot_id: self.meta.snapshot_id.clone(),
            git_ref: self.meta.git_ref.clone(),
        });
    }

    /// Record a by-name reference from `source` to be resolved at the end.
    pub fn refer(&mut self, reference: Reference, source: &str, name: &str) {
        let scope = self.parent_of(source).unwrap_or(&self.file_id).to_string();
        self.pending.push(PendingReference {
            reference,
            source: source.to_string(),
            scope,
            name: name.to_string(),
        });
    }

    /// Like [`FileBuilder::refer`] but with an explicit lookup scope.
    pub(crate) fn refer_from_scope(&mut self, reference: Reference, source: &str, scope: &str, name: &str) {
        self.pending.push(PendingReference {
            reference,
            source: source.to_string(),
            scope: scope.to_string(),
            name: name.to_string(),
        });
    }

    pub fn parent_of(&self, id: &str) -> Option<&str> {
        self.parents.get(id).map(String::as_str)
    }

    fn declare(&mut self, parent: &str, child: &str) {
        self.parents.insert(child.to_string(), parent.to_string());
        self.add_edge(EdgeKind::Declares, parent, child, None, false);
    }

    fn push_node(&mut self, node: GraphNode) {
        self.node_ids.insert(node.id.clone());
        self.nodes.push(node);
    }

    /// Resolve pending references and return the file's graph fragment.
    pub fn finish(mut self) -> ExtractionResult {
        let mut by_name: HashMap<&str, Vec<(&str, NodeKind)>> = HashMap::new();
        for node in &self.nodes {
            if node.kind.is_symbol() && node.kind != NodeKind::Endpoint {
                by_name.entry(node.name.as_str()).or_default().push((node.id.as_str(), node.kind));
            }
        }

        let mut resolved = Vec::new();
        for pending in &self.pending {
            let Some(candidates) = by_name.get(pending.name.as_str()) else {
                continue;
            };
            let accepted: Vec<&(&str, NodeKind)> = candidates
                .iter()
                .filter(|(_, kind)| pending.reference.accepts(*kind))
                .collect();
            let sibling = accepted
                .iter()
                .find(|(id, _)| self.parents.get(*id).is_some_and(|p| *p == pending.scope));
            let top_level = accepted
                .iter()
                .find(|(id, _)| self.parents.get(*id).is_some_and(|p| *p == self.file_id));
            let Some(&&(target, target_kind)) = sibling.or(top_level).or(accepted.first()) else {
                continue;
            };
            let (kind, call_site) = match pending.reference {
                Reference::Call if target_kind == NodeKind::Hook => (EdgeKind::UsesHook, false),
                Reference::Call => (EdgeKind::Calls, false),
                Reference::CallSite => (EdgeKind::Calls, true),
                Reference::Extends => (EdgeKind::Extends, false),
                Reference::Implements => (EdgeKind::Implements, false),
                Reference::Renders => (EdgeKind::Renders, false),
            };
            resolved.push((kind, pending.source.clone(), target.to_string(), call_site));
        }

        let unresolved = self.pending.len() - resolved.len();
        if unresolved > 0 {
            tracing::debug!("{}: {} unresolved references dropped", self.path, unresolved);
        }
        for (kind, source, target, call_site) in resolved {
            self.add_edge(kind, &source, &target, None, call_site);
        }

        ExtractionResult {
            nodes: self.nodes,
            edges: self.edges,
        }
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Dotted module path of a file: `pkg/mod.py` → `pkg.mod`,
/// `pkg/__init__.py` → `pkg`, `src/App.tsx` → `src.App`.
pub fn module_path(path: &str) -> String {
    let trimmed = path.trim_start_matches("./");
    let stem = match trimmed.rsplit_once('.') {
        Some((stem, ext)) if !ext.contains('/') => stem,
        _ => trimmed,
    };
    let dotted = stem.replace(['/', '\\'], ".");
    match dotted.strip_suffix(".__init__") {
        Some(package) => package.to_string(),
        None if dotted == "__init__" => String::new(),
        None => dotted,
    }
}

/// Join a scope and a name into a qualified name.
pub fn qualify(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{scope}.{name}")
    }
}
