//! Hand-built snapshot graphs for unit tests

use std::collections::{BTreeMap, HashMap};

use crate::model::*;

/// Incrementally assembles a [`SnapshotGraph`] in a single file `m.py`.
pub struct SnapshotBuilder {
    graph: SnapshotGraph,
    by_qualified: HashMap<String, String>,
    file_id: String,
}

impl SnapshotBuilder {
    pub fn new(snapshot_id: &str) -> Self {
        let mut graph = SnapshotGraph::new("repo", snapshot_id, format!("ref-{snapshot_id}"));
        let file_id = GraphNode::make_id(snapshot_id, NodeKind::File, "m.py", "m.py");
        graph.nodes.push(GraphNode {
            id: file_id.clone(),
            kind: NodeKind::File,
            name: "m.py".to_string(),
            qualified_name: "m.py".to_string(),
            file_path: "m.py".to_string(),
            language: Language::Python,
            start_line: Some(1),
            end_line: Some(100),
            signature_hash: Some("file".to_string()),
            metadata: BTreeMap::new(),
            snapshot_id: snapshot_id.to_string(),
            git_ref: format!("ref-{snapshot_id}"),
        });
        SnapshotBuilder {
            graph,
            by_qualified: HashMap::new(),
            file_id,
        }
    }

    pub fn node(
        &mut self,
        kind: NodeKind,
        qualified_name: &str,
        lines: (u32, u32),
        signature: Option<&str>,
    ) -> String {
        let snapshot_id = self.graph.snapshot_id.clone();
        let id = GraphNode::make_id(&snapshot_id, kind, "m.py", qualified_name);
        let name = qualified_name
            .rsplit(['.', ':'])
            .next()
            .unwrap_or(qualified_name)
            .to_string();
        self.graph.nodes.push(GraphNode {
            id: id.clone(),
            kind,
            name,
            qualified_name: qualified_name.to_string(),
            file_path: "m.py".to_string(),
            language: Language::Python,
            start_line: Some(lines.0),
            end_line: Some(lines.1),
            signature_hash: signature.map(str::to_string),
            metadata: BTreeMap::new(),
            snapshot_id,
            git_ref: self.graph.git_ref.clone(),
        });
        self.by_qualified.insert(qualified_name.to_string(), id.clone());
        id
    }

    /// Top-level function declared by the file.
    pub fn function(&mut self, qualified_name: &str, lines: (u32, u32), signature: Option<&str>) -> String {
        let id = self.node(NodeKind::Function, qualified_name, lines, signature);
        let file_id = self.file_id.clone();
        self.edge(EdgeKind::Declares, &file_id, &id, None);
        id
    }

    /// Branch declared by `owner` (a qualified name added earlier).
    pub fn branch(
        &mut self,
        owner: &str,
        branch_type: &str,
        idx: u32,
        signature: Option<&str>,
        lines: (u32, u32),
    ) -> String {
        let qualified = format!("{owner}::{branch_type}#{idx}");
        let id = self.node(NodeKind::Branch, &qualified, lines, signature);
        if let Some(node) = self.graph.nodes.last_mut() {
            node.metadata.insert("owner".to_string(), owner.to_string());
            node.metadata.insert("branchType".to_string(), branch_type.to_string());
            node.metadata.insert("snippet".to_string(), format!("{branch_type} ..."));
        }
        if let Some(owner_id) = self.by_qualified.get(owner).cloned() {
            self.edge(EdgeKind::Declares, &owner_id, &id, None);
        }
        id
    }

    pub fn edge(&mut self, kind: EdgeKind, source: &str, target: &str, flow: Option<FlowType>) -> String {
        let id = GraphEdge::make_id(kind, source, target, flow);
        let mut metadata = BTreeMap::new();
        if let Some(flow) = flow {
            metadata.insert(FLOW_TYPE_KEY.to_string(), flow.as_str().to_string());
        }
        self.graph.edges.push(GraphEdge {
            id: id.clone(),
            source: source.to_string(),
            target: target.to_string(),
            kind,
            file_path: Some("m.py".to_string()),
            metadata,
            snapshot_id: self.graph.snapshot_id.clone(),
            git_ref: self.graph.git_ref.clone(),
        });
        id
    }

    pub fn call(&mut self, source: &str, target: &str) -> String {
        self.edge(EdgeKind::Calls, source, target, None)
    }

    pub fn flow(&mut self, source: &str, target: &str, flow: FlowType) -> String {
        self.edge(EdgeKind::Calls, source, target, Some(flow))
    }

    /// Call-site edge from a branch to the callee symbol.
    pub fn call_site(&mut self, branch: &str, callee: &str) -> String {
        let id = self.edge(EdgeKind::Calls, branch, callee, None);
        if let Some(edge) = self.graph.edges.last_mut() {
            edge.metadata.insert(CALL_SITE_KEY.to_string(), "true".to_string());
        }
        id
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut GraphNode> {
        self.graph.nodes.iter_mut().find(|n| n.id == id)
    }

    pub fn file_id(&self) -> &str {
        &self.file_id
    }

    pub fn build(self) -> SnapshotGraph {
        self.graph
    }
}
