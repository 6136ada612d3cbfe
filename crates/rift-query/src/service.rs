//! Diff registry: analyzes two snapshots, matches them and answers lookups
//! by diff, symbol, file and view.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rift_core::{
    DerivationInput, DiffStatus, FileChangeStatus, GraphDelta, GraphNode, NodeKind, Perspective, RiskLevel,
    SnapshotGraph, SymbolRisk, ViewPair, build_all, file_score, match_graphs, score_symbols,
};
use rift_indexer::{Coordinator, SnapshotMeta, SourceFile};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::QueryError;
use crate::hunks::FileHunks;
use crate::store::GraphStore;

/// `{repo}:{old snapshot}..{new snapshot}`
pub type DiffId = String;

pub fn diff_id(repo_id: &str, old_snapshot: &str, new_snapshot: &str) -> DiffId {
    format!("{repo_id}:{old_snapshot}..{new_snapshot}")
}

/// One side of a diff as handed over by the file-content collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotInput {
    pub snapshot_id: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub files: Vec<SourceFile>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffRequest {
    pub repo_id: String,
    pub old: SnapshotInput,
    pub new: SnapshotInput,
    /// Display-only textual hunks; never consulted by the matcher.
    pub hunks: Vec<FileHunks>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSummary {
    pub path: String,
    pub status: FileChangeStatus,
    pub churn: usize,
    pub score: u32,
    pub level: RiskLevel,
    pub symbols: Vec<SymbolRisk>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolDetail {
    pub status: DiffStatus,
    pub old: Option<GraphNode>,
    pub new: Option<GraphNode>,
    pub risk: Option<SymbolRisk>,
    pub hunks: Option<FileHunks>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Old,
    New,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffRecord {
    pub id: DiffId,
    pub repo_id: String,
    pub old_ref: String,
    pub new_ref: String,
    pub delta: GraphDelta,
    pub views: HashMap<Perspective, ViewPair>,
    /// Changed symbols, riskiest first.
    pub symbols: Vec<SymbolRisk>,
    pub files: Vec<FileSummary>,
    pub hunks: HashMap<String, FileHunks>,
    pub created_at: DateTime<Utc>,
}

impl DiffRecord {
    pub fn old_graph(&self) -> &SnapshotGraph {
        &self.delta.old_graph
    }

    pub fn new_graph(&self) -> &SnapshotGraph {
        &self.delta.new_graph
    }
}

pub struct DiffService {
    coordinator: Arc<Coordinator>,
    store: Arc<dyn GraphStore>,
    diffs: DashMap<DiffId, Arc<DiffRecord>>,
}

impl DiffService {
    pub fn new(coordinator: Arc<Coordinator>, store: Arc<dyn GraphStore>) -> Self {
        Self {
            coordinator,
            store,
            diffs: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    /// Analyze (or reload) both snapshots, match them and register the result.
    /// Rejects a pair of snapshots that produce no change at all.
    pub async fn create_diff(&self, request: DiffRequest) -> Result<DiffId, QueryError> {
        let DiffRequest {
            repo_id,
            old,
            new,
            hunks,
        } = request;
        let id = diff_id(&repo_id, &old.snapshot_id, &new.snapshot_id);
        let old_meta = SnapshotMeta::new(&repo_id, &old.snapshot_id, &old.git_ref);
        let new_meta = SnapshotMeta::new(&repo_id, &new.snapshot_id, &new.git_ref);

        let (old_graph, new_graph) = match (self.cached(&old_meta).await, self.cached(&new_meta).await) {
            (Some(old_graph), Some(new_graph)) => (old_graph, new_graph),
            (Some(old_graph), None) => (old_graph, self.analyze(new_meta, new.files).await?),
            (None, Some(new_graph)) => (self.analyze(old_meta, old.files).await?, new_graph),
            (None, None) => {
                let coordinator = Arc::clone(&self.coordinator);
                let old_files = old.files;
                let new_files = new.files;
                let (old_graph, new_graph) = tokio::task::spawn_blocking(move || {
                    coordinator.analyze_pair((&old_meta, old_files.as_slice()), (&new_meta, new_files.as_slice()))
                })
                .await?;
                self.persist(&old_graph).await;
                self.persist(&new_graph).await;
                (old_graph, new_graph)
            }
        };

        let delta = match_graphs(Arc::new(old_graph), Arc::new(new_graph));
        if delta.is_empty() {
            return Err(QueryError::NoChanges {
                old_ref: old.git_ref,
                new_ref: new.git_ref,
            });
        }

        let hunks: HashMap<String, FileHunks> = hunks.into_iter().map(|h| (h.path.clone(), h)).collect();
        let views = build_all(&delta);
        let symbols = score_symbols(&delta);
        let files = summarize_files(&delta, &symbols, &hunks);
        info!(
            "Diff {} registered: {} changed symbols across {} files",
            id,
            symbols.len(),
            files.len()
        );

        let record = DiffRecord {
            id: id.clone(),
            repo_id,
            old_ref: old.git_ref,
            new_ref: new.git_ref,
            delta,
            views,
            symbols,
            files,
            hunks,
            created_at: Utc::now(),
        };
        self.diffs.insert(id.clone(), Arc::new(record));
        Ok(id)
    }

    /// A stored graph for this snapshot, if one loads and validates.
    async fn cached(&self, meta: &SnapshotMeta) -> Option<SnapshotGraph> {
        match self.store.load(&meta.repo_id, &meta.snapshot_id).await {
            Ok(Some(graph)) => match graph.validate() {
                Ok(()) => {
                    debug!("Reusing stored graph for snapshot {}", meta.snapshot_id);
                    Some(graph)
                }
                Err(e) => {
                    warn!("Stored graph for {} is invalid, reanalyzing: {}", meta.snapshot_id, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to load graph for {}: {}", meta.snapshot_id, e);
                None
            }
        }
    }

    async fn analyze(&self, meta: SnapshotMeta, files: Vec<SourceFile>) -> Result<SnapshotGraph, QueryError> {
        let coordinator = Arc::clone(&self.coordinator);
        let graph = tokio::task::spawn_blocking(move || coordinator.analyze(&meta, &files)).await?;
        self.persist(&graph).await;
        Ok(graph)
    }

    async fn persist(&self, graph: &SnapshotGraph) {
        if let Err(e) = self.store.save(graph).await {
            warn!("Failed to persist graph {}: {}", graph.snapshot_id, e);
        }
    }

    pub fn diff(&self, id: &str) -> Option<Arc<DiffRecord>> {
        self.diffs.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn diff_ids(&self) -> Vec<DiffId> {
        let mut ids: Vec<DiffId> = self.diffs.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn remove_diff(&self, id: &str) -> Option<Arc<DiffRecord>> {
        self.diffs.remove(id).map(|(_, record)| record)
    }

    /// Old and new node of a symbol, looked up by either side's id.
    pub fn symbol(&self, diff_id: &str, symbol_id: &str) -> Option<SymbolDetail> {
        let record = self.diff(diff_id)?;
        let delta = &record.delta;
        let status = delta.node_status(symbol_id)?;
        let find = |graph: &SnapshotGraph, id: &str| graph.nodes.iter().find(|n| n.id == id).cloned();

        let counterpart = delta.counterpart(symbol_id);
        let (old, new) = match find(&delta.old_graph, symbol_id) {
            Some(old) => (Some(old), counterpart.and_then(|id| find(&delta.new_graph, id))),
            None => (
                counterpart.and_then(|id| find(&delta.old_graph, id)),
                find(&delta.new_graph, symbol_id),
            ),
        };
        let ids: Vec<&str> = [old.as_ref(), new.as_ref()]
            .into_iter()
            .flatten()
            .map(|n| n.id.as_str())
            .collect();
        let risk = record.symbols.iter().find(|r| ids.contains(&r.id.as_str())).cloned();
        let hunks = new
            .as_ref()
            .or(old.as_ref())
            .and_then(|n| record.hunks.get(&n.file_path))
            .cloned();

        Some(SymbolDetail {
            status,
            old,
            new,
            risk,
            hunks,
        })
    }

    /// Per-file summaries, riskiest first.
    pub fn file_summaries(&self, diff_id: &str) -> Option<Vec<FileSummary>> {
        self.diff(diff_id).map(|record| record.files.clone())
    }

    pub fn view(&self, diff_id: &str, perspective: Perspective, changes_only: bool) -> Option<ViewPair> {
        let record = self.diff(diff_id)?;
        let pair = record.views.get(&perspective)?;
        if !changes_only {
            return Some(pair.clone());
        }
        Some(ViewPair {
            old_view: pair.old_view.changes_only(),
            new_view: pair.new_view.changes_only(),
        })
    }

    /// Derivation input for one side of a view, with every node positioned.
    pub fn derivation_input(
        &self,
        diff_id: &str,
        perspective: Perspective,
        side: Side,
        changes_only: bool,
        query: &str,
        exclude: bool,
    ) -> Option<DerivationInput> {
        let pair = self.view(diff_id, perspective, changes_only)?;
        let view = match side {
            Side::Old => &pair.old_view,
            Side::New => &pair.new_view,
        };
        Some(DerivationInput::from_view(view, query, exclude))
    }
}

fn file_status(status: DiffStatus) -> FileChangeStatus {
    match status {
        DiffStatus::Added => FileChangeStatus::Added,
        DiffStatus::Removed => FileChangeStatus::Deleted,
        DiffStatus::Modified => FileChangeStatus::Modified,
        DiffStatus::Unchanged => FileChangeStatus::Unchanged,
    }
}

/// Group changed symbols by file. A file's status comes from its `File` node
/// unless the hunk provider reports one. Files without any change are left out.
fn summarize_files(
    delta: &GraphDelta,
    symbols: &[SymbolRisk],
    hunks: &HashMap<String, FileHunks>,
) -> Vec<FileSummary> {
    let mut statuses: BTreeMap<&str, FileChangeStatus> = BTreeMap::new();
    fn file_nodes(graph: &SnapshotGraph) -> Vec<(&str, &str)> {
        graph
            .nodes
            .iter()
            .filter(|n| n.kind == NodeKind::File)
            .map(|n| (n.file_path.as_str(), n.id.as_str()))
            .collect::<Vec<_>>()
    }
    for (path, id) in file_nodes(&delta.old_graph) {
        if delta.node_status(id) == Some(DiffStatus::Removed) {
            statuses.insert(path, FileChangeStatus::Deleted);
        }
    }
    for (path, id) in file_nodes(&delta.new_graph) {
        let status = delta.node_status(id).unwrap_or(DiffStatus::Unchanged);
        statuses.insert(path, file_status(status));
    }

    let mut by_file: HashMap<&str, Vec<SymbolRisk>> = HashMap::new();
    for symbol in symbols {
        by_file.entry(symbol.file_path.as_str()).or_default().push(symbol.clone());
    }
    for path in by_file.keys().copied().chain(hunks.keys().map(String::as_str)) {
        statuses.entry(path).or_insert(FileChangeStatus::Modified);
    }

    let mut summaries: Vec<FileSummary> = statuses
        .into_iter()
        .filter_map(|(path, status)| {
            let file_hunks = hunks.get(path);
            let churn = file_hunks.map_or(0, FileHunks::churn);
            let symbols = by_file.remove(path).unwrap_or_default();
            let status = match file_hunks {
                Some(h) => h.status,
                None if status == FileChangeStatus::Unchanged && !symbols.is_empty() => FileChangeStatus::Modified,
                None => status,
            };
            if status == FileChangeStatus::Unchanged && symbols.is_empty() && churn == 0 {
                return None;
            }
            let score = file_score(&symbols, churn, status);
            Some(FileSummary {
                path: path.to_string(),
                status,
                churn,
                score,
                level: RiskLevel::from_score(score),
                symbols,
            })
        })
        .collect();
    summaries.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.path.cmp(&b.path)));
    summaries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::hunks::Hunk;
    use crate::store::MemoryGraphStore;
    use async_trait::async_trait;
    use rift_core::config::AnalysisConfig;

    const OLD_APP: &str = "def f(a, b):\n    total = g(a, b)\n    return total\n\n\ndef g(a, b):\n    return a + b\n";
    const NEW_APP: &str =
        "def f(a,\n      b):\n    total = h(a,  b)\n    return total\n\n\ndef h(a, b):\n    return a + b\n";
    const UTIL: &str = "def helper():\n    return 1\n";

    fn service_with(store: Arc<dyn GraphStore>) -> DiffService {
        let coordinator = Coordinator::new(&AnalysisConfig::default()).unwrap();
        DiffService::new(Arc::new(coordinator), store)
    }

    fn snapshot(id: &str, files: &[(&str, &str)]) -> SnapshotInput {
        SnapshotInput {
            snapshot_id: id.to_string(),
            git_ref: format!("refs/{id}"),
            files: files.iter().map(|(p, c)| SourceFile::new(*p, c.as_bytes())).collect(),
        }
    }

    fn request() -> DiffRequest {
        DiffRequest {
            repo_id: "acme".to_string(),
            old: snapshot("v1", &[("app.py", OLD_APP), ("util.py", UTIL)]),
            new: snapshot("v2", &[("app.py", NEW_APP), ("util.py", UTIL)]),
            hunks: Vec::new(),
        }
    }

    #[tokio::test]
    async fn creates_and_looks_up_a_diff() {
        let store = Arc::new(MemoryGraphStore::new());
        let service = service_with(store.clone());
        let id = service.create_diff(request()).await.unwrap();
        assert_eq!(id, "acme:v1..v2");
        assert_eq!(store.len(), 2);

        let record = service.diff(&id).unwrap();
        assert_eq!(record.old_ref, "refs/v1");
        assert_eq!(record.views.len(), 3);
        assert_eq!(record.new_graph().snapshot_id, "v2");

        let summaries = service.file_summaries(&id).unwrap();
        let paths: Vec<&str> = summaries.iter().map(|s| s.path.as_str()).collect();
        assert_eq!(paths, vec!["app.py"]);
        let mut lines: Vec<String> = summaries[0]
            .symbols
            .iter()
            .map(|s| format!("{:?} {} {}", s.status, s.kind, s.qualified_name))
            .collect();
        lines.sort();
        insta::assert_snapshot!(lines.join("\n"), @r"
        Added Function app.h
        Removed Function app.g
        ");
    }

    #[tokio::test]
    async fn symbol_lookup_pairs_both_sides() {
        let service = service_with(Arc::new(MemoryGraphStore::new()));
        let mut request = request();
        let mut hunk = FileHunks::new("app.py", FileChangeStatus::Modified);
        hunk.hunks.push(Hunk {
            old_start: 2,
            old_lines: 1,
            new_start: 2,
            new_lines: 1,
            lines: vec!["-    total = g(a, b)".into(), "+    total = h(a,  b)".into()],
        });
        request.hunks.push(hunk);
        let id = service.create_diff(request).await.unwrap();

        let detail = service.symbol(&id, "v2:Function:app.py:app.f").unwrap();
        assert_eq!(detail.status, DiffStatus::Unchanged);
        assert_eq!(detail.old.unwrap().id, "v1:Function:app.py:app.f");
        assert_eq!(detail.new.unwrap().start_line, Some(1));
        assert!(detail.risk.is_none());
        assert_eq!(detail.hunks.unwrap().churn(), 2);

        let removed = service.symbol(&id, "v1:Function:app.py:app.g").unwrap();
        assert_eq!(removed.status, DiffStatus::Removed);
        assert!(removed.new.is_none());
        assert!(removed.risk.is_some_and(|r| r.score > 0));

        let summaries = service.file_summaries(&id).unwrap();
        assert_eq!(summaries[0].churn, 2);
    }

    #[tokio::test]
    async fn unknown_identifiers_are_absent() {
        let service = service_with(Arc::new(MemoryGraphStore::new()));
        let id = service.create_diff(request()).await.unwrap();
        assert!(service.diff("acme:nope..v2").is_none());
        assert!(service.symbol(&id, "v2:Function:app.py:app.nope").is_none());
        assert!(service.symbol("missing", "v2:Function:app.py:app.f").is_none());
        assert!(service.file_summaries("missing").is_none());
        assert!(service.view("missing", Perspective::ControlFlow, false).is_none());
    }

    #[tokio::test]
    async fn identical_snapshots_are_rejected() {
        let service = service_with(Arc::new(MemoryGraphStore::new()));
        let mut request = request();
        request.new = snapshot("v2", &[("app.py", OLD_APP), ("util.py", UTIL)]);
        let error = service.create_diff(request).await.unwrap_err();
        assert!(matches!(error, QueryError::NoChanges { .. }));
        assert_eq!(error.to_string(), "no changes detected between refs/v1 and refs/v2");
        assert!(service.diff_ids().is_empty());
    }

    #[tokio::test]
    async fn stored_graphs_are_reused() {
        let store = Arc::new(MemoryGraphStore::new());
        let service = service_with(store.clone());
        service.create_diff(request()).await.unwrap();

        // Same snapshot ids with different content: the stored graphs win.
        let mut again = request();
        again.old.files.clear();
        again.new.files.clear();
        let id = service.create_diff(again).await.unwrap();
        assert!(service.symbol(&id, "v2:Function:app.py:app.h").is_some());
    }

    struct FailingStore;

    #[async_trait]
    impl GraphStore for FailingStore {
        async fn save(&self, _graph: &SnapshotGraph) -> Result<(), StoreError> {
            Err(StoreError::Io {
                path: "/unwritable".into(),
                source: std::io::Error::other("read-only"),
            })
        }

        async fn load(&self, _repo_id: &str, _snapshot_id: &str) -> Result<Option<SnapshotGraph>, StoreError> {
            Err(StoreError::Io {
                path: "/unreadable".into(),
                source: std::io::Error::other("offline"),
            })
        }

        async fn clear(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn store_failures_do_not_block_diffs() {
        let service = service_with(Arc::new(FailingStore));
        let id = service.create_diff(request()).await.unwrap();
        assert!(service.diff(&id).is_some());
    }

    #[tokio::test]
    async fn views_and_derivation_inputs() {
        let service = service_with(Arc::new(MemoryGraphStore::new()));
        let id = service.create_diff(request()).await.unwrap();

        let full = service.view(&id, Perspective::Declarations, false).unwrap();
        let changed = service.view(&id, Perspective::Declarations, true).unwrap();
        assert!(changed.new_view.nodes.len() <= full.new_view.nodes.len());
        assert!(changed.new_view.nodes.iter().any(|n| n.label == "h"));
        assert!(!changed.new_view.nodes.iter().any(|n| n.label == "helper"));

        let input = service
            .derivation_input(&id, Perspective::Declarations, Side::Old, false, "g", false)
            .unwrap();
        assert_eq!(input.graph_id, full.old_view.graph_id);
        assert_eq!(input.nodes.len(), full.old_view.nodes.len());
        assert_eq!(input.query, "g");
    }
}
