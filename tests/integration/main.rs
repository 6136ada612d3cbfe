//! Integration tests for Rift
//!
//! These tests drive analysis, matching, views, risk and derivations
//! together through the query service.

use std::collections::BTreeSet;
use std::sync::Arc;

use rift_core::config::AnalysisConfig;
use rift_core::{
    DiffStatus, EdgeKind, FileChangeStatus, GraphDelta, NeighborhoodEngine, Perspective, RiftConfig, SnapshotGraph,
    match_graphs,
};
use rift_indexer::{Coordinator, SnapshotMeta, SourceFile};
use rift_query::{
    DerivationWorker, DiffRequest, DiffService, FileGraphStore, GraphStore, MemoryGraphStore, Side, SnapshotInput,
    parse_unified_diff,
};

const OLD_MATH: &str = "\
def f(a, b):
    total = g(a, b)
    if total > 10:
        return total
    return 0

def g(a, b):
    return a + b
";

const NEW_MATH: &str = "\
def f(a,
      b):
    total = h(a, b)   # renamed helper
    if (total >
            10):
        return total
    return 0

def h(a, b):
    return a + b
";

const OLD_VIEW: &str = "\
import { useState } from 'react';

export function useCounter(start: number) {
  const [count, setCount] = useState(start);
  return { count, setCount };
}

export function Counter() {
  const { count } = useCounter(0);
  return <span>{count}</span>;
}
";

const NEW_VIEW: &str = "\
import { useState } from 'react';

export function useCounter(start: number) {
  const [count, setCount] = useState(start);
  if (start < 0) {
    throw new Error('negative start');
  }
  return { count, setCount };
}

export function Counter() {
  const { count } = useCounter(0);
  return <span>{count}</span>;
}
";

fn coordinator() -> Arc<Coordinator> {
    Arc::new(Coordinator::new(&AnalysisConfig::default()).unwrap())
}

fn snapshot(id: &str, files: &[(&str, &str)]) -> SnapshotInput {
    SnapshotInput {
        snapshot_id: id.to_string(),
        git_ref: format!("refs/tags/{id}"),
        files: files.iter().map(|(p, c)| SourceFile::new(*p, c.as_bytes())).collect(),
    }
}

fn request() -> DiffRequest {
    DiffRequest {
        repo_id: "acme/calc".to_string(),
        old: snapshot("v1", &[("calc/math.py", OLD_MATH), ("web/counter.tsx", OLD_VIEW)]),
        new: snapshot("v2", &[("calc/math.py", NEW_MATH), ("web/counter.tsx", NEW_VIEW)]),
        hunks: Vec::new(),
    }
}

/// Status of the plain (non-flow) call edge from `caller` to `callee`.
fn call_status(delta: &GraphDelta, graph: &SnapshotGraph, caller: &str, callee: &str) -> Option<DiffStatus> {
    let edge = graph.edges.iter().find(|e| {
        e.kind == EdgeKind::Calls
            && !e.is_flow()
            && !e.is_call_site()
            && e.source.ends_with(caller)
            && e.target.ends_with(callee)
    })?;
    delta.edge_status(&edge.id)
}

#[tokio::test]
async fn renamed_helper_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileGraphStore::new(dir.path().join(".rift")));
    let service = DiffService::new(coordinator(), store.clone());
    let id = service.create_diff(request()).await.unwrap();
    let record = service.diff(&id).unwrap();
    let delta = &record.delta;

    assert_eq!(delta.node_status("v1:Function:calc/math.py:calc.math.f"), Some(DiffStatus::Unchanged));
    assert_eq!(delta.node_status("v1:Function:calc/math.py:calc.math.g"), Some(DiffStatus::Removed));
    assert_eq!(delta.node_status("v2:Function:calc/math.py:calc.math.h"), Some(DiffStatus::Added));
    assert_eq!(
        call_status(delta, &delta.old_graph, ":calc.math.f", ":calc.math.g"),
        Some(DiffStatus::Removed)
    );
    assert_eq!(
        call_status(delta, &delta.new_graph, ":calc.math.f", ":calc.math.h"),
        Some(DiffStatus::Added)
    );
    // The wrapped condition hashes like the single-line one.
    assert_eq!(
        delta.node_status("v2:Branch:calc/math.py:calc.math.f::if#0"),
        Some(DiffStatus::Unchanged)
    );

    // Both graphs were persisted and load back intact.
    let stored = store.load("acme/calc", "v2").await.unwrap().unwrap();
    assert_eq!(&stored, delta.new_graph.as_ref());
}

#[tokio::test]
async fn file_summaries_rank_by_risk() {
    let service = DiffService::new(coordinator(), Arc::new(MemoryGraphStore::new()));
    let mut request = request();
    request.hunks = parse_unified_diff(
        "\
diff --git a/web/counter.tsx b/web/counter.tsx
--- a/web/counter.tsx
+++ b/web/counter.tsx
@@ -4,2 +4,5 @@ export function useCounter(start: number) {
   const [count, setCount] = useState(start);
+  if (start < 0) {
+    throw new Error('negative start');
+  }
   return { count, setCount };
",
    );
    let id = service.create_diff(request).await.unwrap();
    let summaries = service.file_summaries(&id).unwrap();

    let scores: Vec<u32> = summaries.iter().map(|s| s.score).collect();
    let mut sorted = scores.clone();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    assert_eq!(scores, sorted);

    let counter = summaries.iter().find(|s| s.path == "web/counter.tsx").unwrap();
    assert_eq!(counter.status, FileChangeStatus::Modified);
    assert_eq!(counter.churn, 3);
    let hook = counter.symbols.iter().find(|s| s.name == "useCounter").unwrap();
    assert_eq!(hook.status, DiffStatus::Modified);
    assert!(hook.score > 0);
    assert!(!counter.symbols.iter().any(|s| s.name == "Counter"));

    let detail = service.symbol(&id, &hook.id).unwrap();
    assert_eq!(detail.hunks.unwrap().hunks.len(), 1);
    assert!(detail.old.is_some() && detail.new.is_some());
}

#[test]
fn matcher_is_reflexive_and_symmetric_on_real_graphs() {
    let coordinator = coordinator();
    let old = Arc::new(coordinator.analyze(
        &SnapshotMeta::new("r", "v1", "v1"),
        &[SourceFile::new("calc/math.py", OLD_MATH), SourceFile::new("web/counter.tsx", OLD_VIEW)],
    ));
    let new = Arc::new(coordinator.analyze(
        &SnapshotMeta::new("r", "v2", "v2"),
        &[SourceFile::new("calc/math.py", NEW_MATH), SourceFile::new("web/counter.tsx", NEW_VIEW)],
    ));

    let same = match_graphs(Arc::clone(&old), Arc::clone(&old));
    assert!(same.is_empty());
    assert!(same.node_status.values().all(|s| *s == DiffStatus::Unchanged));

    let forward = match_graphs(Arc::clone(&old), Arc::clone(&new));
    let backward = match_graphs(new, old);
    let ids = |delta: &GraphDelta, status: DiffStatus| -> BTreeSet<String> {
        delta
            .node_status
            .iter()
            .filter(|(_, s)| **s == status)
            .map(|(id, _)| id.clone())
            .collect()
    };
    assert_eq!(ids(&forward, DiffStatus::Added), ids(&backward, DiffStatus::Removed));
    assert_eq!(ids(&forward, DiffStatus::Removed), ids(&backward, DiffStatus::Added));
    assert_eq!(ids(&forward, DiffStatus::Unchanged), ids(&backward, DiffStatus::Unchanged));
    assert_eq!(ids(&forward, DiffStatus::Modified), ids(&backward, DiffStatus::Modified));
}

#[tokio::test]
async fn worker_derives_group_neighborhoods_and_exclusions() {
    let service = DiffService::new(coordinator(), Arc::new(MemoryGraphStore::new()));
    let id = service.create_diff(request()).await.unwrap();
    let pair = service.view(&id, Perspective::ControlFlow, false).unwrap();
    let group = pair
        .new_view
        .nodes
        .iter()
        .find(|n| n.is_group && n.label == "f")
        .unwrap()
        .clone();
    let members: Vec<&str> = pair
        .new_view
        .nodes
        .iter()
        .filter(|n| n.parent_id.as_deref() == Some(group.id.as_str()))
        .map(|n| n.id.as_str())
        .collect();
    assert!(!members.is_empty());

    let worker = DerivationWorker::spawn(NeighborhoodEngine::with_capacity(8));
    let input = service
        .derivation_input(&id, Perspective::ControlFlow, Side::New, false, "f", true)
        .unwrap();
    let generation = worker.submit(input);
    let outcome = worker.wait_for(generation).await.unwrap();
    worker.shutdown().await;

    let hover = &outcome.derivation.neighborhoods[&group.id];
    for member in &members {
        assert!(hover.keep_node_ids.contains(*member), "{member}");
    }
    // Excluding the group drops its members even when their text does not match.
    let matches = &outcome.derivation.search_match_ids;
    assert!(!matches.contains(&group.id));
    for member in &members {
        assert!(!matches.contains(*member), "{member}");
    }
}

#[tokio::test]
async fn clearing_the_store_forces_reanalysis() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileGraphStore::new(dir.path()));
    let service = DiffService::new(coordinator(), store.clone());
    service.create_diff(request()).await.unwrap();
    assert!(store.load("acme/calc", "v1").await.unwrap().is_some());

    store.clear().await.unwrap();
    assert!(store.load("acme/calc", "v1").await.unwrap().is_none());
}

#[test]
fn configuration_file_and_environment() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join(rift_core::config::CONFIG_FILE_NAME),
        "[analysis]\nthreads = 2\n\n[store]\ndir = \"/var/cache/rift\"\n",
    )
    .unwrap();
    let mut config = RiftConfig::from_file(&dir.path().join("rift.toml")).unwrap();
    assert_eq!(config.analysis.threads, 2);
    assert_eq!(config.analysis.max_file_bytes, AnalysisConfig::default().max_file_bytes);

    config.apply_env(|key| (key == rift_core::config::CACHE_CAPACITY_ENV).then(|| "12".to_string()));
    assert_eq!(config.derivation.cache_capacity, 12);
    assert_eq!(config.store.dir, std::path::PathBuf::from("/var/cache/rift"));
}
