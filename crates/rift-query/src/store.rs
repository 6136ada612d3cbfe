//! Snapshot graph persistence

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rift_core::SnapshotGraph;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Layout version of stored graph documents.
pub const GRAPH_FORMAT_VERSION: u32 = 1;

/// Subdirectory of the store holding graph documents.
pub const GRAPHS_DIR: &str = "graphs";

#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn save(&self, graph: &SnapshotGraph) -> Result<(), StoreError>;

    /// `Ok(None)` when no graph was saved for this snapshot.
    async fn load(&self, repo_id: &str, snapshot_id: &str) -> Result<Option<SnapshotGraph>, StoreError>;

    /// Remove every stored graph.
    async fn clear(&self) -> Result<(), StoreError>;
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphEnvelope<G> {
    version: u32,
    saved_at: DateTime<Utc>,
    graph: G,
}

/// JSON documents under `{dir}/graphs/{repo}/{snapshot}.json`.
#[derive(Debug, Clone)]
pub struct FileGraphStore {
    dir: PathBuf,
}

impl FileGraphStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn graph_path(&self, repo_id: &str, snapshot_id: &str) -> PathBuf {
        self.dir
            .join(GRAPHS_DIR)
            .join(file_component(repo_id))
            .join(format!("{}.json", file_component(snapshot_id)))
    }
}

/// Ids may carry separators that are not valid in a single path component.
fn file_component(id: &str) -> String {
    id.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            other => other,
        })
        .collect()
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[async_trait]
impl GraphStore for FileGraphStore {
    async fn save(&self, graph: &SnapshotGraph) -> Result<(), StoreError> {
        let path = self.graph_path(&graph.repo_id, &graph.snapshot_id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_error(parent))?;
        }
        let envelope = GraphEnvelope {
            version: GRAPH_FORMAT_VERSION,
            saved_at: Utc::now(),
            graph,
        };
        let json = serde_json::to_vec_pretty(&envelope).map_err(|source| StoreError::Json {
            path: path.clone(),
            source,
        })?;
        tokio::fs::write(&path, json).await.map_err(io_error(&path))?;
        tracing::debug!("Graph saved: {}", path.display());
        Ok(())
    }

    async fn load(&self, repo_id: &str, snapshot_id: &str) -> Result<Option<SnapshotGraph>, StoreError> {
        let path = self.graph_path(repo_id, snapshot_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&path)(e)),
        };
        let envelope: GraphEnvelope<SnapshotGraph> =
            serde_json::from_slice(&bytes).map_err(|source| StoreError::Json {
                path: path.clone(),
                source,
            })?;
        if envelope.version != GRAPH_FORMAT_VERSION {
            return Err(StoreError::Version {
                path,
                found: envelope.version,
                expected: GRAPH_FORMAT_VERSION,
            });
        }
        tracing::debug!("Graph loaded from: {}", path.display());
        Ok(Some(envelope.graph))
    }

    async fn clear(&self) -> Result<(), StoreError> {
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&self.dir)(e)),
        }
    }
}

/// In-process store keyed by `(repo, snapshot)`.
#[derive(Debug, Default)]
pub struct MemoryGraphStore {
    graphs: DashMap<(String, String), Arc<SnapshotGraph>>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn save(&self, graph: &SnapshotGraph) -> Result<(), StoreError> {
        self.graphs.insert(
            (graph.repo_id.clone(), graph.snapshot_id.clone()),
            Arc::new(graph.clone()),
        );
        Ok(())
    }

    async fn load(&self, repo_id: &str, snapshot_id: &str) -> Result<Option<SnapshotGraph>, StoreError> {
        let key = (repo_id.to_string(), snapshot_id.to_string());
        Ok(self.graphs.get(&key).map(|entry| entry.value().as_ref().clone()))
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.graphs.clear();
        Ok(())
    }
}
