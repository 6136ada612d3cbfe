//! Orchestrates parallel analysis of a snapshot

use std::collections::HashSet;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use rift_core::SnapshotGraph;
use rift_core::config::AnalysisConfig;
use tracing::{debug, info, warn};

use crate::error::AnalyzeError;
use crate::extractor::{ExtractionResult, FileBuilder, SnapshotMeta, SourceFile};
use crate::languages::extractor_for;
use crate::parser::{FileType, first_error_line, parse};

/// Runs one extractor per file on the rayon pool and merges the results.
/// Each file gets its own parser, so workers share no mutable state.
pub struct Coordinator {
    max_file_bytes: u64,
    pool: Option<ThreadPool>,
}

impl Coordinator {
    pub fn new(config: &AnalysisConfig) -> Result<Self, AnalyzeError> {
        let pool = match config.threads {
            0 => None,
            threads => Some(
                ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|i| format!("rift-analyze-{i}"))
                    .build()?,
            ),
        };
        Ok(Coordinator {
            max_file_bytes: config.max_file_bytes,
            pool,
        })
    }

    /// Analyze one snapshot. Files that fail degrade to a bare `File` node;
    /// the snapshot as a whole always succeeds.
    pub fn analyze(&self, meta: &SnapshotMeta, files: &[SourceFile]) -> SnapshotGraph {
        self.install(|| self.analyze_snapshot(meta, files))
    }

    /// Analyze the old and new snapshots of a diff concurrently.
    pub fn analyze_pair(
        &self,
        old: (&SnapshotMeta, &[SourceFile]),
        new: (&SnapshotMeta, &[SourceFile]),
    ) -> (SnapshotGraph, SnapshotGraph) {
        self.install(|| {
            rayon::join(
                || self.analyze_snapshot(old.0, old.1),
                || self.analyze_snapshot(new.0, new.1),
            )
        })
    }

    fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }

    fn analyze_snapshot(&self, meta: &SnapshotMeta, files: &[SourceFile]) -> SnapshotGraph {
        let results: Vec<ExtractionResult> = files.par_iter().map(|file| self.analyze_file(meta, file)).collect();
        let graph = merge(meta, results);
        info!(
            "Analyzed snapshot {}: {} files, {} nodes, {} edges",
            meta.snapshot_id,
            files.len(),
            graph.nodes.len(),
            graph.edges.len()
        );
        graph
    }

    /// Analyze a single file, isolating any failure to that file.
    pub fn analyze_file(&self, meta: &SnapshotMeta, file: &SourceFile) -> ExtractionResult {
        match self.try_analyze_file(meta, file) {
            Ok(result) => result,
            Err(error) => {
                match &error {
                    AnalyzeError::Unsupported { .. } => debug!("{error}"),
                    _ => warn!("Failed to analyze {}: {}", file.path, error),
                }
                FileBuilder::degraded(meta, &file.path, &file.content, &error)
            }
        }
    }

    fn try_analyze_file(&self, meta: &SnapshotMeta, file: &SourceFile) -> Result<ExtractionResult, AnalyzeError> {
        let size = file.content.len() as u64;
        if size > self.max_file_bytes {
            return Err(AnalyzeError::TooLarge {
                path: file.path.clone(),
                size,
                limit: self.max_file_bytes,
            });
        }
        let file_type = FileType::from_path(&file.path).ok_or_else(|| AnalyzeError::Unsupported {
            path: file.path.clone(),
        })?;
        let source = std::str::from_utf8(&file.content).map_err(|source| AnalyzeError::InvalidUtf8 {
            path: file.path.clone(),
            source,
        })?;

        let tree = parse(file_type, &file.path, source)?;
        if let Some(line) = first_error_line(&tree) {
            return Err(AnalyzeError::Syntax {
                path: file.path.clone(),
                line,
            });
        }

        let mut builder = FileBuilder::new(meta, &file.path, file_type.language(), source);
        extractor_for(file_type).extract(&mut builder, &tree)?;
        Ok(builder.finish())
    }
}

/// Concatenate per-file fragments, keeping the first node per id and
/// dropping edges whose endpoints did not survive.
fn merge(meta: &SnapshotMeta, results: Vec<ExtractionResult>) -> SnapshotGraph {
    let mut graph = SnapshotGraph::new(&meta.repo_id, &meta.snapshot_id, &meta.git_ref);
    let mut node_ids = HashSet::new();
    let mut edges = Vec::new();
    for result in results {
        for node in result.nodes {
            if node_ids.insert(node.id.clone()) {
                graph.nodes.push(node);
            }
        }
        edges.extend(result.edges);
    }

    let mut edge_ids = HashSet::new();
    let before = edges.len();
    graph.edges = edges
        .into_iter()
        .filter(|e| node_ids.contains(&e.source) && node_ids.contains(&e.target))
        .filter(|e| edge_ids.insert(e.id.clone()))
        .collect();
    let dropped = before - graph.edges.len();
    if dropped > 0 {
        debug!("Dropped {} edges with missing endpoints in {}", dropped, meta.snapshot_id);
    }
    graph
}
