//! CLI command implementations

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use ignore::WalkBuilder;
use rift_core::{NeighborhoodEngine, Perspective, RiftConfig};
use rift_indexer::{Coordinator, FileType, SourceFile};
use rift_query::{
    DerivationWorker, DiffRequest, DiffService, FileGraphStore, QueryError, Side, SnapshotInput, parse_unified_diff,
};

pub struct DiffOptions {
    pub repo: Option<String>,
    pub patch: Option<PathBuf>,
    pub search: Option<String>,
    pub json: bool,
}

/// Store location; relative paths are taken from the root directory.
fn store_dir(root: &Path, config: &RiftConfig) -> PathBuf {
    if config.store.dir.is_absolute() {
        config.store.dir.clone()
    } else {
        root.join(&config.store.dir)
    }
}

pub async fn diff(
    root: &Path,
    config: &RiftConfig,
    old_dir: PathBuf,
    new_dir: PathBuf,
    options: DiffOptions,
) -> anyhow::Result<()> {
    let repo_id = options.repo.unwrap_or_else(|| {
        fs::canonicalize(root)
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "local".to_string())
    });
    let old = read_snapshot(&old_dir)?;
    let new = read_snapshot(&new_dir)?;
    tracing::info!(
        "Diffing {} ({} files) against {} ({} files)",
        old.git_ref,
        old.files.len(),
        new.git_ref,
        new.files.len()
    );

    let hunks = match &options.patch {
        Some(path) => {
            let text = fs::read_to_string(path).with_context(|| format!("reading patch {}", path.display()))?;
            parse_unified_diff(&text)
        }
        None => Vec::new(),
    };

    let coordinator = Arc::new(Coordinator::new(&config.analysis)?);
    let store = Arc::new(FileGraphStore::new(store_dir(root, config)));
    let service = DiffService::new(coordinator, store);
    let request = DiffRequest {
        repo_id,
        old,
        new,
        hunks,
    };
    let id = match service.create_diff(request).await {
        Ok(id) => id,
        Err(e @ QueryError::NoChanges { .. }) => {
            println!("{e}");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let summaries = service.file_summaries(&id).unwrap_or_default();
    if options.json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    } else {
        println!("{id}");
        for file in &summaries {
            println!(
                "{:>6} {:>4}  {:<12} {}",
                format!("{:?}", file.level).to_uppercase(),
                file.score,
                serde_json::to_value(file.status)?.as_str().unwrap_or_default(),
                file.path
            );
            for symbol in &file.symbols {
                println!(
                    "{:>13}  {:<9} {} ({})",
                    symbol.score,
                    format!("{:?}", symbol.status).to_lowercase(),
                    symbol.qualified_name,
                    symbol.kind
                );
            }
        }
    }

    if let Some(query) = options.search {
        let input = service
            .derivation_input(&id, Perspective::Declarations, Side::New, false, &query, false)
            .context("declarations view missing")?;
        let worker = DerivationWorker::spawn(NeighborhoodEngine::with_capacity(config.derivation.cache_capacity));
        let generation = worker.submit(input);
        let outcome = worker.wait_for(generation).await.context("derivation worker stopped")?;
        println!("{} nodes match {:?}", outcome.derivation.search_match_ids.len(), query);
        for node_id in &outcome.derivation.search_match_ids {
            println!("  {node_id}");
        }
        worker.shutdown().await;
    }
    Ok(())
}

pub async fn clear(root: &Path, config: &RiftConfig) -> anyhow::Result<()> {
    let store = FileGraphStore::new(store_dir(root, config));
    tracing::info!("Clearing graph store: {}", store.dir().display());
    rift_query::GraphStore::clear(&store).await?;
    tracing::info!("Graph store cleared");
    Ok(())
}

/// Read every analyzable file under `dir`, honoring ignore files. The snapshot
/// id is a content hash so unchanged checkouts reuse stored graphs.
fn read_snapshot(dir: &Path) -> anyhow::Result<SnapshotInput> {
    let mut files = Vec::new();
    for entry in WalkBuilder::new(dir).hidden(true).git_ignore(true).parents(false).build() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Cannot read entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let path = entry.path();
        if FileType::from_path(path).is_none() {
            continue;
        }
        let Ok(relative) = path.strip_prefix(dir) else {
            continue;
        };
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let content = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        files.push(SourceFile::new(relative, content));
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));

    let mut hasher = blake3::Hasher::new();
    for file in &files {
        hasher.update(file.path.as_bytes());
        hasher.update(b"\0");
        hasher.update(blake3::hash(&file.content).as_bytes());
    }
    let snapshot_id = hasher.finalize().to_hex()[..16].to_string();

    Ok(SnapshotInput {
        snapshot_id,
        git_ref: dir.display().to_string(),
        files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_ids_follow_content() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("pkg")).unwrap();
        fs::write(dir.path().join("pkg/app.py"), "def f():\n    return 1\n").unwrap();
        fs::write(dir.path().join("README.md"), "# readme\n").unwrap();

        let first = read_snapshot(dir.path()).unwrap();
        let paths: Vec<&str> = first.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["pkg/app.py"]);
        assert_eq!(read_snapshot(dir.path()).unwrap().snapshot_id, first.snapshot_id);

        fs::write(dir.path().join("pkg/app.py"), "def f():\n    return 2\n").unwrap();
        assert_ne!(read_snapshot(dir.path()).unwrap().snapshot_id, first.snapshot_id);
    }
}
