//! The indexing pipeline: workspace -> graph -> embeddings -> store.
//!
//! One batch job per repository. Per-file and per-batch failures are
//! recovered locally and aggregated into [`RunStats`]; only an
//! invalid repository identifier is a hard failure here (provider
//! misconfiguration already failed at embedder construction).

use std::path::PathBuf;
use std::sync::atomic::Ordering;

use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::config::IndexerConfig;
use crate::embed::Embedder;
use crate::error::{IndexError, RunStats};
use crate::graph::chunker::{self, ChunkLimits};
use crate::graph::{ids, Graph, GraphBuilder, GraphNode, InvertedIndex};
use crate::store::{VectorRecord, VectorStore};
use crate::workspace::Workspace;

#[derive(Debug, Clone)]
pub struct IndexOptions {
    /// Wipe the namespace before uploading
    pub clear_namespace: bool,
    /// Compute embeddings and upload; graph construction happens
    /// either way
    pub embed: bool,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            clear_namespace: false,
            embed: true,
        }
    }
}

#[derive(Debug)]
pub struct IndexOutcome {
    pub graph: Graph,
    pub inverted_index: InvertedIndex,
    pub uploaded: usize,
    pub stats: RunStats,
}

/// Index one repository snapshot end to end.
pub async fn index_repository(
    repo_id: &str,
    workspace: &dyn Workspace,
    embedder: &dyn Embedder,
    store: &VectorStore,
    config: &IndexerConfig,
    options: IndexOptions,
) -> Result<IndexOutcome, IndexError> {
    let repo_id = repo_id.trim();
    if repo_id.is_empty() {
        return Err(IndexError::InvalidRepoId(
            "repository identifier is empty".to_string(),
        ));
    }

    let stats = RunStats::new();
    let limits = ChunkLimits {
        max_lines_per_chunk: config.max_lines_per_chunk,
        max_records_per_batch: config.max_records_per_batch,
    };

    let files = read_files(workspace, &stats);
    info!(repo = repo_id, files = files.len(), "Building graph");

    let mut builder = GraphBuilder::new(limits);
    let (graph, inverted_index) = builder.build(repo_id, &files, &stats).await;

    let namespace = ids::namespace_for(repo_id);
    if options.clear_namespace {
        store.clear_namespace(&namespace).await;
    }

    let uploaded = if options.embed {
        upload_graph(&graph, &namespace, embedder, store, limits, config, &stats).await
    } else {
        0
    };

    info!(repo = repo_id, "{}", stats.summary());
    Ok(IndexOutcome {
        graph,
        inverted_index,
        uploaded,
        stats,
    })
}

/// Drop everything stored for a repository.
pub async fn clear_repository(store: &VectorStore, repo_id: &str) -> Result<(), IndexError> {
    let repo_id = repo_id.trim();
    if repo_id.is_empty() {
        return Err(IndexError::InvalidRepoId(
            "repository identifier is empty".to_string(),
        ));
    }
    store.clear_namespace(&ids::namespace_for(repo_id)).await;
    Ok(())
}

fn read_files(workspace: &dyn Workspace, stats: &RunStats) -> Vec<(PathBuf, String)> {
    let mut files = Vec::new();
    for path in workspace.list_files() {
        match workspace.read_file(&path) {
            Ok(content) => files.push((path, content)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read file, skipping");
                stats.record_read_failure(path);
            }
        }
    }
    files
}

/// Embed and upload every node carrying text, in independent batches
/// bounded by `upload_concurrency`. A failed batch is logged with its
/// path list and skipped; siblings proceed.
async fn upload_graph(
    graph: &Graph,
    namespace: &str,
    embedder: &dyn Embedder,
    store: &VectorStore,
    limits: ChunkLimits,
    config: &IndexerConfig,
    stats: &RunStats,
) -> usize {
    let mut nodes: Vec<GraphNode> = graph
        .nodes()
        .filter(|n| !n.code.is_empty())
        .cloned()
        .collect();
    nodes.sort_by(|a, b| {
        (a.path.as_str(), a.location.start_line, a.location.byte_start).cmp(&(
            b.path.as_str(),
            b.location.start_line,
            b.location.byte_start,
        ))
    });

    let batches = chunker::pack_batches(nodes, limits).await;
    let concurrency = config.upload_concurrency.max(1);

    let uploaded: usize = stream::iter(batches)
        .map(|batch| async move {
            let paths = batch.paths();
            match upload_batch(batch, namespace, embedder, store).await {
                Ok(count) => {
                    stats.chunks_uploaded.fetch_add(count, Ordering::Relaxed);
                    count
                }
                Err(e) => {
                    let error = IndexError::BatchUpsert {
                        paths: paths.into_iter().map(PathBuf::from).collect(),
                        source: e,
                    };
                    warn!("{}, skipping batch", error);
                    stats.batches_failed.fetch_add(1, Ordering::Relaxed);
                    0
                }
            }
        })
        .buffer_unordered(concurrency)
        .fold(0, |acc, n| async move { acc + n })
        .await;

    uploaded
}

async fn upload_batch(
    batch: chunker::UploadBatch,
    namespace: &str,
    embedder: &dyn Embedder,
    store: &VectorStore,
) -> anyhow::Result<usize> {
    let texts: Vec<String> = batch.nodes.iter().map(|n| n.code.clone()).collect();
    let embedded = embedder.embed(&texts).await?;
    if embedded.dim == 0 {
        // No embeddings available is a value, not an error
        return Ok(0);
    }

    let records: Vec<VectorRecord> = batch
        .nodes
        .into_iter()
        .zip(embedded.vectors)
        .map(|(node, vector)| VectorRecord {
            id: node.id,
            text: node.code,
            path: node.path,
            name: node.name,
            language: node.language,
            kind: node.kind,
            start_line: node.location.start_line,
            end_line: node.location.end_line,
            vector,
        })
        .collect();

    let count = store.upsert(namespace, records).await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashEmbedder;
    use crate::workspace::MemoryWorkspace;
    use std::path::Path;

    fn demo_workspace() -> MemoryWorkspace {
        let mut ws = MemoryWorkspace::new();
        ws.insert("foo.py", "def _increment(x):\n    return x + 1\n\ndef foo(x):\n    return _increment(x)\n");
        ws.insert(
            "bar.py",
            "def double_foo(x):\n    return foo(x) * 2\n\ndef triple_foo(x):\n    return foo(x) * 3\n",
        );
        ws
    }

    #[tokio::test]
    async fn test_empty_repo_id_is_hard_error() {
        let ws = MemoryWorkspace::new();
        let embedder = HashEmbedder::new(32);
        let store = VectorStore::disabled();
        let config = IndexerConfig::default();

        let error = index_repository("  ", &ws, &embedder, &store, &config, IndexOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(error, IndexError::InvalidRepoId(_)));

        let error = clear_repository(&store, "").await.unwrap_err();
        assert!(matches!(error, IndexError::InvalidRepoId(_)));
    }

    #[tokio::test]
    async fn test_disabled_store_still_builds_graph() {
        let ws = demo_workspace();
        let embedder = HashEmbedder::new(32);
        let store = VectorStore::disabled();
        let config = IndexerConfig::default();

        let outcome =
            index_repository("demo", &ws, &embedder, &store, &config, IndexOptions::default())
                .await
                .unwrap();

        assert_eq!(outcome.uploaded, 0);
        assert!(outcome.graph.node_count() > 0);
        assert_eq!(
            outcome.stats.files_parsed.load(Ordering::Relaxed),
            2
        );
    }

    /// Lists a file it can never read, like a path deleted between
    /// enumeration and read.
    struct VanishingWorkspace;

    impl Workspace for VanishingWorkspace {
        fn list_files(&self) -> Vec<PathBuf> {
            vec![PathBuf::from("gone.py")]
        }

        fn read_file(&self, path: &Path) -> anyhow::Result<String> {
            anyhow::bail!("No such file: {:?}", path)
        }
    }

    #[tokio::test]
    async fn test_read_failure_counted_apart_from_parse_failures() {
        let embedder = HashEmbedder::new(32);
        let store = VectorStore::disabled();
        let config = IndexerConfig::default();

        let outcome = index_repository(
            "demo",
            &VanishingWorkspace,
            &embedder,
            &store,
            &config,
            IndexOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.stats.read_failures.load(Ordering::Relaxed), 1);
        assert_eq!(outcome.stats.parse_failures.load(Ordering::Relaxed), 0);
        assert_eq!(outcome.stats.failed_paths(), vec![PathBuf::from("gone.py")]);
    }

    #[tokio::test]
    async fn test_upload_to_store() {
        let dir = tempfile::tempdir().unwrap();
        let ws = demo_workspace();
        let embedder = HashEmbedder::new(32);
        let store = VectorStore::connect(Some(dir.path()), 30).await.unwrap();
        let config = IndexerConfig::default();

        let outcome =
            index_repository("demo", &ws, &embedder, &store, &config, IndexOptions::default())
                .await
                .unwrap();

        assert!(outcome.uploaded > 0);
        let namespace = ids::namespace_for("demo");
        assert_eq!(store.count(&namespace).await.unwrap(), outcome.uploaded);
    }

    #[tokio::test]
    async fn test_clear_repository() {
        let dir = tempfile::tempdir().unwrap();
        let ws = demo_workspace();
        let embedder = HashEmbedder::new(32);
        let store = VectorStore::connect(Some(dir.path()), 30).await.unwrap();
        let config = IndexerConfig::default();

        index_repository("demo", &ws, &embedder, &store, &config, IndexOptions::default())
            .await
            .unwrap();
        clear_repository(&store, "demo").await.unwrap();

        let namespace = ids::namespace_for("demo");
        assert_eq!(store.count(&namespace).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_embed_disabled_skips_upload() {
        let dir = tempfile::tempdir().unwrap();
        let ws = demo_workspace();
        let embedder = HashEmbedder::new(32);
        let store = VectorStore::connect(Some(dir.path()), 30).await.unwrap();
        let config = IndexerConfig::default();

        let options = IndexOptions {
            embed: false,
            ..Default::default()
        };
        let outcome = index_repository("demo", &ws, &embedder, &store, &config, options)
            .await
            .unwrap();

        assert_eq!(outcome.uploaded, 0);
        assert!(outcome.graph.node_count() > 0);
    }
}
