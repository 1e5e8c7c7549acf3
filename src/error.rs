//! Error taxonomy and per-run failure accounting.
//!
//! File- and batch-level failures are recovered locally and aggregated
//! into [`RunStats`]; only configuration errors and invalid input
//! surface to the caller as hard failures.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use thiserror::Error;

/// Errors raised by the indexing and retrieval pipeline.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Repository identifier was empty or otherwise unusable.
    #[error("invalid repository identifier: {0:?}")]
    InvalidRepoId(String),

    /// The selected embedding provider is missing required credentials.
    /// Raised at construction, before any call is attempted.
    #[error("embedding provider `{provider}` is not configured: {reason}")]
    EmbeddingConfig { provider: &'static str, reason: String },

    /// A remote embedding call failed (network, timeout, non-2xx).
    #[error("embedding call failed ({status}): {body}")]
    EmbeddingCall { status: String, body: String },

    /// Local embedding model failed to load or run.
    #[error("local embedding model error: {0}")]
    EmbeddingModel(String),

    /// A vector store batch upsert failed. Carries the file paths in
    /// the batch so the skip can be logged usefully.
    #[error("batch upsert failed for {} path(s): {source}", paths.len())]
    BatchUpsert {
        paths: Vec<PathBuf>,
        #[source]
        source: anyhow::Error,
    },

    /// The vector store rejected or cannot hold an operation.
    #[error("vector store error: {0}")]
    Store(#[from] anyhow::Error),
}

/// Counters describing what a completed run actually did.
///
/// A run always reports these even when individual files or batches
/// failed; partial progress is a valid outcome.
#[derive(Debug, Default)]
pub struct RunStats {
    pub files_seen: AtomicUsize,
    pub files_parsed: AtomicUsize,
    pub parse_failures: AtomicUsize,
    pub read_failures: AtomicUsize,
    pub unsupported_files: AtomicUsize,
    pub nodes_created: AtomicUsize,
    pub edges_created: AtomicUsize,
    pub chunks_uploaded: AtomicUsize,
    pub batches_failed: AtomicUsize,
    /// Paths that failed to read or parse, capped to keep reports
    /// readable.
    failed_paths: Mutex<Vec<PathBuf>>,
}

const MAX_REPORTED_PATHS: usize = 50;

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_parse_failure(&self, path: PathBuf) {
        self.parse_failures.fetch_add(1, Ordering::Relaxed);
        self.record_failed_path(path);
    }

    /// An I/O failure before parsing, counted apart from parse
    /// failures so the run summary stays truthful.
    pub fn record_read_failure(&self, path: PathBuf) {
        self.read_failures.fetch_add(1, Ordering::Relaxed);
        self.record_failed_path(path);
    }

    fn record_failed_path(&self, path: PathBuf) {
        let mut paths = self.failed_paths.lock().unwrap();
        if paths.len() < MAX_REPORTED_PATHS {
            paths.push(path);
        }
    }

    pub fn failed_paths(&self) -> Vec<PathBuf> {
        self.failed_paths.lock().unwrap().clone()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} files seen, {} parsed ({} parse failures, {} read failures, {} unsupported), {} nodes, {} edges, {} chunks uploaded, {} batches failed",
            self.files_seen.load(Ordering::Relaxed),
            self.files_parsed.load(Ordering::Relaxed),
            self.parse_failures.load(Ordering::Relaxed),
            self.read_failures.load(Ordering::Relaxed),
            self.unsupported_files.load(Ordering::Relaxed),
            self.nodes_created.load(Ordering::Relaxed),
            self.edges_created.load(Ordering::Relaxed),
            self.chunks_uploaded.load(Ordering::Relaxed),
            self.batches_failed.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_summary_contains_counts() {
        let stats = RunStats::new();
        stats.files_seen.store(3, Ordering::Relaxed);
        stats.files_parsed.store(2, Ordering::Relaxed);
        stats.record_parse_failure(PathBuf::from("bad.rs"));
        stats.record_read_failure(PathBuf::from("gone.rs"));

        let summary = stats.summary();
        assert!(summary.contains("3 files seen"));
        assert!(summary.contains("1 parse failures"));
        assert!(summary.contains("1 read failures"));
        assert_eq!(
            stats.failed_paths(),
            vec![PathBuf::from("bad.rs"), PathBuf::from("gone.rs")]
        );
    }

    #[test]
    fn test_failed_path_cap() {
        let stats = RunStats::new();
        for i in 0..100 {
            stats.record_parse_failure(PathBuf::from(format!("f{}.rs", i)));
        }
        assert_eq!(stats.parse_failures.load(Ordering::Relaxed), 100);
        assert_eq!(stats.failed_paths().len(), MAX_REPORTED_PATHS);
    }

    #[test]
    fn test_batch_upsert_error_display() {
        let err = IndexError::BatchUpsert {
            paths: vec![PathBuf::from("a.rs"), PathBuf::from("b.rs")],
            source: anyhow::anyhow!("connection reset"),
        };
        let msg = err.to_string();
        assert!(msg.contains("2 path(s)"));
        assert!(msg.contains("connection reset"));
    }
}
