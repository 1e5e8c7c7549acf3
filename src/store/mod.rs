//! Namespace-scoped vector store on LanceDB.
//!
//! One table per namespace isolates repositories from each other.
//! An unconfigured store (no database path) turns every operation
//! into a documented no-op returning zero/empty, so indexing still
//! succeeds structurally without a live store.

use anyhow::{Context, Result};
use arrow_array::types::Float32Type;
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int32Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::graph::NodeKind;

/// Display code ceiling per record; the embeddable text is used in
/// full for the embedding call but never stored beyond this.
pub const MAX_CODE_CHARS: usize = 4000;

/// One record destined for a namespace.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    /// Untruncated embeddable text; not persisted as-is
    pub text: String,
    pub path: String,
    pub name: String,
    pub language: Option<String>,
    pub kind: NodeKind,
    pub start_line: usize,
    pub end_line: usize,
    pub vector: Vec<f32>,
}

/// One ranked similarity hit.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub path: String,
    pub name: String,
    pub language: Option<String>,
    pub kind: Option<NodeKind>,
    pub start_line: usize,
    pub end_line: usize,
    pub code: String,
}

/// Narrowing applied server-side to a similarity query.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub kinds: Vec<NodeKind>,
    pub exclude_paths: Vec<String>,
}

impl SearchFilters {
    /// SQL predicate for LanceDB's `only_if`, or `None` when empty.
    fn to_predicate(&self) -> Option<String> {
        let mut clauses = Vec::new();
        if !self.kinds.is_empty() {
            let kinds: Vec<String> = self
                .kinds
                .iter()
                .map(|k| format!("'{}'", k.as_str()))
                .collect();
            clauses.push(format!("kind IN ({})", kinds.join(", ")));
        }
        if !self.exclude_paths.is_empty() {
            let paths: Vec<String> = self
                .exclude_paths
                .iter()
                .map(|p| format!("'{}'", escape_sql(p)))
                .collect();
            clauses.push(format!("path NOT IN ({})", paths.join(", ")));
        }
        if clauses.is_empty() {
            None
        } else {
            Some(clauses.join(" AND "))
        }
    }
}

fn escape_sql(value: &str) -> String {
    value.replace('\'', "''")
}

/// LanceDB-backed store, or a disabled stand-in when no path is
/// configured.
pub struct VectorStore {
    db: Option<Connection>,
    db_path: Option<PathBuf>,
    timeout: Duration,
}

impl VectorStore {
    /// Open the store at `path`, or build a disabled store when
    /// `path` is `None`.
    pub async fn connect(path: Option<&Path>, timeout_secs: u64) -> Result<Self> {
        let timeout = Duration::from_secs(timeout_secs);
        let Some(path) = path else {
            debug!("No database path configured, vector store disabled");
            return Ok(Self {
                db: None,
                db_path: None,
                timeout,
            });
        };

        let path_str = path.to_string_lossy();
        info!("Opening vector store at {}", path_str);
        let db = connect(&path_str)
            .execute()
            .await
            .with_context(|| format!("Failed to connect to vector store at {}", path_str))?;

        Ok(Self {
            db: Some(db),
            db_path: Some(path.to_path_buf()),
            timeout,
        })
    }

    pub fn disabled() -> Self {
        Self {
            db: None,
            db_path: None,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.db.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Upsert records into `namespace`: delete by ID then add, so
    /// re-indexing converges on identical IDs. Records with empty
    /// embeddable text are dropped. Returns the stored count; 0 when
    /// the store is disabled.
    pub async fn upsert(&self, namespace: &str, records: Vec<VectorRecord>) -> Result<usize> {
        let Some(db) = &self.db else {
            return Ok(0);
        };

        let records: Vec<VectorRecord> =
            records.into_iter().filter(|r| !r.text.is_empty()).collect();
        if records.is_empty() {
            return Ok(0);
        }

        let dim = records[0].vector.len();
        if dim == 0 {
            debug!(namespace, "No embeddings available, skipping upsert");
            return Ok(0);
        }
        // The fixed-size list column silently misaligns rows if any
        // vector is short, so reject an inconsistent batch outright
        if let Some(bad) = records.iter().find(|r| r.vector.len() != dim) {
            anyhow::bail!(
                "record {} has vector dimension {}, batch dimension is {}",
                bad.id,
                bad.vector.len(),
                dim
            );
        }

        let table = self.get_or_create_table(db, namespace, dim).await?;

        let ids: Vec<String> = records
            .iter()
            .map(|r| format!("'{}'", escape_sql(&r.id)))
            .collect();
        let predicate = format!("id IN ({})", ids.join(", "));
        tokio::time::timeout(self.timeout, table.delete(&predicate))
            .await
            .context("Timed out deleting existing records")?
            .context("Failed to delete existing records")?;

        let batch = records_to_batch(&records, dim)?;
        let batches = RecordBatchIterator::new(vec![Ok(batch)], Arc::new(table_schema(dim)));
        let add = table.add(Box::new(batches)).execute();
        tokio::time::timeout(self.timeout, add)
            .await
            .context("Timed out adding records")?
            .context("Failed to add records")?;

        debug!(namespace, count = records.len(), "Upserted records");
        Ok(records.len())
    }

    /// Top-K similarity query scoped to `namespace`. Disabled store
    /// or missing namespace returns an empty result set.
    pub async fn search(
        &self,
        namespace: &str,
        vector: Vec<f32>,
        top_k: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<SearchHit>> {
        let Some(db) = &self.db else {
            return Ok(Vec::new());
        };

        let table_names = db.table_names().execute().await?;
        if !table_names.contains(&namespace.to_string()) {
            return Ok(Vec::new());
        }
        let table = db
            .open_table(namespace)
            .execute()
            .await
            .with_context(|| format!("Failed to open namespace {}", namespace))?;

        let mut query = table
            .vector_search(vector)
            .context("Failed to create vector search query")?
            .limit(top_k);
        if let Some(predicate) = filters.to_predicate() {
            query = query.only_if(predicate);
        }

        let results = tokio::time::timeout(self.timeout, query.execute())
            .await
            .context("Timed out executing search")?
            .context("Failed to execute vector search")?;
        let batches: Vec<RecordBatch> = results
            .try_collect()
            .await
            .context("Failed to collect search results")?;

        let mut hits = Vec::new();
        for batch in batches {
            hits.extend(batch_to_hits(&batch)?);
        }
        Ok(hits)
    }

    /// Delete everything in `namespace`. Failure is logged and
    /// swallowed: the following upsert converges by ID anyway.
    pub async fn clear_namespace(&self, namespace: &str) {
        let Some(db) = &self.db else {
            return;
        };

        let result: Result<()> = async {
            let table_names = db.table_names().execute().await?;
            if table_names.contains(&namespace.to_string()) {
                db.drop_table(namespace).await?;
            }
            Ok(())
        }
        .await;

        match result {
            Ok(()) => info!(namespace, "Cleared namespace"),
            Err(e) => warn!(namespace, error = %e, "Failed to clear namespace, continuing"),
        }
    }

    /// Row count for a namespace; 0 when disabled or absent.
    pub async fn count(&self, namespace: &str) -> Result<usize> {
        let Some(db) = &self.db else {
            return Ok(0);
        };
        let table_names = db.table_names().execute().await?;
        if !table_names.contains(&namespace.to_string()) {
            return Ok(0);
        }
        let table = db.open_table(namespace).execute().await?;
        table.count_rows(None).await.context("Failed to count rows")
    }

    async fn get_or_create_table(
        &self,
        db: &Connection,
        namespace: &str,
        dim: usize,
    ) -> Result<lancedb::Table> {
        let table_names = db.table_names().execute().await?;
        if table_names.contains(&namespace.to_string()) {
            db.open_table(namespace)
                .execute()
                .await
                .with_context(|| format!("Failed to open namespace {}", namespace))
        } else {
            debug!(namespace, dim, "Creating namespace table");
            let batches = RecordBatchIterator::new(vec![], Arc::new(table_schema(dim)));
            db.create_table(namespace, Box::new(batches))
                .execute()
                .await
                .with_context(|| format!("Failed to create namespace {}", namespace))
        }
    }
}

fn table_schema(dim: usize) -> Schema {
    Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("code", DataType::Utf8, false),
        Field::new("path", DataType::Utf8, false),
        Field::new("name", DataType::Utf8, false),
        Field::new("language", DataType::Utf8, true),
        Field::new("kind", DataType::Utf8, false),
        Field::new("start_line", DataType::Int32, false),
        Field::new("end_line", DataType::Int32, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                dim as i32,
            ),
            false,
        ),
    ])
}

fn records_to_batch(records: &[VectorRecord], dim: usize) -> Result<RecordBatch> {
    let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
    // Stored display text respects the payload ceiling; the
    // embedding was computed from the full text
    let codes: Vec<String> = records
        .iter()
        .map(|r| r.text.chars().take(MAX_CODE_CHARS).collect())
        .collect();
    let code_refs: Vec<&str> = codes.iter().map(|s| s.as_str()).collect();
    let paths: Vec<&str> = records.iter().map(|r| r.path.as_str()).collect();
    let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
    let languages: Vec<Option<&str>> = records.iter().map(|r| r.language.as_deref()).collect();
    let kinds: Vec<&str> = records.iter().map(|r| r.kind.as_str()).collect();
    let start_lines: Vec<i32> = records.iter().map(|r| r.start_line as i32).collect();
    let end_lines: Vec<i32> = records.iter().map(|r| r.end_line as i32).collect();

    let vectors = FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(
        records
            .iter()
            .map(|r| Some(r.vector.iter().map(|&v| Some(v)))),
        dim as i32,
    );

    RecordBatch::try_new(
        Arc::new(table_schema(dim)),
        vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(StringArray::from(code_refs)),
            Arc::new(StringArray::from(paths)),
            Arc::new(StringArray::from(names)),
            Arc::new(StringArray::from(languages)),
            Arc::new(StringArray::from(kinds)),
            Arc::new(Int32Array::from(start_lines)),
            Arc::new(Int32Array::from(end_lines)),
            Arc::new(vectors),
        ],
    )
    .context("Failed to create record batch")
}

fn batch_to_hits(batch: &RecordBatch) -> Result<Vec<SearchHit>> {
    let string_col = |name: &str| -> Result<&StringArray> {
        batch
            .column_by_name(name)
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| anyhow::anyhow!("Missing {} column", name))
    };
    let int_col = |name: &str| -> Result<&Int32Array> {
        batch
            .column_by_name(name)
            .and_then(|c| c.as_any().downcast_ref::<Int32Array>())
            .ok_or_else(|| anyhow::anyhow!("Missing {} column", name))
    };

    let ids = string_col("id")?;
    let codes = string_col("code")?;
    let paths = string_col("path")?;
    let names = string_col("name")?;
    let kinds = string_col("kind")?;
    let start_lines = int_col("start_line")?;
    let end_lines = int_col("end_line")?;
    let languages = batch
        .column_by_name("language")
        .and_then(|c| c.as_any().downcast_ref::<StringArray>());
    // LanceDB reports L2 distance in _distance
    let distances = batch
        .column_by_name("_distance")
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

    let mut hits = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let score = distances.map(|d| 1.0 / (1.0 + d.value(i))).unwrap_or(1.0);
        let language = languages.and_then(|l| {
            if l.is_null(i) {
                None
            } else {
                Some(l.value(i).to_string())
            }
        });
        hits.push(SearchHit {
            id: ids.value(i).to_string(),
            score,
            path: paths.value(i).to_string(),
            name: names.value(i).to_string(),
            language,
            kind: NodeKind::parse(kinds.value(i)),
            start_line: start_lines.value(i) as usize,
            end_line: end_lines.value(i) as usize,
            code: codes.value(i).to_string(),
        });
    }
    Ok(hits)
}
