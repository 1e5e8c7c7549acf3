//! Chunking: symbol-body splitting and upload batch packing.
//!
//! Splitting is line-bounded: a body of L lines under limit M yields
//! exactly `ceil(L / M)` consecutive parts. Packing groups nodes into
//! store-upload batches under three independent OR-triggers: record
//! count, cumulative line span, and path change.

use tracing::debug;

use super::ids;
use super::{ChunkStrategy, GraphNode, Location, NodeKind, NodeMeta};

/// Parts generated before this many trigger a cooperative yield, so
/// huge symbol bodies don't monopolize the scheduler.
const YIELD_EVERY_PARTS: usize = 10;

/// Size limits applied during splitting and batching.
#[derive(Debug, Clone, Copy)]
pub struct ChunkLimits {
    pub max_lines_per_chunk: usize,
    pub max_records_per_batch: usize,
}

impl Default for ChunkLimits {
    fn default() -> Self {
        Self {
            max_lines_per_chunk: 200,
            max_records_per_batch: 100,
        }
    }
}

/// One line-bounded slice of a parent body.
#[derive(Debug, Clone)]
pub struct ChunkPart {
    pub id: String,
    pub part: usize,
    pub code: String,
    pub location: Location,
}

/// Split a body into `ceil(lines / max_lines)` consecutive parts.
///
/// Each part's location is the corresponding line sub-range of the
/// parent. Empty code produces no parts. Yields control every
/// [`YIELD_EVERY_PARTS`] generated parts.
pub async fn split_body(
    parent_id: &str,
    code: &str,
    location: &Location,
    max_lines: usize,
) -> Vec<ChunkPart> {
    if code.is_empty() || max_lines == 0 {
        return Vec::new();
    }
    let lines: Vec<&str> = code.lines().collect();
    if lines.is_empty() {
        return Vec::new();
    }

    let mut parts = Vec::with_capacity(lines.len().div_ceil(max_lines));
    // Byte offset of each line start within `code`, taken from the
    // original string so CRLF terminators don't skew later parts
    let mut line_offsets = Vec::with_capacity(lines.len() + 1);
    line_offsets.push(0);
    for (i, byte) in code.bytes().enumerate() {
        if byte == b'\n' {
            line_offsets.push(i + 1);
        }
    }
    line_offsets.truncate(lines.len());
    line_offsets.push(code.len());

    let mut start = 0usize;
    while start < lines.len() {
        let end = (start + max_lines).min(lines.len());
        let part_index = parts.len();
        let part_code = lines[start..end].join("\n");

        let byte_start = location.byte_start + line_offsets[start];
        let byte_end = location.byte_start + line_offsets[end].min(code.len());
        parts.push(ChunkPart {
            id: ids::chunk_id(parent_id, part_index),
            part: part_index,
            code: part_code,
            location: Location {
                start_line: location.start_line + start,
                start_col: if part_index == 0 { location.start_col } else { 0 },
                end_line: location.start_line + end - 1,
                end_col: lines[end - 1].len(),
                byte_start,
                byte_end,
            },
        });

        if parts.len() % YIELD_EVERY_PARTS == 0 {
            tokio::task::yield_now().await;
        }
        start = end;
    }

    parts
}

/// A group of nodes destined for one store upload call.
#[derive(Debug, Default)]
pub struct UploadBatch {
    pub nodes: Vec<GraphNode>,
}

impl UploadBatch {
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.nodes.iter().map(|n| n.path.clone()).collect();
        paths.dedup();
        paths
    }

    pub fn line_span(&self) -> usize {
        self.nodes.iter().map(|n| n.location.line_span()).sum()
    }
}

/// Pack nodes (in order) into upload batches.
///
/// A batch closes when any of three triggers fires: record count would
/// exceed `max_records_per_batch`, cumulative line span would exceed
/// `max_lines_per_chunk`, or the file path changes. A single node
/// whose own span exceeds the line limit is pre-split by
/// [`split_body`], each part becoming its own single-node batch.
pub async fn pack_batches(nodes: Vec<GraphNode>, limits: ChunkLimits) -> Vec<UploadBatch> {
    let mut batches = Vec::new();
    let mut current = UploadBatch::default();
    let mut current_lines = 0usize;
    let mut current_path: Option<String> = None;

    for node in nodes {
        let span = node.location.line_span();

        if span > limits.max_lines_per_chunk {
            if !current.nodes.is_empty() {
                batches.push(std::mem::take(&mut current));
                current_lines = 0;
                current_path = None;
            }
            for oversized in presplit_oversized(node, limits.max_lines_per_chunk).await {
                batches.push(UploadBatch {
                    nodes: vec![oversized],
                });
            }
            continue;
        }

        let path_changed = current_path
            .as_deref()
            .map(|p| p != node.path)
            .unwrap_or(false);
        let full = current.nodes.len() >= limits.max_records_per_batch;
        let over_span = current_lines + span > limits.max_lines_per_chunk;

        if !current.nodes.is_empty() && (full || over_span || path_changed) {
            batches.push(std::mem::take(&mut current));
            current_lines = 0;
        }

        current_path = Some(node.path.clone());
        current_lines += span;
        current.nodes.push(node);
    }

    if !current.nodes.is_empty() {
        batches.push(current);
    }

    batches
}

/// Split an oversized node into chunk nodes, one per part. A node
/// without code cannot be split and stays whole in its own batch.
async fn presplit_oversized(node: GraphNode, max_lines: usize) -> Vec<GraphNode> {
    if node.code.is_empty() {
        debug!(
            id = %node.id,
            span = node.location.line_span(),
            "Oversized node without code; uploading unsplit"
        );
        return vec![node];
    }

    let parts = split_body(&node.id, &node.code, &node.location, max_lines).await;
    parts
        .into_iter()
        .map(|part| GraphNode {
            id: part.id,
            kind: NodeKind::Chunk,
            name: format!("{}#{}", node.name, part.part),
            path: node.path.clone(),
            language: node.language.clone(),
            location: part.location,
            signature: node.signature.clone(),
            code: part.code,
            doc: String::new(),
            meta: NodeMeta::Chunk {
                strategy: ChunkStrategy::SymbolSplit,
                part: part.part,
                unsupported: false,
            },
            embedding: Vec::new(),
        })
        .collect()
}
