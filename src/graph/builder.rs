//! Graph construction over a snapshot of repository files.
//!
//! Two phases: first build all per-file nodes and edges while
//! recording call sites and a repo-wide symbol name registry, then
//! resolve `Calls` edges globally. Call edges cannot be resolved
//! single-pass because a callee may live in a file not yet visited.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::atomic::Ordering;

use tracing::{debug, warn};

use super::chunker::{self, ChunkLimits};
use super::ids;
use super::{ChunkStrategy, EdgeKind, Graph, GraphNode, Location, NodeKind, NodeMeta};
use crate::error::RunStats;
use crate::lang::{Extraction, Extractor, LanguageResolver};

const MAX_SIGNATURE_CHARS: usize = 200;
const MAX_IMPORT_NAME_CHARS: usize = 64;

/// Token -> node IDs, built from each node's code, signature and name.
/// A lightweight lexical lookup that works without the vector store.
#[derive(Debug, Default)]
pub struct InvertedIndex {
    tokens: HashMap<String, BTreeSet<String>>,
}

impl InvertedIndex {
    pub fn insert_node(&mut self, node: &GraphNode) {
        for source in [&node.code, &node.signature, &node.name] {
            for token in tokenize(source) {
                self.tokens
                    .entry(token)
                    .or_default()
                    .insert(node.id.clone());
            }
        }
    }

    pub fn lookup(&self, token: &str) -> Vec<&str> {
        self.tokens
            .get(&token.to_lowercase())
            .map(|ids| ids.iter().map(|s| s.as_str()).collect())
            .unwrap_or_default()
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| t.len() >= 2 && !t.chars().all(|c| c.is_ascii_digit()))
        .map(|t| t.to_lowercase())
}

/// Symbol recorded during phase one, for call resolution.
#[derive(Debug, Clone)]
struct SymbolRef {
    id: String,
    name: String,
    location: Location,
}

/// Call site recorded during phase one.
#[derive(Debug)]
struct CallSite {
    location: Location,
    callee: String,
}

#[derive(Debug, Default)]
struct FileRecord {
    symbols: Vec<SymbolRef>,
    calls: Vec<CallSite>,
}

/// Builds one [`Graph`] per indexing run.
pub struct GraphBuilder {
    resolver: LanguageResolver,
    limits: ChunkLimits,
}

impl GraphBuilder {
    pub fn new(limits: ChunkLimits) -> Self {
        Self {
            resolver: LanguageResolver::new(),
            limits,
        }
    }

    /// Build the graph and inverted index for `(path, content)` pairs.
    ///
    /// Per-file failures are logged and counted, never fatal.
    pub async fn build(
        &mut self,
        repo_id: &str,
        files: &[(PathBuf, String)],
        stats: &RunStats,
    ) -> (Graph, InvertedIndex) {
        let mut graph = Graph::new(repo_id);

        let repo_node_id = ids::node_id(repo_id, "", NodeKind::Repo, repo_id, &Location::default());
        graph.add_node(GraphNode {
            id: repo_node_id.clone(),
            kind: NodeKind::Repo,
            name: repo_id.to_string(),
            path: String::new(),
            language: None,
            location: Location::default(),
            signature: String::new(),
            code: String::new(),
            doc: String::new(),
            meta: NodeMeta::None,
            embedding: Vec::new(),
        });

        // Phase one: per-file nodes/edges + registry + call sites
        let mut registry: HashMap<String, Vec<String>> = HashMap::new();
        let mut records: Vec<FileRecord> = Vec::new();

        for (path, content) in files {
            stats.files_seen.fetch_add(1, Ordering::Relaxed);
            let path_str = path.to_string_lossy().to_string();

            let Some(spec_id) = self.resolver.resolve(path).map(|s| s.id) else {
                debug!(path = %path_str, "Unsupported language, falling back to raw chunks");
                stats.unsupported_files.fetch_add(1, Ordering::Relaxed);
                self.add_raw_chunks(&mut graph, &repo_node_id, &path_str, content, true)
                    .await;
                continue;
            };

            let Some(tree) = self.resolver.parse(spec_id, content) else {
                warn!(path = %path_str, language = spec_id, "Parse failed, skipping file");
                stats.record_parse_failure(path.clone());
                continue;
            };
            stats.files_parsed.fetch_add(1, Ordering::Relaxed);

            let extraction = match self.resolver.resolve(path) {
                Some(spec) => Extractor::extract(&tree, spec, content),
                None => Extraction::default(),
            };

            let record = self
                .add_file(
                    &mut graph,
                    repo_id,
                    &repo_node_id,
                    &path_str,
                    spec_id,
                    content,
                    extraction,
                )
                .await;
            for symbol in &record.symbols {
                registry
                    .entry(symbol.name.clone())
                    .or_default()
                    .push(symbol.id.clone());
            }
            records.push(record);
        }

        // Phase two: resolve call edges against the completed registry
        for record in &records {
            resolve_calls(&mut graph, record, &registry);
        }

        stats
            .nodes_created
            .store(graph.node_count(), Ordering::Relaxed);
        stats
            .edges_created
            .store(graph.edge_count(), Ordering::Relaxed);

        let mut index = InvertedIndex::default();
        for node in graph.nodes() {
            index.insert_node(node);
        }

        (graph, index)
    }

    /// Steps 3-8 of the per-file algorithm: file, symbols, comments,
    /// imports, chunks, whole-file fallback.
    #[allow(clippy::too_many_arguments)]
    async fn add_file(
        &self,
        graph: &mut Graph,
        repo_id: &str,
        repo_node_id: &str,
        path: &str,
        language: &'static str,
        content: &str,
        extraction: Extraction,
    ) -> FileRecord {
        let file_location = whole_file_location(content);
        let file_id = ids::node_id(repo_id, path, NodeKind::File, path, &file_location);
        graph.add_node(GraphNode {
            id: file_id.clone(),
            kind: NodeKind::File,
            name: path.to_string(),
            path: path.to_string(),
            language: Some(language.to_string()),
            location: file_location,
            signature: signature_of(content),
            code: String::new(),
            doc: String::new(),
            meta: NodeMeta::File {
                content_hash: ids::content_hash(content),
            },
            embedding: Vec::new(),
        });
        graph.add_edge(repo_node_id, &file_id, EdgeKind::Contains);

        let mut record = FileRecord::default();

        // Symbols
        for def in &extraction.definitions {
            let slice = slice_at(content, &def.location);
            let symbol_id =
                ids::node_id(repo_id, path, NodeKind::Symbol, &def.name, &def.location);
            graph.add_node(GraphNode {
                id: symbol_id.clone(),
                kind: NodeKind::Symbol,
                name: def.name.clone(),
                path: path.to_string(),
                language: Some(language.to_string()),
                location: def.location,
                signature: signature_of(slice),
                // Chunk children carry the body; don't duplicate it
                code: String::new(),
                doc: String::new(),
                meta: NodeMeta::None,
                embedding: Vec::new(),
            });
            graph.add_edge(&file_id, &symbol_id, EdgeKind::Contains);
            record.symbols.push(SymbolRef {
                id: symbol_id,
                name: def.name.clone(),
                location: def.location,
            });
        }

        // Comments, linked to the nearest following symbol
        for doc in &extraction.docs {
            let slice = slice_at(content, &doc.location);
            let comment_id =
                ids::node_id(repo_id, path, NodeKind::Comment, "comment", &doc.location);
            graph.add_node(GraphNode {
                id: comment_id.clone(),
                kind: NodeKind::Comment,
                name: "comment".to_string(),
                path: path.to_string(),
                language: Some(language.to_string()),
                location: doc.location,
                signature: signature_of(slice),
                code: slice.to_string(),
                doc: String::new(),
                meta: NodeMeta::None,
                embedding: Vec::new(),
            });
            graph.add_edge(&file_id, &comment_id, EdgeKind::Contains);

            if let Some(symbol) = record
                .symbols
                .iter()
                .find(|s| s.location.start_line >= doc.location.end_line)
            {
                graph.add_edge(&comment_id, &symbol.id, EdgeKind::DocsFor);
            }
        }

        // Imports
        for import in &extraction.imports {
            let slice = slice_at(content, &import.location);
            let name: String = slice.chars().take(MAX_IMPORT_NAME_CHARS).collect();
            let import_id =
                ids::node_id(repo_id, path, NodeKind::Import, &name, &import.location);
            graph.add_node(GraphNode {
                id: import_id.clone(),
                kind: NodeKind::Import,
                name,
                path: path.to_string(),
                language: Some(language.to_string()),
                location: import.location,
                signature: String::new(),
                code: slice.to_string(),
                doc: String::new(),
                meta: NodeMeta::None,
                embedding: Vec::new(),
            });
            graph.add_edge(&file_id, &import_id, EdgeKind::Contains);
        }

        // Chunks per symbol, chained in source order
        let mut file_has_chunks = false;
        for symbol in &record.symbols {
            let slice = slice_at(content, &symbol.location);
            let parts = chunker::split_body(
                &symbol.id,
                slice,
                &symbol.location,
                self.limits.max_lines_per_chunk,
            )
            .await;

            let mut previous_chunk: Option<String> = None;
            for part in parts {
                file_has_chunks = true;
                let chunk_node = GraphNode {
                    id: part.id.clone(),
                    kind: NodeKind::Chunk,
                    name: format!("{}#{}", symbol.name, part.part),
                    path: path.to_string(),
                    language: Some(language.to_string()),
                    location: part.location,
                    signature: signature_of(slice),
                    code: part.code,
                    doc: String::new(),
                    meta: NodeMeta::Chunk {
                        strategy: ChunkStrategy::SymbolSplit,
                        part: part.part,
                        unsupported: false,
                    },
                    embedding: Vec::new(),
                };
                graph.add_node(chunk_node);
                graph.add_edge(&symbol.id, &part.id, EdgeKind::PartOf);
                if let Some(prev) = &previous_chunk {
                    graph.add_edge(prev, &part.id, EdgeKind::NextChunk);
                }
                previous_chunk = Some(part.id);
            }
        }

        // No chunkable symbol bodies: embed the whole file instead
        if !file_has_chunks && !content.is_empty() {
            self.add_raw_chunks(graph, &file_id, path, content, false)
                .await;
        }

        // Call sites, resolved later against the completed registry
        for call in &extraction.calls {
            let slice = slice_at(content, &call.location);
            if let Some(callee) = leading_identifier(slice) {
                record.calls.push(CallSite {
                    location: call.location,
                    callee,
                });
            }
        }

        record
    }

    /// Line-bounded raw chunks directly under `parent_id`, used for
    /// unsupported files and for files without chunkable symbols.
    async fn add_raw_chunks(
        &self,
        graph: &mut Graph,
        parent_id: &str,
        path: &str,
        content: &str,
        unsupported: bool,
    ) {
        let location = whole_file_location(content);
        let parent_chunk_id =
            ids::node_id(graph.repo_id(), path, NodeKind::Chunk, path, &location);
        let parts =
            chunker::split_body(&parent_chunk_id, content, &location, self.limits.max_lines_per_chunk)
                .await;

        for part in parts {
            let node = GraphNode {
                id: part.id.clone(),
                kind: NodeKind::Chunk,
                name: format!("{}#{}", path, part.part),
                path: path.to_string(),
                language: None,
                location: part.location,
                signature: signature_of(content),
                code: part.code,
                doc: String::new(),
                meta: NodeMeta::Chunk {
                    strategy: ChunkStrategy::WholeFile,
                    part: part.part,
                    unsupported,
                },
                embedding: Vec::new(),
            };
            graph.add_node(node);
            graph.add_edge(parent_id, &part.id, EdgeKind::Contains);
        }
    }
}

/// Resolve call sites for one file against the repo-wide registry.
///
/// Caller: smallest enclosing symbol. Target: same-file exact name
/// first (document order), else a repo-wide unique name. A name bound
/// to two or more symbols repo-wide is never auto-linked.
fn resolve_calls(graph: &mut Graph, record: &FileRecord, registry: &HashMap<String, Vec<String>>) {
    for call in &record.calls {
        let caller = record
            .symbols
            .iter()
            .filter(|s| s.location.contains(&call.location))
            .min_by_key(|s| s.location.byte_end - s.location.byte_start);
        let Some(caller) = caller else {
            continue;
        };

        let same_file = record.symbols.iter().find(|s| s.name == call.callee);
        let target_id = match same_file {
            Some(symbol) => Some(symbol.id.clone()),
            None => match registry.get(&call.callee) {
                Some(ids) if ids.len() == 1 => Some(ids[0].clone()),
                _ => None,
            },
        };

        if let Some(target_id) = target_id {
            graph.add_edge(&caller.id, &target_id, EdgeKind::Calls);
        }
    }
}

/// First logical line of a definition, ellipsized to 200 chars.
fn signature_of(code: &str) -> String {
    let first_line = code
        .lines()
        .map(str::trim_end)
        .find(|l| !l.trim().is_empty())
        .unwrap_or("");
    if first_line.chars().count() <= MAX_SIGNATURE_CHARS {
        first_line.to_string()
    } else {
        let truncated: String = first_line.chars().take(MAX_SIGNATURE_CHARS - 3).collect();
        format!("{}...", truncated)
    }
}

/// Leading identifier token of a call expression, e.g. `foo` in
/// `foo.bar(x)` and `foo(x)`.
fn leading_identifier(text: &str) -> Option<String> {
    let token: String = text
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    if token.is_empty() || token.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        None
    } else {
        Some(token)
    }
}

fn slice_at<'a>(content: &'a str, location: &Location) -> &'a str {
    content
        .get(location.byte_start..location.byte_end)
        .unwrap_or("")
}

fn whole_file_location(content: &str) -> Location {
    let line_count = content.lines().count().max(1);
    Location {
        start_line: 1,
        start_col: 0,
        end_line: line_count,
        end_col: content.lines().last().map(|l| l.len()).unwrap_or(0),
        byte_start: 0,
        byte_end: content.len(),
    }
}
