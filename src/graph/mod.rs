//! Typed, content-addressed code graph.
//!
//! One `Graph` per indexing run, scoped to a single repository. Nodes
//! and edges are only added, never mutated in place; re-adding a node
//! with the same ID replaces it wholesale. Edges referencing unknown
//! endpoints are silently dropped so the graph never dangles.

pub mod builder;
pub mod chunker;
pub mod ids;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub use builder::{GraphBuilder, InvertedIndex};

/// Categories of graph entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Repo,
    File,
    Symbol,
    Chunk,
    Comment,
    Import,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Repo => "repo",
            NodeKind::File => "file",
            NodeKind::Symbol => "symbol",
            NodeKind::Chunk => "chunk",
            NodeKind::Comment => "comment",
            NodeKind::Import => "import",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "repo" => Some(NodeKind::Repo),
            "file" => Some(NodeKind::File),
            "symbol" => Some(NodeKind::Symbol),
            "chunk" => Some(NodeKind::Chunk),
            "comment" => Some(NodeKind::Comment),
            "import" => Some(NodeKind::Import),
            _ => None,
        }
    }
}

/// Categories of graph relationships.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Contains,
    DocsFor,
    PartOf,
    NextChunk,
    Calls,
}

/// Source span: 1-indexed lines, 0-indexed columns, byte offsets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub start_line: usize,
    pub start_col: usize,
    pub end_line: usize,
    pub end_col: usize,
    pub byte_start: usize,
    pub byte_end: usize,
}

impl Location {
    /// Inclusive line span covered by this location.
    pub fn line_span(&self) -> usize {
        self.end_line.saturating_sub(self.start_line) + 1
    }

    /// Whether `other` lies entirely inside this span (byte-wise).
    pub fn contains(&self, other: &Location) -> bool {
        self.byte_start <= other.byte_start && other.byte_end <= self.byte_end
    }
}

/// How a chunk's text was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStrategy {
    /// Sub-range of a symbol body
    SymbolSplit,
    /// Line-bounded slice of a whole file
    WholeFile,
}

/// Closed per-kind metadata; add variants, not stringly-typed keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeMeta {
    #[default]
    None,
    File {
        content_hash: String,
    },
    Chunk {
        strategy: ChunkStrategy,
        part: usize,
        unsupported: bool,
    },
}

/// One entity in the code graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub kind: NodeKind,
    pub name: String,
    pub path: String,
    pub language: Option<String>,
    pub location: Location,
    /// First logical line of the definition, ellipsized to 200 chars
    pub signature: String,
    /// Source slice; empty for Symbol nodes to avoid duplicating
    /// their Chunk children
    pub code: String,
    pub doc: String,
    #[serde(default)]
    pub meta: NodeMeta,
    /// Empty until computed
    #[serde(default)]
    pub embedding: Vec<f32>,
}

/// One relationship between two nodes, by ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    pub kind: EdgeKind,
}

/// Node map plus forward/reverse adjacency, scoped to one repository.
#[derive(Debug, Serialize)]
pub struct Graph {
    repo_id: String,
    nodes: HashMap<String, GraphNode>,
    edges: Vec<GraphEdge>,
    #[serde(skip)]
    forward: HashMap<String, Vec<usize>>,
    #[serde(skip)]
    reverse: HashMap<String, Vec<usize>>,
}

// Adjacency is derived state the export omits; rebuild it so a
// deserialized graph answers edge queries like a freshly built one.
impl<'de> Deserialize<'de> for Graph {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Wire {
            repo_id: String,
            nodes: HashMap<String, GraphNode>,
            #[serde(default)]
            edges: Vec<GraphEdge>,
        }

        let wire = Wire::deserialize(deserializer)?;
        let mut graph = Graph {
            repo_id: wire.repo_id,
            nodes: wire.nodes,
            edges: Vec::new(),
            forward: HashMap::new(),
            reverse: HashMap::new(),
        };
        for edge in &wire.edges {
            graph.add_edge(&edge.from, &edge.to, edge.kind);
        }
        Ok(graph)
    }
}

impl Graph {
    pub fn new(repo_id: impl Into<String>) -> Self {
        Self {
            repo_id: repo_id.into(),
            nodes: HashMap::new(),
            edges: Vec::new(),
            forward: HashMap::new(),
            reverse: HashMap::new(),
        }
    }

    pub fn repo_id(&self) -> &str {
        &self.repo_id
    }

    /// Insert a node, replacing any existing node with the same ID.
    pub fn add_node(&mut self, node: GraphNode) {
        self.nodes.insert(node.id.clone(), node);
    }

    /// Insert an edge. A no-op unless both endpoints exist.
    /// Returns whether the edge was kept.
    pub fn add_edge(&mut self, from: &str, to: &str, kind: EdgeKind) -> bool {
        if !self.nodes.contains_key(from) || !self.nodes.contains_key(to) {
            return false;
        }
        let index = self.edges.len();
        self.edges.push(GraphEdge {
            from: from.to_string(),
            to: to.to_string(),
            kind,
        });
        self.forward.entry(from.to_string()).or_default().push(index);
        self.reverse.entry(to.to_string()).or_default().push(index);
        true
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    pub fn edges_from<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a GraphEdge> {
        self.forward
            .get(id)
            .into_iter()
            .flatten()
            .map(|&i| &self.edges[i])
    }

    pub fn edges_to<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a GraphEdge> {
        self.reverse
            .get(id)
            .into_iter()
            .flatten()
            .map(|&i| &self.edges[i])
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Serialize the graph for persistence or diagnostics.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, kind: NodeKind) -> GraphNode {
        GraphNode {
            id: id.to_string(),
            kind,
            name: id.to_string(),
            path: "f.rs".to_string(),
            language: Some("rust".to_string()),
            location: Location::default(),
            signature: String::new(),
            code: String::new(),
            doc: String::new(),
            meta: NodeMeta::None,
            embedding: Vec::new(),
        }
    }

    #[test]
    fn test_edge_requires_both_endpoints() {
        let mut graph = Graph::new("repo");
        graph.add_node(node("a", NodeKind::Symbol));

        assert!(!graph.add_edge("a", "missing", EdgeKind::Calls));
        assert!(!graph.add_edge("missing", "a", EdgeKind::Calls));
        assert_eq!(graph.edge_count(), 0);

        graph.add_node(node("b", NodeKind::Symbol));
        assert!(graph.add_edge("a", "b", EdgeKind::Calls));
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_node_replaced_wholesale() {
        let mut graph = Graph::new("repo");
        graph.add_node(node("a", NodeKind::Symbol));

        let mut replacement = node("a", NodeKind::Symbol);
        replacement.name = "renamed".to_string();
        graph.add_node(replacement);

        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.node("a").unwrap().name, "renamed");
    }

    #[test]
    fn test_adjacency() {
        let mut graph = Graph::new("repo");
        graph.add_node(node("f", NodeKind::File));
        graph.add_node(node("s", NodeKind::Symbol));
        graph.add_edge("f", "s", EdgeKind::Contains);

        let out: Vec<_> = graph.edges_from("f").collect();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to, "s");

        let inc: Vec<_> = graph.edges_to("s").collect();
        assert_eq!(inc.len(), 1);
        assert_eq!(inc[0].from, "f");
    }

    #[test]
    fn test_location_span_and_containment() {
        let outer = Location {
            start_line: 1,
            end_line: 10,
            byte_start: 0,
            byte_end: 100,
            ..Default::default()
        };
        let inner = Location {
            start_line: 3,
            end_line: 5,
            byte_start: 20,
            byte_end: 50,
            ..Default::default()
        };

        assert_eq!(outer.line_span(), 10);
        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
    }

    #[test]
    fn test_graph_json_roundtrip() {
        let mut graph = Graph::new("repo");
        graph.add_node(node("a", NodeKind::File));
        let json = graph.to_json().unwrap();
        assert!(json.contains("\"repo_id\""));
        assert!(json.contains("\"file\""));
    }

    #[test]
    fn test_deserialized_graph_rebuilds_adjacency() {
        let mut graph = Graph::new("repo");
        graph.add_node(node("f", NodeKind::File));
        graph.add_node(node("s", NodeKind::Symbol));
        graph.add_edge("f", "s", EdgeKind::Contains);

        let restored: Graph = serde_json::from_str(&graph.to_json().unwrap()).unwrap();

        assert_eq!(restored.repo_id(), "repo");
        assert_eq!(restored.edge_count(), 1);
        let out: Vec<_> = restored.edges_from("f").collect();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to, "s");
        assert_eq!(restored.edges_to("s").count(), 1);
    }
}
