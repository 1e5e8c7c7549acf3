//! Content-addressed identifiers.
//!
//! IDs derive solely from stable attributes, so re-indexing an
//! unchanged file reproduces identical IDs and store upserts converge.

use sha2::{Digest, Sha256};

use super::{Location, NodeKind};

/// Stable node ID: `hash(repo | path | kind | name | span)`,
/// first 16 bytes of sha256 as lowercase hex.
pub fn node_id(
    repo_id: &str,
    path: &str,
    kind: NodeKind,
    name: &str,
    location: &Location,
) -> String {
    let span = format!(
        "{}:{}-{}:{}",
        location.start_line, location.start_col, location.end_line, location.end_col
    );
    let mut hasher = Sha256::new();
    hasher.update(repo_id.as_bytes());
    hasher.update(b"|");
    hasher.update(path.as_bytes());
    hasher.update(b"|");
    hasher.update(kind.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(name.as_bytes());
    hasher.update(b"|");
    hasher.update(span.as_bytes());
    hex_prefix(&hasher.finalize(), 16)
}

/// Chunk part IDs embed the part index so splitting is deterministic.
pub fn chunk_id(parent_id: &str, part: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(parent_id.as_bytes());
    hasher.update(b"#");
    hasher.update(part.to_string().as_bytes());
    hex_prefix(&hasher.finalize(), 16)
}

/// Stable hash of a file's content, kept in File node metadata.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex_prefix(&hasher.finalize(), 16)
}

/// Vector store namespace scoping all records for one repository.
pub fn namespace_for(repo_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(repo_id.as_bytes());
    format!("ns_{}", hex_prefix(&hasher.finalize(), 8))
}

fn hex_prefix(digest: &[u8], bytes: usize) -> String {
    digest[..bytes].iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(start_line: usize, end_line: usize) -> Location {
        Location {
            start_line,
            end_line,
            ..Default::default()
        }
    }

    #[test]
    fn test_node_id_deterministic() {
        let a = node_id("repo", "src/a.rs", NodeKind::Symbol, "foo", &loc(1, 5));
        let b = node_id("repo", "src/a.rs", NodeKind::Symbol, "foo", &loc(1, 5));
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn test_node_id_varies_by_span() {
        let a = node_id("repo", "src/a.rs", NodeKind::Symbol, "foo", &loc(1, 5));
        let b = node_id("repo", "src/a.rs", NodeKind::Symbol, "foo", &loc(10, 15));
        assert_ne!(a, b, "same name at different spans must not collide");
    }

    #[test]
    fn test_node_id_varies_by_kind_and_repo() {
        let sym = node_id("repo", "a.rs", NodeKind::Symbol, "x", &loc(1, 1));
        let com = node_id("repo", "a.rs", NodeKind::Comment, "x", &loc(1, 1));
        let other = node_id("repo2", "a.rs", NodeKind::Symbol, "x", &loc(1, 1));
        assert_ne!(sym, com);
        assert_ne!(sym, other);
    }

    #[test]
    fn test_chunk_id_embeds_part() {
        let parent = node_id("repo", "a.rs", NodeKind::Symbol, "big", &loc(1, 500));
        assert_ne!(chunk_id(&parent, 0), chunk_id(&parent, 1));
        assert_eq!(chunk_id(&parent, 3), chunk_id(&parent, 3));
    }

    #[test]
    fn test_namespace_stable() {
        assert_eq!(namespace_for("my/repo"), namespace_for("my/repo"));
        assert_ne!(namespace_for("my/repo"), namespace_for("other/repo"));
        assert!(namespace_for("my/repo").starts_with("ns_"));
    }
}
