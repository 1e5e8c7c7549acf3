//! Syntax-tree extraction.
//!
//! Pure function of (tree, spec, source): yields named definitions,
//! import spans, call-site spans and comment spans. Parse failures are
//! the caller's problem; nothing here touches the filesystem.

use tree_sitter::{Node, Tree, TreeCursor};

use super::LanguageSpec;
use crate::graph::Location;

/// A named declaration found in the source.
#[derive(Debug, Clone)]
pub struct Definition {
    pub name: String,
    pub location: Location,
}

/// An anonymous span of interest (import, call site, comment).
#[derive(Debug, Clone)]
pub struct SpanItem {
    pub location: Location,
}

/// Everything the extractor pulls out of one file.
#[derive(Debug, Default)]
pub struct Extraction {
    pub definitions: Vec<Definition>,
    pub imports: Vec<SpanItem>,
    pub calls: Vec<SpanItem>,
    pub docs: Vec<SpanItem>,
}

pub struct Extractor;

impl Extractor {
    /// Extract definitions, imports, calls and comments from a parsed
    /// tree, ordered by source position.
    pub fn extract(tree: &Tree, spec: &LanguageSpec, source: &str) -> Extraction {
        let mut out = Extraction::default();
        let mut cursor = tree.walk();
        Self::walk(&mut cursor, spec, source.as_bytes(), &mut out);

        out.definitions
            .sort_by_key(|d| (d.location.byte_start, d.location.byte_end));
        out
    }

    fn walk(cursor: &mut TreeCursor, spec: &LanguageSpec, source: &[u8], out: &mut Extraction) {
        let node = cursor.node();
        let kind = node.kind();

        if spec.comment_kinds.contains(&kind) {
            out.docs.push(SpanItem {
                location: node_location(&node),
            });
            // Comments have no children worth visiting
            return;
        }

        if spec.import_kinds.contains(&kind) {
            out.imports.push(SpanItem {
                location: node_location(&node),
            });
            return;
        }

        if spec.call_kinds.contains(&kind) {
            out.calls.push(SpanItem {
                location: node_location(&node),
            });
            // Recurse: call arguments may contain nested calls
        }

        if spec.arrow_binding_kinds.contains(&kind) {
            if let Some(def) = Self::arrow_bound_definition(&node, source) {
                out.definitions.push(def);
            }
        } else if spec.definition_kinds.contains(&kind) {
            if let Some(name) = Self::definition_name(&node, spec, source) {
                out.definitions.push(Definition {
                    name,
                    location: node_location(&node),
                });
            }
        }

        if cursor.goto_first_child() {
            loop {
                Self::walk(cursor, spec, source, out);
                if !cursor.goto_next_sibling() {
                    break;
                }
            }
            cursor.goto_parent();
        }
    }

    /// `const f = () => {}` / `const f = function () {}` style
    /// declarations: the definition spans the whole declaration and is
    /// named after the declarator.
    fn arrow_bound_definition(node: &Node, source: &[u8]) -> Option<Definition> {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if child.kind() != "variable_declarator" {
                continue;
            }
            let name = child.child_by_field_name("name")?;
            let value = child.child_by_field_name("value")?;
            if matches!(value.kind(), "arrow_function" | "function_expression" | "function") {
                return Some(Definition {
                    name: node_text(&name, source).to_string(),
                    location: node_location(node),
                });
            }
        }
        None
    }

    fn definition_name(node: &Node, spec: &LanguageSpec, source: &[u8]) -> Option<String> {
        // Common case across grammars
        if let Some(name) = node.child_by_field_name("name") {
            return Some(node_text(&name, source).to_string());
        }

        match (spec.id, node.kind()) {
            // `impl Foo` / `impl Trait for Foo` names the target type
            ("rust", "impl_item") => node
                .child_by_field_name("type")
                .map(|n| node_text(&n, source).to_string()),
            // `type Foo struct { ... }` nests the name inside type_spec
            ("go", "type_declaration") => {
                let mut cursor = node.walk();
                let name = node
                    .named_children(&mut cursor)
                    .find(|c| c.kind() == "type_spec")
                    .and_then(|ts| ts.child_by_field_name("name"))
                    .map(|n| node_text(&n, source).to_string());
                name
            }
            // C/C++ function names hide inside nested declarators
            ("c" | "cpp", "function_definition") => node
                .child_by_field_name("declarator")
                .and_then(|d| Self::declarator_identifier(&d, source)),
            _ => Self::first_identifier_child(node, source),
        }
    }

    fn declarator_identifier(node: &Node, source: &[u8]) -> Option<String> {
        if node.kind().ends_with("identifier") {
            return Some(node_text(node, source).to_string());
        }
        if let Some(inner) = node.child_by_field_name("declarator") {
            return Self::declarator_identifier(&inner, source);
        }
        Self::first_identifier_child(node, source)
    }

    fn first_identifier_child(node: &Node, source: &[u8]) -> Option<String> {
        let mut cursor = node.walk();
        let name = node
            .named_children(&mut cursor)
            .find(|c| c.kind().ends_with("identifier"))
            .map(|c| node_text(&c, source).to_string());
        name
    }
}

/// Source slice for a node's byte range.
pub fn node_text<'a>(node: &Node, source: &'a [u8]) -> &'a str {
    std::str::from_utf8(&source[node.start_byte()..node.end_byte()]).unwrap_or("")
}

fn node_location(node: &Node) -> Location {
    Location {
        start_line: node.start_position().row + 1,
        start_col: node.start_position().column,
        end_line: node.end_position().row + 1,
        end_col: node.end_position().column,
        byte_start: node.start_byte(),
        byte_end: node.end_byte(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::LanguageResolver;

    fn extract(language: &'static str, source: &str) -> Extraction {
        let ext = match language {
            "rust" => "rs",
            "python" => "py",
            "typescript" => "ts",
            "javascript" => "js",
            other => other,
        };
        let mut resolver = LanguageResolver::new();
        let tree = resolver.parse(language, source).expect("parse failed");
        let file = format!("f.{}", ext);
        let spec = resolver
            .resolve(std::path::Path::new(&file))
            .expect("language spec");
        Extractor::extract(&tree, spec, source)
    }

    #[test]
    fn test_rust_function_and_call() {
        let source = "fn helper() {}\n\nfn main() {\n    helper();\n}\n";
        let out = extract("rust", source);

        let names: Vec<_> = out.definitions.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["helper", "main"]);
        assert_eq!(out.calls.len(), 1);
        assert_eq!(out.definitions[1].location.start_line, 3);
    }

    #[test]
    fn test_rust_imports_and_comments() {
        let source = "use std::fmt;\n\n/// Greets.\nfn greet() {}\n";
        let out = extract("rust", source);

        assert_eq!(out.imports.len(), 1);
        assert_eq!(out.docs.len(), 1);
        assert_eq!(out.docs[0].location.start_line, 3);
    }

    #[test]
    fn test_python_class_and_methods() {
        let source = "class Greeter:\n    def greet(self):\n        return fmt(self.name)\n";
        let out = extract("python", source);

        let names: Vec<_> = out.definitions.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["Greeter", "greet"]);
        assert_eq!(out.calls.len(), 1);
    }

    #[test]
    fn test_typescript_arrow_binding() {
        let source = "const greet = (name: string): string => {\n    return hello(name);\n};\n";
        let out = extract("typescript", source);

        assert_eq!(out.definitions.len(), 1);
        assert_eq!(out.definitions[0].name, "greet");
        assert_eq!(out.calls.len(), 1);
    }

    #[test]
    fn test_typescript_interface_and_type_alias() {
        let source = "interface User { name: string }\ntype UserId = string;\n";
        let out = extract("typescript", source);

        let names: Vec<_> = out.definitions.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["User", "UserId"]);
    }

    #[test]
    fn test_go_type_declaration_name() {
        let source = "package main\n\ntype Point struct {\n\tX int\n}\n\nfunc area(p Point) int { return p.X }\n";
        let out = extract("go", source);

        let names: Vec<_> = out.definitions.iter().map(|d| d.name.as_str()).collect();
        assert!(names.contains(&"Point"));
        assert!(names.contains(&"area"));
    }

    #[test]
    fn test_nested_definitions_kept() {
        let source = "fn outer() {\n    fn inner() {}\n    inner();\n}\n";
        let out = extract("rust", source);

        let names: Vec<_> = out.definitions.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["outer", "inner"]);
        // inner's span nests inside outer's
        assert!(out.definitions[1].location.byte_start > out.definitions[0].location.byte_start);
        assert!(out.definitions[1].location.byte_end < out.definitions[0].location.byte_end);
    }
}
