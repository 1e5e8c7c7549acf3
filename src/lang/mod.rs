//! Language resolution: file path -> grammar spec.
//!
//! Each supported language carries a tree-sitter grammar plus tables
//! of the node kinds the extractor cares about. Files with unknown or
//! deny-listed extensions resolve to "unsupported", which is not an
//! error: they are still embedded as raw line chunks downstream.

pub mod extract;

use std::collections::HashMap;
use std::path::Path;

use tracing::debug;
use tree_sitter::{Language, Parser, Tree};

pub use extract::{Definition, Extraction, Extractor, SpanItem};

/// Grammar handle plus the node-kind tables driving extraction.
pub struct LanguageSpec {
    /// Language identifier, e.g. "rust", "python"
    pub id: &'static str,
    /// tree-sitter grammar
    pub language: Language,
    /// Node kinds that declare a named symbol
    pub definition_kinds: &'static [&'static str],
    /// Node kinds whose children may bind an arrow/function expression
    /// to a name (JS/TS `const f = () => {}`)
    pub arrow_binding_kinds: &'static [&'static str],
    /// Import-statement node kinds
    pub import_kinds: &'static [&'static str],
    /// Call-expression node kinds
    pub call_kinds: &'static [&'static str],
    /// Comment node kinds
    pub comment_kinds: &'static [&'static str],
}

/// Maps file paths to language specs and owns per-language parsers.
pub struct LanguageResolver {
    specs: HashMap<&'static str, LanguageSpec>,
    parsers: HashMap<&'static str, Parser>,
}

impl LanguageResolver {
    pub fn new() -> Self {
        let mut specs = HashMap::new();
        for spec in builtin_specs() {
            specs.insert(spec.id, spec);
        }
        Self {
            specs,
            parsers: HashMap::new(),
        }
    }

    /// Resolve a file path to a language spec, or `None` for
    /// unsupported files.
    pub fn resolve(&self, path: &Path) -> Option<&LanguageSpec> {
        let ext = path.extension()?.to_str()?;
        let id = language_for_extension(ext)?;
        self.specs.get(id)
    }

    /// Parse source text with the language's cached parser.
    ///
    /// Creates the parser on first use and reuses it afterwards.
    /// Returns `None` when the parser cannot be configured or the
    /// parse produces no tree.
    pub fn parse(&mut self, language_id: &'static str, source: &str) -> Option<Tree> {
        if !self.parsers.contains_key(language_id) {
            let spec = self.specs.get(language_id)?;
            let mut parser = Parser::new();
            if let Err(e) = parser.set_language(&spec.language) {
                debug!("Failed to set language '{}' for parser: {:?}", language_id, e);
                return None;
            }
            self.parsers.insert(language_id, parser);
        }
        self.parsers
            .get_mut(language_id)?
            .parse(source.as_bytes(), None)
    }

    pub fn supported_languages(&self) -> Vec<&'static str> {
        self.specs.keys().copied().collect()
    }
}

impl Default for LanguageResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Map a file extension to a language identifier.
pub fn language_for_extension(ext: &str) -> Option<&'static str> {
    match ext {
        "rs" => Some("rust"),
        "py" => Some("python"),
        "js" | "jsx" | "mjs" | "cjs" => Some("javascript"),
        "ts" => Some("typescript"),
        "tsx" => Some("tsx"),
        "go" => Some("go"),
        "java" => Some("java"),
        "c" | "h" => Some("c"),
        "cc" | "cxx" | "cpp" | "c++" | "hpp" | "hxx" | "hh" => Some("cpp"),
        _ => None,
    }
}

const TS_DEFINITIONS: &[&str] = &[
    "function_declaration",
    "generator_function_declaration",
    "class_declaration",
    "abstract_class_declaration",
    "method_definition",
    "interface_declaration",
    "type_alias_declaration",
    "enum_declaration",
];

const TS_ARROW_BINDINGS: &[&str] = &["lexical_declaration", "variable_declaration"];

fn builtin_specs() -> Vec<LanguageSpec> {
    vec![
        LanguageSpec {
            id: "rust",
            language: tree_sitter_rust::LANGUAGE.into(),
            definition_kinds: &[
                "function_item",
                "struct_item",
                "enum_item",
                "trait_item",
                "impl_item",
                "mod_item",
                "const_item",
                "static_item",
                "type_item",
                "macro_definition",
            ],
            arrow_binding_kinds: &[],
            import_kinds: &["use_declaration"],
            call_kinds: &["call_expression"],
            comment_kinds: &["line_comment", "block_comment"],
        },
        LanguageSpec {
            id: "python",
            language: tree_sitter_python::LANGUAGE.into(),
            definition_kinds: &["function_definition", "class_definition"],
            arrow_binding_kinds: &[],
            import_kinds: &["import_statement", "import_from_statement"],
            call_kinds: &["call"],
            comment_kinds: &["comment"],
        },
        LanguageSpec {
            id: "javascript",
            language: tree_sitter_javascript::LANGUAGE.into(),
            definition_kinds: &[
                "function_declaration",
                "generator_function_declaration",
                "class_declaration",
                "method_definition",
            ],
            arrow_binding_kinds: TS_ARROW_BINDINGS,
            import_kinds: &["import_statement"],
            call_kinds: &["call_expression"],
            comment_kinds: &["comment"],
        },
        LanguageSpec {
            id: "typescript",
            language: tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            definition_kinds: TS_DEFINITIONS,
            arrow_binding_kinds: TS_ARROW_BINDINGS,
            import_kinds: &["import_statement"],
            call_kinds: &["call_expression"],
            comment_kinds: &["comment"],
        },
        LanguageSpec {
            id: "tsx",
            language: tree_sitter_typescript::LANGUAGE_TSX.into(),
            definition_kinds: TS_DEFINITIONS,
            arrow_binding_kinds: TS_ARROW_BINDINGS,
            import_kinds: &["import_statement"],
            call_kinds: &["call_expression"],
            comment_kinds: &["comment"],
        },
        LanguageSpec {
            id: "go",
            language: tree_sitter_go::LANGUAGE.into(),
            definition_kinds: &[
                "function_declaration",
                "method_declaration",
                "type_declaration",
            ],
            arrow_binding_kinds: &[],
            import_kinds: &["import_declaration"],
            call_kinds: &["call_expression"],
            comment_kinds: &["comment"],
        },
        LanguageSpec {
            id: "java",
            language: tree_sitter_java::LANGUAGE.into(),
            definition_kinds: &[
                "method_declaration",
                "constructor_declaration",
                "class_declaration",
                "interface_declaration",
                "enum_declaration",
            ],
            arrow_binding_kinds: &[],
            import_kinds: &["import_declaration"],
            call_kinds: &["method_invocation"],
            comment_kinds: &["line_comment", "block_comment"],
        },
        LanguageSpec {
            id: "c",
            language: tree_sitter_c::LANGUAGE.into(),
            definition_kinds: &["function_definition", "struct_specifier", "enum_specifier"],
            arrow_binding_kinds: &[],
            import_kinds: &["preproc_include"],
            call_kinds: &["call_expression"],
            comment_kinds: &["comment"],
        },
        LanguageSpec {
            id: "cpp",
            language: tree_sitter_cpp::LANGUAGE.into(),
            definition_kinds: &[
                "function_definition",
                "class_specifier",
                "struct_specifier",
                "enum_specifier",
            ],
            arrow_binding_kinds: &[],
            import_kinds: &["preproc_include"],
            call_kinds: &["call_expression"],
            comment_kinds: &["comment"],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_extensions() {
        let resolver = LanguageResolver::new();
        assert_eq!(resolver.resolve(Path::new("main.rs")).unwrap().id, "rust");
        assert_eq!(resolver.resolve(Path::new("app.py")).unwrap().id, "python");
        assert_eq!(resolver.resolve(Path::new("app.tsx")).unwrap().id, "tsx");
        assert_eq!(resolver.resolve(Path::new("m.go")).unwrap().id, "go");
    }

    #[test]
    fn test_resolve_unsupported() {
        let resolver = LanguageResolver::new();
        assert!(resolver.resolve(Path::new("README.md")).is_none());
        assert!(resolver.resolve(Path::new("Cargo.lock")).is_none());
        assert!(resolver.resolve(Path::new("no_extension")).is_none());
    }

    #[test]
    fn test_parse_and_reuse_parser() {
        let mut resolver = LanguageResolver::new();
        let tree = resolver.parse("rust", "fn main() {}").unwrap();
        assert_eq!(tree.root_node().kind(), "source_file");

        // Second parse reuses the cached parser
        let tree = resolver.parse("rust", "fn other() {}").unwrap();
        assert!(!tree.root_node().has_error());
    }

    #[test]
    fn test_supported_languages() {
        let resolver = LanguageResolver::new();
        let languages = resolver.supported_languages();
        assert!(languages.contains(&"rust"));
        assert!(languages.contains(&"python"));
        assert!(languages.contains(&"typescript"));
        assert!(languages.contains(&"cpp"));
    }
}
