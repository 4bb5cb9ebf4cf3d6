//! Language parser plugins and the extension-keyed registry.
//!
//! Each plugin turns file text into structural records with native
//! tree-sitter grammars. Parsers never fail a batch on bad syntax: they
//! return whatever could be recovered from the partial tree.

use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use tree_sitter::{Node, Tree};

use crate::errors::{SmellError, SmellResult};
use crate::indexer::java::JavaParser;
use crate::indexer::python::PythonParser;
use crate::models::{
    disambiguate_function_ids, FileRecord, FunctionRecord, ImportStatement, ParsedFile, TypeRecord,
};

/// Capability every source-language plugin provides.
pub trait LanguageParser: Send + Sync {
    fn language(&self) -> &'static str;

    /// Lowercase extensions including the leading dot, e.g. `".py"`.
    fn extensions(&self) -> &[&'static str];

    /// Syntax node kinds counted as decision points.
    fn decision_kinds(&self) -> &[String];

    fn parse_file(
        &self,
        path: &str,
        content: &str,
    ) -> SmellResult<(FileRecord, Vec<TypeRecord>, Vec<FunctionRecord>)>;

    fn get_imports(&self, content: &str) -> Vec<ImportStatement>;

    /// `1 + number of decision constructs` in `snippet`.
    fn calculate_complexity(&self, snippet: &str) -> i64;

    /// Structural records and imports in one call.
    fn parse(&self, path: &str, content: &str) -> SmellResult<ParsedFile> {
        let (file, types, mut functions) = self.parse_file(path, content)?;
        disambiguate_function_ids(&mut functions);
        Ok(ParsedFile {
            file,
            types,
            functions,
            imports: self.get_imports(content),
        })
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Maps file extensions to parser plugins. Later registrations win.
#[derive(Clone, Default)]
pub struct ParserRegistry {
    by_extension: IndexMap<String, Arc<dyn LanguageParser>>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in Python and Java parsers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(PythonParser::new()));
        registry.register(Arc::new(JavaParser::new()));
        registry
    }

    pub fn register(&mut self, parser: Arc<dyn LanguageParser>) {
        for ext in parser.extensions() {
            self.by_extension
                .insert(ext.to_ascii_lowercase(), Arc::clone(&parser));
        }
    }

    pub fn for_extension(&self, extension: &str) -> Option<Arc<dyn LanguageParser>> {
        let ext = extension.to_ascii_lowercase();
        let key = if ext.starts_with('.') {
            ext
        } else {
            format!(".{ext}")
        };
        self.by_extension.get(&key).cloned()
    }

    pub fn for_path(&self, path: &Path) -> Option<Arc<dyn LanguageParser>> {
        let ext = path.extension()?.to_string_lossy();
        self.for_extension(&ext)
    }

    pub fn supported_extensions(&self) -> Vec<&str> {
        self.by_extension.keys().map(String::as_str).collect()
    }
}

// ---------------------------------------------------------------------------
// Shared tree-sitter helpers
// ---------------------------------------------------------------------------

pub(crate) fn parse_tree(language: &tree_sitter::Language, content: &str) -> SmellResult<Tree> {
    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(language)
        .map_err(|e| SmellError::Parse(format!("Failed to set language: {e}")))?;
    parser
        .parse(content.as_bytes(), None)
        .ok_or_else(|| SmellError::Parse("tree-sitter returned no tree".to_string()))
}

pub(crate) fn node_text<'a>(node: Node<'_>, source: &'a str) -> &'a str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

/// 1-based inclusive line span of a node.
pub(crate) fn line_span(node: Node<'_>) -> (i64, i64) {
    (
        node.start_position().row as i64 + 1,
        node.end_position().row as i64 + 1,
    )
}

/// Count nodes under `root` (inclusive) whose kind is a decision kind.
/// Anonymous tokens are visited too, so operators like `&&` can be listed.
pub(crate) fn count_decisions(root: Node<'_>, kinds: &[String]) -> i64 {
    let mut count = 0;
    let mut cursor = root.walk();
    loop {
        if kinds.iter().any(|k| k == cursor.node().kind()) {
            count += 1;
        }
        if cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return count;
            }
        }
    }
}

/// Non-empty lines that are not line comments.
pub(crate) fn count_code_lines(content: &str, comment_prefixes: &[&str]) -> i64 {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !comment_prefixes.iter().any(|p| line.starts_with(p)))
        .count() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_resolves_builtin_extensions() {
        let registry = ParserRegistry::with_defaults();
        assert_eq!(
            registry.for_path(Path::new("pkg/mod.py")).map(|p| p.language()),
            Some("python")
        );
        assert_eq!(
            registry.for_extension("JAVA").map(|p| p.language()),
            Some("java")
        );
        assert!(registry.for_path(Path::new("README.md")).is_none());
        assert!(registry.for_path(Path::new("Makefile")).is_none());
        assert_eq!(registry.supported_extensions(), vec![".py", ".java"]);
    }

    #[test]
    fn count_code_lines_skips_blank_and_comment_lines() {
        let src = "# header\n\nimport os\n   # indented comment\nx = 1\n";
        assert_eq!(count_code_lines(src, &["#"]), 2);
    }

    #[test]
    fn count_decisions_visits_every_node() {
        let language: tree_sitter::Language = tree_sitter_python::LANGUAGE.into();
        let tree = parse_tree(&language, "if a:\n    if b:\n        pass\n").unwrap();
        let kinds = vec!["if_statement".to_string()];
        assert_eq!(count_decisions(tree.root_node(), &kinds), 2);
    }
}
