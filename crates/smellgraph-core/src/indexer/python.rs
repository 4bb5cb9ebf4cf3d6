//! Python parser plugin backed by tree-sitter-python.

use tracing::debug;
use tree_sitter::Node;

use crate::errors::SmellResult;
use crate::indexer::parser::{
    count_code_lines, count_decisions, line_span, node_text, parse_tree, LanguageParser,
};
use crate::models::{FileRecord, FunctionRecord, ImportStatement, TypeRecord};

const PYTHON_DECISION_KINDS: &[&str] = &[
    "if_statement",
    "elif_clause",
    "for_statement",
    "while_statement",
    "except_clause",
    "boolean_operator",
];

pub struct PythonParser {
    decision_kinds: Vec<String>,
}

impl Default for PythonParser {
    fn default() -> Self {
        Self::new()
    }
}

impl PythonParser {
    pub fn new() -> Self {
        Self {
            decision_kinds: PYTHON_DECISION_KINDS.iter().map(|k| k.to_string()).collect(),
        }
    }

    pub fn with_decision_kinds(mut self, kinds: Vec<String>) -> Self {
        self.decision_kinds = kinds;
        self
    }

    fn language_handle() -> tree_sitter::Language {
        tree_sitter_python::LANGUAGE.into()
    }

    fn visit(&self, node: Node<'_>, ctx: &mut Extraction<'_>, owner: Option<&str>) {
        match node.kind() {
            "decorated_definition" => {
                if let Some(definition) = node.child_by_field_name("definition") {
                    self.visit(definition, ctx, owner);
                }
            }
            "class_definition" => self.visit_class(node, ctx),
            "function_definition" => {
                let name = match node.child_by_field_name("name") {
                    Some(n) => node_text(n, ctx.source),
                    None => return,
                };
                let (start, end) = line_span(node);
                let mut function = FunctionRecord::new(ctx.path, name, owner, start, end);
                function.cyclomatic_complexity = 1 + count_decisions(node, &self.decision_kinds);
                ctx.functions.push(function);
            }
            _ => {
                let mut cursor = node.walk();
                for child in node.named_children(&mut cursor) {
                    self.visit(child, ctx, owner);
                }
            }
        }
    }

    fn visit_class(&self, node: Node<'_>, ctx: &mut Extraction<'_>) {
        let name = match node.child_by_field_name("name") {
            Some(n) => node_text(n, ctx.source).to_string(),
            None => return,
        };
        let (start, end) = line_span(node);
        let mut record = TypeRecord::new(ctx.path, &name, start, end);

        let explicit_base = node
            .child_by_field_name("superclasses")
            .map(|bases| node_text(bases, ctx.source).contains("ABC"))
            .unwrap_or(false);

        let mut abstract_member = false;
        if let Some(body) = node.child_by_field_name("body") {
            let mut cursor = body.walk();
            for member in body.named_children(&mut cursor) {
                match member.kind() {
                    "function_definition" => record.method_count += 1,
                    "decorated_definition" => {
                        let wraps_function = member
                            .child_by_field_name("definition")
                            .map(|d| d.kind() == "function_definition")
                            .unwrap_or(false);
                        if wraps_function {
                            record.method_count += 1;
                            abstract_member |= has_abstract_decorator(member, ctx.source);
                        }
                    }
                    _ => {}
                }
            }
            record.is_abstract = explicit_base || abstract_member;
            ctx.types.push(record);

            let mut cursor = body.walk();
            for member in body.named_children(&mut cursor) {
                self.visit(member, ctx, Some(&name));
            }
        } else {
            record.is_abstract = explicit_base;
            ctx.types.push(record);
        }
    }
}

struct Extraction<'a> {
    path: &'a str,
    source: &'a str,
    types: Vec<TypeRecord>,
    functions: Vec<FunctionRecord>,
}

fn has_abstract_decorator(decorated: Node<'_>, source: &str) -> bool {
    let mut cursor = decorated.walk();
    let found = decorated
        .named_children(&mut cursor)
        .filter(|child| child.kind() == "decorator")
        .any(|decorator| node_text(decorator, source).contains("abstractmethod"));
    found
}

fn dotted_text(node: Node<'_>, source: &str) -> Option<String> {
    match node.kind() {
        "dotted_name" | "identifier" | "relative_import" => {
            Some(node_text(node, source).to_string())
        }
        "aliased_import" => node
            .child_by_field_name("name")
            .map(|n| node_text(n, source).to_string()),
        _ => None,
    }
}

/// Collect module-level imports, descending into top-level `if`/`try`
/// blocks but never into class or function bodies.
fn collect_imports(node: Node<'_>, source: &str, out: &mut Vec<ImportStatement>) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "import_statement" => {
                let mut inner = child.walk();
                for name in child.named_children(&mut inner) {
                    if let Some(module) = dotted_text(name, source) {
                        out.push(ImportStatement::new(module.clone(), vec![module]));
                    }
                }
            }
            "import_from_statement" => {
                let module = match child
                    .child_by_field_name("module_name")
                    .and_then(|m| dotted_text(m, source))
                {
                    Some(m) => m,
                    None => continue,
                };
                let mut inner = child.walk();
                let mut names: Vec<String> = child
                    .children_by_field_name("name", &mut inner)
                    .filter_map(|n| dotted_text(n, source))
                    .collect();
                let mut wildcard_cursor = child.walk();
                if child
                    .named_children(&mut wildcard_cursor)
                    .any(|n| n.kind() == "wildcard_import")
                {
                    names.push("*".to_string());
                }
                out.push(ImportStatement::new(module, names));
            }
            "function_definition" | "class_definition" | "decorated_definition" => {}
            _ => collect_imports(child, source, out),
        }
    }
}

impl LanguageParser for PythonParser {
    fn language(&self) -> &'static str {
        "python"
    }

    fn extensions(&self) -> &[&'static str] {
        &[".py"]
    }

    fn decision_kinds(&self) -> &[String] {
        &self.decision_kinds
    }

    fn parse_file(
        &self,
        path: &str,
        content: &str,
    ) -> SmellResult<(FileRecord, Vec<TypeRecord>, Vec<FunctionRecord>)> {
        let file = FileRecord {
            path: path.to_string(),
            language: self.language().to_string(),
            lines_of_code: count_code_lines(content, &["#"]),
        };
        let tree = parse_tree(&Self::language_handle(), content)?;
        let root = tree.root_node();
        if root.has_error() {
            debug!("Syntax errors in {path}; keeping partial structure");
        }

        let mut ctx = Extraction {
            path,
            source: content,
            types: Vec::new(),
            functions: Vec::new(),
        };
        self.visit(root, &mut ctx, None);
        Ok((file, ctx.types, ctx.functions))
    }

    fn get_imports(&self, content: &str) -> Vec<ImportStatement> {
        let tree = match parse_tree(&Self::language_handle(), content) {
            Ok(tree) => tree,
            Err(e) => {
                debug!("Import extraction skipped: {e}");
                return Vec::new();
            }
        };
        let mut imports = Vec::new();
        collect_imports(tree.root_node(), content, &mut imports);
        imports
    }

    fn calculate_complexity(&self, snippet: &str) -> i64 {
        match parse_tree(&Self::language_handle(), snippet) {
            Ok(tree) => 1 + count_decisions(tree.root_node(), &self.decision_kinds),
            Err(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERVICE: &str = r#"import os
import json, logging as log
from abc import ABC, abstractmethod
from .sibling import helper
from app.db import Session as S, engine
from toolkit import *

try:
    import yaml
except ImportError:
    yaml = None


class Repository(ABC):
    @abstractmethod
    def save(self, item):
        ...

    def load(self, key):
        if key and self.ready:
            return key
        return None


class Plain:
    @staticmethod
    def build():
        return Plain()

    def run(self):
        for x in range(3):
            while x:
                x -= 1
        try:
            pass
        except ValueError:
            pass


def helper_fn(flag):
    import sqlite3
    if flag:
        return 1
    elif not flag:
        return 2
    return 0
"#;

    fn parse(src: &str) -> (FileRecord, Vec<TypeRecord>, Vec<FunctionRecord>) {
        PythonParser::new().parse_file("app/service.py", src).unwrap()
    }

    #[test]
    fn extracts_types_with_method_counts_and_abstractness() {
        let (file, types, _) = parse(SERVICE);
        assert_eq!(file.language, "python");
        assert_eq!(types.len(), 2);

        let repo = &types[0];
        assert_eq!(repo.name, "Repository");
        assert_eq!(repo.id, "app/service.py::Repository");
        assert_eq!(repo.method_count, 2);
        assert!(repo.is_abstract);
        assert_eq!(repo.start_line, 14);

        let plain = &types[1];
        assert_eq!(plain.method_count, 2);
        assert!(!plain.is_abstract);
    }

    #[test]
    fn abstract_method_decorator_alone_marks_type_abstract() {
        let src = "class Port:\n    @abc.abstractmethod\n    def send(self):\n        pass\n";
        let (_, types, _) = parse(src);
        assert!(types[0].is_abstract);
    }

    #[test]
    fn methods_record_parent_type_and_complexity() {
        let (_, _, functions) = parse(SERVICE);
        let names: Vec<&str> = functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["save", "load", "build", "run", "helper_fn"]);

        let load = &functions[1];
        assert_eq!(load.parent_type.as_deref(), Some("app/service.py::Repository"));
        assert_eq!(load.id, "app/service.py::Repository.load");
        // if + boolean_operator
        assert_eq!(load.cyclomatic_complexity, 3);

        let run = &functions[3];
        // for + while + except
        assert_eq!(run.cyclomatic_complexity, 4);

        let helper = &functions[4];
        assert!(helper.parent_type.is_none());
        // if + elif
        assert_eq!(helper.cyclomatic_complexity, 3);
    }

    #[test]
    fn imports_cover_plain_from_relative_and_wildcard_forms() {
        let imports = PythonParser::new().get_imports(SERVICE);
        let rendered: Vec<(String, Vec<String>)> = imports
            .into_iter()
            .map(|i| (i.module_path, i.names))
            .collect();
        assert_eq!(
            rendered,
            vec![
                ("os".to_string(), vec!["os".to_string()]),
                ("json".to_string(), vec!["json".to_string()]),
                ("logging".to_string(), vec!["logging".to_string()]),
                (
                    "abc".to_string(),
                    vec!["ABC".to_string(), "abstractmethod".to_string()]
                ),
                (".sibling".to_string(), vec!["helper".to_string()]),
                (
                    "app.db".to_string(),
                    vec!["Session".to_string(), "engine".to_string()]
                ),
                ("toolkit".to_string(), vec!["*".to_string()]),
                ("yaml".to_string(), vec!["yaml".to_string()]),
            ]
        );
    }

    #[test]
    fn calculate_complexity_counts_decisions_in_snippet() {
        let parser = PythonParser::new();
        assert_eq!(parser.calculate_complexity("x = 1\n"), 1);
        assert_eq!(
            parser.calculate_complexity("if a or b:\n    pass\nwhile c:\n    pass\n"),
            4
        );
    }

    #[test]
    fn decision_kinds_are_configurable() {
        let parser = PythonParser::new().with_decision_kinds(vec!["while_statement".to_string()]);
        assert_eq!(
            parser.calculate_complexity("if a:\n    pass\nwhile b:\n    pass\n"),
            2
        );
    }

    #[test]
    fn malformed_source_yields_partial_result() {
        let src = "class Broken(:\n    def ok(self):\n        return 1\n\ndef fine():\n    return 2\n";
        let (file, _types, functions) = parse(src);
        assert!(file.lines_of_code > 0);
        assert!(functions.iter().any(|f| f.name == "fine"));
    }

    #[test]
    fn property_accessors_keep_distinct_ids() {
        let src = "class Box:\n    @property\n    def size(self):\n        return self._size\n\n    @size.setter\n    def size(self, value):\n        self._size = value\n";
        let parsed = PythonParser::new().parse("box.py", src).unwrap();
        let ids: Vec<&str> = parsed.functions.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["box.py::Box.size#3", "box.py::Box.size#7"]);
        assert_eq!(parsed.types[0].method_count, 2);
    }

    #[test]
    fn empty_source_is_empty_result() {
        let (file, types, functions) = parse("");
        assert_eq!(file.lines_of_code, 0);
        assert!(types.is_empty());
        assert!(functions.is_empty());
    }
}
