//! Java parser plugin backed by tree-sitter-java.

use tracing::debug;
use tree_sitter::Node;

use crate::errors::SmellResult;
use crate::indexer::parser::{
    count_code_lines, count_decisions, line_span, node_text, parse_tree, LanguageParser,
};
use crate::models::{FileRecord, FunctionRecord, ImportStatement, TypeRecord};

const JAVA_DECISION_KINDS: &[&str] = &[
    "if_statement",
    "for_statement",
    "enhanced_for_statement",
    "while_statement",
    "do_statement",
    "catch_clause",
    "ternary_expression",
    "switch_label",
    "&&",
    "||",
];

const TYPE_KINDS: &[&str] = &[
    "class_declaration",
    "interface_declaration",
    "enum_declaration",
    "record_declaration",
];

const MEMBER_KINDS: &[&str] = &[
    "method_declaration",
    "constructor_declaration",
    "compact_constructor_declaration",
];

pub struct JavaParser {
    decision_kinds: Vec<String>,
}

impl Default for JavaParser {
    fn default() -> Self {
        Self::new()
    }
}

impl JavaParser {
    pub fn new() -> Self {
        Self {
            decision_kinds: JAVA_DECISION_KINDS.iter().map(|k| k.to_string()).collect(),
        }
    }

    pub fn with_decision_kinds(mut self, kinds: Vec<String>) -> Self {
        self.decision_kinds = kinds;
        self
    }

    fn language_handle() -> tree_sitter::Language {
        tree_sitter_java::LANGUAGE.into()
    }

    fn visit(
        &self,
        node: Node<'_>,
        source: &str,
        path: &str,
        types: &mut Vec<TypeRecord>,
        functions: &mut Vec<FunctionRecord>,
    ) {
        if TYPE_KINDS.contains(&node.kind()) {
            self.visit_type(node, source, path, types, functions);
            return;
        }
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.visit(child, source, path, types, functions);
        }
    }

    fn visit_type(
        &self,
        node: Node<'_>,
        source: &str,
        path: &str,
        types: &mut Vec<TypeRecord>,
        functions: &mut Vec<FunctionRecord>,
    ) {
        let name = match node.child_by_field_name("name") {
            Some(n) => node_text(n, source).to_string(),
            None => return,
        };
        let (start, end) = line_span(node);
        let mut record = TypeRecord::new(path, &name, start, end);
        record.is_abstract =
            node.kind() == "interface_declaration" || has_modifier(node, source, "abstract");

        let members = match node.child_by_field_name("body") {
            Some(body) => body_members(body),
            None => Vec::new(),
        };
        let mut nested = Vec::new();
        for member in members {
            if MEMBER_KINDS.contains(&member.kind()) {
                record.method_count += 1;
                if has_modifier(member, source, "abstract") {
                    record.is_abstract = true;
                }
                let method_name = match member.child_by_field_name("name") {
                    Some(n) => node_text(n, source),
                    None => name.as_str(),
                };
                let (m_start, m_end) = line_span(member);
                let mut function =
                    FunctionRecord::new(path, method_name, Some(&name), m_start, m_end);
                function.cyclomatic_complexity =
                    1 + count_decisions(member, &self.decision_kinds);
                functions.push(function);
            } else if TYPE_KINDS.contains(&member.kind()) {
                nested.push(member);
            }
        }
        types.push(record);

        for inner in nested {
            self.visit_type(inner, source, path, types, functions);
        }
    }
}

/// Direct members of a type body, flattening the enum declarations section.
fn body_members(body: Node<'_>) -> Vec<Node<'_>> {
    let mut members = Vec::new();
    let mut cursor = body.walk();
    for child in body.named_children(&mut cursor) {
        if child.kind() == "enum_body_declarations" {
            let mut inner = child.walk();
            members.extend(child.named_children(&mut inner));
        } else {
            members.push(child);
        }
    }
    members
}

fn has_modifier(node: Node<'_>, source: &str, keyword: &str) -> bool {
    let mut cursor = node.walk();
    let found = node
        .named_children(&mut cursor)
        .filter(|child| child.kind() == "modifiers")
        .any(|mods| node_text(mods, source).split_whitespace().any(|t| t == keyword));
    found
}

fn import_from_declaration(node: Node<'_>, source: &str) -> Option<ImportStatement> {
    let mut cursor = node.walk();
    let mut path: Option<String> = None;
    let mut is_static = false;
    let mut wildcard = false;
    for child in node.children(&mut cursor) {
        match child.kind() {
            "static" => is_static = true,
            "asterisk" => wildcard = true,
            "scoped_identifier" | "identifier" => path = Some(node_text(child, source).to_string()),
            _ => {}
        }
    }
    let path = path?;
    if wildcard {
        return Some(ImportStatement::new(path, vec!["*".to_string()]));
    }
    let (owner, last) = match path.rsplit_once('.') {
        Some((owner, last)) => (owner.to_string(), last.to_string()),
        None => (String::new(), path.clone()),
    };
    if is_static && !owner.is_empty() {
        // `import static a.b.Type.member;` depends on `a.b.Type`.
        Some(ImportStatement::new(owner, vec![last]))
    } else {
        Some(ImportStatement::new(path, vec![last]))
    }
}

impl LanguageParser for JavaParser {
    fn language(&self) -> &'static str {
        "java"
    }

    fn extensions(&self) -> &[&'static str] {
        &[".java"]
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
            lines_of_code: count_code_lines(content, &["//", "/*", "*"]),
        };
        let tree = parse_tree(&Self::language_handle(), content)?;
        let root = tree.root_node();
        if root.has_error() {
            debug!("Syntax errors in {path}; keeping partial structure");
        }
        let mut types = Vec::new();
        let mut functions = Vec::new();
        self.visit(root, content, path, &mut types, &mut functions);
        Ok((file, types, functions))
    }

    fn get_imports(&self, content: &str) -> Vec<ImportStatement> {
        let tree = match parse_tree(&Self::language_handle(), content) {
            Ok(tree) => tree,
            Err(e) => {
                debug!("Import extraction skipped: {e}");
                return Vec::new();
            }
        };
        let root = tree.root_node();
        let mut cursor = root.walk();
        let imports = root
            .named_children(&mut cursor)
            .filter(|n| n.kind() == "import_declaration")
            .filter_map(|n| import_from_declaration(n, content))
            .collect();
        imports
    }

    fn calculate_complexity(&self, snippet: &str) -> i64 {
        match parse_tree(&Self::language_handle(), snippet) {
            Ok(tree) => 1 + count_decisions(tree.root_node(), &self.decision_kinds),
            Err(_) => 1,
        }
    }
}
