//! Structure-preserving code normalization and shape hashing.
//!
//! Two snippets hash equally when they differ only in local identifier
//! names, docstring text, comments or layout. Call names, attribute names,
//! declared type and function names, literals and control flow all stay in
//! the serialized tree, so changing any of them changes the hash.

use sha2::{Digest, Sha256};
use tree_sitter::TreeCursor;

use crate::indexer::parser::{node_text, parse_tree};

const PLACEHOLDER: &str = "VAR";
const NO_OP: &str = "(pass_statement)";

/// SHA-256 hex digest of the normalized shape of `code`. Code that does not
/// parse cleanly is hashed verbatim, so a hash is always produced.
pub fn normalize_and_hash(code: &str) -> String {
    match normalize(code) {
        Some(shape) => sha256_hex(shape.as_bytes()),
        None => sha256_hex(code.as_bytes()),
    }
}

/// Deterministic serialization of the normalized tree, or `None` when the
/// snippet has syntax errors.
pub fn normalize(code: &str) -> Option<String> {
    let source = dedent(code);
    let language: tree_sitter::Language = tree_sitter_python::LANGUAGE.into();
    let tree = parse_tree(&language, &source).ok()?;
    let root = tree.root_node();
    if root.has_error() {
        return None;
    }
    let mut out = String::with_capacity(source.len());
    let mut cursor = root.walk();
    emit(&mut cursor, &source, "", Scope::default(), &mut out);
    Some(out)
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Strip the indentation shared by every non-blank line, so method bodies
/// cut out of a class parse as top-level code.
fn dedent(code: &str) -> String {
    let indent = code
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);
    code.lines()
        .map(|line| line.get(indent..).unwrap_or_else(|| line.trim_start()))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Clone, Copy, Default)]
struct Scope {
    /// Inside a type annotation, superclass list or import path.
    declared_names: bool,
}

fn keeps_identifier(parent_kind: &str, field: Option<&str>) -> bool {
    matches!(
        (parent_kind, field),
        ("call", Some("function"))
            | ("attribute", Some("attribute"))
            | ("function_definition", Some("name"))
            | ("class_definition", Some("name"))
            | ("keyword_argument", Some("name"))
    ) || parent_kind == "decorator"
}

fn child_scope(kind: &str, field: Option<&str>, scope: Scope) -> Scope {
    let declared = scope.declared_names
        || kind == "type"
        || kind == "dotted_name"
        || kind == "import_statement"
        || kind == "import_from_statement"
        || (kind == "argument_list" && field == Some("superclasses"));
    Scope {
        declared_names: declared,
    }
}

fn is_docstring(node: tree_sitter::Node<'_>) -> bool {
    if node.kind() != "expression_statement" || node.named_child_count() == 0 {
        return false;
    }
    let mut cursor = node.walk();
    let all_strings = node
        .named_children(&mut cursor)
        .all(|child| matches!(child.kind(), "string" | "concatenated_string" | "comment"));
    all_strings
}

fn emit(cursor: &mut TreeCursor<'_>, source: &str, parent_kind: &str, scope: Scope, out: &mut String) {
    let node = cursor.node();
    let kind = node.kind();
    let field = cursor.field_name();

    if kind == "comment" {
        return;
    }
    if is_docstring(node) {
        out.push_str(NO_OP);
        return;
    }
    if kind == "identifier" {
        if scope.declared_names || keeps_identifier(parent_kind, field) {
            out.push_str(node_text(node, source));
        } else {
            out.push_str(PLACEHOLDER);
        }
        return;
    }
    if node.child_count() == 0 {
        if !node.is_named() {
            out.push('"');
            out.push_str(kind);
            out.push('"');
        } else if matches!(kind, "string_start" | "string_end") {
            // Quote style is layout, not shape.
            out.push('(');
            out.push_str(kind);
            out.push(')');
        } else {
            out.push('(');
            out.push_str(kind);
            out.push(' ');
            out.push_str(node_text(node, source));
            out.push(')');
        }
        return;
    }

    let inner = child_scope(kind, field, scope);
    out.push('(');
    out.push_str(kind);
    if cursor.goto_first_child() {
        loop {
            out.push(' ');
            emit(cursor, source, kind, inner, out);
            if !cursor.goto_next_sibling() {
                break;
            }
        }
        cursor.goto_parent();
    }
    out.push(')');
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGINAL: &str = "\
def total(items, tax=0):
    \"\"\"Add up every price.\"\"\"
    result = 0
    for item in items:
        if item.active:
            result += price(item, rate=tax)
    return result
";

    const RENAMED: &str = "\
def total(xs,   t = 0):
    '''Totally different words.'''
    acc = 0   # running sum


    for x in xs:
        if x.active:
              acc += price(x, rate=t)
    return acc
";

    #[test]
    fn renaming_and_layout_do_not_change_the_hash() {
        assert_eq!(normalize_and_hash(ORIGINAL), normalize_and_hash(RENAMED));
        assert_eq!(normalize_and_hash(ORIGINAL).len(), 64);
    }

    #[test]
    fn control_flow_changes_the_hash() {
        let changed = ORIGINAL.replace("for item in items:", "while items:");
        assert_ne!(normalize_and_hash(ORIGINAL), normalize_and_hash(&changed));
    }

    #[test]
    fn call_and_attribute_names_change_the_hash() {
        let call = ORIGINAL.replace("price(", "cost(");
        assert_ne!(normalize_and_hash(ORIGINAL), normalize_and_hash(&call));
        let attr = ORIGINAL.replace("item.active", "item.enabled");
        assert_ne!(normalize_and_hash(ORIGINAL), normalize_and_hash(&attr));
    }

    #[test]
    fn indented_method_bodies_normalize() {
        let method = "    def save(self, row):\n        self.db.insert(row)\n";
        let renamed = "    def save(self, record):\n        self.db.insert(record)\n";
        assert!(normalize(method).is_some());
        assert_eq!(normalize_and_hash(method), normalize_and_hash(renamed));
    }

    #[test]
    fn syntax_errors_fall_back_to_raw_text() {
        let broken = "def broken(:\n    return\n";
        assert!(normalize(broken).is_none());
        let hash = normalize_and_hash(broken);
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, sha256_hex(broken.as_bytes()));
    }

    #[test]
    fn docstring_becomes_a_no_op() {
        let shape = normalize("def f():\n    \"\"\"doc\"\"\"\n").unwrap();
        assert!(shape.contains(NO_OP));
        assert!(!shape.contains("doc"));
    }
}
