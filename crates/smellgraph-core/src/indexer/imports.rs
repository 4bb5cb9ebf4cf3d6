//! Import resolution from module paths to project files.
//!
//! Only absolute dotted paths are resolved. Relative imports and anything
//! that does not map onto a scanned file are dropped.

use std::collections::HashSet;
use std::path::Path;

use indexmap::IndexMap;

use crate::models::{ImportEdge, ImportStatement};

fn candidates_for(module_path: &str, source_extension: &str) -> Vec<String> {
    let base = module_path.replace('.', "/");
    match source_extension {
        ".py" => vec![format!("{base}.py"), format!("{base}/__init__.py")],
        ext => vec![format!("{base}{ext}")],
    }
}

/// Map a dotted module path onto a known project file.
pub fn resolve_module(
    module_path: &str,
    source_extension: &str,
    known_files: &HashSet<String>,
) -> Option<String> {
    let module = module_path.trim();
    if module.is_empty() || module.starts_with('.') {
        return None;
    }
    candidates_for(module, source_extension)
        .into_iter()
        .find(|c| known_files.contains(c))
}

/// Resolve a file's import statements into IMPORTS edges. Statements that
/// land on the same target are merged; self-imports are dropped.
pub fn resolve_imports(
    source_path: &str,
    imports: &[ImportStatement],
    known_files: &HashSet<String>,
) -> Vec<ImportEdge> {
    let source_extension = Path::new(source_path)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default();

    let mut by_target: IndexMap<String, Vec<String>> = IndexMap::new();
    for import in imports {
        let target = match resolve_module(&import.module_path, &source_extension, known_files) {
            Some(t) => t,
            None => continue,
        };
        if target == source_path {
            continue;
        }
        let names = by_target.entry(target).or_default();
        for name in &import.names {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
    }

    by_target
        .into_iter()
        .map(|(target_path, imported_names)| ImportEdge {
            source_path: source_path.to_string(),
            target_path,
            imported_names,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known(paths: &[&str]) -> HashSet<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn python_modules_resolve_to_files_or_packages() {
        let files = known(&["app/db.py", "app/services/__init__.py"]);
        assert_eq!(
            resolve_module("app.db", ".py", &files),
            Some("app/db.py".to_string())
        );
        assert_eq!(
            resolve_module("app.services", ".py", &files),
            Some("app/services/__init__.py".to_string())
        );
        assert_eq!(resolve_module("requests", ".py", &files), None);
        assert_eq!(resolve_module(".db", ".py", &files), None);
    }

    #[test]
    fn java_types_resolve_by_package_path() {
        let files = known(&["com/shop/Order.java"]);
        assert_eq!(
            resolve_module("com.shop.Order", ".java", &files),
            Some("com/shop/Order.java".to_string())
        );
        assert_eq!(resolve_module("com.shop", ".java", &files), None);
    }

    #[test]
    fn resolve_imports_merges_names_and_drops_unresolved() {
        let files = known(&["app/db.py", "app/main.py"]);
        let imports = vec![
            ImportStatement::new("app.db", vec!["Session".to_string()]),
            ImportStatement::new("app.db", vec!["engine".to_string(), "Session".to_string()]),
            ImportStatement::new("sqlalchemy", vec!["sqlalchemy".to_string()]),
            ImportStatement::new("app.main", vec!["run".to_string()]),
        ];
        let edges = resolve_imports("app/main.py", &imports, &files);
        assert_eq!(
            edges,
            vec![ImportEdge {
                source_path: "app/main.py".to_string(),
                target_path: "app/db.py".to_string(),
                imported_names: vec!["Session".to_string(), "engine".to_string()],
            }]
        );
    }
}
