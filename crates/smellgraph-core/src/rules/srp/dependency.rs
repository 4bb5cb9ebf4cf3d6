//! Import concern-domain classification and hard layering checks.

use indexmap::IndexMap;

/// Fixed concern domains, checked in order; the first keyword hit wins.
pub const CONCERN_PATTERNS: &[(&str, &[&str])] = &[
    (
        "persistence",
        &["db", "database", "sql", "orm", "repository", "dao", "model", "entity"],
    ),
    (
        "communication",
        &["http", "requests", "api", "client", "socket", "email", "smtp", "webhook"],
    ),
    (
        "serialization",
        &["json", "xml", "yaml", "pickle", "serialize", "marshal"],
    ),
    (
        "validation",
        &["validator", "schema", "pydantic", "marshmallow", "cerberus"],
    ),
    ("logging", &["logging", "logger", "log"]),
    ("caching", &["cache", "redis", "memcached"]),
    ("file-io", &["file", "path", "io", "os.path"]),
    ("datetime", &["datetime", "time", "timezone"]),
    (
        "security",
        &["auth", "jwt", "bcrypt", "hash", "crypto", "security"],
    ),
];

const INFRASTRUCTURE_MARKERS: &[&str] = &["infra", "infrastructure", "repository", "service"];
const DATABASE_DRIVERS: &[&str] = &["sqlalchemy", "psycopg", "pymongo", "mysql"];
const MAX_LISTED_IMPORTS: usize = 3;

pub fn classify_import(module: &str) -> Option<&'static str> {
    let lower = module.to_lowercase();
    CONCERN_PATTERNS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(domain, _)| *domain)
}

/// Count of imports per concern domain, in first-seen order.
pub fn analyze_imports(imports: &[String]) -> IndexMap<&'static str, usize> {
    let mut counts = IndexMap::new();
    for module in imports {
        if let Some(domain) = classify_import(module) {
            *counts.entry(domain).or_insert(0) += 1;
        }
    }
    counts
}

pub fn dependency_diversity(num_concerns: usize) -> f64 {
    match num_concerns {
        0 | 1 => 0.0,
        2 => 0.3,
        3 => 0.6,
        n => (0.6 + (n - 3) as f64 * 0.1).min(1.0),
    }
}

fn matching<'a>(imports: &'a [String], markers: &[&str]) -> Vec<&'a str> {
    imports
        .iter()
        .filter(|module| {
            let lower = module.to_lowercase();
            markers.iter().any(|m| lower.contains(m))
        })
        .map(String::as_str)
        .collect()
}

/// Hard layering violations for a file, each as a readable description.
pub fn check_layer_violations(file_path: &str, imports: &[String]) -> Vec<String> {
    let mut violations = Vec::new();
    let path = file_path.to_lowercase();

    if path.contains("domain") || path.contains("entity") {
        let hits = matching(imports, INFRASTRUCTURE_MARKERS);
        if !hits.is_empty() {
            violations.push(format!(
                "Domain layer imports from infrastructure: {}",
                hits.iter().take(MAX_LISTED_IMPORTS).copied().collect::<Vec<_>>().join(", ")
            ));
        }
    }

    if path.contains("controller") {
        let hits = matching(imports, DATABASE_DRIVERS);
        if !hits.is_empty() {
            violations.push(format!(
                "Controller imports database directly: {}",
                hits.iter().take(MAX_LISTED_IMPORTS).copied().collect::<Vec<_>>().join(", ")
            ));
        }
    }

    violations
}
