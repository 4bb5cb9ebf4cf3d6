//! Method-name verb categories and their dispersion.

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;

pub const VERB_CATEGORIES: &[(&str, &[&str])] = &[
    (
        "data",
        &[
            "create", "read", "get", "fetch", "update", "delete", "save", "load", "insert",
            "remove", "find", "query",
        ],
    ),
    (
        "validation",
        &["validate", "check", "verify", "ensure", "assert", "test", "confirm"],
    ),
    (
        "transformation",
        &[
            "convert", "transform", "map", "serialize", "deserialize", "parse", "format",
            "encode", "decode",
        ],
    ),
    (
        "communication",
        &[
            "send", "fetch", "notify", "publish", "subscribe", "request", "respond", "emit",
            "broadcast",
        ],
    ),
    (
        "calculation",
        &["calculate", "compute", "sum", "count", "average", "process", "analyze"],
    ),
    (
        "orchestration",
        &["execute", "run", "perform", "handle", "manage", "coordinate", "dispatch"],
    ),
];

static CAMEL_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]+|[A-Z][a-z]*").unwrap());

/// Leading verb of a method name, lowercased.
pub fn extract_verb(method_name: &str) -> String {
    if method_name.contains('_') {
        return method_name
            .split('_')
            .next()
            .unwrap_or_default()
            .to_lowercase();
    }
    match CAMEL_WORD_RE.find(method_name) {
        Some(word) => word.as_str().to_lowercase(),
        None => method_name.to_lowercase(),
    }
}

pub fn categorize_verb(verb: &str) -> Option<&'static str> {
    VERB_CATEGORIES
        .iter()
        .find(|(_, verbs)| verbs.contains(&verb))
        .map(|(category, _)| *category)
}

/// Number of methods per verb category; unknown verbs are not counted.
pub fn extract_verb_categories(method_names: &[String]) -> IndexMap<&'static str, usize> {
    let mut counts = IndexMap::new();
    for name in method_names {
        if let Some(category) = categorize_verb(&extract_verb(name)) {
            *counts.entry(category).or_insert(0) += 1;
        }
    }
    counts
}

/// Dispersion of the category distribution in `[0, 1]`.
///
/// Uses `1 - Σ p^1.5`, scaled so an even spread over all six categories
/// scores 1.0. One category scores 0.0.
pub fn naming_diversity(counts: &IndexMap<&'static str, usize>) -> f64 {
    let total: usize = counts.values().sum();
    if counts.len() <= 1 || total == 0 {
        return 0.0;
    }
    let concentration: f64 = counts
        .values()
        .map(|count| (*count as f64 / total as f64).powf(1.5))
        .sum();
    let ceiling = 1.0 - 1.0 / (VERB_CATEGORIES.len() as f64).sqrt();
    ((1.0 - concentration) / ceiling).clamp(0.0, 1.0)
}
