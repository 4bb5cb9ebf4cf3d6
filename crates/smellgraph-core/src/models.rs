//! Shared typed models used across parsing, storage, rules, and the ledger.

use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Graph constants
// ---------------------------------------------------------------------------

pub const RELATIONSHIP_IMPORTS: &str = "IMPORTS";
pub const RELATIONSHIP_DEFINES: &str = "DEFINES";
pub const RELATIONSHIP_CONTAINS: &str = "CONTAINS";

/// Stable key of a type or function record: `{file_path}::{name}`.
pub fn record_id(file_path: &str, name: &str) -> String {
    format!("{file_path}::{name}")
}

// ---------------------------------------------------------------------------
// 1. FileRecord
// ---------------------------------------------------------------------------

/// A single source file known to the graph.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    pub language: String,
    pub lines_of_code: i64,
}

// ---------------------------------------------------------------------------
// 2. TypeRecord
// ---------------------------------------------------------------------------

/// A class, interface, or enum declared in a file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeRecord {
    pub id: String,
    pub name: String,
    pub file_path: String,
    pub start_line: i64,
    pub end_line: i64,
    pub is_abstract: bool,
    pub method_count: i64,
}

impl TypeRecord {
    pub fn new(file_path: &str, name: &str, start_line: i64, end_line: i64) -> Self {
        Self {
            id: record_id(file_path, name),
            name: name.to_string(),
            file_path: file_path.to_string(),
            start_line,
            end_line,
            is_abstract: false,
            method_count: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// 3. FunctionRecord
// ---------------------------------------------------------------------------

/// A free function or a method. Methods are keyed by `Type.method` so two
/// types in one file may declare members with the same name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionRecord {
    pub id: String,
    pub name: String,
    pub file_path: String,
    pub start_line: i64,
    pub end_line: i64,
    pub cyclomatic_complexity: i64,
    /// Key of the owning [`TypeRecord`], if any.
    pub parent_type: Option<String>,
}

impl FunctionRecord {
    pub fn new(
        file_path: &str,
        name: &str,
        parent_type_name: Option<&str>,
        start_line: i64,
        end_line: i64,
    ) -> Self {
        let id = match parent_type_name {
            Some(owner) => record_id(file_path, &format!("{owner}.{name}")),
            None => record_id(file_path, name),
        };
        Self {
            id,
            name: name.to_string(),
            file_path: file_path.to_string(),
            start_line,
            end_line,
            cyclomatic_complexity: 1,
            parent_type: parent_type_name.map(|owner| record_id(file_path, owner)),
        }
    }
}

/// Give functions that share a key (overloads, constructors, property
/// accessors) distinct ids by appending `#<start_line>`. Unique keys are
/// left untouched.
pub fn disambiguate_function_ids(functions: &mut [FunctionRecord]) {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for function in functions.iter() {
        *counts.entry(function.id.clone()).or_default() += 1;
    }
    let mut taken = HashSet::new();
    for function in functions.iter_mut() {
        if counts.get(&function.id).copied().unwrap_or_default() > 1 {
            let base = format!("{}#{}", function.id, function.start_line);
            let mut id = base.clone();
            let mut ordinal = 1;
            while taken.contains(&id) {
                ordinal += 1;
                id = format!("{base}.{ordinal}");
            }
            function.id = id;
        }
        taken.insert(function.id.clone());
    }
}

// ---------------------------------------------------------------------------
// 4. Imports
// ---------------------------------------------------------------------------

/// One import statement as written in source: `(module_path, [names])`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportStatement {
    pub module_path: String,
    pub names: Vec<String>,
}

impl ImportStatement {
    pub fn new(module_path: impl Into<String>, names: Vec<String>) -> Self {
        Self {
            module_path: module_path.into(),
            names,
        }
    }
}

/// A resolved File -> File IMPORTS edge.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportEdge {
    pub source_path: String,
    pub target_path: String,
    pub imported_names: Vec<String>,
}

/// Everything a parser extracts from one file.
#[derive(Clone, Debug)]
pub struct ParsedFile {
    pub file: FileRecord,
    pub types: Vec<TypeRecord>,
    pub functions: Vec<FunctionRecord>,
    pub imports: Vec<ImportStatement>,
}

// ---------------------------------------------------------------------------
// 5. Violations
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rule finding for one item in one file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub id: String,
    pub rule_name: String,
    pub severity: Severity,
    pub file_path: String,
    pub line_number: i64,
    pub code_snippet: String,
    pub message: String,
    pub context: Option<String>,
}

impl Violation {
    pub fn new(
        rule_name: &str,
        severity: Severity,
        file_path: &str,
        line_number: i64,
        code_snippet: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            rule_name: rule_name.to_string(),
            severity,
            file_path: file_path.to_string(),
            line_number,
            code_snippet: code_snippet.into(),
            message: message.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// Per-signal breakdown of a single-responsibility evaluation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SrpScoreBreakdown {
    pub total: f64,
    pub semantic: f64,
    pub dependency: f64,
    pub naming: f64,
    pub method_count_score: f64,
    pub num_methods: usize,
    pub num_semantic_clusters: usize,
    pub num_dependency_concerns: usize,
    pub num_naming_categories: usize,
    pub layer_violations: Vec<String>,
}

// ---------------------------------------------------------------------------
// 6. Ledger records
// ---------------------------------------------------------------------------

/// A stored violation. Immutable once written, except for `ignored`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LedgerViolation {
    pub id: String,
    pub project_path: String,
    pub rule_name: String,
    pub severity: Severity,
    pub file_path: String,
    pub line_number: i64,
    pub code_snippet: String,
    pub snippet_hash: String,
    pub message: String,
    pub context: Option<String>,
    pub embedding: Vec<f32>,
    pub timestamp: DateTime<Utc>,
    pub ignored: bool,
}

/// A user decision to ignore one code shape.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SuppressionRecord {
    pub id: String,
    pub violation_id: String,
    pub snippet_hash: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    pub invalidated: bool,
    pub invalidation_reason: Option<String>,
}

impl SuppressionRecord {
    pub fn is_active(&self) -> bool {
        !self.invalidated
    }
}
