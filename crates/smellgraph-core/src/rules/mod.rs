//! Pluggable violation rules and the engine that runs them.

pub mod srp;
pub mod threshold;

use std::sync::Arc;

use tracing::warn;

use crate::config::AnalysisConfig;
use crate::embedding::Embedder;
use crate::errors::SmellResult;
use crate::models::{FunctionRecord, ImportStatement, ParsedFile, TypeRecord, Violation};

pub use srp::SrpRule;
pub use threshold::{ComplexityMetric, GodObjectMetric, ThresholdMetric, ThresholdRule};

// ---------------------------------------------------------------------------
// Rule context
// ---------------------------------------------------------------------------

/// Which item list of a [`RuleContext`] a rule walks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextKey {
    Functions,
    Types,
}

impl ContextKey {
    pub fn label(&self) -> &'static str {
        match self {
            ContextKey::Functions => "Functions",
            ContextKey::Types => "Classes",
        }
    }
}

#[derive(Clone, Debug)]
pub struct TypeItem {
    pub record: TypeRecord,
    pub method_names: Vec<String>,
    pub source: Option<String>,
}

#[derive(Clone, Debug)]
pub struct FunctionItem {
    pub record: FunctionRecord,
    pub source: Option<String>,
}

/// Everything a rule may look at for one file.
#[derive(Clone, Debug, Default)]
pub struct RuleContext {
    pub file_path: String,
    pub types: Vec<TypeItem>,
    pub functions: Vec<FunctionItem>,
    pub imports: Vec<ImportStatement>,
}

impl RuleContext {
    pub fn new(file_path: &str) -> Self {
        Self {
            file_path: file_path.to_string(),
            ..Self::default()
        }
    }

    /// Build a context from stored records plus the file text.
    pub fn from_records(
        file_path: &str,
        types: Vec<TypeRecord>,
        functions: Vec<FunctionRecord>,
        imports: Vec<ImportStatement>,
        source: Option<&str>,
    ) -> Self {
        let type_items = types
            .into_iter()
            .map(|record| {
                let method_names = functions
                    .iter()
                    .filter(|f| f.parent_type.as_deref() == Some(record.id.as_str()))
                    .map(|f| f.name.clone())
                    .collect();
                let source = source.map(|text| slice_lines(text, record.start_line, record.end_line));
                TypeItem {
                    record,
                    method_names,
                    source,
                }
            })
            .collect();
        let function_items = functions
            .into_iter()
            .map(|record| {
                let source = source.map(|text| slice_lines(text, record.start_line, record.end_line));
                FunctionItem { record, source }
            })
            .collect();
        Self {
            file_path: file_path.to_string(),
            types: type_items,
            functions: function_items,
            imports,
        }
    }

    pub fn from_parsed(parsed: &ParsedFile, source: &str) -> Self {
        Self::from_records(
            &parsed.file.path,
            parsed.types.clone(),
            parsed.functions.clone(),
            parsed.imports.clone(),
            Some(source),
        )
    }

    pub fn import_modules(&self) -> Vec<String> {
        self.imports.iter().map(|i| i.module_path.clone()).collect()
    }
}

/// Lines `start..=end` (1-based) of `text`.
pub fn slice_lines(text: &str, start: i64, end: i64) -> String {
    let skip = (start.max(1) - 1) as usize;
    let take = (end - start.max(1) + 1).max(0) as usize;
    text.lines().skip(skip).take(take).collect::<Vec<_>>().join("\n")
}

// ---------------------------------------------------------------------------
// Rule trait and engine
// ---------------------------------------------------------------------------

pub trait Rule: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> String;

    fn analyze(&self, file_path: &str, context: &RuleContext) -> SmellResult<Vec<Violation>>;
}

/// Runs every registered rule against a file. A failing rule is logged and
/// skipped; the others still run.
#[derive(Default)]
pub struct RuleEngine {
    rules: Vec<Box<dyn Rule>>,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Complexity, god-object and SRP rules configured from `config`.
    pub fn from_config(config: &AnalysisConfig, embedder: Arc<dyn Embedder>) -> Self {
        let mut engine = Self::new();
        engine.register(Box::new(ThresholdRule::new(
            ComplexityMetric,
            config.complexity_threshold,
        )));
        engine.register(Box::new(ThresholdRule::new(
            GodObjectMetric,
            config.god_object_threshold,
        )));
        engine.register(Box::new(SrpRule::from_config(config, embedder)));
        engine
    }

    pub fn register(&mut self, rule: Box<dyn Rule>) {
        self.rules.push(rule);
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn run(&self, file_path: &str, context: &RuleContext) -> Vec<Violation> {
        let mut violations = Vec::new();
        for rule in &self.rules {
            match rule.analyze(file_path, context) {
                Ok(found) => violations.extend(found),
                Err(e) => warn!("Rule {} failed on {file_path}: {e}", rule.name()),
            }
        }
        violations
    }
}
