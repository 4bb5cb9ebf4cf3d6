//! Per-file review: rules over the stored graph, routed through the ledger.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::errors::SmellResult;
use crate::ledger::Ledger;
use crate::models::{FunctionRecord, ImportStatement, LedgerViolation, TypeRecord, Violation};
use crate::rules::{RuleContext, RuleEngine};
use crate::store::graph::{row_i64, row_names, row_opt_str, row_str, GraphStore};

/// Outcome of reviewing one file.
#[derive(Clone, Debug, Default)]
pub struct ReviewReport {
    pub file_path: String,
    /// Newly recorded in the ledger.
    pub fresh: Vec<LedgerViolation>,
    /// Same rule and shape already on record; not stored again.
    pub cached: Vec<LedgerViolation>,
    /// Shape is under an active suppression.
    pub suppressed: Vec<Violation>,
}

impl ReviewReport {
    /// Findings the caller should surface.
    pub fn reportable(&self) -> impl Iterator<Item = &LedgerViolation> {
        self.fresh.iter().chain(self.cached.iter())
    }
}

/// Structural records of one file as currently stored in the graph.
pub fn load_context(
    store: &dyn GraphStore,
    file_path: &str,
    source: Option<&str>,
) -> SmellResult<RuleContext> {
    let path = [Value::from(file_path)];

    let types = store
        .query(
            "SELECT id, name, file_path, start_line, end_line, is_abstract, method_count \
             FROM types WHERE file_path = ?1 ORDER BY start_line, id;",
            &path,
        )?
        .iter()
        .map(|row| {
            Ok(TypeRecord {
                id: row_str(row, "id")?,
                name: row_str(row, "name")?,
                file_path: row_str(row, "file_path")?,
                start_line: row_i64(row, "start_line")?,
                end_line: row_i64(row, "end_line")?,
                is_abstract: row_i64(row, "is_abstract")? != 0,
                method_count: row_i64(row, "method_count")?,
            })
        })
        .collect::<SmellResult<Vec<_>>>()?;

    let functions = store
        .query(
            "SELECT id, name, file_path, start_line, end_line, cyclomatic_complexity, parent_type \
             FROM functions WHERE file_path = ?1 ORDER BY start_line, id;",
            &path,
        )?
        .iter()
        .map(|row| {
            Ok(FunctionRecord {
                id: row_str(row, "id")?,
                name: row_str(row, "name")?,
                file_path: row_str(row, "file_path")?,
                start_line: row_i64(row, "start_line")?,
                end_line: row_i64(row, "end_line")?,
                cyclomatic_complexity: row_i64(row, "cyclomatic_complexity")?,
                parent_type: row_opt_str(row, "parent_type"),
            })
        })
        .collect::<SmellResult<Vec<_>>>()?;

    let imports = store
        .query(
            "SELECT module_path, imported_names FROM file_imports \
             WHERE file_path = ?1 ORDER BY position;",
            &path,
        )?
        .iter()
        .map(|row| {
            Ok(ImportStatement::new(
                row_str(row, "module_path")?,
                row_names(row, "imported_names"),
            ))
        })
        .collect::<SmellResult<Vec<_>>>()?;

    Ok(RuleContext::from_records(file_path, types, functions, imports, source))
}

pub struct Reviewer {
    store: Arc<dyn GraphStore>,
    engine: RuleEngine,
    ledger: Arc<Ledger>,
    project_path: String,
}

impl Reviewer {
    pub fn new(
        store: Arc<dyn GraphStore>,
        engine: RuleEngine,
        ledger: Arc<Ledger>,
        project_path: &str,
    ) -> Self {
        Self {
            store,
            engine,
            ledger,
            project_path: project_path.to_string(),
        }
    }

    pub fn engine(&self) -> &RuleEngine {
        &self.engine
    }

    /// Run every rule on a stored file and sort the findings by ledger state.
    pub fn review_file(&self, file_path: &str, source: &str) -> SmellResult<ReviewReport> {
        let context = load_context(self.store.as_ref(), file_path, Some(source))?;
        let mut report = ReviewReport {
            file_path: file_path.to_string(),
            ..ReviewReport::default()
        };

        for violation in self.engine.run(file_path, &context) {
            if self.ledger.is_ignored(&violation.code_snippet)? {
                debug!("Suppressed {} at {file_path}:{}", violation.rule_name, violation.line_number);
                report.suppressed.push(violation);
                continue;
            }
            let known = self
                .ledger
                .cache()
                .get_cached_rule_violation(&violation.code_snippet, &violation.rule_name)?;
            match known {
                Some(record) => report.cached.push(record),
                None => {
                    let record = self.ledger.store_violation(&self.project_path, &violation)?;
                    report.fresh.push(record);
                }
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::embedding::HashingEmbedder;
    use crate::indexer::parser::ParserRegistry;
    use crate::ledger::SqliteLedger;
    use crate::models::Severity;
    use crate::store::graph::SqliteGraphStore;

    const BUSY: &str = "\
import json

def busy(a, b):
    if a:
        pass
    if b:
        pass
    for x in a:
        pass
    return json.dumps(a)
";

    fn reviewer(store: Arc<SqliteGraphStore>) -> (Arc<Ledger>, Reviewer) {
        let embedder = Arc::new(HashingEmbedder::new(16));
        let config = AnalysisConfig {
            complexity_threshold: 2,
            ..AnalysisConfig::default()
        };
        let ledger = Arc::new(Ledger::new(
            Arc::new(SqliteLedger::open_in_memory().unwrap()),
            embedder.clone(),
        ));
        let engine = RuleEngine::from_config(&config, embedder);
        let reviewer = Reviewer::new(store, engine, ledger.clone(), "/proj");
        (ledger, reviewer)
    }

    fn index(store: &SqliteGraphStore, path: &str, source: &str) {
        let registry = ParserRegistry::with_defaults();
        let parser = registry.for_extension(".py").unwrap();
        store.replace_file(&parser.parse(path, source).unwrap(), &[]).unwrap();
    }

    #[test]
    fn context_is_rebuilt_from_the_store() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        index(&store, "svc.py", BUSY);
        let ctx = load_context(&store, "svc.py", Some(BUSY)).unwrap();
        assert_eq!(ctx.functions.len(), 1);
        assert_eq!(ctx.functions[0].record.cyclomatic_complexity, 4);
        assert!(ctx.functions[0].source.as_deref().unwrap().starts_with("def busy"));
        assert_eq!(ctx.import_modules(), vec!["json"]);
    }

    #[test]
    fn findings_move_from_fresh_to_cached_to_suppressed() {
        let store = Arc::new(SqliteGraphStore::open_in_memory().unwrap());
        index(&store, "svc.py", BUSY);
        let (ledger, reviewer) = reviewer(store.clone());

        let first = reviewer.review_file("svc.py", BUSY).unwrap();
        assert_eq!(first.fresh.len(), 1);
        assert_eq!(first.fresh[0].rule_name, "COMPLEXITY");
        assert_eq!(first.fresh[0].severity, Severity::Medium);

        let second = reviewer.review_file("svc.py", BUSY).unwrap();
        assert!(second.fresh.is_empty());
        assert_eq!(second.cached.len(), 1);
        assert_eq!(second.reportable().count(), 1);

        let recorded = &first.fresh[0];
        ledger
            .ignore_violation(&recorded.id, &recorded.code_snippet, "legacy hot path")
            .unwrap();
        let third = reviewer.review_file("svc.py", BUSY).unwrap();
        assert_eq!(third.suppressed.len(), 1);
        assert_eq!(third.reportable().count(), 0);
        // Still on record.
        assert_eq!(ledger.violations_by_hash(&recorded.snippet_hash).unwrap().len(), 1);

        let edited = BUSY.replace("for x in a:", "while a:");
        let edited_fn = recorded.code_snippet.replace("for x in a:", "while a:");
        assert!(ledger
            .invalidate_if_changed(&recorded.code_snippet, &edited_fn, None)
            .unwrap());
        index(&store, "svc.py", &edited);
        let fourth = reviewer.review_file("svc.py", &edited).unwrap();
        assert!(fourth.suppressed.is_empty());
        assert_eq!(fourth.fresh.len(), 1);
    }
}
