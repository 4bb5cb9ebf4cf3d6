//! Shape-addressed violation ledger with suppressions.
//!
//! Every stored violation is keyed by the hash of its code shape. A
//! suppression silences one shape until an edit changes that shape, at
//! which point it is invalidated for good.

pub mod cache;
pub mod normalize;
pub mod store;

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::embedding::Embedder;
use crate::errors::{SmellError, SmellResult};
use crate::models::{LedgerViolation, SuppressionRecord, Violation};

pub use cache::CacheManager;
pub use normalize::normalize_and_hash;
pub use store::{LedgerStore, SqliteLedger};

pub const DEFAULT_INVALIDATION_REASON: &str = "Code structure changed";

pub struct Ledger {
    store: Arc<dyn LedgerStore>,
    cache: CacheManager,
    embedder: Arc<dyn Embedder>,
}

impl Ledger {
    pub fn new(store: Arc<dyn LedgerStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            cache: CacheManager::new(store.clone()),
            store,
            embedder,
        }
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    /// Append a ledger record for `violation`. An unavailable embedder
    /// stores an empty vector rather than failing the write.
    pub fn store_violation(
        &self,
        project_path: &str,
        violation: &Violation,
    ) -> SmellResult<LedgerViolation> {
        let snippet_hash = normalize_and_hash(&violation.code_snippet);
        let text = format!(
            "{}: {}\n\n{}",
            violation.rule_name, violation.message, violation.code_snippet
        );
        let embedding = match self.embedder.embed(&text) {
            Ok(vector) => vector,
            Err(e) => {
                warn!("Storing {} without embedding: {e}", violation.id);
                Vec::new()
            }
        };

        let record = LedgerViolation {
            id: violation.id.clone(),
            project_path: project_path.to_string(),
            rule_name: violation.rule_name.clone(),
            severity: violation.severity,
            file_path: violation.file_path.clone(),
            line_number: violation.line_number,
            code_snippet: violation.code_snippet.clone(),
            snippet_hash,
            message: violation.message.clone(),
            context: violation.context.clone(),
            embedding,
            timestamp: Utc::now(),
            ignored: false,
        };
        self.store.add_violation(&record)?;
        debug!("Stored {} for {}:{}", record.rule_name, record.file_path, record.line_number);
        Ok(record)
    }

    /// Suppress the shape of `code` on behalf of a stored violation.
    pub fn ignore_violation(
        &self,
        violation_id: &str,
        code: &str,
        reason: &str,
    ) -> SmellResult<SuppressionRecord> {
        if self.store.violation_by_id(violation_id)?.is_none() {
            return Err(SmellError::query(format!("unknown violation id {violation_id}")));
        }
        let suppression = SuppressionRecord {
            id: uuid::Uuid::new_v4().to_string(),
            violation_id: violation_id.to_string(),
            snippet_hash: normalize_and_hash(code),
            reason: reason.to_string(),
            timestamp: Utc::now(),
            invalidated: false,
            invalidation_reason: None,
        };
        self.store.add_suppression(&suppression)?;
        info!("Suppressed violation {violation_id}: {reason}");
        Ok(suppression)
    }

    pub fn invalidate_if_changed(
        &self,
        old_code: &str,
        new_code: &str,
        reason: Option<&str>,
    ) -> SmellResult<bool> {
        self.cache.invalidate_if_changed(
            old_code,
            new_code,
            reason.unwrap_or(DEFAULT_INVALIDATION_REASON),
        )
    }

    pub fn is_ignored(&self, code: &str) -> SmellResult<bool> {
        self.cache.is_ignored(code)
    }

    pub fn get_cached_violation(&self, code: &str) -> SmellResult<Option<LedgerViolation>> {
        self.cache.get_cached_violation(code)
    }

    pub fn get_project_violations(&self, project_path: &str) -> SmellResult<Vec<LedgerViolation>> {
        self.store.project_violations(project_path)
    }

    pub fn violations_by_hash(&self, snippet_hash: &str) -> SmellResult<Vec<LedgerViolation>> {
        self.store.violations_by_hash(snippet_hash)
    }

    pub fn suppressions_by_hash(&self, snippet_hash: &str) -> SmellResult<Vec<SuppressionRecord>> {
        self.store.suppressions_by_hash(snippet_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use crate::models::Severity;

    const CODE: &str = "\
def pay(order):
    if order.total > 0:
        charge(order.card, order.total)
";

    fn ledger() -> Ledger {
        Ledger::new(
            Arc::new(SqliteLedger::open_in_memory().unwrap()),
            Arc::new(HashingEmbedder::new(32)),
        )
    }

    fn finding(code: &str) -> Violation {
        Violation::new("COMPLEXITY", Severity::Medium, "pay.py", 1, code, "Function 'pay' is complex")
    }

    #[test]
    fn store_appends_independent_records() {
        let ledger = ledger();
        let first = ledger.store_violation("/p", &finding(CODE)).unwrap();
        let second = ledger.store_violation("/p", &finding(CODE)).unwrap();
        assert_eq!(first.snippet_hash, second.snippet_hash);
        assert_ne!(first.id, second.id);
        assert_eq!(first.embedding.len(), 32);
        assert_eq!(ledger.violations_by_hash(&first.snippet_hash).unwrap().len(), 2);
        assert_eq!(ledger.get_project_violations("/p").unwrap()[0].id, second.id);
        assert_eq!(ledger.get_cached_violation(CODE).unwrap().unwrap().id, second.id);
    }

    #[test]
    fn ignore_then_edit_invalidates() {
        let ledger = ledger();
        let stored = ledger.store_violation("/p", &finding(CODE)).unwrap();
        ledger.ignore_violation(&stored.id, CODE, "known").unwrap();
        assert!(ledger.is_ignored(CODE).unwrap());

        // Same shape: suppression survives.
        let renamed = CODE.replace("order", "o");
        assert!(!ledger.invalidate_if_changed(CODE, &renamed, None).unwrap());
        assert!(ledger.is_ignored(CODE).unwrap());

        let edited = CODE.replace("charge(", "refund(");
        assert!(ledger.invalidate_if_changed(CODE, &edited, None).unwrap());
        assert!(!ledger.is_ignored(CODE).unwrap());

        let history = ledger.suppressions_by_hash(&stored.snippet_hash).unwrap();
        assert_eq!(
            history[0].invalidation_reason.as_deref(),
            Some(DEFAULT_INVALIDATION_REASON)
        );
    }

    #[test]
    fn suppressed_record_stays_queryable() {
        let ledger = ledger();
        let stored = ledger.store_violation("/p", &finding(CODE)).unwrap();
        ledger.ignore_violation(&stored.id, CODE, "known").unwrap();
        let records = ledger.violations_by_hash(&stored.snippet_hash).unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].ignored);
    }

    #[test]
    fn ignoring_unknown_violation_is_an_error() {
        let ledger = ledger();
        assert!(matches!(
            ledger.ignore_violation("nope", CODE, "x"),
            Err(SmellError::Query(_))
        ));
    }
}
