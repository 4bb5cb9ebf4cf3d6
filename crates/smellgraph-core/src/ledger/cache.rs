//! Hash-keyed lookups over a ledger store.

use std::sync::Arc;

use tracing::info;

use super::normalize::normalize_and_hash;
use super::store::LedgerStore;
use crate::errors::SmellResult;
use crate::models::LedgerViolation;

/// Answers "have we seen this shape before" questions. A miss is `None`,
/// never an error.
#[derive(Clone)]
pub struct CacheManager {
    store: Arc<dyn LedgerStore>,
}

impl CacheManager {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub fn get_cached_violation(&self, code: &str) -> SmellResult<Option<LedgerViolation>> {
        self.store.latest_by_hash(&normalize_and_hash(code))
    }

    pub fn get_cached_rule_violation(
        &self,
        code: &str,
        rule_name: &str,
    ) -> SmellResult<Option<LedgerViolation>> {
        self.store
            .latest_by_hash_and_rule(&normalize_and_hash(code), rule_name)
    }

    pub fn is_ignored(&self, code: &str) -> SmellResult<bool> {
        Ok(self
            .store
            .active_suppression(&normalize_and_hash(code))?
            .is_some())
    }

    /// Invalidate suppressions of the old shape when the edit changed it.
    /// Returns whether anything was invalidated.
    pub fn invalidate_if_changed(
        &self,
        old_code: &str,
        new_code: &str,
        reason: &str,
    ) -> SmellResult<bool> {
        let old_hash = normalize_and_hash(old_code);
        if old_hash == normalize_and_hash(new_code) {
            return Ok(false);
        }
        let invalidated = self.store.invalidate_suppressions(&old_hash, reason)?;
        if invalidated > 0 {
            info!("Invalidated {invalidated} suppression(s) for changed shape {old_hash}");
        }
        Ok(invalidated > 0)
    }
}
