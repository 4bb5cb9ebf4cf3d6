//! Ledger store contract and its SQLite implementation.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::errors::{SmellError, SmellResult};
use crate::models::{LedgerViolation, Severity, SuppressionRecord};
use crate::store::schema;

/// Append-mostly violation and suppression storage.
pub trait LedgerStore: Send + Sync {
    /// Append a record. Records sharing a hash are kept side by side.
    fn add_violation(&self, violation: &LedgerViolation) -> SmellResult<()>;

    /// Most recently stored record with this hash.
    fn latest_by_hash(&self, snippet_hash: &str) -> SmellResult<Option<LedgerViolation>>;

    /// Most recent record with this hash for a given rule.
    fn latest_by_hash_and_rule(
        &self,
        snippet_hash: &str,
        rule_name: &str,
    ) -> SmellResult<Option<LedgerViolation>>;

    /// All records with this hash, newest first.
    fn violations_by_hash(&self, snippet_hash: &str) -> SmellResult<Vec<LedgerViolation>>;

    fn violation_by_id(&self, id: &str) -> SmellResult<Option<LedgerViolation>>;

    /// All records for a project, newest first.
    fn project_violations(&self, project_path: &str) -> SmellResult<Vec<LedgerViolation>>;

    /// Store a suppression and flag its violation ignored, atomically.
    fn add_suppression(&self, suppression: &SuppressionRecord) -> SmellResult<()>;

    fn active_suppression(&self, snippet_hash: &str) -> SmellResult<Option<SuppressionRecord>>;

    fn suppressions_by_hash(&self, snippet_hash: &str) -> SmellResult<Vec<SuppressionRecord>>;

    /// Invalidate every active suppression for a hash and clear `ignored` on
    /// violations left without one. Returns the number invalidated.
    fn invalidate_suppressions(&self, snippet_hash: &str, reason: &str) -> SmellResult<usize>;
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

const VIOLATION_COLUMNS: &str = "id, project_path, rule_name, severity, file_path, line_number, \
     code_snippet, snippet_hash, message, context, embedding, created_at, ignored";

const SUPPRESSION_COLUMNS: &str =
    "id, violation_id, snippet_hash, reason, created_at, invalidated, invalidation_reason";

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

fn violation_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<LedgerViolation> {
    let severity: String = row.get(3)?;
    let embedding: String = row.get(10)?;
    let created_at: String = row.get(11)?;
    Ok(LedgerViolation {
        id: row.get(0)?,
        project_path: row.get(1)?,
        rule_name: row.get(2)?,
        severity: Severity::parse(&severity).unwrap_or(Severity::Low),
        file_path: row.get(4)?,
        line_number: row.get(5)?,
        code_snippet: row.get(6)?,
        snippet_hash: row.get(7)?,
        message: row.get(8)?,
        context: row.get(9)?,
        embedding: serde_json::from_str(&embedding).unwrap_or_default(),
        timestamp: parse_timestamp(&created_at),
        ignored: row.get::<_, i64>(12)? != 0,
    })
}

fn suppression_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SuppressionRecord> {
    let created_at: String = row.get(4)?;
    Ok(SuppressionRecord {
        id: row.get(0)?,
        violation_id: row.get(1)?,
        snippet_hash: row.get(2)?,
        reason: row.get(3)?,
        timestamp: parse_timestamp(&created_at),
        invalidated: row.get::<_, i64>(5)? != 0,
        invalidation_reason: row.get(6)?,
    })
}

// ---------------------------------------------------------------------------
// SqliteLedger
// ---------------------------------------------------------------------------

pub struct SqliteLedger {
    db_path: Option<PathBuf>,
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    pub fn open(db_path: &Path) -> SmellResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
        schema::init_ledger_schema(&conn)?;
        Ok(Self {
            db_path: Some(db_path.to_path_buf()),
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> SmellResult<Self> {
        let conn = Connection::open_in_memory()?;
        schema::init_ledger_schema(&conn)?;
        Ok(Self {
            db_path: None,
            conn: Mutex::new(conn),
        })
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn select_violations(
        &self,
        filter: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> SmellResult<Vec<LedgerViolation>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {VIOLATION_COLUMNS} FROM violations WHERE {filter} ORDER BY seq DESC;");
        let mut stmt = conn.prepare(&sql).map_err(SmellError::query)?;
        let rows = stmt
            .query_map(args, violation_from_row)
            .map_err(SmellError::query)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(SmellError::query)
    }

    fn first_violation(
        &self,
        filter: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> SmellResult<Option<LedgerViolation>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {VIOLATION_COLUMNS} FROM violations WHERE {filter} ORDER BY seq DESC LIMIT 1;"
        );
        conn.query_row(&sql, args, violation_from_row)
            .optional()
            .map_err(SmellError::query)
    }
}

impl LedgerStore for SqliteLedger {
    fn add_violation(&self, violation: &LedgerViolation) -> SmellResult<()> {
        let embedding = serde_json::to_string(&violation.embedding)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO violations (id, project_path, rule_name, severity, file_path, line_number, \
                                     code_snippet, snippet_hash, message, context, embedding, \
                                     created_at, ignored) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13);",
            params![
                violation.id,
                violation.project_path,
                violation.rule_name,
                violation.severity.as_str(),
                violation.file_path,
                violation.line_number,
                violation.code_snippet,
                violation.snippet_hash,
                violation.message,
                violation.context,
                embedding,
                violation.timestamp.to_rfc3339(),
                violation.ignored as i64,
            ],
        )?;
        Ok(())
    }

    fn latest_by_hash(&self, snippet_hash: &str) -> SmellResult<Option<LedgerViolation>> {
        self.first_violation("snippet_hash = ?1", params![snippet_hash])
    }

    fn latest_by_hash_and_rule(
        &self,
        snippet_hash: &str,
        rule_name: &str,
    ) -> SmellResult<Option<LedgerViolation>> {
        self.first_violation(
            "snippet_hash = ?1 AND rule_name = ?2",
            params![snippet_hash, rule_name],
        )
    }

    fn violations_by_hash(&self, snippet_hash: &str) -> SmellResult<Vec<LedgerViolation>> {
        self.select_violations("snippet_hash = ?1", params![snippet_hash])
    }

    fn violation_by_id(&self, id: &str) -> SmellResult<Option<LedgerViolation>> {
        self.first_violation("id = ?1", params![id])
    }

    fn project_violations(&self, project_path: &str) -> SmellResult<Vec<LedgerViolation>> {
        self.select_violations("project_path = ?1", params![project_path])
    }

    fn add_suppression(&self, suppression: &SuppressionRecord) -> SmellResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO suppressions (id, violation_id, snippet_hash, reason, created_at, \
                                       invalidated, invalidation_reason) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                suppression.id,
                suppression.violation_id,
                suppression.snippet_hash,
                suppression.reason,
                suppression.timestamp.to_rfc3339(),
                suppression.invalidated as i64,
                suppression.invalidation_reason,
            ],
        )?;
        if suppression.is_active() {
            tx.execute(
                "UPDATE violations SET ignored = 1 WHERE id = ?1;",
                params![suppression.violation_id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn active_suppression(&self, snippet_hash: &str) -> SmellResult<Option<SuppressionRecord>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {SUPPRESSION_COLUMNS} FROM suppressions \
             WHERE snippet_hash = ?1 AND invalidated = 0 ORDER BY seq DESC LIMIT 1;"
        );
        conn.query_row(&sql, params![snippet_hash], suppression_from_row)
            .optional()
            .map_err(SmellError::query)
    }

    fn suppressions_by_hash(&self, snippet_hash: &str) -> SmellResult<Vec<SuppressionRecord>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {SUPPRESSION_COLUMNS} FROM suppressions WHERE snippet_hash = ?1 ORDER BY seq DESC;"
        );
        let mut stmt = conn.prepare(&sql).map_err(SmellError::query)?;
        let rows = stmt
            .query_map(params![snippet_hash], suppression_from_row)
            .map_err(SmellError::query)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(SmellError::query)
    }

    fn invalidate_suppressions(&self, snippet_hash: &str, reason: &str) -> SmellResult<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let invalidated = tx.execute(
            "UPDATE suppressions SET invalidated = 1, invalidation_reason = ?2 \
             WHERE snippet_hash = ?1 AND invalidated = 0;",
            params![snippet_hash, reason],
        )?;
        if invalidated > 0 {
            tx.execute(
                "UPDATE violations SET ignored = 0 \
                 WHERE ignored = 1 AND id IN ( \
                     SELECT violation_id FROM suppressions WHERE snippet_hash = ?1 \
                 ) AND id NOT IN ( \
                     SELECT violation_id FROM suppressions WHERE invalidated = 0 \
                 );",
                params![snippet_hash],
            )?;
        }
        tx.commit()?;
        Ok(invalidated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn violation(id: &str, hash: &str, rule: &str) -> LedgerViolation {
        LedgerViolation {
            id: id.to_string(),
            project_path: "/proj".to_string(),
            rule_name: rule.to_string(),
            severity: Severity::High,
            file_path: "a.py".to_string(),
            line_number: 3,
            code_snippet: "def f(): pass".to_string(),
            snippet_hash: hash.to_string(),
            message: "too much".to_string(),
            context: None,
            embedding: vec![0.5, -0.5],
            timestamp: Utc::now(),
            ignored: false,
        }
    }

    fn suppression(id: &str, violation_id: &str, hash: &str) -> SuppressionRecord {
        SuppressionRecord {
            id: id.to_string(),
            violation_id: violation_id.to_string(),
            snippet_hash: hash.to_string(),
            reason: "accepted".to_string(),
            timestamp: Utc::now(),
            invalidated: false,
            invalidation_reason: None,
        }
    }

    #[test]
    fn records_sharing_a_hash_are_appended_not_overwritten() {
        let ledger = SqliteLedger::open_in_memory().unwrap();
        ledger.add_violation(&violation("v1", "h", "SRP")).unwrap();
        ledger.add_violation(&violation("v2", "h", "COMPLEXITY")).unwrap();

        let all = ledger.violations_by_hash("h").unwrap();
        let ids: Vec<&str> = all.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["v2", "v1"]);
        assert_eq!(ledger.latest_by_hash("h").unwrap().unwrap().id, "v2");
        assert_eq!(
            ledger.latest_by_hash_and_rule("h", "SRP").unwrap().unwrap().id,
            "v1"
        );
        assert!(ledger.latest_by_hash("missing").unwrap().is_none());
        assert_eq!(all[0].embedding, vec![0.5, -0.5]);
        assert_eq!(ledger.project_violations("/proj").unwrap().len(), 2);
    }

    #[test]
    fn suppression_round_trip_and_invalidation() {
        let ledger = SqliteLedger::open_in_memory().unwrap();
        ledger.add_violation(&violation("v1", "h", "SRP")).unwrap();
        ledger.add_suppression(&suppression("s1", "v1", "h")).unwrap();

        assert!(ledger.violation_by_id("v1").unwrap().unwrap().ignored);
        assert_eq!(ledger.active_suppression("h").unwrap().unwrap().id, "s1");

        assert_eq!(ledger.invalidate_suppressions("h", "changed").unwrap(), 1);
        assert!(ledger.active_suppression("h").unwrap().is_none());
        assert!(!ledger.violation_by_id("v1").unwrap().unwrap().ignored);

        let history = ledger.suppressions_by_hash("h").unwrap();
        assert!(history[0].invalidated);
        assert_eq!(history[0].invalidation_reason.as_deref(), Some("changed"));
        // Nothing left to invalidate.
        assert_eq!(ledger.invalidate_suppressions("h", "again").unwrap(), 0);
    }

    #[test]
    fn file_backed_ledger_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg").join("ledger.db");
        let ledger = SqliteLedger::open(&path).unwrap();
        ledger.add_violation(&violation("v1", "h", "SRP")).unwrap();
        drop(ledger);
        let reopened = SqliteLedger::open(&path).unwrap();
        assert_eq!(reopened.db_path(), Some(path.as_path()));
        assert!(reopened.latest_by_hash("h").unwrap().is_some());
    }
}
