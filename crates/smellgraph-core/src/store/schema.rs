//! SQLite schema DDL and migration framework for the graph and the ledger.

use rusqlite::Connection;

use crate::errors::SmellResult;

/// Current graph schema version.
pub const SCHEMA_VERSION: i32 = 2;

/// Current ledger schema version.
pub const LEDGER_SCHEMA_VERSION: i32 = 2;

const META_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS repo_meta (
        key TEXT PRIMARY KEY,
        value TEXT
    );",
    "CREATE TABLE IF NOT EXISTS migration_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        from_version INTEGER NOT NULL,
        to_version INTEGER NOT NULL,
        status TEXT NOT NULL,
        error_message TEXT,
        created_at TEXT DEFAULT CURRENT_TIMESTAMP
    );",
];

/// Graph DDL: 5 tables + 6 indexes. Safe to replay.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS files (
        path TEXT PRIMARY KEY,
        language TEXT NOT NULL,
        lines_of_code INTEGER NOT NULL DEFAULT 0
    );",
    "CREATE TABLE IF NOT EXISTS types (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        file_path TEXT NOT NULL,
        start_line INTEGER NOT NULL,
        end_line INTEGER NOT NULL,
        is_abstract INTEGER NOT NULL DEFAULT 0,
        method_count INTEGER NOT NULL DEFAULT 0
    );",
    "CREATE TABLE IF NOT EXISTS functions (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        file_path TEXT NOT NULL,
        start_line INTEGER NOT NULL,
        end_line INTEGER NOT NULL,
        cyclomatic_complexity INTEGER NOT NULL DEFAULT 1,
        parent_type TEXT
    );",
    "CREATE TABLE IF NOT EXISTS edges (
        source_key TEXT NOT NULL,
        target_key TEXT NOT NULL,
        relationship TEXT NOT NULL,
        file_path TEXT NOT NULL,
        imported_names TEXT NOT NULL DEFAULT '[]',
        PRIMARY KEY(source_key, target_key, relationship)
    );",
    "CREATE TABLE IF NOT EXISTS file_imports (
        file_path TEXT NOT NULL,
        position INTEGER NOT NULL,
        module_path TEXT NOT NULL,
        imported_names TEXT NOT NULL DEFAULT '[]',
        PRIMARY KEY(file_path, position)
    );",
    "CREATE INDEX IF NOT EXISTS idx_types_file ON types(file_path);",
    "CREATE INDEX IF NOT EXISTS idx_functions_file ON functions(file_path);",
    "CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target_key, relationship);",
    "CREATE INDEX IF NOT EXISTS idx_edges_file ON edges(file_path);",
    "CREATE INDEX IF NOT EXISTS idx_types_method_count ON types(method_count DESC);",
    "CREATE INDEX IF NOT EXISTS idx_functions_complexity ON functions(cyclomatic_complexity DESC);",
];

/// Ledger DDL: 2 tables + 3 indexes.
pub const LEDGER_SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS violations (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        project_path TEXT NOT NULL,
        rule_name TEXT NOT NULL,
        severity TEXT NOT NULL,
        file_path TEXT NOT NULL,
        line_number INTEGER NOT NULL,
        code_snippet TEXT NOT NULL,
        snippet_hash TEXT NOT NULL,
        message TEXT NOT NULL,
        context TEXT,
        embedding TEXT NOT NULL DEFAULT '[]',
        created_at TEXT NOT NULL,
        ignored INTEGER NOT NULL DEFAULT 0
    );",
    "CREATE TABLE IF NOT EXISTS suppressions (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        violation_id TEXT NOT NULL,
        snippet_hash TEXT NOT NULL,
        reason TEXT NOT NULL,
        created_at TEXT NOT NULL,
        invalidated INTEGER NOT NULL DEFAULT 0,
        invalidation_reason TEXT
    );",
    "CREATE INDEX IF NOT EXISTS idx_violations_hash ON violations(snippet_hash, seq DESC);",
    "CREATE INDEX IF NOT EXISTS idx_violations_project ON violations(project_path, seq DESC);",
    "CREATE INDEX IF NOT EXISTS idx_suppressions_hash ON suppressions(snippet_hash, invalidated);",
];

/// Create the graph tables and bring the schema to [`SCHEMA_VERSION`].
pub fn init_graph_schema(conn: &Connection) -> SmellResult<()> {
    for stmt in META_STATEMENTS.iter().chain(SCHEMA_STATEMENTS) {
        conn.execute_batch(stmt)?;
    }
    migrate_schema(conn)
}

/// Create the ledger tables and bring the schema to [`LEDGER_SCHEMA_VERSION`].
pub fn init_ledger_schema(conn: &Connection) -> SmellResult<()> {
    for stmt in META_STATEMENTS.iter().chain(LEDGER_SCHEMA_STATEMENTS) {
        conn.execute_batch(stmt)?;
    }
    migrate_ledger_schema(conn)
}

// ─── Migration framework ────────────────────────────────────────────────────

pub fn migrate_schema(conn: &Connection) -> SmellResult<()> {
    run_migrations(conn, SCHEMA_VERSION, graph_step)
}

pub fn migrate_ledger_schema(conn: &Connection) -> SmellResult<()> {
    run_migrations(conn, LEDGER_SCHEMA_VERSION, ledger_step)
}

/// Run pending steps from the stored version up to `target`. Each step runs
/// under a SAVEPOINT so a failure rolls back only that step.
fn run_migrations(
    conn: &Connection,
    target: i32,
    apply_step: fn(&Connection, i32) -> SmellResult<()>,
) -> SmellResult<()> {
    let mut current_version = get_schema_version(conn);

    while current_version < target {
        let next_version = current_version + 1;
        conn.execute_batch("SAVEPOINT smellgraph_migrate_step;")?;

        let step_result = (|| -> SmellResult<()> {
            apply_step(conn, next_version)?;
            set_schema_version(conn, next_version)?;
            record_migration_step(conn, current_version, next_version, "success", None)?;
            conn.execute_batch("RELEASE SAVEPOINT smellgraph_migrate_step;")?;
            Ok(())
        })();

        match step_result {
            Ok(()) => current_version = next_version,
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK TO SAVEPOINT smellgraph_migrate_step;");
                let _ = conn.execute_batch("RELEASE SAVEPOINT smellgraph_migrate_step;");
                let _ = record_migration_step(
                    conn,
                    current_version,
                    next_version,
                    "failed",
                    Some(&e.to_string()),
                );
                return Err(e);
            }
        }
    }

    Ok(())
}

/// Stored schema version, or 0 when absent or unparseable.
pub fn get_schema_version(conn: &Connection) -> i32 {
    let result: Result<String, _> = conn.query_row(
        "SELECT value FROM repo_meta WHERE key = 'schema_version';",
        [],
        |row| row.get(0),
    );
    match result {
        Ok(v) => v.parse::<i32>().unwrap_or(0),
        Err(_) => 0,
    }
}

fn set_schema_version(conn: &Connection, version: i32) -> SmellResult<()> {
    conn.execute(
        "INSERT INTO repo_meta(key, value) \
         VALUES('schema_version', ?1) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value;",
        rusqlite::params![version.to_string()],
    )?;
    Ok(())
}

fn record_migration_step(
    conn: &Connection,
    from_v: i32,
    to_v: i32,
    status: &str,
    error_msg: Option<&str>,
) -> SmellResult<()> {
    conn.execute(
        "INSERT INTO migration_history(from_version, to_version, status, error_message) \
         VALUES (?1, ?2, ?3, ?4);",
        rusqlite::params![from_v, to_v, status, error_msg],
    )?;
    Ok(())
}

// ─── Individual migration steps ─────────────────────────────────────────────

fn graph_step(conn: &Connection, version: i32) -> SmellResult<()> {
    match version {
        // v0 -> v1: baseline created by SCHEMA_STATEMENTS.
        1 => Ok(()),
        // v1 -> v2: ranking indexes for god-object and complexity queries.
        2 => {
            conn.execute_batch(
                "CREATE INDEX IF NOT EXISTS idx_types_method_count ON types(method_count DESC);",
            )?;
            conn.execute_batch(
                "CREATE INDEX IF NOT EXISTS idx_functions_complexity \
                 ON functions(cyclomatic_complexity DESC);",
            )?;
            Ok(())
        }
        _ => Ok(()),
    }
}

fn ledger_step(conn: &Connection, version: i32) -> SmellResult<()> {
    match version {
        1 => Ok(()),
        // v1 -> v2: per-project listing index.
        2 => {
            conn.execute_batch(
                "CREATE INDEX IF NOT EXISTS idx_violations_project \
                 ON violations(project_path, seq DESC);",
            )?;
            Ok(())
        }
        _ => Ok(()),
    }
}
