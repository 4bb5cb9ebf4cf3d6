//! Structural graph store: File/Type/Function nodes and keyed edges.
//!
//! Records are addressed by stable string keys (`path`, `path::Name`), never
//! by pointer, so the graph survives process restarts unchanged.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, Connection};
use serde_json::Value;

use crate::errors::{SmellError, SmellResult};
use crate::models::{
    FileRecord, FunctionRecord, ImportEdge, ImportStatement, ParsedFile, TypeRecord,
    RELATIONSHIP_CONTAINS, RELATIONSHIP_DEFINES, RELATIONSHIP_IMPORTS,
};
use crate::store::schema;

/// One result row keyed by column name.
pub type Row = serde_json::Map<String, Value>;

/// Minimal contract of a persistent graph store.
///
/// Upserts are idempotent. Mutations go through a single writer; reads may
/// run from any thread.
pub trait GraphStore: Send + Sync {
    fn upsert_file(&self, file: &FileRecord) -> SmellResult<()>;

    /// Create or update a type and its DEFINES edge from the owning file.
    fn upsert_type(&self, record: &TypeRecord) -> SmellResult<()>;

    /// Create or update a function and, for methods, its CONTAINS edge.
    fn upsert_function(&self, record: &FunctionRecord) -> SmellResult<()>;

    fn upsert_import_edge(&self, edge: &ImportEdge) -> SmellResult<()>;

    /// Replace the raw import statements recorded for a file.
    fn replace_module_imports(&self, file_path: &str, imports: &[ImportStatement])
        -> SmellResult<()>;

    /// Remove a file, everything it owns, and every edge touching it.
    fn delete_file(&self, file_path: &str) -> SmellResult<()>;

    /// Atomically swap a file's records for a fresh parse. IMPORTS edges
    /// from other files into this one are kept; `edges` may carry both the
    /// file's own imports and incoming ones to restore.
    fn replace_file(&self, parsed: &ParsedFile, edges: &[ImportEdge]) -> SmellResult<()>;

    /// Run a read-only SQL predicate with positional parameters.
    fn query(&self, predicate: &str, params: &[Value]) -> SmellResult<Vec<Row>>;

    fn file_paths(&self) -> SmellResult<HashSet<String>> {
        self.query("SELECT path FROM files;", &[])?
            .iter()
            .map(|row| row_str(row, "path"))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Row helpers
// ---------------------------------------------------------------------------

pub(crate) fn row_str(row: &Row, column: &str) -> SmellResult<String> {
    match row.get(column) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(SmellError::Query(format!("missing text column {column:?}"))),
    }
}

pub(crate) fn row_opt_str(row: &Row, column: &str) -> Option<String> {
    row.get(column).and_then(|v| v.as_str()).map(str::to_string)
}

pub(crate) fn row_i64(row: &Row, column: &str) -> SmellResult<i64> {
    row.get(column)
        .and_then(Value::as_i64)
        .ok_or_else(|| SmellError::Query(format!("missing integer column {column:?}")))
}

/// Decode a JSON-encoded name list column; malformed text reads as empty.
pub(crate) fn row_names(row: &Row, column: &str) -> Vec<String> {
    row_opt_str(row, column)
        .and_then(|raw| serde_json::from_str::<Vec<String>>(&raw).ok())
        .unwrap_or_default()
}

fn row_to_json(row: &rusqlite::Row<'_>, col_names: &[String]) -> rusqlite::Result<Row> {
    let mut out = Row::new();
    for (i, name) in col_names.iter().enumerate() {
        let value = match row.get_ref(i)? {
            rusqlite::types::ValueRef::Null => Value::Null,
            rusqlite::types::ValueRef::Integer(v) => Value::from(v),
            rusqlite::types::ValueRef::Real(v) => Value::from(v),
            rusqlite::types::ValueRef::Text(bytes) => {
                Value::String(String::from_utf8_lossy(bytes).into_owned())
            }
            rusqlite::types::ValueRef::Blob(bytes) => {
                Value::String(String::from_utf8_lossy(bytes).into_owned())
            }
        };
        out.insert(name.clone(), value);
    }
    Ok(out)
}

fn json_to_sql(value: &Value) -> rusqlite::types::Value {
    use rusqlite::types::Value as Sql;
    match value {
        Value::Null => Sql::Null,
        Value::Bool(b) => Sql::Integer(*b as i64),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Sql::Integer(i),
            None => Sql::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => Sql::Text(s.clone()),
        other => Sql::Text(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// SqliteGraphStore
// ---------------------------------------------------------------------------

/// Embedded SQLite implementation of [`GraphStore`].
pub struct SqliteGraphStore {
    db_path: Option<PathBuf>,
    conn: Mutex<Connection>,
}

impl SqliteGraphStore {
    /// Open (or create) a file-backed store, creating parent directories.
    pub fn open(db_path: &Path) -> SmellResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        // journal_mode returns a row, so read it instead of executing it.
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
        schema::init_graph_schema(&conn)?;
        Ok(Self {
            db_path: Some(db_path.to_path_buf()),
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> SmellResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::init_graph_schema(&conn)?;
        Ok(Self {
            db_path: None,
            conn: Mutex::new(conn),
        })
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    // -- statements shared by single upserts and transactions ---------------

    fn write_file(conn: &Connection, file: &FileRecord) -> rusqlite::Result<()> {
        conn.execute(
            "INSERT INTO files (path, language, lines_of_code) VALUES (?1, ?2, ?3) \
             ON CONFLICT(path) DO UPDATE SET \
                 language = excluded.language, \
                 lines_of_code = excluded.lines_of_code;",
            params![file.path, file.language, file.lines_of_code],
        )?;
        Ok(())
    }

    fn write_edge(
        conn: &Connection,
        source_key: &str,
        target_key: &str,
        relationship: &str,
        file_path: &str,
        imported_names: &[String],
    ) -> rusqlite::Result<()> {
        let names = serde_json::to_string(imported_names).unwrap_or_else(|_| "[]".to_string());
        conn.execute(
            "INSERT INTO edges (source_key, target_key, relationship, file_path, imported_names) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(source_key, target_key, relationship) DO UPDATE SET \
                 file_path = excluded.file_path, \
                 imported_names = excluded.imported_names;",
            params![source_key, target_key, relationship, file_path, names],
        )?;
        Ok(())
    }

    fn write_type(conn: &Connection, record: &TypeRecord) -> rusqlite::Result<()> {
        conn.execute(
            "INSERT INTO types (id, name, file_path, start_line, end_line, is_abstract, method_count) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
             ON CONFLICT(id) DO UPDATE SET \
                 name = excluded.name, \
                 file_path = excluded.file_path, \
                 start_line = excluded.start_line, \
                 end_line = excluded.end_line, \
                 is_abstract = excluded.is_abstract, \
                 method_count = excluded.method_count;",
            params![
                record.id,
                record.name,
                record.file_path,
                record.start_line,
                record.end_line,
                record.is_abstract as i64,
                record.method_count,
            ],
        )?;
        Self::write_edge(
            conn,
            &record.file_path,
            &record.id,
            RELATIONSHIP_DEFINES,
            &record.file_path,
            &[],
        )
    }

    fn write_function(conn: &Connection, record: &FunctionRecord) -> rusqlite::Result<()> {
        conn.execute(
            "INSERT INTO functions (id, name, file_path, start_line, end_line, \
                                    cyclomatic_complexity, parent_type) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
             ON CONFLICT(id) DO UPDATE SET \
                 name = excluded.name, \
                 file_path = excluded.file_path, \
                 start_line = excluded.start_line, \
                 end_line = excluded.end_line, \
                 cyclomatic_complexity = excluded.cyclomatic_complexity, \
                 parent_type = excluded.parent_type;",
            params![
                record.id,
                record.name,
                record.file_path,
                record.start_line,
                record.end_line,
                record.cyclomatic_complexity,
                record.parent_type,
            ],
        )?;
        if let Some(parent) = &record.parent_type {
            Self::write_edge(
                conn,
                parent,
                &record.id,
                RELATIONSHIP_CONTAINS,
                &record.file_path,
                &[],
            )?;
        }
        Ok(())
    }

    fn write_module_imports(
        conn: &Connection,
        file_path: &str,
        imports: &[ImportStatement],
    ) -> rusqlite::Result<()> {
        conn.execute(
            "DELETE FROM file_imports WHERE file_path = ?1;",
            params![file_path],
        )?;
        let mut stmt = conn.prepare(
            "INSERT INTO file_imports (file_path, position, module_path, imported_names) \
             VALUES (?1, ?2, ?3, ?4);",
        )?;
        for (position, import) in imports.iter().enumerate() {
            let names = serde_json::to_string(&import.names).unwrap_or_else(|_| "[]".to_string());
            stmt.execute(params![file_path, position as i64, import.module_path, names])?;
        }
        Ok(())
    }

    /// Remove what a file owns. Incoming IMPORTS edges survive unless
    /// `drop_incoming` is set.
    fn clear_file(conn: &Connection, file_path: &str, drop_incoming: bool) -> rusqlite::Result<()> {
        conn.execute("DELETE FROM edges WHERE file_path = ?1;", params![file_path])?;
        if drop_incoming {
            conn.execute(
                "DELETE FROM edges WHERE target_key = ?1 AND relationship = ?2;",
                params![file_path, RELATIONSHIP_IMPORTS],
            )?;
        }
        conn.execute("DELETE FROM functions WHERE file_path = ?1;", params![file_path])?;
        conn.execute("DELETE FROM types WHERE file_path = ?1;", params![file_path])?;
        conn.execute("DELETE FROM file_imports WHERE file_path = ?1;", params![file_path])?;
        conn.execute("DELETE FROM files WHERE path = ?1;", params![file_path])?;
        Ok(())
    }
}

impl GraphStore for SqliteGraphStore {
    fn upsert_file(&self, file: &FileRecord) -> SmellResult<()> {
        let conn = self.conn.lock();
        Self::write_file(&conn, file).map_err(SmellError::graph_write)
    }

    fn upsert_type(&self, record: &TypeRecord) -> SmellResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(SmellError::graph_write)?;
        Self::write_type(&tx, record).map_err(SmellError::graph_write)?;
        tx.commit().map_err(SmellError::graph_write)
    }

    fn upsert_function(&self, record: &FunctionRecord) -> SmellResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(SmellError::graph_write)?;
        Self::write_function(&tx, record).map_err(SmellError::graph_write)?;
        tx.commit().map_err(SmellError::graph_write)
    }

    fn upsert_import_edge(&self, edge: &ImportEdge) -> SmellResult<()> {
        let conn = self.conn.lock();
        Self::write_edge(
            &conn,
            &edge.source_path,
            &edge.target_path,
            RELATIONSHIP_IMPORTS,
            &edge.source_path,
            &edge.imported_names,
        )
        .map_err(SmellError::graph_write)
    }

    fn replace_module_imports(
        &self,
        file_path: &str,
        imports: &[ImportStatement],
    ) -> SmellResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(SmellError::graph_write)?;
        Self::write_module_imports(&tx, file_path, imports).map_err(SmellError::graph_write)?;
        tx.commit().map_err(SmellError::graph_write)
    }

    fn delete_file(&self, file_path: &str) -> SmellResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(SmellError::graph_write)?;
        Self::clear_file(&tx, file_path, true).map_err(SmellError::graph_write)?;
        tx.commit().map_err(SmellError::graph_write)
    }

    fn replace_file(&self, parsed: &ParsedFile, edges: &[ImportEdge]) -> SmellResult<()> {
        let path = parsed.file.path.as_str();
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(SmellError::graph_write)?;
        let applied = (|| -> rusqlite::Result<()> {
            Self::clear_file(&tx, path, false)?;
            Self::write_file(&tx, &parsed.file)?;
            for record in &parsed.types {
                Self::write_type(&tx, record)?;
            }
            for record in &parsed.functions {
                Self::write_function(&tx, record)?;
            }
            Self::write_module_imports(&tx, path, &parsed.imports)?;
            for edge in edges {
                Self::write_edge(
                    &tx,
                    &edge.source_path,
                    &edge.target_path,
                    RELATIONSHIP_IMPORTS,
                    &edge.source_path,
                    &edge.imported_names,
                )?;
            }
            Ok(())
        })();
        applied.map_err(SmellError::graph_write)?;
        tx.commit().map_err(SmellError::graph_write)
    }

    fn query(&self, predicate: &str, params: &[Value]) -> SmellResult<Vec<Row>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(predicate).map_err(SmellError::query)?;
        if !stmt.readonly() {
            return Err(SmellError::Query(
                "graph predicates must be read-only".to_string(),
            ));
        }
        let col_names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let bound: Vec<rusqlite::types::Value> = params.iter().map(json_to_sql).collect();
        let mut rows = stmt
            .query(params_from_iter(bound.iter()))
            .map_err(SmellError::query)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(SmellError::query)? {
            out.push(row_to_json(row, &col_names).map_err(SmellError::query)?);
        }
        Ok(out)
    }
}
