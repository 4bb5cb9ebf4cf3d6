//! Project scan orchestration with Rayon-based parallel parsing.
//!
//! Parsing fans out over a bounded pool and touches no shared state. Graph
//! writes happen afterwards, one file at a time, on the calling thread.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use indexmap::IndexMap;
use rayon::prelude::*;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::AnalysisConfig;
use crate::errors::{SmellError, SmellResult};
use crate::indexer::filesystem::{iter_project_files, relative_path};
use crate::indexer::imports::resolve_imports;
use crate::indexer::parser::ParserRegistry;
use crate::models::{ImportEdge, ImportStatement, ParsedFile};
use crate::store::graph::{row_names, row_str, GraphStore};

/// Totals for one full scan.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub files_seen: usize,
    pub files_indexed: usize,
    pub files_failed: usize,
    pub types: usize,
    pub functions: usize,
    pub import_edges: usize,
    pub elapsed_ms: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    Removed,
    /// No parser is registered for the file's extension.
    Skipped,
}

struct ExtractionResult {
    file_path: String,
    parsed: Result<ParsedFile, String>,
}

fn extract_file_worker(
    registry: &ParserRegistry,
    absolute: &Path,
    relative: &str,
) -> ExtractionResult {
    let parsed = match registry.for_path(absolute) {
        Some(parser) => std::fs::read_to_string(absolute)
            .map_err(|e| e.to_string())
            .and_then(|source| parser.parse(relative, &source).map_err(|e| e.to_string())),
        None => Err("no parser registered".to_string()),
    };
    ExtractionResult {
        file_path: relative.to_string(),
        parsed,
    }
}

fn parallel_extract(
    registry: &ParserRegistry,
    jobs: &[(PathBuf, String)],
    workers: usize,
) -> Vec<ExtractionResult> {
    if jobs.is_empty() {
        return vec![];
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build();

    match pool {
        Ok(pool) => pool.install(|| {
            jobs.par_iter()
                .map(|(absolute, relative)| extract_file_worker(registry, absolute, relative))
                .collect()
        }),
        Err(e) => {
            debug!("Thread pool unavailable ({e}); parsing sequentially");
            jobs.iter()
                .map(|(absolute, relative)| extract_file_worker(registry, absolute, relative))
                .collect()
        }
    }
}

pub struct ProjectScanner {
    root: PathBuf,
    config: AnalysisConfig,
    registry: ParserRegistry,
    store: Arc<dyn GraphStore>,
}

impl ProjectScanner {
    pub fn new(
        root: &Path,
        config: AnalysisConfig,
        registry: ParserRegistry,
        store: Arc<dyn GraphStore>,
    ) -> Self {
        Self {
            root: root.to_path_buf(),
            config,
            registry,
            store,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn registry(&self) -> &ParserRegistry {
        &self.registry
    }

    /// Parse every matching file, then rewrite the graph. Files that fail
    /// to read or parse are counted and keep their previous records; files
    /// that disappeared since the previous scan are deleted.
    pub fn scan_project(&self) -> SmellResult<ScanStats> {
        let started = Instant::now();
        let files = iter_project_files(&self.root, &self.config.extensions, &self.config.ignore_dirs);
        let jobs: Vec<(PathBuf, String)> = files
            .into_iter()
            .filter(|path| self.registry.for_path(path).is_some())
            .map(|path| {
                let relative = relative_path(&self.root, &path);
                (path, relative)
            })
            .collect();

        let mut stats = ScanStats {
            files_seen: jobs.len(),
            ..ScanStats::default()
        };
        let results = parallel_extract(&self.registry, &jobs, self.config.worker_count());

        // Files still on disk keep their previous records even when this
        // pass cannot read or parse them.
        let on_disk: HashSet<String> = jobs.iter().map(|(_, relative)| relative.clone()).collect();

        for stale in self.store.file_paths()?.difference(&on_disk) {
            debug!("Removing stale file {stale}");
            self.store.delete_file(stale)?;
        }

        for result in results {
            let parsed = match result.parsed {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!("Skipping {}: {e}", result.file_path);
                    stats.files_failed += 1;
                    continue;
                }
            };
            let edges = resolve_imports(&result.file_path, &parsed.imports, &on_disk);
            if let Err(e) = self.store.replace_file(&parsed, &edges) {
                warn!("Failed to write {}: {e}", result.file_path);
                stats.files_failed += 1;
                continue;
            }
            stats.files_indexed += 1;
            stats.types += parsed.types.len();
            stats.functions += parsed.functions.len();
            stats.import_edges += edges.len();
        }

        stats.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            "Scanned {}: {} indexed, {} failed, {} types, {} functions, {} import edges in {}ms",
            self.root.display(),
            stats.files_indexed,
            stats.files_failed,
            stats.types,
            stats.functions,
            stats.import_edges,
            stats.elapsed_ms
        );
        Ok(stats)
    }

    fn split_path(&self, path: &Path) -> (PathBuf, String) {
        if path.is_absolute() {
            (path.to_path_buf(), relative_path(&self.root, path))
        } else {
            (self.root.join(path), path.to_string_lossy().replace('\\', "/"))
        }
    }

    /// Re-index one file. `path` is absolute or relative to the project root.
    /// Imports elsewhere in the project that resolve onto the file are
    /// re-linked in the same write.
    pub fn update_file(&self, path: &Path) -> SmellResult<UpdateOutcome> {
        let (absolute, relative) = self.split_path(path);
        if !absolute.is_file() {
            self.store.delete_file(&relative)?;
            debug!("Removed {relative} from graph");
            return Ok(UpdateOutcome::Removed);
        }
        let Some(parser) = self.registry.for_path(&absolute) else {
            return Ok(UpdateOutcome::Skipped);
        };

        let source = std::fs::read_to_string(&absolute)?;
        let parsed = parser.parse(&relative, &source)?;
        let mut known = self.store.file_paths()?;
        known.insert(relative.clone());
        let mut edges = resolve_imports(&relative, &parsed.imports, &known);
        let outgoing = edges.len();
        edges.extend(self.incoming_edges(&relative, &known)?);
        self.store
            .replace_file(&parsed, &edges)
            .map_err(|e| SmellError::graph_write(format!("{relative}: {e}")))?;
        debug!(
            "Updated {relative}: {} types, {} functions, {outgoing} outgoing and {} incoming import edges",
            parsed.types.len(),
            parsed.functions.len(),
            edges.len() - outgoing
        );
        Ok(UpdateOutcome::Updated)
    }

    /// IMPORTS edges from other indexed files that resolve onto `target`,
    /// rebuilt from their recorded import statements.
    fn incoming_edges(
        &self,
        target: &str,
        known: &HashSet<String>,
    ) -> SmellResult<Vec<ImportEdge>> {
        let rows = self.store.query(
            "SELECT file_path, module_path, imported_names FROM file_imports \
             WHERE file_path != ?1 ORDER BY file_path, position;",
            &[Value::from(target)],
        )?;
        let mut by_source: IndexMap<String, Vec<ImportStatement>> = IndexMap::new();
        for row in &rows {
            by_source
                .entry(row_str(row, "file_path")?)
                .or_default()
                .push(ImportStatement::new(
                    row_str(row, "module_path")?,
                    row_names(row, "imported_names"),
                ));
        }
        Ok(by_source
            .iter()
            .flat_map(|(source, imports)| resolve_imports(source, imports, known))
            .filter(|edge| edge.target_path == target)
            .collect())
    }

    pub fn delete_file(&self, path: &Path) -> SmellResult<()> {
        let (_, relative) = self.split_path(path);
        self.store.delete_file(&relative)
    }
}
