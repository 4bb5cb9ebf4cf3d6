//! One handle over a project: graph, scanner, queries, reviewer and ledger.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::AnalysisConfig;
use crate::embedding::{CachingEmbedder, Embedder, HashingEmbedder, DEFAULT_CACHE_ENTRIES};
use crate::errors::SmellResult;
use crate::indexer::parser::ParserRegistry;
use crate::indexer::pipeline::{ProjectScanner, ScanStats, UpdateOutcome};
use crate::ledger::{Ledger, LedgerStore, SqliteLedger};
use crate::models::{LedgerViolation, SuppressionRecord};
use crate::query::dependencies::DependencyQueries;
use crate::review::{ReviewReport, Reviewer};
use crate::rules::RuleEngine;
use crate::store::graph::{GraphStore, SqliteGraphStore};

pub struct Workspace {
    root: PathBuf,
    config: AnalysisConfig,
    graph: Arc<dyn GraphStore>,
    ledger: Arc<Ledger>,
    scanner: ProjectScanner,
    reviewer: Reviewer,
}

impl Workspace {
    /// Load `.smellgraph/config.json` plus environment overrides and open
    /// the on-disk stores.
    pub fn open(root: &Path) -> SmellResult<Self> {
        let registry = ParserRegistry::with_defaults();
        let config = AnalysisConfig::load(root, &registry.supported_extensions());
        Self::with_config(root, config)
    }

    pub fn with_config(root: &Path, config: AnalysisConfig) -> SmellResult<Self> {
        let graph = Arc::new(SqliteGraphStore::open(&config.resolved_graph_path(root))?);
        let ledger = Arc::new(SqliteLedger::open(&config.resolved_ledger_path())?);
        let embedder = Arc::new(CachingEmbedder::new(
            Arc::new(HashingEmbedder::default()),
            DEFAULT_CACHE_ENTRIES,
        ));
        Ok(Self::from_parts(root, config, graph, ledger, embedder))
    }

    /// Assemble a workspace from caller-supplied stores and embedder.
    pub fn from_parts(
        root: &Path,
        config: AnalysisConfig,
        graph: Arc<dyn GraphStore>,
        ledger_store: Arc<dyn LedgerStore>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        let ledger = Arc::new(Ledger::new(ledger_store, embedder.clone()));
        let engine = RuleEngine::from_config(&config, embedder);
        let project_path = root.to_string_lossy().into_owned();
        let scanner = ProjectScanner::new(
            root,
            config.clone(),
            ParserRegistry::with_defaults(),
            graph.clone(),
        );
        let reviewer = Reviewer::new(graph.clone(), engine, ledger.clone(), &project_path);
        Self {
            root: root.to_path_buf(),
            config,
            graph,
            ledger,
            scanner,
            reviewer,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn graph(&self) -> &dyn GraphStore {
        self.graph.as_ref()
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn queries(&self) -> DependencyQueries<'_> {
        DependencyQueries::new(self.graph.as_ref())
    }

    fn project_path(&self) -> String {
        self.root.to_string_lossy().into_owned()
    }

    pub fn scan_project(&self) -> SmellResult<ScanStats> {
        self.scanner.scan_project()
    }

    pub fn update_file(&self, path: &Path) -> SmellResult<UpdateOutcome> {
        self.scanner.update_file(path)
    }

    pub fn delete_file(&self, path: &Path) -> SmellResult<()> {
        self.scanner.delete_file(path)
    }

    /// Review one project-relative file against its current text on disk.
    pub fn review_file(&self, file_path: &str) -> SmellResult<ReviewReport> {
        let source = std::fs::read_to_string(self.root.join(file_path))?;
        self.reviewer.review_file(file_path, &source)
    }

    /// Review every indexed file in path order. Unreadable files are
    /// logged and left out.
    pub fn review_project(&self) -> SmellResult<Vec<ReviewReport>> {
        let mut paths: Vec<String> = self.graph.file_paths()?.into_iter().collect();
        paths.sort();
        let mut reports = Vec::with_capacity(paths.len());
        for path in paths {
            match self.review_file(&path) {
                Ok(report) => reports.push(report),
                Err(e) => warn!("Review skipped {path}: {e}"),
            }
        }
        let reported: usize = reports.iter().map(|r| r.reportable().count()).sum();
        info!("Reviewed {} files, {reported} findings", reports.len());
        Ok(reports)
    }

    pub fn ignore_violation(
        &self,
        violation_id: &str,
        code: &str,
        reason: &str,
    ) -> SmellResult<SuppressionRecord> {
        self.ledger.ignore_violation(violation_id, code, reason)
    }

    pub fn invalidate_if_changed(
        &self,
        old_code: &str,
        new_code: &str,
        reason: Option<&str>,
    ) -> SmellResult<bool> {
        self.ledger.invalidate_if_changed(old_code, new_code, reason)
    }

    pub fn is_ignored(&self, code: &str) -> SmellResult<bool> {
        self.ledger.is_ignored(code)
    }

    pub fn get_project_violations(&self) -> SmellResult<Vec<LedgerViolation>> {
        self.ledger.get_project_violations(&self.project_path())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::models::Severity;
    use crate::rules::srp::semantic::tests::AxisEmbedder;

    const CONTROLLER: &str = "\
import sqlalchemy
import requests
import json
import redis


class UserController:
    def save_user(self):
        pass

    def load_user(self):
        pass

    def send_email(self):
        pass

    def notify_admin(self):
        pass

    def validate_email(self):
        pass

    def check_quota(self):
        pass

    def run_report(self):
        pass

    def handle_hook(self):
        pass

    def save_audit(self):
        pass

    def send_sms(self):
        pass
";

    fn write_controller(root: &Path) {
        let controllers = root.join("app/controllers");
        fs::create_dir_all(&controllers).unwrap();
        fs::write(controllers.join("users.py"), CONTROLLER).unwrap();
    }

    #[test]
    fn with_config_opens_stores_on_disk() {
        let project = tempfile::tempdir().unwrap();
        let home = tempfile::tempdir().unwrap();
        write_controller(project.path());
        let config = AnalysisConfig {
            ledger_path: Some(home.path().join("ledger.db")),
            workers: Some(1),
            ..AnalysisConfig::default()
        };
        let ws = Workspace::with_config(project.path(), config).unwrap();
        assert_eq!(ws.scan_project().unwrap().files_indexed, 1);
        assert!(project.path().join(".smellgraph/graph.db").exists());
        assert!(home.path().join("ledger.db").exists());
        assert_eq!(ws.queries().find_god_objects(10).unwrap()[0].name, "UserController");
    }

    #[test]
    fn scan_review_and_suppress_end_to_end() {
        let project = tempfile::tempdir().unwrap();
        write_controller(project.path());
        let ws = Workspace::from_parts(
            project.path(),
            AnalysisConfig {
                workers: Some(2),
                ..AnalysisConfig::default()
            },
            Arc::new(SqliteGraphStore::open_in_memory().unwrap()),
            Arc::new(SqliteLedger::open_in_memory().unwrap()),
            Arc::new(AxisEmbedder),
        );
        ws.scan_project().unwrap();

        let reports = ws.review_project().unwrap();
        assert_eq!(reports.len(), 1);
        let srp: Vec<_> = reports[0].fresh.iter().filter(|v| v.rule_name == "SRP").collect();
        assert_eq!(srp.len(), 1);
        assert_eq!(srp[0].severity, Severity::Critical);
        assert!(srp[0].message.contains("Controller imports database directly: sqlalchemy"));
        assert!(srp[0].code_snippet.starts_with("class UserController:"));

        ws.ignore_violation(&srp[0].id, &srp[0].code_snippet, "known").unwrap();
        assert!(ws.is_ignored(&srp[0].code_snippet).unwrap());
        let again = ws.review_file("app/controllers/users.py").unwrap();
        assert_eq!(again.suppressed.len(), 1);
        assert!(again.fresh.is_empty());

        let listed = ws.get_project_violations().unwrap();
        assert!(listed.iter().any(|v| v.id == srp[0].id && v.ignored));
    }
}
