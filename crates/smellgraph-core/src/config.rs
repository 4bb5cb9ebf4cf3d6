//! Analysis configuration.
//!
//! Defaults are overlaid by `.smellgraph/config.json` under the project root
//! and then by `SMELLGRAPH_*` environment variables.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::{SmellError, SmellResult};

pub const CONFIG_DIR: &str = ".smellgraph";
pub const CONFIG_FILE: &str = "config.json";
pub const GRAPH_DB_FILE: &str = "graph.db";
pub const DEFAULT_LEDGER_PATH: &str = "~/.config/smellgraph/ledger.db";

const DEFAULT_EXTENSIONS: &[&str] = &[".py", ".java"];

const DEFAULT_IGNORE_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    ".venv",
    "venv",
    "node_modules",
    "__pycache__",
    ".pytest_cache",
    "dist",
    "build",
    "target",
    CONFIG_DIR,
];

const DEFAULT_LAYER_TOLERANCES: &[(&str, u32)] =
    &[("domain", 1), ("entity", 1), ("controller", 3), ("service", 5)];

pub const DEFAULT_COMPLEXITY_THRESHOLD: i64 = 10;
pub const DEFAULT_GOD_OBJECT_THRESHOLD: i64 = 10;
pub const DEFAULT_TOLERANCE: u32 = 3;

// ---------------------------------------------------------------------------
// Helper: tilde expansion
// ---------------------------------------------------------------------------

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            let mut expanded = PathBuf::from(home);
            if path.len() > 2 {
                expanded.push(&path[2..]);
            }
            return expanded;
        }
    }
    PathBuf::from(path)
}

fn normalize_extension(raw: &str) -> String {
    let trimmed = raw.trim().to_lowercase();
    if trimmed.starts_with('.') {
        trimmed
    } else {
        format!(".{trimmed}")
    }
}

// ---------------------------------------------------------------------------
// AnalysisConfig
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub extensions: Vec<String>,
    pub ignore_dirs: Vec<String>,
    pub complexity_threshold: i64,
    pub god_object_threshold: i64,
    /// Path keyword -> expected concern tolerance. Matched in insertion order.
    pub layer_tolerances: IndexMap<String, u32>,
    pub exempt_layers: Vec<String>,
    pub default_tolerance: u32,
    pub workers: Option<usize>,
    pub graph_path: Option<PathBuf>,
    pub ledger_path: Option<PathBuf>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            ignore_dirs: DEFAULT_IGNORE_DIRS.iter().map(|d| d.to_string()).collect(),
            complexity_threshold: DEFAULT_COMPLEXITY_THRESHOLD,
            god_object_threshold: DEFAULT_GOD_OBJECT_THRESHOLD,
            layer_tolerances: DEFAULT_LAYER_TOLERANCES
                .iter()
                .map(|(layer, tolerance)| (layer.to_string(), *tolerance))
                .collect(),
            exempt_layers: vec!["legacy".to_string()],
            default_tolerance: DEFAULT_TOLERANCE,
            workers: None,
            graph_path: None,
            ledger_path: None,
        }
    }
}

impl AnalysisConfig {
    /// Load the effective configuration for a project.
    ///
    /// A malformed sidecar file is reported and ignored; defaults apply.
    pub fn load(project_root: &Path, supported_extensions: &[&str]) -> Self {
        let sidecar = project_root.join(CONFIG_DIR).join(CONFIG_FILE);
        let mut config = if sidecar.exists() {
            match std::fs::read_to_string(&sidecar)
                .map_err(SmellError::from)
                .and_then(|raw| Self::from_json_str(&raw))
            {
                Ok(config) => config,
                Err(e) => {
                    warn!("Ignoring config file {}: {e}", sidecar.display());
                    Self::default()
                }
            }
        } else {
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        for diagnostic in config.validate(supported_extensions) {
            warn!("{diagnostic}");
        }
        config
    }

    pub fn from_json_str(raw: &str) -> SmellResult<Self> {
        serde_json::from_str(raw)
            .map_err(|e| SmellError::InvalidConfiguration(format!("config.json: {e}")))
    }

    /// Apply `SMELLGRAPH_*` overrides using `lookup` to read variables.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let read_int = |key: &str| -> Option<i64> {
            let raw = lookup(key)?;
            match raw.trim().parse::<i64>() {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!("Ignoring {key}={raw:?}: not an integer");
                    None
                }
            }
        };
        if let Some(v) = read_int("SMELLGRAPH_COMPLEXITY_THRESHOLD") {
            self.complexity_threshold = v;
        }
        if let Some(v) = read_int("SMELLGRAPH_GOD_OBJECT_THRESHOLD") {
            self.god_object_threshold = v;
        }
        if let Some(v) = read_int("SMELLGRAPH_WORKERS") {
            self.workers = Some(v.max(1) as usize);
        }
        if let Some(path) = lookup("SMELLGRAPH_GRAPH_PATH").filter(|p| !p.trim().is_empty()) {
            self.graph_path = Some(PathBuf::from(path.trim()));
        }
        if let Some(path) = lookup("SMELLGRAPH_LEDGER_PATH").filter(|p| !p.trim().is_empty()) {
            self.ledger_path = Some(PathBuf::from(path.trim()));
        }
    }

    /// Repair invalid entries in place and return one diagnostic per repair.
    pub fn validate(&mut self, supported_extensions: &[&str]) -> Vec<SmellError> {
        let mut diagnostics = Vec::new();

        if self.complexity_threshold <= 0 {
            diagnostics.push(SmellError::InvalidConfiguration(format!(
                "complexity_threshold {} must be positive; using {DEFAULT_COMPLEXITY_THRESHOLD}",
                self.complexity_threshold
            )));
            self.complexity_threshold = DEFAULT_COMPLEXITY_THRESHOLD;
        }
        if self.god_object_threshold <= 0 {
            diagnostics.push(SmellError::InvalidConfiguration(format!(
                "god_object_threshold {} must be positive; using {DEFAULT_GOD_OBJECT_THRESHOLD}",
                self.god_object_threshold
            )));
            self.god_object_threshold = DEFAULT_GOD_OBJECT_THRESHOLD;
        }
        if self.default_tolerance == 0 {
            diagnostics.push(SmellError::InvalidConfiguration(format!(
                "default_tolerance must be positive; using {DEFAULT_TOLERANCE}"
            )));
            self.default_tolerance = DEFAULT_TOLERANCE;
        }

        let invalid_layers: Vec<String> = self
            .layer_tolerances
            .iter()
            .filter(|(layer, tolerance)| layer.trim().is_empty() || **tolerance == 0)
            .map(|(layer, _)| layer.clone())
            .collect();
        for layer in invalid_layers {
            self.layer_tolerances.shift_remove(&layer);
            diagnostics.push(SmellError::InvalidConfiguration(format!(
                "layer tolerance for {layer:?} must be a positive integer; entry dropped"
            )));
        }

        let mut extensions = Vec::new();
        for raw in &self.extensions {
            let ext = normalize_extension(raw);
            if !supported_extensions.contains(&ext.as_str()) {
                diagnostics.push(SmellError::InvalidConfiguration(format!(
                    "no parser registered for extension {ext:?}; entry dropped"
                )));
                continue;
            }
            if !extensions.contains(&ext) {
                extensions.push(ext);
            }
        }
        self.extensions = extensions;

        diagnostics
    }

    pub fn resolved_graph_path(&self, project_root: &Path) -> PathBuf {
        match &self.graph_path {
            Some(path) => {
                let expanded = expand_tilde(&path.to_string_lossy());
                if expanded.is_absolute() {
                    expanded
                } else {
                    project_root.join(expanded)
                }
            }
            None => project_root.join(CONFIG_DIR).join(GRAPH_DB_FILE),
        }
    }

    pub fn resolved_ledger_path(&self) -> PathBuf {
        match &self.ledger_path {
            Some(path) => expand_tilde(&path.to_string_lossy()),
            None => expand_tilde(DEFAULT_LEDGER_PATH),
        }
    }

    /// Parse worker count: available cores minus one, at least one.
    pub fn worker_count(&self) -> usize {
        match self.workers {
            Some(workers) => workers.max(1),
            None => std::thread::available_parallelism()
                .map(|n| n.get().saturating_sub(1))
                .unwrap_or(1)
                .max(1),
        }
    }
}
