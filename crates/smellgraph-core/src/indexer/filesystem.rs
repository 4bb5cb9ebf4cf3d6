//! Filesystem enumeration for scan passes.

use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::{DirEntry, WalkDir};

const TEMP_FILE_SUFFIXES: &[&str] = &[".swp", ".swo", ".swn", "~", ".tmp", ".bak"];

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
}

fn is_ignored_dir(entry: &DirEntry, ignore_dirs: &[String]) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && ignore_dirs
            .iter()
            .any(|d| entry.file_name().to_string_lossy() == d.as_str())
}

/// Every file under `root` whose extension is listed, skipping ignored
/// directory names at any depth. Results are sorted for deterministic scans.
pub fn iter_project_files(root: &Path, extensions: &[String], ignore_dirs: &[String]) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| !is_ignored_dir(entry, ignore_dirs))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("Skipping unreadable entry: {e}");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(DirEntry::into_path)
        .filter(|path| {
            extension_of(path)
                .map(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext)))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    files
}

/// Project-relative path with forward slashes.
pub fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Whether a change event for `path` should reach `update_file`.
///
/// Editor swap/backup files and dotfiles never do; other files only when
/// their extension is scanned.
pub fn is_trackable_change(path: &Path, extensions: &[String]) -> bool {
    let name = match path.file_name() {
        Some(n) => n.to_string_lossy(),
        None => return false,
    };
    if name.starts_with('.') || TEMP_FILE_SUFFIXES.iter().any(|s| name.ends_with(s)) {
        return false;
    }
    extension_of(path)
        .map(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext)))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn exts() -> Vec<String> {
        vec![".py".to_string()]
    }

    #[test]
    fn enumerates_matching_files_and_skips_ignored_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for rel in [
            "app/main.py",
            "app/core/models.py",
            "app/README.md",
            ".venv/lib/site.py",
            "node_modules/pkg/index.py",
            "app/__pycache__/main.py",
        ] {
            let path = root.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "x = 1\n").unwrap();
        }

        let ignore: Vec<String> = [".venv", "node_modules", "__pycache__"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let found: Vec<String> = iter_project_files(root, &exts(), &ignore)
            .iter()
            .map(|p| relative_path(root, p))
            .collect();
        assert_eq!(found, vec!["app/core/models.py", "app/main.py"]);
    }

    #[test]
    fn trackable_change_filters_temp_and_hidden_files() {
        assert!(is_trackable_change(Path::new("src/app.py"), &exts()));
        assert!(!is_trackable_change(Path::new("src/.app.py.swp"), &exts()));
        assert!(!is_trackable_change(Path::new("src/app.py~"), &exts()));
        assert!(!is_trackable_change(Path::new("src/app.py.bak"), &exts()));
        assert!(!is_trackable_change(Path::new("src/.env"), &exts()));
        assert!(!is_trackable_change(Path::new("src/app.rs"), &exts()));
    }
}
