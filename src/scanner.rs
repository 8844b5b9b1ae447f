use anyhow::{Context, Result};
use log::{debug, warn};
use std::path::PathBuf;
use walkdir::WalkDir;

/// Directories never descended into
const SKIPPED_DIRS: &[&str] = &["target", "node_modules"];

/// Finds the Rust files of a project.
///
/// Build output and hidden directories are skipped. Files come back sorted,
/// so everything derived from them (route order, schema names) is stable
/// across runs and platforms.
pub struct FileScanner {
    root_path: PathBuf,
}

pub struct ScanResult {
    /// Every `.rs` file found, sorted
    pub rust_files: Vec<PathBuf>,
    /// Paths that could not be read; scanning continues past them
    pub warnings: Vec<String>,
}

impl FileScanner {
    pub fn new(root_path: PathBuf) -> Self {
        Self { root_path }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root_path
    }

    pub fn scan(&self) -> Result<ScanResult> {
        if !self.root_path.is_dir() {
            anyhow::bail!("Not a directory: {}", self.root_path.display());
        }

        let mut rust_files = Vec::new();
        let mut warnings = Vec::new();
        let walker = WalkDir::new(&self.root_path).into_iter().filter_entry(|e| {
            if e.depth() == 0 || !e.file_type().is_dir() {
                return true;
            }
            let name = e.file_name().to_string_lossy();
            !name.starts_with('.') && !SKIPPED_DIRS.contains(&name.as_ref())
        });

        for entry in walker {
            match entry {
                Ok(entry) => {
                    let path = entry.path();
                    if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == "rs") {
                        rust_files.push(path.to_path_buf());
                    }
                }
                Err(e) => {
                    let warning = format!("Failed to access path: {}", e);
                    warn!("{}", warning);
                    warnings.push(warning);
                }
            }
        }

        rust_files.sort();
        debug!(
            "Found {} Rust files under {}",
            rust_files.len(),
            self.root_path.display()
        );
        Ok(ScanResult {
            rust_files,
            warnings,
        })
    }

    /// Scans and fails when nothing was found.
    pub fn scan_non_empty(&self) -> Result<ScanResult> {
        let result = self
            .scan()
            .with_context(|| format!("Failed to scan {}", self.root_path.display()))?;
        if result.rust_files.is_empty() {
            anyhow::bail!("No Rust files found in {}", self.root_path.display());
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &std::path::Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    #[test]
    fn test_scan_sorted_and_nested() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "src/z.rs");
        touch(dir.path(), "src/api/users.rs");
        touch(dir.path(), "src/a.rs");

        let result = FileScanner::new(dir.path().to_path_buf()).scan().unwrap();
        let names: Vec<String> = result
            .rust_files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(names, vec!["src/a.rs", "src/api/users.rs", "src/z.rs"]);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_scan_skips_target_and_hidden() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "src/lib.rs");
        touch(dir.path(), "target/debug/build.rs");
        touch(dir.path(), ".git/hooks.rs");

        let result = FileScanner::new(dir.path().to_path_buf()).scan().unwrap();
        assert_eq!(result.rust_files.len(), 1);
    }

    #[test]
    fn test_scan_filters_non_rust_files() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "src/lib.rs");
        touch(dir.path(), "README.md");
        touch(dir.path(), "Cargo.toml");

        let result = FileScanner::new(dir.path().to_path_buf()).scan().unwrap();
        assert_eq!(result.rust_files.len(), 1);
    }

    #[test]
    fn test_scan_non_empty() {
        let dir = TempDir::new().unwrap();
        let scanner = FileScanner::new(dir.path().to_path_buf());
        assert!(scanner.scan().unwrap().rust_files.is_empty());
        assert!(scanner.scan_non_empty().is_err());
        assert!(FileScanner::new(dir.path().join("missing")).scan().is_err());
    }
}
