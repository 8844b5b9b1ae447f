use anyhow::{Context, Result};
use log::{debug, warn};
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Parses Rust source files with `syn`.
///
/// Each parsed file remembers the module path its items live in, so type
/// names can be qualified (`models::User`) when the catalog is built.
///
/// ```no_run
/// use sigroute::parser::AstParser;
/// use std::path::Path;
///
/// let parsed = AstParser::parse_file_in(Path::new("."), Path::new("src/models.rs")).unwrap();
/// assert_eq!(parsed.module, "models");
/// ```
pub struct AstParser;

/// A successfully parsed Rust file
#[derive(Debug)]
pub struct ParsedFile {
    pub path: PathBuf,
    /// Module path of the file's items, `""` for the crate root
    pub module: String,
    pub syntax_tree: syn::File,
}

impl AstParser {
    /// Parses a file whose items are treated as crate-root items.
    pub fn parse_file(path: &Path) -> Result<ParsedFile> {
        Self::parse_with_module(path, String::new())
    }

    /// Parses a file of the project rooted at `root`, deriving its module path
    /// from its location.
    pub fn parse_file_in(root: &Path, path: &Path) -> Result<ParsedFile> {
        Self::parse_with_module(path, module_path(root, path))
    }

    fn parse_with_module(path: &Path, module: String) -> Result<ParsedFile> {
        debug!("Parsing file: {} (module `{}`)", path.display(), module);
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read file: {}", path.display()))?;
        let syntax_tree = syn::parse_file(&content)
            .with_context(|| format!("Failed to parse Rust syntax in file: {}", path.display()))?;
        Ok(ParsedFile {
            path: path.to_path_buf(),
            module,
            syntax_tree,
        })
    }

    /// Parses in-memory source, e.g. declarations embedded in a program.
    pub fn parse_source(module: &str, source: &str) -> Result<ParsedFile> {
        let syntax_tree = syn::parse_file(source)
            .with_context(|| format!("Failed to parse Rust syntax for module `{}`", module))?;
        Ok(ParsedFile {
            path: PathBuf::from(format!("<{}>", if module.is_empty() { "root" } else { module })),
            module: module.to_string(),
            syntax_tree,
        })
    }

    /// Parses every file of a project, keeping the ones that parse.
    ///
    /// Broken files are logged and skipped so one syntax error does not hide
    /// the rest of the API.
    pub fn parse_project(root: &Path, paths: &[PathBuf]) -> Vec<ParsedFile> {
        debug!("Parsing {} files", paths.len());
        let parsed: Vec<ParsedFile> = paths
            .iter()
            .filter_map(|path| match Self::parse_file_in(root, path) {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    warn!("Skipping {}: {:#}", path.display(), e);
                    None
                }
            })
            .collect();
        debug!(
            "Parsing complete: {} succeeded, {} failed",
            parsed.len(),
            paths.len() - parsed.len()
        );
        parsed
    }
}

/// `src/api/users.rs` -> `api::users`; `lib.rs`, `main.rs` and `mod.rs` name
/// their parent module.
pub fn module_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let mut segments: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    if segments.first().map(String::as_str) == Some("src") {
        segments.remove(0);
    }
    if let Some(last) = segments.pop() {
        let stem = last.strip_suffix(".rs").unwrap_or(&last).to_string();
        if !matches!(stem.as_str(), "lib" | "main" | "mod") {
            segments.push(stem);
        }
    }
    segments.join("::")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_parse_valid_file() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "src/models.rs", "pub struct User { pub id: u32 }");
        let parsed = AstParser::parse_file_in(dir.path(), &path).unwrap();
        assert_eq!(parsed.module, "models");
        assert_eq!(parsed.syntax_tree.items.len(), 1);
    }

    #[test]
    fn test_parse_invalid_file() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "broken.rs", "pub struct User { id: u32");
        let err = AstParser::parse_file(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse Rust syntax"));
    }

    #[test]
    fn test_parse_nonexistent_file() {
        assert!(AstParser::parse_file(Path::new("/nonexistent/file.rs")).is_err());
    }

    #[test]
    fn test_parse_project_skips_broken_files() {
        let dir = TempDir::new().unwrap();
        let good = write(&dir, "src/lib.rs", "struct A;");
        let bad = write(&dir, "src/bad.rs", "fn (");
        let parsed = AstParser::parse_project(dir.path(), &[good, bad]);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].module, "");
    }

    #[test]
    fn test_parse_source() {
        let parsed = AstParser::parse_source("api", "fn f() {}").unwrap();
        assert_eq!(parsed.module, "api");
        assert!(AstParser::parse_source("api", "fn (").is_err());
    }

    #[test]
    fn test_module_path() {
        let root = Path::new("/project");
        assert_eq!(module_path(root, Path::new("/project/src/main.rs")), "");
        assert_eq!(module_path(root, Path::new("/project/src/lib.rs")), "");
        assert_eq!(module_path(root, Path::new("/project/src/models.rs")), "models");
        assert_eq!(module_path(root, Path::new("/project/src/api/mod.rs")), "api");
        assert_eq!(
            module_path(root, Path::new("/project/src/api/users.rs")),
            "api::users"
        );
        assert_eq!(module_path(root, Path::new("/project/handlers.rs")), "handlers");
    }
}
