//! File system walker for discovering source files to refresh
//!
//! Honors .gitignore files, `.codeatlasignore` files and the
//! `indexing.ignore_patterns` globs from settings, and keeps only files
//! whose extension is listed in `indexing.extensions`.

use crate::config::IndexingConfig;
use ignore::WalkBuilder;
use ignore::overrides::OverrideBuilder;
use std::path::{Path, PathBuf};

pub const IGNORE_FILE_NAME: &str = ".codeatlasignore";

/// Walks directories to find source files
#[derive(Debug, Clone)]
pub struct FileWalker {
    extensions: Vec<String>,
    ignore_patterns: Vec<String>,
}

impl FileWalker {
    pub fn new(config: &IndexingConfig) -> Self {
        Self {
            extensions: config
                .extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_string())
                .collect(),
            ignore_patterns: config.ignore_patterns.clone(),
        }
    }

    /// Walk a directory and return matching files, sorted.
    pub fn walk(&self, root: &Path) -> Vec<PathBuf> {
        let mut builder = WalkBuilder::new(root);

        builder
            .hidden(true) // Skip hidden files and directories
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .follow_links(false)
            .max_depth(None)
            .require_git(false); // Allow gitignore to work in non-git directories

        builder.add_custom_ignore_filename(IGNORE_FILE_NAME);

        // Override globs prefixed with '!' exclude matches
        if !self.ignore_patterns.is_empty() {
            let mut overrides = OverrideBuilder::new(root);
            for pattern in &self.ignore_patterns {
                if let Err(e) = overrides.add(&format!("!{pattern}")) {
                    tracing::warn!("[walker] ignoring invalid pattern '{pattern}': {e}");
                }
            }
            match overrides.build() {
                Ok(overrides) => {
                    builder.overrides(overrides);
                }
                Err(e) => tracing::warn!("[walker] failed to build ignore patterns: {e}"),
            }
        }

        let mut files: Vec<PathBuf> = builder
            .build()
            .filter_map(Result::ok) // Skip files we can't access
            .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
            .map(|entry| entry.into_path())
            .filter(|path| self.has_enabled_extension(path))
            .collect();
        files.sort();
        files
    }

    fn has_enabled_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|enabled| enabled == ext))
    }

    /// Count files that would be refreshed (useful for dry runs)
    pub fn count_files(&self, root: &Path) -> usize {
        self.walk(root).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn config(extensions: &[&str], ignore: &[&str]) -> IndexingConfig {
        IndexingConfig {
            extensions: extensions.iter().map(|s| s.to_string()).collect(),
            ignore_patterns: ignore.iter().map(|s| s.to_string()).collect(),
            ..IndexingConfig::default()
        }
    }

    #[test]
    fn test_walk_filters_extensions_and_patterns() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("lib")).unwrap();
        fs::create_dir_all(root.join("deps/foo")).unwrap();
        fs::write(root.join("lib/a.ex"), "module A").unwrap();
        fs::write(root.join("lib/b.txt"), "text").unwrap();
        fs::write(root.join("deps/foo/c.ex"), "module C").unwrap();
        fs::write(root.join(".hidden.ex"), "module H").unwrap();

        let walker = FileWalker::new(&config(&["ex"], &["deps/**"]));
        let files = walker.walk(root);

        assert_eq!(files, vec![root.join("lib/a.ex")]);
    }

    #[test]
    fn test_custom_ignore_file() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::write(root.join("keep.ex"), "").unwrap();
        fs::write(root.join("skip.ex"), "").unwrap();
        fs::write(root.join(IGNORE_FILE_NAME), "skip.ex\n").unwrap();

        let walker = FileWalker::new(&config(&[".ex"], &[]));
        assert_eq!(walker.walk(root), vec![root.join("keep.ex")]);
    }
}
