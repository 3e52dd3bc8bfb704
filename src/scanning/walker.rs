//! File system walker for discovering source files to index
//!
//! This module provides efficient directory traversal with support for:
//! - .gitignore rules discovered during the walk
//! - `.contextignore` files for project-specific exclusions
//! - The merged ignore-rules matcher and extension allowlist

use super::rules::IgnoreRules;
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

/// Walks a codebase root and yields the files eligible for indexing,
/// with their forward-slash relative paths.
#[derive(Debug)]
pub struct FileWalker<'a> {
    rules: &'a IgnoreRules,
}

impl<'a> FileWalker<'a> {
    pub fn new(rules: &'a IgnoreRules) -> Self {
        Self { rules }
    }

    /// Walk a directory and return `(absolute, relative)` path pairs
    /// in deterministic (sorted) order.
    pub fn walk(&self, root: &Path) -> Vec<(PathBuf, String)> {
        let mut builder = WalkBuilder::new(root);
        builder
            .hidden(true) // Skip hidden files and directories
            .git_ignore(true) // Respect .gitignore files
            .git_global(true) // Respect global gitignore
            .git_exclude(true) // Respect .git/info/exclude
            .follow_links(false)
            .max_depth(None)
            .require_git(false); // Allow gitignore to work in non-git directories

        // Project-specific ignore file, same syntax as .gitignore.
        builder.add_custom_ignore_filename(".contextignore");

        let mut files: Vec<(PathBuf, String)> = builder
            .build()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
            .filter_map(|entry| {
                let path = entry.path();
                let relative = relative_to(root, path)?;
                self.rules.include(&relative).then(|| (path.to_path_buf(), relative))
            })
            .collect();

        files.sort_by(|a, b| a.1.cmp(&b.1));
        files
    }

    /// Count files that would be indexed (useful for dry runs)
    pub fn count_files(&self, root: &Path) -> usize {
        self.walk(root).len()
    }
}

/// Forward-slash normalized path of `path` relative to `root`.
fn relative_to(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut out = String::new();
    for component in relative.components() {
        if !out.is_empty() {
            out.push('/');
        }
        out.push_str(component.as_os_str().to_str()?);
    }
    (!out.is_empty()).then_some(out)
}
