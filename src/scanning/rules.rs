//! Merged ignore rules and extension allowlist.
//!
//! Three sources fold into one matcher, later overriding earlier:
//! built-in defaults, workspace `.gitignore`-style files (handled by
//! the walker during traversal), and user-supplied patterns and
//! extensions. The result is a single order-independent
//! `include(relative_path) -> bool`.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::BTreeSet;
use tracing::warn;

/// Directory and file patterns excluded regardless of gitignore state.
const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    "**/node_modules/**",
    "**/.git/**",
    "**/target/**",
    "**/dist/**",
    "**/build/**",
    "**/out/**",
    "**/__pycache__/**",
    "**/.venv/**",
    "**/venv/**",
    "**/vendor/**",
    "**/coverage/**",
    "**/.idea/**",
    "**/.vscode/**",
    "**/.cache/**",
    "**/*.min.js",
    "**/*.min.css",
    "**/*.map",
    "**/*.bundle.js",
    "**/*.lock",
    "**/package-lock.json",
];

/// Extensions indexed by default: mainstream source languages plus
/// Markdown.
const DEFAULT_EXTENSIONS: &[&str] = &[
    ".rs", ".py", ".pyi", ".js", ".jsx", ".mjs", ".cjs", ".ts", ".tsx", ".go", ".java", ".c",
    ".h", ".cpp", ".hpp", ".cc", ".cs", ".rb", ".php", ".swift", ".kt", ".scala", ".m", ".md",
    ".markdown",
];

/// Single matcher deciding whether a relative path is indexed.
#[derive(Debug)]
pub struct IgnoreRules {
    ignored: GlobSet,
    extensions: BTreeSet<String>,
}

impl Default for IgnoreRules {
    fn default() -> Self {
        Self::new(&[], &[])
    }
}

impl IgnoreRules {
    /// Build the matcher from user-supplied additions. Invalid custom
    /// patterns are skipped with a warning rather than failing the run.
    pub fn new(custom_patterns: &[String], custom_extensions: &[String]) -> Self {
        let mut builder = GlobSetBuilder::new();
        for pattern in DEFAULT_IGNORE_PATTERNS {
            if let Ok(glob) = Glob::new(pattern) {
                builder.add(glob);
            }
        }
        for pattern in custom_patterns {
            match Glob::new(pattern) {
                Ok(glob) => {
                    builder.add(glob);
                }
                Err(e) => warn!(pattern = %pattern, error = %e, "skipping invalid ignore pattern"),
            }
        }
        let ignored = builder.build().unwrap_or_else(|e| {
            warn!(error = %e, "falling back to empty ignore set");
            GlobSet::empty()
        });

        let mut extensions: BTreeSet<String> = DEFAULT_EXTENSIONS
            .iter()
            .map(|ext| ext.to_string())
            .collect();
        for ext in custom_extensions {
            extensions.insert(normalize_extension(ext));
        }

        Self { ignored, extensions }
    }

    /// Whether a forward-slash relative path should be indexed.
    #[must_use]
    pub fn include(&self, relative_path: &str) -> bool {
        if self.ignored.is_match(relative_path) {
            return false;
        }
        self.allows_extension(&crate::types::extension_of(relative_path))
    }

    /// Whether files with this extension (leading dot) are indexed.
    #[must_use]
    pub fn allows_extension(&self, extension: &str) -> bool {
        !extension.is_empty() && self.extensions.contains(extension)
    }
}

fn normalize_extension(ext: &str) -> String {
    let trimmed = ext.trim().trim_start_matches('.').to_lowercase();
    format!(".{trimmed}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_exclude_dependency_dirs() {
        let rules = IgnoreRules::default();
        assert!(!rules.include("node_modules/react/index.js"));
        assert!(!rules.include(".git/HEAD"));
        assert!(!rules.include("target/debug/main.rs"));
        assert!(!rules.include("assets/app.min.js"));
        assert!(rules.include("src/main.rs"));
        assert!(rules.include("docs/guide.md"));
    }

    #[test]
    fn test_extension_allowlist() {
        let rules = IgnoreRules::default();
        assert!(!rules.include("image.png"));
        assert!(!rules.include("binary.exe"));
        assert!(!rules.include("Makefile"));
        assert!(rules.include("script.py"));
    }

    #[test]
    fn test_custom_patterns_extend_defaults() {
        let rules = IgnoreRules::new(&["**/generated/**".to_string()], &[]);
        assert!(!rules.include("src/generated/api.rs"));
        assert!(rules.include("src/handwritten/api.rs"));
    }

    #[test]
    fn test_custom_extensions_extend_defaults() {
        let rules = IgnoreRules::new(&[], &["proto".to_string(), ".SQL".to_string()]);
        assert!(rules.include("schema/user.proto"));
        assert!(rules.include("db/init.sql"));
        assert!(!IgnoreRules::default().include("schema/user.proto"));
    }

    #[test]
    fn test_include_is_order_independent() {
        // Same answer regardless of how many times or in what order
        // paths are asked.
        let rules = IgnoreRules::default();
        let paths = ["src/a.rs", "node_modules/b.js", "src/a.rs"];
        let first: Vec<bool> = paths.iter().map(|p| rules.include(p)).collect();
        let second: Vec<bool> = paths.iter().rev().map(|p| rules.include(p)).collect();
        assert_eq!(first[0], second[2]);
        assert_eq!(first[1], second[1]);
    }

    #[test]
    fn test_invalid_custom_pattern_is_skipped() {
        let rules = IgnoreRules::new(&["[invalid".to_string()], &[]);
        assert!(rules.include("src/main.rs"));
    }
}
