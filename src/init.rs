//! Storage layout discovery for the `~/.code-context` directory.
//!
//! All on-disk locations flow from a single [`StorageLayout`] value
//! threaded through the registry and synchronizer, so tests can point
//! the whole engine at a temp directory. Environment overrides are
//! resolved once, here, at the boundary.

use std::path::{Path, PathBuf};

/// Environment variable overriding the vectors directory.
pub const VECTOR_DB_PATH_ENV: &str = "VECTOR_DB_PATH";

/// Root directory name under the user's home.
const CONTEXT_DIR: &str = ".code-context";

/// Resolved filesystem layout for one engine instance.
///
/// ```text
/// <root>/
/// ├── vectors/<id>.db
/// ├── merkle/<id>.json
/// ├── models/              (embedding model cache)
/// └── path-mappings.json
/// ```
#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
    vectors: PathBuf,
}

impl StorageLayout {
    /// Discover the layout from the environment: `~/.code-context`,
    /// with `VECTOR_DB_PATH` overriding the vectors directory.
    pub fn discover() -> Self {
        let root = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CONTEXT_DIR);
        let vectors = match std::env::var_os(VECTOR_DB_PATH_ENV) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => root.join("vectors"),
        };
        Self { root, vectors }
    }

    /// Layout rooted at an explicit directory. Used by tests and by
    /// embedders that manage their own storage location.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let vectors = root.join("vectors");
        Self { root, vectors }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding one `<id>.db` store file per codebase.
    /// Created lazily on first use.
    pub fn vectors_dir(&self) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.vectors)?;
        Ok(self.vectors.clone())
    }

    /// Directory holding one `<id>.json` snapshot per codebase.
    pub fn merkle_dir(&self) -> std::io::Result<PathBuf> {
        let dir = self.root.join("merkle");
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Cache directory for downloaded embedding models.
    pub fn models_dir(&self) -> PathBuf {
        self.root.join("models")
    }

    /// The id → absolute path mapping file.
    #[must_use]
    pub fn path_mappings_file(&self) -> PathBuf {
        self.root.join("path-mappings.json")
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self::discover()
    }
}
