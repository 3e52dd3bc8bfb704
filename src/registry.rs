//! Path registry: maps codebase roots to stable identifiers and owns
//! the store-file directory layout.
//!
//! The registry is the only component that knows where store files
//! live. It keeps a sibling `path-mappings.json` file so identifiers
//! can be resolved back to their original absolute paths for listing
//! and orphan cleanup.

use crate::error::{IndexError, IndexResult, IoResultExt};
use crate::init::StorageLayout;
use crate::types::{CodebaseId, resolve_path};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

/// One row of [`PathRegistry::list`].
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub id: CodebaseId,
    pub path: PathBuf,
    /// Size of the store file in bytes, 0 if absent.
    pub size_bytes: u64,
    /// Last modification time of the store file, if it exists.
    pub modified: Option<SystemTime>,
}

/// Maps absolute codebase paths to 8-hex identifiers and store files.
#[derive(Debug, Clone)]
pub struct PathRegistry {
    layout: StorageLayout,
}

impl PathRegistry {
    pub fn new(layout: StorageLayout) -> Self {
        Self { layout }
    }

    /// Deterministic identifier for a codebase root.
    #[must_use]
    pub fn id_for(&self, path: &Path) -> CodebaseId {
        CodebaseId::derive(path)
    }

    /// Store file path for a codebase: `<vectors>/<id>.db`.
    /// Creates the vectors directory lazily.
    pub fn db_path_for(&self, path: &Path) -> IndexResult<PathBuf> {
        let id = self.id_for(path);
        self.db_path_for_id(id)
    }

    /// Store file path for an already-derived identifier.
    pub fn db_path_for_id(&self, id: CodebaseId) -> IndexResult<PathBuf> {
        let dir = self
            .layout
            .vectors_dir()
            .map_err(|e| IndexError::General(format!("Failed to create vectors dir: {e}")))?;
        Ok(dir.join(format!("{id}.db")))
    }

    /// Record the id → absolute path mapping for later reverse lookup.
    pub fn record(&self, path: &Path) -> IndexResult<CodebaseId> {
        let id = self.id_for(path);
        let mut mappings = self.load_mappings();
        let resolved = resolve_path(path);
        mappings.insert(id.to_string(), resolved.to_string_lossy().into_owned());
        self.save_mappings(&mappings)?;
        Ok(id)
    }

    /// List every registered codebase with store-file stats.
    pub fn list(&self) -> IndexResult<Vec<RegistryEntry>> {
        let mappings = self.load_mappings();
        let mut entries = Vec::with_capacity(mappings.len());
        for (id_str, path) in mappings {
            let Some(id) = CodebaseId::parse(&id_str) else {
                warn!(id = %id_str, "skipping malformed id in path mappings");
                continue;
            };
            let db_path = self.db_path_for_id(id)?;
            let (size_bytes, modified) = match std::fs::metadata(&db_path) {
                Ok(meta) => (meta.len(), meta.modified().ok()),
                Err(_) => (0, None),
            };
            entries.push(RegistryEntry {
                id,
                path: PathBuf::from(path),
                size_bytes,
                modified,
            });
        }
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(entries)
    }

    /// Remove a codebase: delete its store file (and WAL sidecars) and
    /// drop its mapping entry. Missing files are not an error.
    pub fn remove(&self, path: &Path) -> IndexResult<()> {
        let id = self.id_for(path);
        self.remove_by_id(id)
    }

    fn remove_by_id(&self, id: CodebaseId) -> IndexResult<()> {
        let db_path = self.db_path_for_id(id)?;
        for suffix in ["", "-wal", "-shm"] {
            let target = PathBuf::from(format!("{}{}", db_path.display(), suffix));
            match std::fs::remove_file(&target) {
                Ok(()) => debug!(path = %target.display(), "removed store file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e).write_err(&target),
            }
        }

        let mut mappings = self.load_mappings();
        if mappings.remove(id.as_str()).is_some() {
            self.save_mappings(&mappings)?;
        }
        Ok(())
    }

    /// Drop every registered codebase whose original path no longer
    /// exists. Returns the identifiers that were cleaned up.
    pub fn cleanup_orphans(&self) -> IndexResult<Vec<CodebaseId>> {
        let mappings = self.load_mappings();
        let mut removed = Vec::new();
        for (id_str, path) in &mappings {
            if Path::new(path).exists() {
                continue;
            }
            if let Some(id) = CodebaseId::parse(id_str) {
                debug!(id = %id, path = %path, "cleaning up orphaned codebase");
                self.remove_by_id(id)?;
                removed.push(id);
            }
        }
        Ok(removed)
    }

    fn load_mappings(&self) -> BTreeMap<String, String> {
        let file = self.layout.path_mappings_file();
        match std::fs::read_to_string(&file) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                warn!(path = %file.display(), error = %e, "ignoring corrupt path mappings");
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        }
    }

    fn save_mappings(&self, mappings: &BTreeMap<String, String>) -> IndexResult<()> {
        let file = self.layout.path_mappings_file();
        if let Some(parent) = file.parent() {
            std::fs::create_dir_all(parent).write_err(parent)?;
        }
        let json = serde_json::to_string_pretty(mappings)
            .map_err(|e| IndexError::General(format!("Failed to serialize path mappings: {e}")))?;

        // tmp + rename so a crash never leaves a truncated mappings file
        let tmp = file.with_extension("json.tmp");
        std::fs::write(&tmp, json).write_err(&tmp)?;
        std::fs::rename(&tmp, &file).write_err(&file)
    }
}
