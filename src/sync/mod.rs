//! File synchronizer: walks the tree, hashes content, persists
//! snapshots, and diffs runs to find what changed.
//!
//! A snapshot is one JSON file per codebase under `<root>/merkle/`,
//! written with tmp+rename so a crash can never leave a truncated
//! file. The store is always written before the snapshot, so a stale
//! snapshot re-indexes files rather than losing them.

mod merkle;

pub use merkle::{MerkleTree, hash_bytes};

use crate::error::{IndexError, IndexResult};
use crate::init::StorageLayout;
use crate::scanning::{FileWalker, IgnoreRules};
use crate::types::CodebaseId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File-level diff between two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileChanges {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub modified: Vec<String>,
}

impl FileChanges {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.added.len() + self.removed.len() + self.modified.len()
    }
}

/// On-disk snapshot format. Unknown keys are ignored on read.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotFile {
    file_hashes: BTreeMap<String, String>,
    merkle_root: String,
    serialized_tree: serde_json::Value,
}

/// Walks a codebase, hashes its files, and manages snapshots.
#[derive(Debug)]
pub struct FileSynchronizer {
    layout: StorageLayout,
}

impl FileSynchronizer {
    pub fn new(layout: StorageLayout) -> Self {
        Self { layout }
    }

    /// Walk the codebase and hash every included file.
    ///
    /// Unreadable files are skipped with a warning; everything else is
    /// fatal so the snapshot never silently diverges from disk.
    pub fn walk(&self, root: &Path, rules: &IgnoreRules) -> IndexResult<MerkleTree> {
        let walker = FileWalker::new(rules);
        let mut hashes = BTreeMap::new();
        for (absolute, relative) in walker.walk(root) {
            match std::fs::read(&absolute) {
                Ok(bytes) => {
                    hashes.insert(relative, hash_bytes(&bytes));
                }
                Err(e) => {
                    warn!(path = %absolute.display(), error = %e, "skipping unreadable file");
                }
            }
        }
        Ok(MerkleTree::from_hashes(hashes))
    }

    /// Diff two trees into added/removed/modified path sets.
    ///
    /// The three sets partition the difference: a path appears in at
    /// most one of them.
    pub fn diff(prev: &MerkleTree, curr: &MerkleTree) -> FileChanges {
        if prev.root() == curr.root() {
            return FileChanges::default();
        }

        let mut changes = FileChanges::default();
        for (path, hash) in curr.leaves() {
            match prev.leaves().get(path) {
                None => changes.added.push(path.clone()),
                Some(prev_hash) if prev_hash != hash => changes.modified.push(path.clone()),
                Some(_) => {}
            }
        }
        for path in prev.leaves().keys() {
            if !curr.leaves().contains_key(path) {
                changes.removed.push(path.clone());
            }
        }
        changes
    }

    /// Load the persisted snapshot for a codebase, if any.
    ///
    /// A corrupt snapshot is treated as missing: the next run becomes
    /// a full re-index rather than an error.
    pub fn load_snapshot(&self, id: CodebaseId) -> Option<MerkleTree> {
        let path = self.snapshot_path(id).ok()?;
        let bytes = std::fs::read(&path).ok()?;
        let snapshot: SnapshotFile = match serde_json::from_slice(&bytes) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring corrupt snapshot");
                return None;
            }
        };

        let tree_bytes = match serde_json::to_vec(&snapshot.serialized_tree) {
            Ok(bytes) => bytes,
            Err(_) => return None,
        };
        match MerkleTree::deserialize(&tree_bytes) {
            Ok(tree) if tree.root() == snapshot.merkle_root => Some(tree),
            Ok(_) => {
                warn!(path = %path.display(), "snapshot root disagrees with tree, ignoring");
                None
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring undecodable snapshot tree");
                None
            }
        }
    }

    /// Persist a snapshot atomically (tmp + rename).
    pub fn save_snapshot(&self, id: CodebaseId, tree: &MerkleTree) -> IndexResult<()> {
        let path = self.snapshot_path(id)?;
        let serialized_tree: serde_json::Value = serde_json::to_value(tree)
            .map_err(|e| snapshot_err(&path, format!("serialize tree: {e}")))?;
        let snapshot = SnapshotFile {
            file_hashes: tree.leaves().clone(),
            merkle_root: tree.root().to_string(),
            serialized_tree,
        };
        let json = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| snapshot_err(&path, format!("serialize snapshot: {e}")))?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| snapshot_err(&tmp, e.to_string()))?;
        std::fs::rename(&tmp, &path).map_err(|e| snapshot_err(&path, e.to_string()))?;
        debug!(id = %id, files = tree.len(), "snapshot saved");
        Ok(())
    }

    /// Remove the snapshot for a codebase. Missing files are fine.
    pub fn delete_snapshot(&self, id: CodebaseId) -> IndexResult<()> {
        let path = self.snapshot_path(id)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(snapshot_err(&path, e.to_string())),
        }
    }

    fn snapshot_path(&self, id: CodebaseId) -> IndexResult<PathBuf> {
        let dir = self
            .layout
            .merkle_dir()
            .map_err(|e| IndexError::General(format!("Failed to create merkle dir: {e}")))?;
        Ok(dir.join(format!("{id}.json")))
    }
}

fn snapshot_err(path: &Path, reason: String) -> IndexError {
    IndexError::Snapshot {
        path: path.to_path_buf(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn synchronizer(temp: &TempDir) -> FileSynchronizer {
        FileSynchronizer::new(StorageLayout::with_root(temp.path().join("storage")))
    }

    fn write_tree(root: &Path, files: &[(&str, &str)]) {
        for (path, content) in files {
            let full = root.join(path);
            if let Some(parent) = full.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(full, content).unwrap();
        }
    }

    #[test]
    fn test_walk_hashes_included_files() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("proj");
        write_tree(&root, &[("a.rs", "fn a() {}"), ("sub/b.py", "def b(): pass")]);

        let sync = synchronizer(&temp);
        let tree = sync.walk(&root, &IgnoreRules::default()).unwrap();
        assert_eq!(tree.len(), 2);
        assert!(tree.leaves().contains_key("a.rs"));
        assert!(tree.leaves().contains_key("sub/b.py"));
        assert_eq!(tree.leaves()["a.rs"], hash_bytes(b"fn a() {}"));
    }

    #[test]
    fn test_modification_changes_root_and_diff() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("proj");
        write_tree(&root, &[("a.ts", "x"), ("b.ts", "y")]);

        let sync = synchronizer(&temp);
        let rules = IgnoreRules::default();
        let before = sync.walk(&root, &rules).unwrap();

        write_tree(&root, &[("a.ts", "x ")]);
        let after = sync.walk(&root, &rules).unwrap();

        assert_ne!(before.root(), after.root());
        let changes = FileSynchronizer::diff(&before, &after);
        assert_eq!(changes.modified, vec!["a.ts".to_string()]);
        assert!(changes.added.is_empty());
        assert!(changes.removed.is_empty());
    }

    #[test]
    fn test_identical_roots_short_circuit() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("proj");
        write_tree(&root, &[("a.ts", "x")]);

        let sync = synchronizer(&temp);
        let rules = IgnoreRules::default();
        let one = sync.walk(&root, &rules).unwrap();
        let two = sync.walk(&root, &rules).unwrap();
        assert!(FileSynchronizer::diff(&one, &two).is_empty());
    }

    #[test]
    fn test_diff_partitions_changes() {
        let prev = MerkleTree::from_hashes(
            [("keep.rs", "h1"), ("gone.rs", "h2"), ("edit.rs", "h3")]
                .into_iter()
                .map(|(p, h)| (p.to_string(), h.to_string()))
                .collect(),
        );
        let curr = MerkleTree::from_hashes(
            [("keep.rs", "h1"), ("edit.rs", "h3x"), ("new.rs", "h4")]
                .into_iter()
                .map(|(p, h)| (p.to_string(), h.to_string()))
                .collect(),
        );

        let changes = FileSynchronizer::diff(&prev, &curr);
        assert_eq!(changes.added, vec!["new.rs".to_string()]);
        assert_eq!(changes.removed, vec!["gone.rs".to_string()]);
        assert_eq!(changes.modified, vec!["edit.rs".to_string()]);

        // No path appears in more than one set.
        let mut all: Vec<&String> = changes
            .added
            .iter()
            .chain(&changes.removed)
            .chain(&changes.modified)
            .collect();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), changes.total());
    }

    #[test]
    fn test_snapshot_round_trip() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("proj");
        write_tree(&root, &[("a.rs", "fn a() {}")]);

        let sync = synchronizer(&temp);
        let id = CodebaseId::derive(&root);
        let tree = sync.walk(&root, &IgnoreRules::default()).unwrap();

        assert!(sync.load_snapshot(id).is_none());
        sync.save_snapshot(id, &tree).unwrap();

        let loaded = sync.load_snapshot(id).unwrap();
        assert_eq!(loaded.root(), tree.root());
        assert_eq!(loaded.leaves(), tree.leaves());
    }

    #[test]
    fn test_snapshot_file_shape() {
        let temp = TempDir::new().unwrap();
        let sync = synchronizer(&temp);
        let id = CodebaseId::derive(Path::new("/tmp/proj"));
        let tree = MerkleTree::from_hashes(
            [("a.rs".to_string(), "deadbeef".to_string())].into(),
        );
        sync.save_snapshot(id, &tree).unwrap();

        let path = temp
            .path()
            .join("storage/merkle")
            .join(format!("{id}.json"));
        let json: serde_json::Value =
            serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert!(json.get("fileHashes").is_some());
        assert!(json.get("merkleRoot").is_some());
        assert!(json.get("serializedTree").is_some());
        assert_eq!(json["fileHashes"]["a.rs"], "deadbeef");
    }

    #[test]
    fn test_corrupt_snapshot_treated_as_missing() {
        let temp = TempDir::new().unwrap();
        let sync = synchronizer(&temp);
        let id = CodebaseId::derive(Path::new("/tmp/proj"));

        let dir = temp.path().join("storage/merkle");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(format!("{id}.json")), b"not json at all").unwrap();

        assert!(sync.load_snapshot(id).is_none());
    }

    #[test]
    fn test_delete_snapshot_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let sync = synchronizer(&temp);
        let id = CodebaseId::derive(Path::new("/tmp/proj"));

        sync.delete_snapshot(id).unwrap();
        sync.save_snapshot(id, &MerkleTree::empty()).unwrap();
        sync.delete_snapshot(id).unwrap();
        assert!(sync.load_snapshot(id).is_none());
    }
}
