//! Content-hash Merkle tree over a codebase's files.
//!
//! The root is a SHA-256 digest over the sorted `path\0hash\0`
//! concatenation, so it is insensitive to the order files were
//! discovered in and changes whenever any file's content or the file
//! set changes.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Merkle summary of `relative_path -> sha256hex` leaves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleTree {
    leaves: BTreeMap<String, String>,
    root: String,
}

impl MerkleTree {
    /// Build the tree from file hashes. Any map iterable in sorted
    /// order works; a `BTreeMap` guarantees it.
    pub fn from_hashes(leaves: BTreeMap<String, String>) -> Self {
        let root = compute_root(&leaves);
        Self { leaves, root }
    }

    /// An empty tree (no files).
    pub fn empty() -> Self {
        Self::from_hashes(BTreeMap::new())
    }

    #[must_use]
    pub fn root(&self) -> &str {
        &self.root
    }

    #[must_use]
    pub fn leaves(&self) -> &BTreeMap<String, String> {
        &self.leaves
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Serialize for embedding into a snapshot file.
    pub fn serialize(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize and verify: a stored root that disagrees with the
    /// recomputed one marks a corrupt snapshot.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, String> {
        let tree: MerkleTree =
            serde_json::from_slice(bytes).map_err(|e| format!("malformed tree: {e}"))?;
        let recomputed = compute_root(&tree.leaves);
        if recomputed != tree.root {
            return Err(format!(
                "root mismatch: stored {}, recomputed {recomputed}",
                tree.root
            ));
        }
        Ok(tree)
    }
}

/// SHA-256 over `path\0hash\0` pairs in sorted key order.
fn compute_root(leaves: &BTreeMap<String, String>) -> String {
    let mut hasher = Sha256::new();
    for (path, hash) in leaves {
        hasher.update(path.as_bytes());
        hasher.update([0]);
        hasher.update(hash.as_bytes());
        hasher.update([0]);
    }
    format!("{:x}", hasher.finalize())
}

/// SHA-256 hex digest of file content.
#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}
