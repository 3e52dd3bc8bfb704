//! Semantic code search engine for AI coding assistants.
//!
//! Given a natural-language query and a local source tree, the engine
//! returns ranked code spans with file, line range, and similarity
//! score. It walks and filters the tree, splits files into chunks
//! using parser-derived structure with a character fallback, embeds
//! chunks through a pluggable provider, persists vectors in a
//! per-codebase SQLite store with hybrid (vector + full-text) search,
//! and applies incremental changes between runs via a content-hash
//! Merkle tree.
//!
//! The protocol server, editor panels, and provider HTTP clients live
//! outside this crate; [`indexing::ContextIndexer`] is the surface
//! they consume.

pub mod config;
pub mod embedding;
pub mod error;
pub mod indexing;
pub mod init;
pub mod parsing;
pub mod registry;
pub mod scanning;
pub mod store;
pub mod sync;
pub mod types;

// Explicit exports for better API clarity
pub use config::Settings;
pub use embedding::{EmbeddingProvider, FastEmbedProvider, RetryingProvider};
pub use error::{
    EmbeddingError, EmbeddingResult, IndexError, IndexResult, IoResultExt, StoreError,
    StoreResult,
};
pub use indexing::{
    CancellationToken, CodebaseState, ContextIndexer, IndexPhase, IndexProgress, ProgressCallback,
};
pub use init::StorageLayout;
pub use parsing::{Language, Splitter};
pub use registry::PathRegistry;
pub use scanning::IgnoreRules;
pub use store::{ChunkRow, ScoredChunk, SearchOptions, VectorStore};
pub use sync::{FileChanges, FileSynchronizer, MerkleTree};
pub use types::{
    ChangeCounts, Chunk, CodebaseId, EmbeddedChunk, IndexMode, IndexOutcome, IndexStatus,
    SearchHit, VectorDimension,
};
