//! The index orchestrator: composes the registry, synchronizer,
//! splitter, embedding provider, and store into full and incremental
//! indexing plus search.
//!
//! One writer per codebase is enforced in-process; concurrent calls
//! against the same codebase fail fast with a busy error. A single
//! store is kept open per session and previous stores close when a
//! different codebase is touched, bounding open file descriptors.

use super::progress::{IndexPhase, ProgressCallback, ProgressReporter};
use super::{CancellationToken, CodebaseState, IndexStats};
use crate::config::Settings;
use crate::embedding::{EmbeddingProvider, RetryingProvider};
use crate::error::{EmbeddingError, IndexError, IndexResult};
use crate::init::StorageLayout;
use crate::parsing::{LANGUAGE_KEY, Splitter};
use crate::registry::PathRegistry;
use crate::scanning::IgnoreRules;
use crate::store::{ScoredChunk, SearchOptions, VectorStore};
use crate::sync::{FileSynchronizer, MerkleTree};
use crate::types::{
    ChangeCounts, Chunk, CodebaseId, EmbeddedChunk, IndexMode, IndexOutcome, IndexStatus,
    SearchHit, VectorDimension, extension_of,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

struct OpenStore {
    id: CodebaseId,
    store: VectorStore,
}

/// Releases the per-codebase writer slot when an operation finishes.
struct BusyGuard {
    busy: Arc<Mutex<HashSet<CodebaseId>>>,
    id: CodebaseId,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.busy.lock().remove(&self.id);
    }
}

/// Composes indexing, storage, and search for any number of codebases.
pub struct ContextIndexer {
    settings: Settings,
    registry: PathRegistry,
    synchronizer: FileSynchronizer,
    provider: RetryingProvider<Arc<dyn EmbeddingProvider>>,
    splitter: Splitter,
    rules: IgnoreRules,
    session: Mutex<Option<OpenStore>>,
    busy: Arc<Mutex<HashSet<CodebaseId>>>,
    states: Mutex<HashMap<CodebaseId, CodebaseState>>,
}

impl ContextIndexer {
    pub fn new(
        settings: Settings,
        layout: StorageLayout,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        let splitter = Splitter::new(
            settings.splitter.chunk_size,
            settings.splitter.chunk_overlap,
        );
        let rules = IgnoreRules::new(
            &settings.scanning.custom_ignore_patterns,
            &settings.scanning.custom_extensions,
        );
        let provider = RetryingProvider::new(provider, settings.embedding.max_retries);
        Self {
            settings,
            registry: PathRegistry::new(layout.clone()),
            synchronizer: FileSynchronizer::new(layout),
            provider,
            splitter,
            rules,
            session: Mutex::new(None),
            busy: Arc::new(Mutex::new(HashSet::new())),
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Swap the embedding provider. Takes effect on subsequent
    /// operations only.
    pub fn set_embedding_provider(&mut self, provider: Arc<dyn EmbeddingProvider>) {
        self.provider = RetryingProvider::new(provider, self.settings.embedding.max_retries);
    }

    /// Swap the splitter. Takes effect on subsequent operations only.
    pub fn set_splitter(&mut self, splitter: Splitter) {
        self.splitter = splitter;
    }

    /// Swap the ignore rules. Takes effect on subsequent operations only.
    pub fn set_ignore_rules(&mut self, rules: IgnoreRules) {
        self.rules = rules;
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Index a codebase from scratch (or on top of an existing
    /// collection when `force` is false).
    pub fn index_codebase(
        &self,
        path: &Path,
        progress: Option<ProgressCallback>,
        force: bool,
    ) -> IndexResult<IndexOutcome> {
        self.index_codebase_with(path, progress, force, &CancellationToken::new())
    }

    /// Like [`Self::index_codebase`], honoring a cancellation token at
    /// batch boundaries.
    pub fn index_codebase_with(
        &self,
        path: &Path,
        progress: Option<ProgressCallback>,
        force: bool,
        cancel: &CancellationToken,
    ) -> IndexResult<IndexOutcome> {
        let id = self.registry.id_for(path);
        let _busy = self.acquire_writer(id)?;
        if cancel.is_cancelled() {
            return Err(IndexError::Cancelled);
        }

        let mut reporter = ProgressReporter::new(progress);
        self.set_state(id, CodebaseState::Preparing);
        let result = self.run_full_index(id, path, force, &mut reporter, cancel);
        match &result {
            Ok(outcome) => self.set_state(id, state_for(outcome.status)),
            Err(_) => self.set_state(id, CodebaseState::Failed),
        }
        result
    }

    fn run_full_index(
        &self,
        id: CodebaseId,
        path: &Path,
        force: bool,
        reporter: &mut ProgressReporter,
        cancel: &CancellationToken,
    ) -> IndexResult<IndexOutcome> {
        reporter.report(IndexPhase::Preparing, 0, 100);
        self.prepare_collection(id, force)?;
        self.registry.record(path)?;

        let tree = self.synchronizer.walk(path, &self.rules)?;
        let files: Vec<String> = tree.leaves().keys().cloned().collect();
        info!(id = %id, files = files.len(), "indexing codebase");

        self.set_state(id, CodebaseState::Indexing);
        let summary = self.ingest(id, path, &files, reporter, cancel)?;

        reporter.report(IndexPhase::Saving, 99, 100);
        self.save_partial_snapshot(id, &tree, &files, &summary.fully_indexed)?;
        reporter.report(IndexPhase::Saving, 100, 100);

        Ok(IndexOutcome {
            indexed_files: summary.fully_indexed.len(),
            total_chunks: summary.chunks_written,
            status: summary.status,
        })
    }

    /// Detect changes since the last snapshot and apply them:
    /// deletions first, then re-chunk and re-embed added and modified
    /// files.
    pub fn reindex_by_change(
        &self,
        path: &Path,
        progress: Option<ProgressCallback>,
    ) -> IndexResult<ChangeCounts> {
        self.reindex_by_change_with(path, progress, &CancellationToken::new())
    }

    /// Like [`Self::reindex_by_change`], honoring a cancellation token.
    pub fn reindex_by_change_with(
        &self,
        path: &Path,
        progress: Option<ProgressCallback>,
        cancel: &CancellationToken,
    ) -> IndexResult<ChangeCounts> {
        let id = self.registry.id_for(path);
        let _busy = self.acquire_writer(id)?;
        if cancel.is_cancelled() {
            return Err(IndexError::Cancelled);
        }

        let mut reporter = ProgressReporter::new(progress);
        self.set_state(id, CodebaseState::Preparing);
        let result = self.run_reindex(id, path, &mut reporter, cancel);
        match &result {
            Ok(_) => self.set_state(id, CodebaseState::Completed),
            Err(_) => self.set_state(id, CodebaseState::Failed),
        }
        result
    }

    fn run_reindex(
        &self,
        id: CodebaseId,
        path: &Path,
        reporter: &mut ProgressReporter,
        cancel: &CancellationToken,
    ) -> IndexResult<ChangeCounts> {
        reporter.report(IndexPhase::Preparing, 0, 100);
        self.prepare_collection(id, false)?;

        let curr = self.synchronizer.walk(path, &self.rules)?;
        let prev = self
            .synchronizer
            .load_snapshot(id)
            .unwrap_or_else(MerkleTree::empty);
        let changes = FileSynchronizer::diff(&prev, &curr);
        let counts = ChangeCounts {
            added: changes.added.len(),
            removed: changes.removed.len(),
            modified: changes.modified.len(),
        };
        if changes.is_empty() {
            reporter.report(IndexPhase::Saving, 100, 100);
            debug!(id = %id, "no changes detected");
            return Ok(counts);
        }
        info!(
            id = %id,
            added = counts.added,
            removed = counts.removed,
            modified = counts.modified,
            "applying incremental changes"
        );
        self.set_state(id, CodebaseState::Indexing);

        // Deletions first, so old and new chunks of a file never
        // coexist for a concurrent searcher.
        for relative in changes.removed.iter().chain(&changes.modified) {
            let deleted = self.with_store(id, |store| {
                store.delete_by_relative_path(id, relative).map_err(Into::into)
            })?;
            debug!(path = %relative, chunks = deleted, "purged stale chunks");
        }

        let mut to_index: Vec<String> = changes
            .added
            .iter()
            .chain(&changes.modified)
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        to_index.sort();

        let summary = self.ingest(id, path, &to_index, reporter, cancel)?;

        // The snapshot keeps untouched files as-is and admits changed
        // files only once their chunks are fully written.
        reporter.report(IndexPhase::Saving, 99, 100);
        self.save_partial_snapshot(id, &curr, &to_index, &summary.fully_indexed)?;
        reporter.report(IndexPhase::Saving, 100, 100);
        Ok(counts)
    }

    /// Search a codebase with a natural-language query.
    ///
    /// Scores are similarities in `[0, 1]`; hits below `threshold` are
    /// dropped. Hybrid collections fuse vector and full-text rankings
    /// unless the query is empty.
    pub fn semantic_search(
        &self,
        path: &Path,
        query: &str,
        top_k: usize,
        threshold: f32,
        filter_expr: Option<String>,
    ) -> IndexResult<Vec<SearchHit>> {
        let id = self.registry.id_for(path);
        if !self.has_index(path)? {
            return Err(IndexError::NotIndexed {
                path: path.to_path_buf(),
            });
        }

        let vectors = self.provider.embed_batch(&[query])?;
        let query_vector = vectors.into_iter().next().ok_or_else(|| {
            IndexError::from(EmbeddingError::Permanent {
                provider: self.provider.provider_name().to_string(),
                reason: "provider returned no vector for the query".to_string(),
            })
        })?;

        let options = SearchOptions {
            top_k,
            filter: filter_expr,
        };
        let scored = self.with_store(id, |store| {
            let mode = store.collection_mode(id)?;
            match mode {
                Some(IndexMode::Hybrid) => store
                    .hybrid_search(id, &query_vector, query, &options)
                    .map_err(Into::into),
                _ => store.search(id, &query_vector, &options).map_err(Into::into),
            }
        })?;

        Ok(scored
            .into_iter()
            .map(hit_from)
            .filter(|hit| hit.score >= threshold)
            .collect())
    }

    /// Search with the configured default `top_k` and threshold.
    pub fn search(&self, path: &Path, query: &str) -> IndexResult<Vec<SearchHit>> {
        self.semantic_search(
            path,
            query,
            self.settings.search.top_k,
            self.settings.search.threshold,
            None,
        )
    }

    /// True iff a collection exists for the codebase.
    pub fn has_index(&self, path: &Path) -> IndexResult<bool> {
        let id = self.registry.id_for(path);
        let db_path = self.registry.db_path_for_id(id)?;
        if !db_path.exists() {
            return Ok(false);
        }
        self.with_store(id, |store| store.has_collection(id).map_err(Into::into))
    }

    /// Drop the collection, the store file, the snapshot, and the
    /// path mapping for a codebase.
    pub fn clear_index(
        &self,
        path: &Path,
        progress: Option<ProgressCallback>,
    ) -> IndexResult<()> {
        let id = self.registry.id_for(path);
        let _busy = self.acquire_writer(id)?;
        let mut reporter = ProgressReporter::new(progress);
        self.set_state(id, CodebaseState::Clearing);

        reporter.report(IndexPhase::Clearing, 0, 3);
        let db_path = self.registry.db_path_for_id(id)?;
        if db_path.exists() {
            self.with_store(id, |store| store.drop_collection(id).map_err(Into::into))?;
        }
        self.close_session(id);
        reporter.report(IndexPhase::Clearing, 1, 3);

        self.synchronizer.delete_snapshot(id)?;
        reporter.report(IndexPhase::Clearing, 2, 3);

        self.registry.remove(path)?;
        reporter.report(IndexPhase::Clearing, 3, 3);

        self.set_state(id, CodebaseState::Absent);
        info!(id = %id, "index cleared");
        Ok(())
    }

    /// Observable state of a codebase.
    pub fn index_state(&self, path: &Path) -> CodebaseState {
        let id = self.registry.id_for(path);
        if let Some(state) = self.states.lock().get(&id) {
            return *state;
        }
        match self.has_index(path) {
            Ok(true) => CodebaseState::Completed,
            _ => CodebaseState::Absent,
        }
    }

    // Collection preparation

    fn prepare_collection(&self, id: CodebaseId, force: bool) -> IndexResult<()> {
        let dimension = self.resolve_dimension()?;
        let mode = if self.settings.search.hybrid {
            IndexMode::Hybrid
        } else {
            IndexMode::Dense
        };
        self.with_store(id, |store| {
            if force || !store.has_collection(id)? {
                store.create_collection(id, dimension, mode)?;
                return Ok(());
            }
            match store.collection_dimension(id)? {
                Some(existing) if existing == dimension => Ok(()),
                Some(existing) => Err(IndexError::Config {
                    reason: format!(
                        "collection dimension {existing} does not match embedder dimension {dimension}; clear the index or fix the embedding configuration"
                    ),
                }),
                None => {
                    store.create_collection(id, dimension, mode)?;
                    Ok(())
                }
            }
        })
    }

    fn resolve_dimension(&self) -> IndexResult<VectorDimension> {
        let dim = self
            .settings
            .dimension_override()
            .unwrap_or_else(|| self.provider.dimension());
        VectorDimension::new(dim).ok_or_else(|| IndexError::Config {
            reason: "embedding dimension is unknown; configure embedding.dimension or use a provider that reports one".to_string(),
        })
    }

    // Ingestion

    fn ingest(
        &self,
        id: CodebaseId,
        root: &Path,
        relative_paths: &[String],
        reporter: &mut ProgressReporter,
        cancel: &CancellationToken,
    ) -> IndexResult<IngestSummary> {
        let batch_size = self.settings.indexing.embedding_batch_size.max(1);
        let cap = self.settings.indexing.chunk_limit;
        let total = relative_paths.len();

        let mut stats = IndexStats::new();
        let mut produced = vec![0usize; total];
        let mut written = vec![0usize; total];
        let mut processed = vec![false; total];
        let mut pending: Vec<(usize, Chunk)> = Vec::new();
        let mut chunks_written = 0usize;
        let mut files_done = 0usize;
        let mut status = IndexStatus::Completed;

        'files: for (file_idx, relative) in relative_paths.iter().enumerate() {
            let absolute = root.join(relative);
            let text = match std::fs::read_to_string(&absolute) {
                Ok(text) => text,
                Err(e) => {
                    stats.add_error(relative.clone(), e.to_string());
                    warn!(path = %relative, error = %e, "skipping unreadable file");
                    files_done += 1;
                    continue;
                }
            };

            let chunks = self.splitter.split(&text, relative);
            produced[file_idx] = chunks.len();
            processed[file_idx] = true;
            pending.extend(chunks.into_iter().map(|chunk| (file_idx, chunk)));

            while pending.len() >= batch_size {
                let batch: Vec<(usize, Chunk)> = pending.drain(..batch_size).collect();
                let budget = cap.saturating_sub(chunks_written);
                let (flushed, cap_hit) = self.flush_batch(id, batch, budget, &mut written)?;
                chunks_written += flushed;
                reporter.report(IndexPhase::Indexing, files_done, total.max(1));
                if cap_hit {
                    status = IndexStatus::LimitReached;
                    break 'files;
                }
                if cancel.is_cancelled() {
                    status = IndexStatus::Cancelled;
                    break 'files;
                }
            }
            files_done += 1;
            stats.files_indexed += 1;
        }

        if status == IndexStatus::Completed && !pending.is_empty() {
            let batch: Vec<(usize, Chunk)> = std::mem::take(&mut pending);
            let budget = cap.saturating_sub(chunks_written);
            let (flushed, cap_hit) = self.flush_batch(id, batch, budget, &mut written)?;
            chunks_written += flushed;
            if cap_hit {
                status = IndexStatus::LimitReached;
            }
        }
        if status == IndexStatus::Completed {
            reporter.report(IndexPhase::Indexing, total, total.max(1));
        }

        let fully_indexed: BTreeSet<String> = relative_paths
            .iter()
            .enumerate()
            .filter(|(i, _)| processed[*i] && written[*i] == produced[*i])
            .map(|(_, path)| path.clone())
            .collect();

        stats.chunks_written = chunks_written;
        stats.stop_timing();
        info!(
            id = %id,
            files = stats.files_indexed,
            failed = stats.files_failed,
            chunks = stats.chunks_written,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            status = ?status,
            "ingestion finished"
        );

        Ok(IngestSummary {
            fully_indexed,
            chunks_written,
            status,
        })
    }

    /// Embed and upsert one batch, truncated to the remaining cap
    /// budget. Returns the number of chunks written and whether the
    /// cap was hit.
    fn flush_batch(
        &self,
        id: CodebaseId,
        batch: Vec<(usize, Chunk)>,
        budget: usize,
        written: &mut [usize],
    ) -> IndexResult<(usize, bool)> {
        let cap_hit = batch.len() > budget;
        let batch: Vec<(usize, Chunk)> = batch.into_iter().take(budget).collect();
        if batch.is_empty() {
            return Ok((0, cap_hit));
        }

        let texts: Vec<&str> = batch.iter().map(|(_, c)| c.content.as_str()).collect();
        let vectors = self.provider.embed_batch(&texts)?;
        if vectors.len() != batch.len() {
            return Err(EmbeddingError::Permanent {
                provider: self.provider.provider_name().to_string(),
                reason: format!(
                    "provider returned {} vectors for {} inputs",
                    vectors.len(),
                    batch.len()
                ),
            }
            .into());
        }

        let embedded: Vec<EmbeddedChunk> = batch
            .iter()
            .zip(vectors)
            .map(|((_, chunk), vector)| EmbeddedChunk {
                chunk: chunk.clone(),
                vector,
            })
            .collect();
        let report = self.with_store(id, |store| store.upsert(id, &embedded).map_err(Into::into))?;

        let failed: HashSet<&str> = report
            .failures
            .iter()
            .map(|(chunk_id, _)| chunk_id.as_str())
            .collect();
        for (chunk_id, reason) in &report.failures {
            warn!(chunk = %chunk_id, reason = %reason, "chunk rejected by store");
        }
        let mut flushed = 0;
        for (file_idx, chunk) in &batch {
            if !failed.contains(chunk.id.as_str()) {
                written[*file_idx] += 1;
                flushed += 1;
            }
        }
        Ok((flushed, cap_hit))
    }

    fn save_partial_snapshot(
        &self,
        id: CodebaseId,
        tree: &MerkleTree,
        touched: &[String],
        fully_indexed: &BTreeSet<String>,
    ) -> IndexResult<()> {
        let touched: HashSet<&String> = touched.iter().collect();
        let hashes: BTreeMap<String, String> = tree
            .leaves()
            .iter()
            .filter(|(path, _)| !touched.contains(path) || fully_indexed.contains(*path))
            .map(|(path, hash)| (path.clone(), hash.clone()))
            .collect();
        self.synchronizer
            .save_snapshot(id, &MerkleTree::from_hashes(hashes))
    }

    // Store session handling

    fn with_store<T>(
        &self,
        id: CodebaseId,
        f: impl FnOnce(&mut VectorStore) -> IndexResult<T>,
    ) -> IndexResult<T> {
        let mut session = self.session.lock();
        let reopen = match session.as_ref() {
            Some(open) => open.id != id,
            None => true,
        };
        if reopen {
            let db_path = self.registry.db_path_for_id(id)?;
            // Dropping the previous store closes its connection before
            // a new file opens.
            *session = None;
            let store = VectorStore::open(db_path)?;
            *session = Some(OpenStore { id, store });
        }
        let open = session.as_mut().expect("session was just populated");
        f(&mut open.store)
    }

    fn close_session(&self, id: CodebaseId) {
        let mut session = self.session.lock();
        if session.as_ref().is_some_and(|open| open.id == id) {
            *session = None;
        }
    }

    fn acquire_writer(&self, id: CodebaseId) -> IndexResult<BusyGuard> {
        let mut busy = self.busy.lock();
        if !busy.insert(id) {
            return Err(IndexError::Busy { id });
        }
        Ok(BusyGuard {
            busy: self.busy.clone(),
            id,
        })
    }

    fn set_state(&self, id: CodebaseId, state: CodebaseState) {
        self.states.lock().insert(id, state);
    }
}

struct IngestSummary {
    fully_indexed: BTreeSet<String>,
    chunks_written: usize,
    status: IndexStatus,
}

fn state_for(status: IndexStatus) -> CodebaseState {
    match status {
        IndexStatus::Completed | IndexStatus::Cancelled => CodebaseState::Completed,
        IndexStatus::LimitReached => CodebaseState::LimitReached,
    }
}

fn hit_from(scored: ScoredChunk) -> SearchHit {
    let language = scored
        .chunk
        .metadata
        .get(LANGUAGE_KEY)
        .cloned()
        .unwrap_or_else(|| {
            let ext = extension_of(&scored.chunk.relative_path);
            crate::parsing::Language::from_extension(&ext)
                .map(|l| l.tag().to_string())
                .unwrap_or_default()
        });
    SearchHit {
        content: scored.chunk.content,
        relative_path: scored.chunk.relative_path,
        start_line: scored.chunk.start_line,
        end_line: scored.chunk.end_line,
        language,
        score: (1.0 - scored.distance).clamp(0.0, 1.0),
    }
}
