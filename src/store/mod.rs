//! Per-codebase vector store over SQLite with the sqlite-vec extension.
//!
//! One store file per codebase (`<id>.db`, WAL mode). A collection is
//! three tables sharing a name derived from the codebase id:
//!
//! - `<collection>`: chunk metadata rows
//! - `<collection>_vec`: vec0 virtual table holding the embeddings
//! - `<collection>_fts`: FTS5 index, hybrid collections only
//!
//! Dense search is an exact cosine scan (`vec_distance_cosine`) with
//! any filter applied before ranking. Hybrid search fuses the dense
//! and FTS rankings with RRF. Reads against missing tables return
//! empty results so "not indexed" surfaces at the orchestrator, not as
//! a database error.

mod filter;
mod fusion;

pub use filter::CompiledFilter;
pub use fusion::{FusedCandidate, RRF_K, reciprocal_rank_fusion};

use crate::error::{StoreError, StoreResult};
use crate::types::{Chunk, CodebaseId, EmbeddedChunk, IndexMode, VectorDimension};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, ffi::sqlite3_auto_extension, params_from_iter};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Once;
use tracing::{debug, warn};

/// Candidate pool size fed into RRF from each ranking.
const FUSION_POOL: usize = 50;

static REGISTER_VEC: Once = Once::new();

fn register_vec_extension() {
    REGISTER_VEC.call_once(|| unsafe {
        sqlite3_auto_extension(Some(std::mem::transmute::<
            *const (),
            unsafe extern "C" fn(
                *mut rusqlite::ffi::sqlite3,
                *mut *mut std::os::raw::c_char,
                *const rusqlite::ffi::sqlite3_api_routines,
            ) -> std::os::raw::c_int,
        >(sqlite_vec::sqlite3_vec_init as *const ())));
    });
}

/// Chunk row scored by cosine distance (smaller is closer).
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub distance: f32,
}

/// Outcome of an upsert batch: per-row failures do not abort the batch.
#[derive(Debug, Default)]
pub struct UpsertReport {
    pub inserted: usize,
    pub failures: Vec<(String, String)>,
}

/// Search parameters shared by dense and hybrid search.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub top_k: usize,
    pub filter: Option<String>,
}

/// A projected row returned by [`VectorStore::query`]: requested field
/// name to value.
pub type ChunkRow = BTreeMap<String, serde_json::Value>;

/// Fields returned by `query` when no projection is requested.
const DEFAULT_QUERY_FIELDS: &[&str] = &[
    "id",
    "content",
    "relativePath",
    "startLine",
    "endLine",
    "fileExtension",
    "metadata",
];

fn column_for_field(field: &str) -> StoreResult<&'static str> {
    match field {
        "id" => Ok("id"),
        "content" => Ok("content"),
        "relativePath" | "relative_path" => Ok("relative_path"),
        "startLine" | "start_line" => Ok("start_line"),
        "endLine" | "end_line" => Ok("end_line"),
        "fileExtension" | "file_extension" => Ok("file_extension"),
        "metadata" => Ok("metadata"),
        other => Err(StoreError::InvalidFilter {
            reason: format!(
                "field '{other}' cannot be selected; queryable fields are id, content, relativePath, startLine, endLine, fileExtension, metadata"
            ),
        }),
    }
}

#[derive(Debug, Clone)]
struct CollectionInfo {
    name: String,
    dimension: VectorDimension,
    mode: IndexMode,
}

/// On-disk container of chunks and vectors for one codebase.
pub struct VectorStore {
    conn: Connection,
    path: PathBuf,
}

impl std::fmt::Debug for VectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStore")
            .field("path", &self.path)
            .finish()
    }
}

impl VectorStore {
    /// Open (or create) the store file at `path`.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        register_vec_extension();
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Serialization(format!("create store dir: {e}")))?;
        }
        let conn = Connection::open(&path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS collections (
                name TEXT PRIMARY KEY,
                dimension INTEGER NOT NULL,
                mode TEXT NOT NULL
            );",
        )?;
        Ok(Self { conn, path })
    }

    /// Path of the underlying store file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create (or recreate) the collection for a codebase.
    ///
    /// Drops any existing tables for the id first, so the call is
    /// idempotent and a mode or dimension change always starts clean.
    pub fn create_collection(
        &mut self,
        id: CodebaseId,
        dimension: VectorDimension,
        mode: IndexMode,
    ) -> StoreResult<()> {
        self.drop_collection(id)?;

        let name = mode.collection_name(id);
        let tx = self.conn.transaction()?;
        tx.execute_batch(&format!(
            r#"
            CREATE TABLE "{name}" (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                relative_path TEXT NOT NULL,
                start_line INTEGER NOT NULL,
                end_line INTEGER NOT NULL,
                file_extension TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{{}}'
            );
            CREATE INDEX "{name}_by_path" ON "{name}"(relative_path);
            CREATE VIRTUAL TABLE "{name}_vec" USING vec0(
                id TEXT PRIMARY KEY,
                embedding float[{dim}]
            );
            "#,
            dim = dimension.get()
        ))?;
        if mode == IndexMode::Hybrid {
            tx.execute_batch(&format!(
                r#"
                CREATE VIRTUAL TABLE "{name}_fts" USING fts5(
                    id UNINDEXED,
                    content,
                    relative_path,
                    file_extension,
                    tokenize = 'unicode61'
                );
                "#
            ))?;
        }
        tx.execute(
            "INSERT INTO collections (name, dimension, mode) VALUES (?1, ?2, ?3)",
            rusqlite::params![name, dimension.get() as i64, mode.as_str()],
        )?;
        tx.commit()?;
        debug!(collection = %name, dimension = dimension.get(), "created collection");
        Ok(())
    }

    /// True iff a collection (either mode) exists for the codebase.
    pub fn has_collection(&self, id: CodebaseId) -> StoreResult<bool> {
        Ok(self.collection_info(id)?.is_some())
    }

    /// The mode of the existing collection, if any.
    pub fn collection_mode(&self, id: CodebaseId) -> StoreResult<Option<IndexMode>> {
        Ok(self.collection_info(id)?.map(|info| info.mode))
    }

    /// The dimension of the existing collection, if any.
    pub fn collection_dimension(&self, id: CodebaseId) -> StoreResult<Option<VectorDimension>> {
        Ok(self.collection_info(id)?.map(|info| info.dimension))
    }

    /// Remove every table belonging to the codebase, both modes.
    pub fn drop_collection(&mut self, id: CodebaseId) -> StoreResult<()> {
        let tx = self.conn.transaction()?;
        for mode in [IndexMode::Dense, IndexMode::Hybrid] {
            let name = mode.collection_name(id);
            tx.execute_batch(&format!(
                r#"
                DROP TABLE IF EXISTS "{name}";
                DROP TABLE IF EXISTS "{name}_vec";
                DROP TABLE IF EXISTS "{name}_fts";
                "#
            ))?;
            tx.execute("DELETE FROM collections WHERE name = ?1", [&name])?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Upsert chunks: delete-then-insert per chunk id.
    ///
    /// A vector with the wrong dimension aborts the whole batch before
    /// any write. Individual row failures are reported, not fatal;
    /// FTS write failures only degrade lexical search for those rows.
    pub fn upsert(&mut self, id: CodebaseId, chunks: &[EmbeddedChunk]) -> StoreResult<UpsertReport> {
        let info = self.require_collection(id)?;
        for entry in chunks {
            if !info.dimension.matches(&entry.vector) {
                return Err(StoreError::DimensionMismatch {
                    chunk_id: entry.chunk.id.clone(),
                    expected: info.dimension.get(),
                    actual: entry.vector.len(),
                });
            }
        }

        let name = &info.name;
        let hybrid = info.mode == IndexMode::Hybrid;
        let mut report = UpsertReport::default();

        let tx = self.conn.transaction()?;
        for entry in chunks {
            let chunk = &entry.chunk;
            let result = (|| -> StoreResult<()> {
                tx.execute(&format!(r#"DELETE FROM "{name}" WHERE id = ?1"#), [&chunk.id])?;
                tx.execute(
                    &format!(r#"DELETE FROM "{name}_vec" WHERE id = ?1"#),
                    [&chunk.id],
                )?;

                let metadata = serde_json::to_string(&chunk.metadata)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                tx.execute(
                    &format!(
                        r#"INSERT INTO "{name}"
                           (id, content, relative_path, start_line, end_line, file_extension, metadata)
                           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#
                    ),
                    rusqlite::params![
                        chunk.id,
                        chunk.content,
                        chunk.relative_path,
                        chunk.start_line,
                        chunk.end_line,
                        chunk.file_extension,
                        metadata
                    ],
                )?;

                let embedding = serde_json::to_string(&entry.vector)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                tx.execute(
                    &format!(r#"INSERT INTO "{name}_vec" (id, embedding) VALUES (?1, ?2)"#),
                    rusqlite::params![chunk.id, embedding],
                )?;
                Ok(())
            })();

            match result {
                Ok(()) => {
                    report.inserted += 1;
                    if hybrid {
                        let fts_result = tx
                            .execute(
                                &format!(r#"DELETE FROM "{name}_fts" WHERE id = ?1"#),
                                [&chunk.id],
                            )
                            .and_then(|_| {
                                tx.execute(
                                    &format!(
                                        r#"INSERT INTO "{name}_fts"
                                           (id, content, relative_path, file_extension)
                                           VALUES (?1, ?2, ?3, ?4)"#
                                    ),
                                    rusqlite::params![
                                        chunk.id,
                                        chunk.content,
                                        chunk.relative_path,
                                        chunk.file_extension
                                    ],
                                )
                            });
                        if let Err(e) = fts_result {
                            // Lexical search degrades to dense for this row.
                            warn!(chunk = %chunk.id, error = %e, "full-text index write failed");
                        }
                    }
                }
                Err(e) => report.failures.push((chunk.id.clone(), e.to_string())),
            }
        }
        tx.commit()?;
        Ok(report)
    }

    /// Delete chunks by id from every table. Missing ids are ignored.
    pub fn delete(&mut self, id: CodebaseId, chunk_ids: &[String]) -> StoreResult<()> {
        let Some(info) = self.collection_info(id)? else {
            return Ok(());
        };
        let name = &info.name;
        let tx = self.conn.transaction()?;
        for chunk_id in chunk_ids {
            tx.execute(&format!(r#"DELETE FROM "{name}" WHERE id = ?1"#), [chunk_id])?;
            tx.execute(
                &format!(r#"DELETE FROM "{name}_vec" WHERE id = ?1"#),
                [chunk_id],
            )?;
            if info.mode == IndexMode::Hybrid {
                tx.execute(
                    &format!(r#"DELETE FROM "{name}_fts" WHERE id = ?1"#),
                    [chunk_id],
                )?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Delete every chunk whose `relative_path` matches. Returns the
    /// number of chunks removed.
    pub fn delete_by_relative_path(
        &mut self,
        id: CodebaseId,
        relative_path: &str,
    ) -> StoreResult<usize> {
        let Some(info) = self.collection_info(id)? else {
            return Ok(0);
        };
        let chunk_ids: Vec<String> = {
            let mut stmt = self.conn.prepare(&format!(
                r#"SELECT id FROM "{}" WHERE relative_path = ?1"#,
                info.name
            ))?;
            let rows = stmt.query_map([relative_path], |row| row.get(0))?;
            rows.collect::<Result<_, _>>()?
        };
        self.delete(id, &chunk_ids)?;
        Ok(chunk_ids.len())
    }

    /// Rows matching a filter expression, projected onto `fields`
    /// (all queryable fields when `None`). No ordering promised.
    pub fn query(
        &self,
        id: CodebaseId,
        filter_expr: Option<&str>,
        fields: Option<&[&str]>,
        limit: Option<usize>,
    ) -> StoreResult<Vec<ChunkRow>> {
        let Some(info) = self.collection_info(id)? else {
            return Ok(Vec::new());
        };

        // Pair every requested field with its column up front so an
        // unknown field fails before any SQL runs.
        let requested = fields.unwrap_or(DEFAULT_QUERY_FIELDS);
        let mut selected: Vec<(&str, &'static str)> = Vec::with_capacity(requested.len());
        for field in requested {
            selected.push((*field, column_for_field(field)?));
        }

        let columns: Vec<String> = selected
            .iter()
            .map(|(_, column)| format!("c.{column}"))
            .collect();
        let compiled = filter::compile(filter_expr)?;
        let mut sql = format!(
            r#"SELECT {} FROM "{}" c WHERE {}"#,
            columns.join(", "),
            info.name,
            compiled.sql
        );
        let mut params = compiled.params;
        if let Some(limit) = limit {
            sql.push_str(" LIMIT ?");
            params.push(SqlValue::Integer(limit as i64));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params), |row| {
            let mut out = ChunkRow::new();
            for (i, (field, column)) in selected.iter().enumerate() {
                let value = match *column {
                    "start_line" | "end_line" => {
                        serde_json::Value::from(row.get::<_, i64>(i)?)
                    }
                    "metadata" => {
                        let raw: String = row.get(i)?;
                        serde_json::from_str(&raw)
                            .unwrap_or(serde_json::Value::String(raw))
                    }
                    _ => serde_json::Value::String(row.get::<_, String>(i)?),
                };
                out.insert((*field).to_string(), value);
            }
            Ok(out)
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// Exact dense search: top-K by ascending cosine distance, filter
    /// applied before ranking. Missing collection yields empty results.
    pub fn search(
        &self,
        id: CodebaseId,
        query_vector: &[f32],
        options: &SearchOptions,
    ) -> StoreResult<Vec<ScoredChunk>> {
        let Some(info) = self.collection_info(id)? else {
            return Ok(Vec::new());
        };
        if !info.dimension.matches(query_vector) {
            return Err(StoreError::DimensionMismatch {
                chunk_id: "<query>".to_string(),
                expected: info.dimension.get(),
                actual: query_vector.len(),
            });
        }
        self.dense_scan(&info, query_vector, options, options.top_k)
    }

    /// Hybrid search: RRF fusion of the dense and FTS rankings.
    ///
    /// Falls back to dense-only when the query text is empty, the
    /// collection is dense, or the FTS index is unavailable.
    pub fn hybrid_search(
        &self,
        id: CodebaseId,
        query_vector: &[f32],
        query_text: &str,
        options: &SearchOptions,
    ) -> StoreResult<Vec<ScoredChunk>> {
        let Some(info) = self.collection_info(id)? else {
            return Ok(Vec::new());
        };
        if info.mode != IndexMode::Hybrid || query_text.trim().is_empty() {
            return self.search(id, query_vector, options);
        }
        if !info.dimension.matches(query_vector) {
            return Err(StoreError::DimensionMismatch {
                chunk_id: "<query>".to_string(),
                expected: info.dimension.get(),
                actual: query_vector.len(),
            });
        }

        let dense = self.dense_scan(&info, query_vector, options, FUSION_POOL)?;
        let lexical = match self.lexical_scan(&info, query_text, options) {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "full-text scan failed, degrading to dense ranking");
                Vec::new()
            }
        };

        let dense_ranked: Vec<(String, f32)> = dense
            .iter()
            .map(|s| (s.chunk.id.clone(), s.distance))
            .collect();
        let fused = reciprocal_rank_fusion(&dense_ranked, &lexical);

        let mut by_id: BTreeMap<String, ScoredChunk> =
            dense.into_iter().map(|s| (s.chunk.id.clone(), s)).collect();
        let missing: Vec<String> = fused
            .iter()
            .filter(|c| !by_id.contains_key(&c.id))
            .map(|c| c.id.clone())
            .collect();
        for scored in self.fetch_scored(&info, &missing, query_vector)? {
            by_id.insert(scored.chunk.id.clone(), scored);
        }

        let mut results = Vec::with_capacity(options.top_k);
        for candidate in fused {
            if results.len() >= options.top_k {
                break;
            }
            if let Some(scored) = by_id.remove(&candidate.id) {
                results.push(scored);
            }
        }
        Ok(results)
    }

    /// Number of chunks stored for the codebase.
    pub fn count_chunks(&self, id: CodebaseId) -> StoreResult<usize> {
        let Some(info) = self.collection_info(id)? else {
            return Ok(0);
        };
        let count: i64 = self.conn.query_row(
            &format!(r#"SELECT COUNT(*) FROM "{}""#, info.name),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    // Internal helpers

    fn require_collection(&self, id: CodebaseId) -> StoreResult<CollectionInfo> {
        self.collection_info(id)?
            .ok_or_else(|| StoreError::CollectionMissing { id: id.to_string() })
    }

    fn collection_info(&self, id: CodebaseId) -> StoreResult<Option<CollectionInfo>> {
        for mode in [IndexMode::Hybrid, IndexMode::Dense] {
            let name = mode.collection_name(id);
            let exists: bool = self.conn.query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1",
                [&name],
                |row| row.get::<_, i64>(0).map(|n| n > 0),
            )?;
            if !exists {
                continue;
            }
            let dimension: i64 = self
                .conn
                .query_row(
                    "SELECT dimension FROM collections WHERE name = ?1",
                    [&name],
                    |row| row.get(0),
                )
                .unwrap_or(0);
            let Some(dimension) = VectorDimension::new(dimension as usize) else {
                return Err(StoreError::Serialization(format!(
                    "collection '{name}' has no recorded dimension; recreate it"
                )));
            };
            return Ok(Some(CollectionInfo {
                name,
                dimension,
                mode,
            }));
        }
        Ok(None)
    }

    fn dense_scan(
        &self,
        info: &CollectionInfo,
        query_vector: &[f32],
        options: &SearchOptions,
        limit: usize,
    ) -> StoreResult<Vec<ScoredChunk>> {
        let compiled = filter::compile(options.filter.as_deref())?;
        let query_json = serde_json::to_string(query_vector)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let sql = format!(
            r#"SELECT c.id, c.content, c.relative_path, c.start_line, c.end_line,
                      c.file_extension, c.metadata,
                      vec_distance_cosine(v.embedding, ?) AS distance
               FROM "{name}" c JOIN "{name}_vec" v ON v.id = c.id
               WHERE {filter}
               ORDER BY distance ASC
               LIMIT ?"#,
            name = info.name,
            filter = compiled.sql
        );
        let mut params = vec![SqlValue::Text(query_json)];
        params.extend(compiled.params);
        params.push(SqlValue::Integer(limit as i64));

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params), |row| {
            Ok(ScoredChunk {
                chunk: row_to_chunk(row)?,
                distance: row.get(7)?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    fn lexical_scan(
        &self,
        info: &CollectionInfo,
        query_text: &str,
        options: &SearchOptions,
    ) -> StoreResult<Vec<String>> {
        let match_expr = fts_match_expression(query_text);
        if match_expr.is_empty() {
            return Ok(Vec::new());
        }
        let compiled = filter::compile(options.filter.as_deref())?;
        let fts = format!("{}_fts", info.name);

        // Collection names are generated hex plus fixed prefixes, so
        // they are safe to splice unquoted (bm25 and MATCH want plain
        // identifiers).
        let sql = format!(
            "SELECT c.id, bm25({fts}) AS lex_rank
             FROM {fts} JOIN {name} c ON c.id = {fts}.id
             WHERE {fts} MATCH ? AND ({filter})
             ORDER BY lex_rank ASC
             LIMIT ?",
            name = info.name,
            filter = compiled.sql
        );
        let mut params = vec![SqlValue::Text(match_expr)];
        params.extend(compiled.params);
        params.push(SqlValue::Integer(FUSION_POOL as i64));

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params), |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// Fetch rows by id with their cosine distance to the query,
    /// preserving no particular order.
    fn fetch_scored(
        &self,
        info: &CollectionInfo,
        chunk_ids: &[String],
        query_vector: &[f32],
    ) -> StoreResult<Vec<ScoredChunk>> {
        if chunk_ids.is_empty() {
            return Ok(Vec::new());
        }
        let query_json = serde_json::to_string(query_vector)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let placeholders = vec!["?"; chunk_ids.len()].join(", ");
        let sql = format!(
            r#"SELECT c.id, c.content, c.relative_path, c.start_line, c.end_line,
                      c.file_extension, c.metadata,
                      vec_distance_cosine(v.embedding, ?) AS distance
               FROM "{name}" c JOIN "{name}_vec" v ON v.id = c.id
               WHERE c.id IN ({placeholders})"#,
            name = info.name,
        );
        let mut params = vec![SqlValue::Text(query_json)];
        params.extend(chunk_ids.iter().map(|id| SqlValue::Text(id.clone())));

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params), |row| {
            Ok(ScoredChunk {
                chunk: row_to_chunk(row)?,
                distance: row.get(7)?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }
}

fn row_to_chunk(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chunk> {
    let metadata_json: String = row.get(6)?;
    let metadata: BTreeMap<String, String> =
        serde_json::from_str(&metadata_json).unwrap_or_default();
    Ok(Chunk {
        id: row.get(0)?,
        content: row.get(1)?,
        relative_path: row.get(2)?,
        start_line: row.get(3)?,
        end_line: row.get(4)?,
        file_extension: row.get(5)?,
        metadata,
    })
}

/// Quote each token so punctuation-heavy queries cannot break the FTS
/// syntax; tokens are OR-ed, matching any of them ranks a row.
fn fts_match_expression(query_text: &str) -> String {
    query_text
        .split_whitespace()
        .map(|token| format!("\"{}\"", token.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" OR ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_id() -> CodebaseId {
        CodebaseId::derive(Path::new("/tmp/proj"))
    }

    fn open_store(temp: &TempDir) -> VectorStore {
        VectorStore::open(temp.path().join("store.db")).unwrap()
    }

    fn chunk(id_suffix: &str, path: &str, content: &str, vector: Vec<f32>) -> EmbeddedChunk {
        EmbeddedChunk {
            chunk: Chunk::new(
                path.to_string(),
                1,
                1,
                format!("{content} {id_suffix}"),
                BTreeMap::new(),
            ),
            vector,
        }
    }

    fn dim4() -> VectorDimension {
        VectorDimension::new(4).unwrap()
    }

    #[test]
    fn test_create_is_idempotent_and_detectable() {
        let temp = TempDir::new().unwrap();
        let mut store = open_store(&temp);
        let id = test_id();

        assert!(!store.has_collection(id).unwrap());
        store.create_collection(id, dim4(), IndexMode::Hybrid).unwrap();
        assert!(store.has_collection(id).unwrap());
        assert_eq!(store.collection_mode(id).unwrap(), Some(IndexMode::Hybrid));
        assert_eq!(store.collection_dimension(id).unwrap(), Some(dim4()));

        // Recreate with a different mode: previous tables must go.
        store.create_collection(id, dim4(), IndexMode::Dense).unwrap();
        assert_eq!(store.collection_mode(id).unwrap(), Some(IndexMode::Dense));
    }

    #[test]
    fn test_upsert_and_dense_search() {
        let temp = TempDir::new().unwrap();
        let mut store = open_store(&temp);
        let id = test_id();
        store.create_collection(id, dim4(), IndexMode::Dense).unwrap();

        let report = store
            .upsert(
                id,
                &[
                    chunk("a", "src/a.rs", "alpha", vec![1.0, 0.0, 0.0, 0.0]),
                    chunk("b", "src/b.rs", "beta", vec![0.0, 1.0, 0.0, 0.0]),
                ],
            )
            .unwrap();
        assert_eq!(report.inserted, 2);
        assert!(report.failures.is_empty());
        assert_eq!(store.count_chunks(id).unwrap(), 2);

        let results = store
            .search(
                id,
                &[1.0, 0.0, 0.0, 0.0],
                &SearchOptions {
                    top_k: 2,
                    filter: None,
                },
            )
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].chunk.relative_path == "src/a.rs");
        assert!(results[0].distance < results[1].distance);
    }

    #[test]
    fn test_upsert_replaces_existing_chunk_id() {
        let temp = TempDir::new().unwrap();
        let mut store = open_store(&temp);
        let id = test_id();
        store.create_collection(id, dim4(), IndexMode::Dense).unwrap();

        let entry = chunk("a", "src/a.rs", "alpha", vec![1.0, 0.0, 0.0, 0.0]);
        store.upsert(id, &[entry.clone()]).unwrap();
        store.upsert(id, &[entry]).unwrap();
        assert_eq!(store.count_chunks(id).unwrap(), 1);
    }

    #[test]
    fn test_dimension_mismatch_aborts_batch() {
        let temp = TempDir::new().unwrap();
        let mut store = open_store(&temp);
        let id = test_id();
        store.create_collection(id, dim4(), IndexMode::Dense).unwrap();

        let err = store
            .upsert(id, &[chunk("a", "src/a.rs", "alpha", vec![1.0, 0.0])])
            .unwrap_err();
        assert!(matches!(err, StoreError::DimensionMismatch { .. }));
        assert_eq!(store.count_chunks(id).unwrap(), 0);
    }

    #[test]
    fn test_delete_by_relative_path() {
        let temp = TempDir::new().unwrap();
        let mut store = open_store(&temp);
        let id = test_id();
        store.create_collection(id, dim4(), IndexMode::Dense).unwrap();
        store
            .upsert(
                id,
                &[
                    chunk("a1", "src/a.rs", "alpha one", vec![1.0, 0.0, 0.0, 0.0]),
                    chunk("a2", "src/a.rs", "alpha two", vec![0.9, 0.1, 0.0, 0.0]),
                    chunk("b", "src/b.rs", "beta", vec![0.0, 1.0, 0.0, 0.0]),
                ],
            )
            .unwrap();

        let removed = store.delete_by_relative_path(id, "src/a.rs").unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.count_chunks(id).unwrap(), 1);

        // Missing ids are silently ignored.
        store.delete(id, &["nonexistent".to_string()]).unwrap();
    }

    #[test]
    fn test_query_with_filter() {
        let temp = TempDir::new().unwrap();
        let mut store = open_store(&temp);
        let id = test_id();
        store.create_collection(id, dim4(), IndexMode::Dense).unwrap();
        store
            .upsert(
                id,
                &[
                    chunk("a", "src/a.ts", "alpha", vec![1.0, 0.0, 0.0, 0.0]),
                    chunk("b", "src/b.py", "beta", vec![0.0, 1.0, 0.0, 0.0]),
                ],
            )
            .unwrap();

        let rows = store
            .query(id, Some("fileExtension in [\".ts\"]"), None, None)
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["fileExtension"], ".ts");
        // Default projection carries every queryable field.
        assert!(rows[0].contains_key("content"));
        assert!(rows[0].contains_key("startLine"));
    }

    #[test]
    fn test_query_field_projection() {
        let temp = TempDir::new().unwrap();
        let mut store = open_store(&temp);
        let id = test_id();
        store.create_collection(id, dim4(), IndexMode::Dense).unwrap();
        store
            .upsert(
                id,
                &[chunk("a", "src/a.ts", "alpha", vec![1.0, 0.0, 0.0, 0.0])],
            )
            .unwrap();

        let rows = store
            .query(id, None, Some(&["relativePath", "startLine"]), None)
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].len(), 2);
        assert_eq!(rows[0]["relativePath"], "src/a.ts");
        assert_eq!(rows[0]["startLine"], 1);

        let err = store
            .query(id, None, Some(&["vector"]), None)
            .unwrap_err();
        assert!(err.to_string().contains("vector"));
    }

    #[test]
    fn test_search_filter_applies_before_ranking() {
        let temp = TempDir::new().unwrap();
        let mut store = open_store(&temp);
        let id = test_id();
        store.create_collection(id, dim4(), IndexMode::Dense).unwrap();
        store
            .upsert(
                id,
                &[
                    chunk("a", "src/a.ts", "alpha", vec![1.0, 0.0, 0.0, 0.0]),
                    chunk("b", "src/b.py", "beta", vec![0.99, 0.1, 0.0, 0.0]),
                ],
            )
            .unwrap();

        // The .py chunk is closer in vector space, but the filter
        // removes it before ranking.
        let results = store
            .search(
                id,
                &[0.99, 0.1, 0.0, 0.0],
                &SearchOptions {
                    top_k: 1,
                    filter: Some("fileExtension in [\".ts\"]".to_string()),
                },
            )
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.file_extension, ".ts");
    }

    #[test]
    fn test_reads_against_missing_collection_are_empty() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);
        let id = test_id();

        assert!(store.query(id, None, None, None).unwrap().is_empty());
        assert!(
            store
                .search(
                    id,
                    &[1.0, 0.0, 0.0, 0.0],
                    &SearchOptions {
                        top_k: 5,
                        filter: None
                    }
                )
                .unwrap()
                .is_empty()
        );
        assert_eq!(store.count_chunks(id).unwrap(), 0);
    }

    #[test]
    fn test_hybrid_search_fuses_lexical_match() {
        let temp = TempDir::new().unwrap();
        let mut store = open_store(&temp);
        let id = test_id();
        store.create_collection(id, dim4(), IndexMode::Hybrid).unwrap();
        store
            .upsert(
                id,
                &[
                    // Close vector, no lexical overlap with the query.
                    chunk("a", "src/a.rs", "fn compute_totals()", vec![1.0, 0.0, 0.0, 0.0]),
                    // Far vector, exact lexical match.
                    chunk(
                        "b",
                        "src/b.rs",
                        "fn frobnicate_widget()",
                        vec![0.0, 0.0, 0.0, 1.0],
                    ),
                ],
            )
            .unwrap();

        let results = store
            .hybrid_search(
                id,
                &[1.0, 0.0, 0.0, 0.0],
                "frobnicate_widget",
                &SearchOptions {
                    top_k: 2,
                    filter: None,
                },
            )
            .unwrap();
        assert_eq!(results.len(), 2);
        // b is rank 1 lexically and rank 2 dense; its accumulated RRF
        // score beats the dense-only a.
        assert_eq!(results[0].chunk.relative_path, "src/b.rs");
        assert_eq!(results[1].chunk.relative_path, "src/a.rs");

        // With topK=1 only the fused winner survives.
        let top1 = store
            .hybrid_search(
                id,
                &[1.0, 0.0, 0.0, 0.0],
                "frobnicate_widget",
                &SearchOptions {
                    top_k: 1,
                    filter: None,
                },
            )
            .unwrap();
        assert_eq!(top1.len(), 1);
        assert_eq!(top1[0].chunk.relative_path, "src/b.rs");
    }

    #[test]
    fn test_hybrid_with_empty_text_reduces_to_dense() {
        let temp = TempDir::new().unwrap();
        let mut store = open_store(&temp);
        let id = test_id();
        store.create_collection(id, dim4(), IndexMode::Hybrid).unwrap();
        store
            .upsert(
                id,
                &[chunk("a", "src/a.rs", "alpha", vec![1.0, 0.0, 0.0, 0.0])],
            )
            .unwrap();

        let dense = store
            .search(
                id,
                &[1.0, 0.0, 0.0, 0.0],
                &SearchOptions {
                    top_k: 5,
                    filter: None,
                },
            )
            .unwrap();
        let hybrid = store
            .hybrid_search(
                id,
                &[1.0, 0.0, 0.0, 0.0],
                "   ",
                &SearchOptions {
                    top_k: 5,
                    filter: None,
                },
            )
            .unwrap();
        assert_eq!(dense.len(), hybrid.len());
        assert_eq!(dense[0].chunk.id, hybrid[0].chunk.id);
    }

    #[test]
    fn test_fts_match_expression_escapes_tokens() {
        assert_eq!(fts_match_expression("hello world"), "\"hello\" OR \"world\"");
        assert_eq!(fts_match_expression("a\"b"), "\"a\"\"b\"");
        assert_eq!(fts_match_expression("  "), "");
    }

    #[test]
    fn test_drop_collection_removes_everything() {
        let temp = TempDir::new().unwrap();
        let mut store = open_store(&temp);
        let id = test_id();
        store.create_collection(id, dim4(), IndexMode::Hybrid).unwrap();
        store
            .upsert(
                id,
                &[chunk("a", "src/a.rs", "alpha", vec![1.0, 0.0, 0.0, 0.0])],
            )
            .unwrap();

        store.drop_collection(id).unwrap();
        assert!(!store.has_collection(id).unwrap());
        assert_eq!(store.count_chunks(id).unwrap(), 0);
    }
}
