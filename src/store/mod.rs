//! SQLite-backed vector index and manifest.
//!
//! The `documents` table is the change-detection manifest and the `chunks`
//! table holds chunk text plus embedding BLOBs. Each per-document mutation
//! runs in a single transaction, so the manifest row only ever advances
//! together with the chunk set it describes, and concurrent readers (WAL
//! snapshots) never observe a half-replaced document.

use crate::db::Db;
use crate::embeddings::cosine_similarity;
use crate::error::{DocragError, Result};
use crate::index::fingerprint::ManifestEntry;
use crate::index::scanner::DocumentMeta;
use chrono::Utc;
use rusqlite::params;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// A chunk ready for storage: text plus its embedding vector.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub text: String,
    pub embedding: Vec<f32>,
}

/// A chunk returned from a similarity query, nearest-first.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk_id: String,
    pub file_name: String,
    pub chunk_index: usize,
    pub text: String,
    pub score: f32,
    pub rank: usize,
}

/// Store-level counts for the CLI stats command.
#[derive(Debug, Clone, Copy)]
pub struct StoreStats {
    pub document_count: usize,
    pub chunk_count: usize,
}

/// Stable document id: SHA256 of the file name.
pub fn doc_id_for(file_name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(file_name.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Encode an embedding as a little-endian f32 BLOB.
fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Decode an embedding BLOB; None if the length is not a multiple of 4.
fn parse_embedding(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return None;
    }

    blob.chunks(4)
        .map(|bytes| {
            let arr: [u8; 4] = bytes.try_into().ok()?;
            Some(f32::from_le_bytes(arr))
        })
        .collect()
}

/// The vector index store. Owns all manifest and chunk persistence.
pub struct VectorStore {
    db: Db,
}

impl VectorStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Atomically replace all chunks stored for a document with a new set,
    /// advancing its manifest entry to the scanned mtime in the same
    /// transaction. Returns the number of chunks stored.
    pub async fn upsert(&self, doc: &DocumentMeta, chunks: Vec<EmbeddedChunk>) -> Result<usize> {
        let doc_id = doc_id_for(&doc.file_name);
        let file_name = doc.file_name.clone();
        let modified_ns = doc.modified_ns;
        let chunk_count = chunks.len();
        let indexed_at = Utc::now().to_rfc3339();

        self.db
            .with_connection(move |conn| {
                let tx = conn.transaction()?;

                tx.execute(
                    r#"
                    INSERT INTO documents (doc_id, file_name, modified_ns, chunk_count, indexed_at)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    ON CONFLICT(doc_id) DO UPDATE SET
                        modified_ns = excluded.modified_ns,
                        chunk_count = excluded.chunk_count,
                        indexed_at = excluded.indexed_at
                    "#,
                    params![doc_id, file_name, modified_ns, chunk_count as i64, indexed_at],
                )?;

                tx.execute("DELETE FROM chunks WHERE doc_id = ?1", params![doc_id])?;

                {
                    let mut stmt = tx.prepare(
                        r#"
                        INSERT INTO chunks (chunk_id, doc_id, chunk_index, chunk_text, embedding)
                        VALUES (?1, ?2, ?3, ?4, ?5)
                        "#,
                    )?;

                    for (idx, chunk) in chunks.iter().enumerate() {
                        let chunk_id = format!("{}::{}", doc_id, idx);
                        stmt.execute(params![
                            chunk_id,
                            doc_id,
                            idx as i64,
                            chunk.text,
                            embedding_to_blob(&chunk.embedding),
                        ])?;
                    }
                }

                tx.commit()?;
                Ok::<usize, DocragError>(chunk_count)
            })
            .await
    }

    /// Delete all chunks owned by a document and drop its manifest entry.
    /// Chunks are removed via foreign-key CASCADE. No-op if the document
    /// is not in the manifest; returns whether anything was removed.
    pub async fn remove(&self, file_name: &str) -> Result<bool> {
        let file_name = file_name.to_string();
        self.db
            .with_connection(move |conn| {
                let affected = conn.execute(
                    "DELETE FROM documents WHERE file_name = ?1",
                    params![file_name],
                )?;
                Ok::<bool, DocragError>(affected > 0)
            })
            .await
    }

    /// Return the k nearest chunks to the query vector by cosine
    /// similarity, nearest-first. Ties are broken by insertion order
    /// (rowid); ranks are assigned 1-based.
    pub async fn query(
        &self,
        vector: Vec<f32>,
        k: usize,
        min_score: f32,
    ) -> Result<Vec<ScoredChunk>> {
        let rows = self
            .db
            .with_connection(move |conn| {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT c.rowid, c.chunk_id, c.chunk_index, c.chunk_text, c.embedding, d.file_name
                    FROM chunks c
                    JOIN documents d ON c.doc_id = d.doc_id
                    "#,
                )?;
                let mut rows = stmt.query([])?;
                let mut scored: Vec<(f32, i64, ScoredChunk)> = Vec::new();
                while let Some(row) = rows.next()? {
                    let rowid: i64 = row.get(0)?;
                    let chunk_id: String = row.get(1)?;
                    let chunk_index: i64 = row.get(2)?;
                    let text: String = row.get(3)?;
                    let blob: Vec<u8> = row.get(4)?;
                    let file_name: String = row.get(5)?;

                    let embedding = match parse_embedding(&blob) {
                        Some(e) if e.len() == vector.len() => e,
                        _ => continue,
                    };

                    let score = cosine_similarity(&vector, &embedding);
                    if score < min_score {
                        continue;
                    }

                    scored.push((
                        score,
                        rowid,
                        ScoredChunk {
                            chunk_id,
                            file_name,
                            chunk_index: chunk_index as usize,
                            text,
                            score,
                            rank: 0,
                        },
                    ));
                }
                Ok::<Vec<(f32, i64, ScoredChunk)>, DocragError>(scored)
            })
            .await?;

        let mut scored = rows;
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.cmp(&b.1))
        });

        let results: Vec<ScoredChunk> = scored
            .into_iter()
            .take(k)
            .enumerate()
            .map(|(idx, (_, _, mut chunk))| {
                chunk.rank = idx + 1;
                chunk
            })
            .collect();

        Ok(results)
    }

    /// Load the full manifest: file name -> entry.
    pub async fn load_manifest(&self) -> Result<HashMap<String, ManifestEntry>> {
        self.db
            .with_connection(|conn| {
                let mut stmt =
                    conn.prepare("SELECT file_name, modified_ns, chunk_count FROM documents")?;
                let rows = stmt.query_map([], |row| {
                    Ok(ManifestEntry {
                        file_name: row.get(0)?,
                        modified_ns: row.get(1)?,
                        chunk_count: row.get::<_, i64>(2)? as usize,
                    })
                })?;
                let mut manifest = HashMap::new();
                for row in rows {
                    let entry = row?;
                    manifest.insert(entry.file_name.clone(), entry);
                }
                Ok::<HashMap<String, ManifestEntry>, DocragError>(manifest)
            })
            .await
    }

    /// Structural manifest/index consistency check: every manifest entry's
    /// recorded chunk_count must match its actual chunk rows, and no chunk
    /// may exist without a manifest entry. Returns true when consistent.
    /// A mismatch is recovered by forcing a full reindex, not by failing
    /// the run.
    pub async fn verify_consistency(&self) -> Result<bool> {
        self.db
            .with_connection(|conn| {
                let mismatched: i64 = conn.query_row(
                    r#"
                    SELECT COUNT(*)
                    FROM documents d
                    LEFT JOIN (SELECT doc_id, COUNT(*) AS n FROM chunks GROUP BY doc_id) c
                        ON c.doc_id = d.doc_id
                    WHERE d.chunk_count != COALESCE(c.n, 0)
                    "#,
                    [],
                    |row| row.get(0),
                )?;

                let orphaned: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM chunks WHERE doc_id NOT IN (SELECT doc_id FROM documents)",
                    [],
                    |row| row.get(0),
                )?;

                Ok::<bool, DocragError>(mismatched == 0 && orphaned == 0)
            })
            .await
    }

    /// Delete chunk rows whose owning document has no manifest entry.
    ///
    /// Orphans cannot arise through this API (foreign keys cascade chunks
    /// with their document), only through external corruption. Forced
    /// rebuilds purge them so a recovery run actually restores
    /// consistency. Returns the number of rows purged.
    pub async fn purge_orphan_chunks(&self) -> Result<usize> {
        self.db
            .with_connection(|conn| {
                let purged = conn.execute(
                    "DELETE FROM chunks WHERE doc_id NOT IN (SELECT doc_id FROM documents)",
                    [],
                )?;
                Ok::<usize, DocragError>(purged)
            })
            .await
    }

    /// Document and chunk counts.
    pub async fn stats(&self) -> Result<StoreStats> {
        self.db
            .with_connection(|conn| {
                let document_count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
                let chunk_count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
                Ok::<StoreStats, DocragError>(StoreStats {
                    document_count: document_count as usize,
                    chunk_count: chunk_count as usize,
                })
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrate;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    async fn setup_store() -> (VectorStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Db::new(&db_path);
        let migrations_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations");
        db.with_connection(move |conn| migrate::run_migrations(conn, &migrations_dir))
            .await
            .unwrap();
        (VectorStore::new(db), temp_dir)
    }

    fn doc(file_name: &str, modified_ns: i64) -> DocumentMeta {
        DocumentMeta {
            file_name: file_name.to_string(),
            absolute_path: PathBuf::from(file_name),
            modified_ns,
            file_size: 0,
        }
    }

    fn chunk(text: &str, embedding: Vec<f32>) -> EmbeddedChunk {
        EmbeddedChunk {
            text: text.to_string(),
            embedding,
        }
    }

    #[test]
    fn test_doc_id_stable() {
        assert_eq!(doc_id_for("a.pdf"), doc_id_for("a.pdf"));
        assert_ne!(doc_id_for("a.pdf"), doc_id_for("b.pdf"));
        assert_eq!(doc_id_for("a.pdf").len(), 64);
    }

    #[test]
    fn test_embedding_blob_roundtrip() {
        let original = vec![1.0f32, -2.5, 0.0, 3.25];
        let blob = embedding_to_blob(&original);
        let parsed = parse_embedding(&blob).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_parse_embedding_invalid_length() {
        assert!(parse_embedding(&[0u8, 1, 2, 3, 4]).is_none());
    }

    #[tokio::test]
    async fn test_upsert_and_manifest() {
        let (store, _tmp) = setup_store().await;

        let n = store
            .upsert(
                &doc("a.pdf", 100),
                vec![chunk("first", vec![1.0, 0.0]), chunk("second", vec![0.0, 1.0])],
            )
            .await
            .unwrap();
        assert_eq!(n, 2);

        let manifest = store.load_manifest().await.unwrap();
        assert_eq!(manifest.len(), 1);
        let entry = &manifest["a.pdf"];
        assert_eq!(entry.modified_ns, 100);
        assert_eq!(entry.chunk_count, 2);
    }

    #[tokio::test]
    async fn test_upsert_replaces_old_chunks_wholesale() {
        let (store, _tmp) = setup_store().await;

        store
            .upsert(
                &doc("a.pdf", 100),
                vec![
                    chunk("old one", vec![1.0, 0.0]),
                    chunk("old two", vec![1.0, 0.0]),
                    chunk("old three", vec![1.0, 0.0]),
                ],
            )
            .await
            .unwrap();

        store
            .upsert(&doc("a.pdf", 200), vec![chunk("fresh", vec![1.0, 0.0])])
            .await
            .unwrap();

        // No stale chunks survive, manifest records the new mtime
        let results = store.query(vec![1.0, 0.0], 10, 0.0).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].text, "fresh");
        assert_eq!(results[0].chunk_index, 0);

        let manifest = store.load_manifest().await.unwrap();
        assert_eq!(manifest["a.pdf"].modified_ns, 200);
        assert_eq!(manifest["a.pdf"].chunk_count, 1);
    }

    #[tokio::test]
    async fn test_remove_cascades_chunks() {
        let (store, _tmp) = setup_store().await;

        store
            .upsert(&doc("a.pdf", 1), vec![chunk("text", vec![1.0, 0.0])])
            .await
            .unwrap();

        let removed = store.remove("a.pdf").await.unwrap();
        assert!(removed);

        assert!(store.load_manifest().await.unwrap().is_empty());
        assert!(store.query(vec![1.0, 0.0], 10, 0.0).await.unwrap().is_empty());

        // Removing an absent document is a no-op
        let removed = store.remove("a.pdf").await.unwrap();
        assert!(!removed);
    }

    #[tokio::test]
    async fn test_query_nearest_first_with_stable_ties() {
        let (store, _tmp) = setup_store().await;

        store
            .upsert(
                &doc("a.txt", 1),
                vec![
                    chunk("exact match", vec![1.0, 0.0]),
                    chunk("tied first", vec![0.5, 0.5]),
                    chunk("tied second", vec![0.5, 0.5]),
                    chunk("orthogonal", vec![0.0, 1.0]),
                ],
            )
            .await
            .unwrap();

        let results = store.query(vec![1.0, 0.0], 3, 0.0).await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].text, "exact match");
        assert_eq!(results[0].rank, 1);
        // Equal scores keep insertion order
        assert_eq!(results[1].text, "tied first");
        assert_eq!(results[2].text, "tied second");
        assert_eq!(results[2].rank, 3);
    }

    #[tokio::test]
    async fn test_query_min_score_filter() {
        let (store, _tmp) = setup_store().await;

        store
            .upsert(
                &doc("a.txt", 1),
                vec![
                    chunk("close", vec![1.0, 0.0]),
                    chunk("far", vec![0.0, 1.0]),
                ],
            )
            .await
            .unwrap();

        let results = store.query(vec![1.0, 0.0], 10, 0.5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].text, "close");
    }

    #[tokio::test]
    async fn test_query_annotates_owning_document() {
        let (store, _tmp) = setup_store().await;

        store
            .upsert(&doc("x.pdf", 1), vec![chunk("from x", vec![1.0, 0.0])])
            .await
            .unwrap();
        store
            .upsert(&doc("y.pdf", 1), vec![chunk("from y", vec![0.9, 0.1])])
            .await
            .unwrap();

        let results = store.query(vec![1.0, 0.0], 2, 0.0).await.unwrap();
        assert_eq!(results[0].file_name, "x.pdf");
        assert_eq!(results[1].file_name, "y.pdf");
    }

    #[tokio::test]
    async fn test_verify_consistency() {
        let (store, _tmp) = setup_store().await;
        assert!(store.verify_consistency().await.unwrap());

        store
            .upsert(&doc("a.txt", 1), vec![chunk("one", vec![1.0, 0.0])])
            .await
            .unwrap();
        assert!(store.verify_consistency().await.unwrap());

        // Corrupt the manifest: claim a chunk count the index does not hold
        store
            .db
            .with_connection(|conn| {
                conn.execute("UPDATE documents SET chunk_count = 5", [])?;
                Ok::<(), DocragError>(())
            })
            .await
            .unwrap();
        assert!(!store.verify_consistency().await.unwrap());
    }

    #[tokio::test]
    async fn test_purge_orphan_chunks() {
        let (store, _tmp) = setup_store().await;

        store
            .upsert(&doc("a.txt", 1), vec![chunk("one", vec![1.0, 0.0])])
            .await
            .unwrap();

        // Inject a chunk owned by no manifest entry; needs foreign keys
        // off, as external corruption would have them.
        store
            .db
            .with_connection(|conn| {
                conn.execute_batch("PRAGMA foreign_keys = OFF;")?;
                conn.execute(
                    "INSERT INTO chunks (chunk_id, doc_id, chunk_index, chunk_text, embedding) \
                     VALUES ('stray::0', 'stray', 0, 'stray text', x'0000803f')",
                    [],
                )?;
                Ok::<(), DocragError>(())
            })
            .await
            .unwrap();
        assert!(!store.verify_consistency().await.unwrap());

        let purged = store.purge_orphan_chunks().await.unwrap();
        assert_eq!(purged, 1);
        assert!(store.verify_consistency().await.unwrap());

        // Owned chunks survive the purge
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.document_count, 1);
        assert_eq!(stats.chunk_count, 1);
    }

    #[tokio::test]
    async fn test_upsert_empty_chunk_set() {
        let (store, _tmp) = setup_store().await;

        // A document whose text produced no chunks still gets a manifest
        // entry so it is not reprocessed every run.
        let n = store.upsert(&doc("empty.txt", 7), vec![]).await.unwrap();
        assert_eq!(n, 0);

        let manifest = store.load_manifest().await.unwrap();
        assert_eq!(manifest["empty.txt"].chunk_count, 0);
        assert!(store.verify_consistency().await.unwrap());
    }
}
