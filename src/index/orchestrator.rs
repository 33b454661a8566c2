//! Drives one indexing run: scan, classify, purge, re-chunk, re-embed,
//! store. Owns the run state explicitly (no process-wide singletons) so
//! multiple independent indexers can coexist in one process.

use crate::config::ChunkingConfig;
use crate::embeddings::Embedder;
use crate::error::{DocragError, Result};
use crate::extract::ExtractorRegistry;
use crate::index::chunker;
use crate::index::fingerprint::{partition, partition_forced};
use crate::index::scanner::{scan_documents, DocumentMeta};
use crate::store::{EmbeddedChunk, VectorStore};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

/// Per-run document counts reported to the caller.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    /// Skipped: fingerprint matched the manifest.
    pub unchanged: usize,
    /// Newly indexed documents.
    pub added: usize,
    /// Re-indexed documents (fingerprint changed, or forced).
    pub updated: usize,
    /// Purged documents no longer present on disk.
    pub removed: usize,
    /// Documents that failed this run and will be retried next run.
    pub failed: usize,
}

impl RunReport {
    /// True when the run touched neither the index nor the manifest.
    pub fn is_noop(&self) -> bool {
        self.added == 0 && self.updated == 0 && self.removed == 0 && self.failed == 0
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unchanged={} added={} updated={} removed={} failed={}",
            self.unchanged, self.added, self.updated, self.removed, self.failed
        )
    }
}

/// The indexing orchestrator.
///
/// Composes the scanner, fingerprint partition, extractor registry,
/// semantic chunker, embedder, and vector store into one incremental run.
pub struct Indexer {
    docs_root: PathBuf,
    store: VectorStore,
    embedder: Arc<dyn Embedder>,
    extractors: ExtractorRegistry,
    chunking: ChunkingConfig,
    /// Exclusive run lock: two runs against the same manifest/index pair
    /// must not interleave.
    run_lock: Mutex<()>,
}

impl Indexer {
    pub fn new(
        docs_root: PathBuf,
        store: VectorStore,
        embedder: Arc<dyn Embedder>,
        chunking: ChunkingConfig,
    ) -> Self {
        Self {
            docs_root,
            store,
            embedder,
            extractors: ExtractorRegistry::new(),
            chunking,
            run_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    /// Run one indexing pass.
    ///
    /// With `force` set, staleness detection is bypassed and every
    /// document on disk is fully re-chunked and re-embedded. A detected
    /// manifest/index mismatch escalates an incremental run to a forced
    /// one rather than failing.
    ///
    /// Per-document failures (extraction, embedding, store write) are
    /// isolated: they are logged, counted in the report, and leave that
    /// document's manifest entry and old chunks untouched so the next run
    /// retries it. The run itself only errors if every attempted document
    /// failed.
    pub async fn run(&self, force: bool) -> Result<RunReport> {
        let _guard = self.run_lock.lock().await;
        let start = Instant::now();

        let scan = scan_documents(&self.docs_root)?;

        let mut force = force;
        if !force && !self.store.verify_consistency().await? {
            log::warn!("Manifest/index mismatch detected; forcing a full reindex");
            force = true;
        }

        // A rebuild only restores consistency if chunks with no manifest
        // owner are also dropped; re-upserting scanned documents cannot
        // reach them.
        if force {
            let purged = self.store.purge_orphan_chunks().await?;
            if purged > 0 {
                log::warn!("Purged {} orphaned chunks", purged);
            }
        }

        let manifest = self.store.load_manifest().await?;
        let parts = if force {
            log::info!("Mode: full reindex ({} documents)", scan.len());
            partition_forced(&scan, &manifest)
        } else {
            partition(&scan, &manifest)
        };

        log::info!(
            "Classification: unchanged={} changed={} added={} removed={}",
            parts.unchanged.len(),
            parts.changed.len(),
            parts.added.len(),
            parts.removed.len()
        );

        let mut report = RunReport {
            unchanged: parts.unchanged.len(),
            ..Default::default()
        };

        for file_name in &parts.removed {
            match self.store.remove(file_name).await {
                Ok(_) => {
                    log::info!("Removed {}", file_name);
                    report.removed += 1;
                }
                Err(e) => {
                    log::warn!("Failed to remove {}: {}", file_name, e);
                    report.failed += 1;
                }
            }
        }

        let mut attempted = 0usize;
        let mut process_failures = 0usize;
        for doc in parts.to_process() {
            attempted += 1;
            let previously_indexed = manifest.contains_key(&doc.file_name);

            match self.process_document(doc).await {
                Ok(chunk_count) => {
                    log::info!("Indexed {} ({} chunks)", doc.file_name, chunk_count);
                    if previously_indexed {
                        report.updated += 1;
                    } else {
                        report.added += 1;
                    }
                }
                Err(e) => {
                    // Manifest entry untouched: the document stays pending
                    // and is retried on the next run.
                    log::warn!("Failed to index {}: {}", doc.file_name, e);
                    report.failed += 1;
                    process_failures += 1;
                }
            }
        }

        if attempted > 0 && process_failures == attempted {
            return Err(DocragError::Indexing(format!(
                "All {} documents failed to index",
                attempted
            )));
        }

        log::info!("Indexing run complete in {:?}: {}", start.elapsed(), report);
        Ok(report)
    }

    /// Process one document end to end: extract text, chunk semantically,
    /// embed the chunk texts, and atomically replace the stored set.
    /// Any failure leaves the document in its prior state.
    async fn process_document(&self, doc: &DocumentMeta) -> Result<usize> {
        let text = self.extractors.extract(&doc.absolute_path)?;

        let chunks = chunker::chunk_text(&text, self.embedder.as_ref(), &self.chunking).await?;

        let embedded = if chunks.is_empty() {
            Vec::new()
        } else {
            let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed_batch(texts).await?;
            if vectors.len() != chunks.len() {
                return Err(DocragError::Embedding(format!(
                    "Embedding count mismatch for {}: {} chunks, {} vectors",
                    doc.file_name,
                    chunks.len(),
                    vectors.len()
                )));
            }
            chunks
                .into_iter()
                .zip(vectors)
                .map(|(chunk, embedding)| EmbeddedChunk {
                    text: chunk.text,
                    embedding,
                })
                .collect()
        };

        self.store.upsert(doc, embedded).await
    }
}
