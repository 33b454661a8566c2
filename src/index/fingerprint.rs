//! Change detection: compare the current directory scan against the
//! persisted manifest and classify each document, so an indexing run only
//! re-chunks and re-embeds what actually changed.

use crate::index::scanner::DocumentMeta;
use std::collections::HashMap;

/// One persisted manifest record: what the index currently holds for a
/// document. `modified_ns` is the fingerprint compared against the scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub file_name: String,
    pub modified_ns: i64,
    pub chunk_count: usize,
}

/// Result of classifying scanned documents against the manifest.
#[derive(Debug, Default)]
pub struct Partition {
    /// In both scan and manifest with identical mtime; skipped entirely.
    pub unchanged: Vec<DocumentMeta>,
    /// In both but mtime differs: old chunks purged, full re-chunk + re-embed.
    pub changed: Vec<DocumentMeta>,
    /// Only in the scan: chunked and embedded, nothing to purge.
    pub added: Vec<DocumentMeta>,
    /// Only in the manifest: chunks purged, manifest entry dropped.
    pub removed: Vec<String>,
}

impl Partition {
    /// Documents needing processing this run (changed first, then added,
    /// matching purge-before-add ordering inside each document's upsert).
    pub fn to_process(&self) -> impl Iterator<Item = &DocumentMeta> {
        self.changed.iter().chain(self.added.iter())
    }
}

/// Classify scanned documents against the manifest.
///
/// Equality on `modified_ns` is exact: any difference, however small,
/// classifies the document as changed.
pub fn partition(scan: &[DocumentMeta], manifest: &HashMap<String, ManifestEntry>) -> Partition {
    let mut result = Partition::default();

    for doc in scan {
        match manifest.get(&doc.file_name) {
            None => result.added.push(doc.clone()),
            Some(entry) if entry.modified_ns != doc.modified_ns => result.changed.push(doc.clone()),
            Some(_) => result.unchanged.push(doc.clone()),
        }
    }

    let scanned: std::collections::HashSet<&str> =
        scan.iter().map(|d| d.file_name.as_str()).collect();
    let mut removed: Vec<String> = manifest
        .keys()
        .filter(|name| !scanned.contains(name.as_str()))
        .cloned()
        .collect();
    removed.sort();
    result.removed = removed;

    result
}

/// Force-reindex partition: every scanned document is treated as changed
/// and every manifest-only document as removed. Used for the `--force`
/// flag and to recover from a detected manifest/index mismatch.
pub fn partition_forced(
    scan: &[DocumentMeta],
    manifest: &HashMap<String, ManifestEntry>,
) -> Partition {
    let scanned: std::collections::HashSet<&str> =
        scan.iter().map(|d| d.file_name.as_str()).collect();
    let mut removed: Vec<String> = manifest
        .keys()
        .filter(|name| !scanned.contains(name.as_str()))
        .cloned()
        .collect();
    removed.sort();

    Partition {
        unchanged: Vec::new(),
        changed: scan.to_vec(),
        added: Vec::new(),
        removed,
    }
}
