use crate::error::{DocragError, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Metadata for a discovered source document
#[derive(Debug, Clone)]
pub struct DocumentMeta {
    /// Path relative to the docs folder; the document's identity key.
    pub file_name: String,
    pub absolute_path: PathBuf,
    /// Modification time as nanoseconds since the Unix epoch. Change
    /// detection compares this exactly, with no tolerance window.
    pub modified_ns: i64,
    pub file_size: u64,
}

/// Convert a file modification time to integer nanoseconds since the epoch.
pub fn mtime_ns(modified: std::time::SystemTime) -> Result<i64> {
    let duration = modified
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|_| DocragError::Config("File modification time predates Unix epoch".to_string()))?;
    i64::try_from(duration.as_nanos())
        .map_err(|_| DocragError::Config("File modification time out of range".to_string()))
}

/// Discover all source documents under the docs folder.
///
/// Recursively walks the directory tree. Only document formats the
/// extraction registry understands are returned (case-insensitive):
/// `.pdf`, `.txt`, `.md`, `.markdown`. Everything else is skipped.
pub fn scan_documents(root: &Path) -> Result<Vec<DocumentMeta>> {
    let mut documents = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();

        if !path.is_file() {
            continue;
        }

        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_lowercase();

        if !matches!(extension.as_str(), "pdf" | "txt" | "md" | "markdown") {
            continue;
        }

        let metadata = std::fs::metadata(path).map_err(DocragError::Io)?;

        let file_name = path
            .strip_prefix(root)
            .map_err(|_| {
                DocragError::Config(format!(
                    "Failed to compute relative path for: {}",
                    path.display()
                ))
            })?
            .to_string_lossy()
            .replace('\\', "/");

        documents.push(DocumentMeta {
            file_name,
            absolute_path: path.to_path_buf(),
            modified_ns: mtime_ns(metadata.modified().map_err(DocragError::Io)?)?,
            file_size: metadata.len(),
        });
    }

    // Stable order so runs process documents deterministically
    documents.sort_by(|a, b| a.file_name.cmp(&b.file_name));

    log::debug!("Discovered {} documents in {}", documents.len(), root.display());
    Ok(documents)
}
