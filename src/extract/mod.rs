use crate::error::{DocragError, Result};
use std::path::Path;

/// Trait for document text extractors
///
/// Extraction is the boundary between source files and the indexing
/// pipeline: given a file on disk, produce its raw text. A failed
/// extraction skips the document for the run without touching its
/// manifest entry.
pub trait TextExtractor: Send + Sync {
    /// Check if this extractor can handle the given file extension
    fn can_extract(&self, extension: &str) -> bool;

    /// Extract raw text from the file
    fn extract(&self, path: &Path) -> Result<String>;
}

/// PDF text extraction via the embedded text layer.
pub struct PdfExtractor;

impl TextExtractor for PdfExtractor {
    fn can_extract(&self, extension: &str) -> bool {
        extension.eq_ignore_ascii_case("pdf")
    }

    fn extract(&self, path: &Path) -> Result<String> {
        pdf_extract::extract_text(path).map_err(|e| {
            DocragError::Extraction(format!("Failed to extract PDF {}: {}", path.display(), e))
        })
    }
}

/// Plain text / Markdown extraction: the file content as-is.
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn can_extract(&self, extension: &str) -> bool {
        matches!(
            extension.to_lowercase().as_str(),
            "txt" | "md" | "markdown"
        )
    }

    fn extract(&self, path: &Path) -> Result<String> {
        std::fs::read_to_string(path).map_err(|e| {
            DocragError::Extraction(format!("Failed to read {}: {}", path.display(), e))
        })
    }
}

/// Registry selecting the appropriate extractor by file extension
pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn TextExtractor>>,
}

impl ExtractorRegistry {
    /// Create a registry with all built-in extractors
    pub fn new() -> Self {
        let mut registry = Self {
            extractors: Vec::new(),
        };

        registry.register(Box::new(PdfExtractor));
        registry.register(Box::new(PlainTextExtractor));

        registry
    }

    /// Register an extractor
    pub fn register(&mut self, extractor: Box<dyn TextExtractor>) {
        self.extractors.push(extractor);
    }

    /// Extensions this registry can handle are everything the scanner
    /// discovers; an unknown extension is an extraction error.
    pub fn extract(&self, path: &Path) -> Result<String> {
        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_lowercase();

        let extractor = self
            .extractors
            .iter()
            .find(|e| e.can_extract(&extension))
            .ok_or_else(|| {
                DocragError::Extraction(format!(
                    "No extractor for extension '{}' ({})",
                    extension,
                    path.display()
                ))
            })?;

        extractor.extract(path)
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_plaintext_extract() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("note.txt");
        fs::write(&path, "hello world").unwrap();

        let registry = ExtractorRegistry::new();
        let text = registry.extract(&path).unwrap();
        assert_eq!(text, "hello world");
    }

    #[test]
    fn test_markdown_extract() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("README.md");
        fs::write(&path, "# Title\n\nBody.").unwrap();

        let registry = ExtractorRegistry::new();
        let text = registry.extract(&path).unwrap();
        assert!(text.contains("Body."));
    }

    #[test]
    fn test_unknown_extension_is_extraction_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("image.png");
        fs::write(&path, b"\x89PNG").unwrap();

        let registry = ExtractorRegistry::new();
        let result = registry.extract(&path);
        assert!(matches!(result, Err(DocragError::Extraction(_))));
    }

    #[test]
    fn test_corrupt_pdf_is_extraction_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.pdf");
        fs::write(&path, "this is not a pdf").unwrap();

        let registry = ExtractorRegistry::new();
        let result = registry.extract(&path);
        assert!(matches!(result, Err(DocragError::Extraction(_))));
    }
}
