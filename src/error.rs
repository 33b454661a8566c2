use thiserror::Error;

/// Main error type for docrag
#[derive(Error, Debug)]
pub enum DocragError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Embedding API errors
    #[error("Embedding API error: {0}")]
    Embedding(String),

    /// Generation API errors
    #[error("Generation API error: {0}")]
    Generation(String),

    /// Document text extraction errors
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Indexing run errors (run-level, not per-document)
    #[error("Indexing error: {0}")]
    Indexing(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Convenient Result type using DocragError
pub type Result<T> = std::result::Result<T, DocragError>;
