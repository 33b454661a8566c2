//! Incremental document indexing: filesystem scan, mtime fingerprinting,
//! semantic chunking, and the orchestrator tying them together.

pub mod chunker;
pub mod fingerprint;
pub mod orchestrator;
pub mod scanner;

pub use chunker::{chunk_text, Chunk};
pub use fingerprint::{partition, partition_forced, ManifestEntry, Partition};
pub use orchestrator::{Indexer, RunReport};
pub use scanner::{scan_documents, DocumentMeta};
