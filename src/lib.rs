pub mod cache;
pub mod config;
pub mod db;
pub mod embeddings;
pub mod error;
pub mod extract;
pub mod index;
pub mod retrieve;
pub mod store;

pub use config::Config;
pub use error::{DocragError, Result};
pub use index::{Indexer, RunReport};
pub use retrieve::{GroundedAnswer, Retriever};
pub use store::VectorStore;
