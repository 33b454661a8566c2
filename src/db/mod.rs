use crate::error::{DocragError, Result};
use rusqlite::Connection;
use std::path::Path;
use tokio::task;

pub mod migrate;

/// Database connection wrapper
///
/// Opens a fresh connection per operation on a blocking thread. WAL mode
/// gives readers a consistent snapshot while an indexing transaction is in
/// flight, which is what makes per-document upserts atomic from the
/// perspective of concurrent queries.
pub struct Db {
    path: std::path::PathBuf,
}

impl Db {
    /// Create a new database connection manager
    pub fn new<P: AsRef<Path>>(db_path: P) -> Self {
        Self {
            path: db_path.as_ref().to_path_buf(),
        }
    }

    /// Execute a closure with a database connection in a blocking task
    pub async fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let path = self.path.clone();
        task::spawn_blocking(move || {
            let mut conn = Connection::open(&path).map_err(DocragError::Database)?;

            // WAL for concurrent readers, NORMAL sync for speed,
            // foreign keys so chunk rows cascade with their document.
            conn.execute_batch(
                "PRAGMA journal_mode = WAL; \
                 PRAGMA synchronous = NORMAL; \
                 PRAGMA foreign_keys = ON; \
                 PRAGMA temp_store = MEMORY; \
                 PRAGMA cache_size = -65536;",
            )?;

            f(&mut conn)
        })
        .await
        .map_err(|e| DocragError::Indexing(format!("Database task panicked: {}", e)))?
    }
}
