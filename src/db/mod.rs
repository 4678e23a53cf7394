use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task;

pub mod graph_store;
pub mod migrate;
pub mod transaction;

pub use graph_store::SqliteGraphStore;
pub use transaction::{in_transaction, TxMode};

/// How long a writer waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database connection wrapper
#[derive(Debug, Clone)]
pub struct Db {
    path: PathBuf,
}

impl Db {
    /// Create a new database connection manager
    pub fn new<P: AsRef<Path>>(db_path: P) -> Self {
        Self {
            path: db_path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a new database connection with the store pragmas applied
    pub fn open_connection(&self) -> rusqlite::Result<Connection> {
        let conn = Connection::open(&self.path)?;

        // WAL lets validator reads run beside ingest writes; the busy timeout
        // covers concurrent writers within one run.
        conn.execute_batch(
            "PRAGMA journal_mode = WAL; \
             PRAGMA synchronous = NORMAL; \
             PRAGMA foreign_keys = ON; \
             PRAGMA temp_store = MEMORY;",
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        Ok(conn)
    }

    /// Execute a closure with a fresh connection in a blocking task.
    ///
    /// The connection is closed explicitly afterwards; a close failure is
    /// logged and never replaces the closure's result.
    pub async fn with_connection<F, T, E>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut Connection) -> std::result::Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<rusqlite::Error> + From<task::JoinError> + Send + 'static,
    {
        let db = self.clone();
        task::spawn_blocking(move || {
            let mut conn = db.open_connection()?;
            let result = f(&mut conn);
            if let Err((_, e)) = conn.close() {
                log::warn!("Failed to close connection to {}: {}", db.path.display(), e);
            }
            result
        })
        .await?
    }
}
