//! Shared SQLite connection handle
//!
//! rusqlite is synchronous, so every store call runs its statements inside
//! `spawn_blocking` while holding the connection mutex.

use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Path value that selects an in-memory database
pub const MEMORY_PATH: &str = ":memory:";

const BUSY_TIMEOUT_MS: u32 = 5000;

/// Thread-safe SQLite connection wrapper
#[derive(Clone)]
pub struct SqlitePool {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl SqlitePool {
    /// Open (or create) the database at `path` and configure pragmas
    pub fn open(path: &Path) -> Result<Self> {
        info!(path = %path.display(), "Opening SQLite database");

        let in_memory = path.to_str() == Some(MEMORY_PATH);
        let conn = if in_memory {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            Connection::open(path)?
        };

        configure_pragmas(&conn, !in_memory)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: path.to_path_buf(),
        })
    }

    pub fn memory() -> Result<Self> {
        Self::open(Path::new(MEMORY_PATH))
    }

    /// Execute a closure with the connection on the current thread
    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock();
        f(&mut conn)
    }

    /// Execute a closure with the connection on the blocking thread pool
    pub async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.clone();
        tokio::task::spawn_blocking(move || pool.with_connection(f)).await?
    }
}

fn configure_pragmas(conn: &Connection, on_disk: bool) -> Result<()> {
    debug!("Configuring SQLite pragmas");

    if on_disk {
        // journal_mode returns a row, so it cannot go through execute()
        let mode: String = conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
        if !mode.eq_ignore_ascii_case("wal") {
            debug!(mode = %mode, "WAL mode unavailable");
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
    }

    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(std::time::Duration::from_millis(BUSY_TIMEOUT_MS as u64))?;
    conn.execute_batch("PRAGMA temp_store = MEMORY;")?;

    Ok(())
}

impl std::fmt::Debug for SqlitePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlitePool").field("path", &self.path).finish()
    }
}

/// Map a missing-parent or permission failure into a readable message
pub(crate) fn describe_open_failure(path: &Path, err: &Error) -> String {
    format!("failed to open {}: {}", path.display(), err)
}
