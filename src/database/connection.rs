/*!
 * State database connection management.
 *
 * This module handles SQLite connection creation and initialization, and
 * provides async-safe access patterns using tokio's spawn_blocking.
 */

use anyhow::{Context, Result};
use log::{debug, info};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::schema;

/// Default database filename
const DEFAULT_DB_FILENAME: &str = "migration-state.db";

/// Default database directory name under user's data directory
const DEFAULT_DB_DIRNAME: &str = "legacy-migrate";

const MEMORY_PATH: &str = ":memory:";

/// Database connection wrapper with thread-safe access
#[derive(Clone)]
pub struct DatabaseConnection {
    /// Path to the database file
    db_path: PathBuf,
    /// Thread-safe connection wrapped in Arc<Mutex>
    connection: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for DatabaseConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConnection")
            .field("db_path", &self.db_path)
            .finish()
    }
}

impl DatabaseConnection {
    /// Create a new database connection at the specified path
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create database directory: {:?}", parent))?;
            }
        }

        info!("Opening state database at: {:?}", db_path);

        let conn = Connection::open(&db_path)
            .with_context(|| format!("Failed to open database: {:?}", db_path))?;
        Self::wrap(db_path, conn)
    }

    /// Create an in-memory database (for testing and dry runs)
    pub fn new_in_memory() -> Result<Self> {
        debug!("Creating in-memory state database");

        let conn =
            Connection::open_in_memory().context("Failed to create in-memory database")?;
        Self::wrap(PathBuf::from(MEMORY_PATH), conn)
    }

    fn wrap(db_path: PathBuf, conn: Connection) -> Result<Self> {
        schema::initialize_schema(&conn)?;
        Ok(Self {
            db_path,
            connection: Arc::new(Mutex::new(conn)),
        })
    }

    fn is_in_memory(&self) -> bool {
        self.db_path.as_os_str() == MEMORY_PATH
    }

    /// Get the default database path
    pub fn default_database_path() -> Result<PathBuf> {
        let base_dir = dirs::data_local_dir()
            .or_else(dirs::data_dir)
            .or_else(|| dirs::home_dir().map(|h| h.join(".local").join("share")))
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;

        Ok(base_dir.join(DEFAULT_DB_DIRNAME).join(DEFAULT_DB_FILENAME))
    }

    /// Get the database file path
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Run `f` against the locked connection on the current thread
    pub fn execute<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .connection
            .lock()
            .map_err(|e| anyhow::anyhow!("Failed to acquire database lock: {}", e))?;

        f(&conn)
    }

    /// Run `f` against the locked connection on the blocking pool
    pub async fn execute_async<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.connection.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|e| anyhow::anyhow!("Failed to acquire database lock: {}", e))?;

            f(&conn)
        })
        .await
        .context("Database task panicked")?
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DatabaseStats> {
        self.execute(|conn| {
            let correspondence_count: i64 = conn
                .query_row("SELECT COUNT(*) FROM correspondence", [], |row| row.get(0))
                .unwrap_or(0);

            let tracked_tables: i64 = conn
                .query_row("SELECT COUNT(*) FROM migration_progress", [], |row| row.get(0))
                .unwrap_or(0);

            let completed_tables: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM migration_progress WHERE phase = 'completed'",
                    [],
                    |row| row.get(0),
                )
                .unwrap_or(0);

            let file_size = if self.is_in_memory() {
                0
            } else {
                std::fs::metadata(&self.db_path).map(|m| m.len()).unwrap_or(0)
            };

            Ok(DatabaseStats {
                correspondence_count,
                tracked_tables,
                completed_tables,
                file_size_bytes: file_size,
            })
        })
    }
}

/// State database statistics
#[derive(Debug, Clone)]
pub struct DatabaseStats {
    /// Number of correspondence entries across all families
    pub correspondence_count: i64,
    /// Number of tables with a progress record
    pub tracked_tables: i64,
    /// Number of tables whose migration completed
    pub completed_tables: i64,
    /// Database file size in bytes
    pub file_size_bytes: u64,
}

impl std::fmt::Display for DatabaseStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Mappings: {}, Tables: {} ({} completed), Size: {} KB",
            self.correspondence_count,
            self.tracked_tables,
            self.completed_tables,
            self.file_size_bytes / 1024
        )
    }
}
