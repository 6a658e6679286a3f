/*!
 * Legacy store backed by a SQLite dump of the old database.
 */

use async_trait::async_trait;
use log::{debug, info};
use rusqlite::{params_from_iter, Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::errors::SourceError;

use super::query::SourceQuery;
use super::row::{SourceRow, SourceValue};
use super::SourceDb;

/// Read-only SQLite source
#[derive(Clone)]
pub struct SqliteSource {
    path: PathBuf,
    connection: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSource").field("path", &self.path).finish()
    }
}

impl SqliteSource {
    /// Open the legacy database read-only
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        use anyhow::Context;

        let path = path.as_ref().to_path_buf();
        info!("Opening legacy database at: {:?}", path);

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI,
        )
        .with_context(|| format!("Failed to open legacy database: {:?}", path))?;

        Ok(Self {
            path,
            connection: Arc::new(Mutex::new(conn)),
        })
    }

    /// Wrap an existing connection (fixtures and tests)
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            path: PathBuf::from(":memory:"),
            connection: Arc::new(Mutex::new(conn)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn run<F, T>(&self, f: F) -> Result<T, SourceError>
    where
        F: FnOnce(&Connection) -> Result<T, SourceError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.connection.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|e| SourceError::Query(format!("Failed to acquire source lock: {}", e)))?;
            f(&conn)
        })
        .await
        .map_err(|e| SourceError::Query(format!("Source task panicked: {}", e)))?
    }
}

fn query_error(sql: &str, error: rusqlite::Error) -> SourceError {
    SourceError::Query(format!("{} ({})", error, sql))
}

#[async_trait]
impl SourceDb for SqliteSource {
    async fn count(&self, query: &SourceQuery) -> Result<u64, SourceError> {
        let (sql, params) = query.to_count_sql()?;

        self.run(move |conn| {
            let count: i64 = conn
                .query_row(&sql, params_from_iter(params.iter()), |row| row.get(0))
                .map_err(|e| query_error(&sql, e))?;
            Ok(count.max(0) as u64)
        })
        .await
    }

    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<SourceRow>, SourceError> {
        let (sql, params) = query.to_sql()?;
        debug!("Source query: {}", sql);

        self.run(move |conn| {
            let mut stmt = conn.prepare(&sql).map_err(|e| query_error(&sql, e))?;
            let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

            let mut rows = stmt
                .query(params_from_iter(params.iter()))
                .map_err(|e| query_error(&sql, e))?;

            let mut result = Vec::new();
            while let Some(row) = rows.next().map_err(|e| query_error(&sql, e))? {
                let mut source_row = SourceRow::new();
                for (index, column) in columns.iter().enumerate() {
                    let value = row.get_ref(index).map_err(|e| query_error(&sql, e))?;
                    source_row.insert(column, SourceValue::from(value));
                }
                result.push(source_row);
            }

            Ok(result)
        })
        .await
    }
}
