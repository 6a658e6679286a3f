/*!
 * Repository layer for migration progress records.
 *
 * This module provides a high-level API over the `migration_progress`
 * table, which the invocation layer uses to persist the migration cursor
 * between separate time-bounded runs.
 */

use anyhow::Result;
use log::debug;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::connection::DatabaseConnection;
use super::models::{FamilyCount, MigrationPhase, ProgressRecord};

/// Repository for progress persistence
#[derive(Clone, Debug)]
pub struct Repository {
    /// Database connection
    db: DatabaseConnection,
}

const PROGRESS_COLUMNS: &str = "table_name, run_id, phase, next_offset, total_count, records_seen, \
     created, skipped, errors, source_fingerprint, started_at, updated_at, completed_at";

impl Repository {
    /// Create a new repository with the given database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create a repository with an in-memory database (for testing)
    pub fn new_in_memory() -> Result<Self> {
        let db = DatabaseConnection::new_in_memory()?;
        Ok(Self::new(db))
    }

    /// Get the underlying connection
    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    // =========================================================================
    // Progress Operations
    // =========================================================================

    /// Get the progress record of a table
    pub async fn get_progress(&self, table_name: &str) -> Result<Option<ProgressRecord>> {
        let table_name = table_name.to_string();

        self.db
            .execute_async(move |conn| Self::get_progress_sync(conn, &table_name))
            .await
    }

    fn get_progress_sync(conn: &Connection, table_name: &str) -> Result<Option<ProgressRecord>> {
        let sql = format!(
            "SELECT {} FROM migration_progress WHERE table_name = ?1",
            PROGRESS_COLUMNS
        );
        let record = conn
            .query_row(&sql, [table_name], Self::map_progress_row)
            .optional()?;

        Ok(record)
    }

    /// Insert or replace the progress record of a table
    pub async fn save_progress(&self, record: &ProgressRecord) -> Result<()> {
        let mut record = record.clone();
        record.updated_at = chrono::Utc::now().to_rfc3339();

        self.db
            .execute_async(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO migration_progress (
                        table_name, run_id, phase, next_offset, total_count, records_seen,
                        created, skipped, errors, source_fingerprint, started_at, updated_at,
                        completed_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                    ON CONFLICT(table_name) DO UPDATE SET
                        run_id = excluded.run_id,
                        phase = excluded.phase,
                        next_offset = excluded.next_offset,
                        total_count = excluded.total_count,
                        records_seen = excluded.records_seen,
                        created = excluded.created,
                        skipped = excluded.skipped,
                        errors = excluded.errors,
                        source_fingerprint = excluded.source_fingerprint,
                        started_at = excluded.started_at,
                        updated_at = excluded.updated_at,
                        completed_at = excluded.completed_at
                    "#,
                    params![
                        record.table_name,
                        record.run_id,
                        record.phase.to_string(),
                        record.next_offset,
                        record.total_count,
                        record.records_seen,
                        record.created,
                        record.skipped,
                        record.errors,
                        record.source_fingerprint,
                        record.started_at,
                        record.updated_at,
                        record.completed_at,
                    ],
                )?;
                debug!(
                    "Saved progress for {}: {} at offset {}",
                    record.table_name, record.phase, record.next_offset
                );
                Ok(())
            })
            .await
    }

    /// List every progress record, ordered by start time
    pub async fn list_progress(&self) -> Result<Vec<ProgressRecord>> {
        self.db
            .execute_async(|conn| {
                let sql = format!(
                    "SELECT {} FROM migration_progress ORDER BY started_at ASC, table_name ASC",
                    PROGRESS_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let records = stmt
                    .query_map([], Self::map_progress_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(records)
            })
            .await
    }

    /// Forget the progress of a table; returns whether a record existed
    pub async fn delete_progress(&self, table_name: &str) -> Result<bool> {
        let table_name = table_name.to_string();

        self.db
            .execute_async(move |conn| {
                let deleted = conn.execute(
                    "DELETE FROM migration_progress WHERE table_name = ?1",
                    [&table_name],
                )?;
                Ok(deleted > 0)
            })
            .await
    }

    /// Count correspondence entries per family
    pub async fn family_counts(&self) -> Result<Vec<FamilyCount>> {
        self.db
            .execute_async(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT entity_family, COUNT(*) FROM correspondence
                     GROUP BY entity_family ORDER BY entity_family",
                )?;
                let counts = stmt
                    .query_map([], |row| {
                        Ok(FamilyCount {
                            family: row.get(0)?,
                            entries: row.get(1)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(counts)
            })
            .await
    }

    fn map_progress_row(row: &Row<'_>) -> rusqlite::Result<ProgressRecord> {
        Ok(ProgressRecord {
            table_name: row.get(0)?,
            run_id: row.get(1)?,
            phase: row
                .get::<_, String>(2)?
                .parse()
                .unwrap_or(MigrationPhase::NotStarted),
            next_offset: row.get(3)?,
            total_count: row.get(4)?,
            records_seen: row.get(5)?,
            created: row.get(6)?,
            skipped: row.get(7)?,
            errors: row.get(8)?,
            source_fingerprint: row.get(9)?,
            started_at: row.get(10)?,
            updated_at: row.get(11)?,
            completed_at: row.get(12)?,
        })
    }
}
