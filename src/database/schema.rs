/*!
 * State database schema definitions and migrations.
 *
 * The state database holds the correspondence table shared by every importer
 * and the per-table progress records used to resume interrupted runs.
 */

use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use rusqlite::{Connection, OptionalExtension};

/// Ordered schema steps; step `n` brings the database to version `n + 1`
const MIGRATIONS: &[&str] = &[
    // v1: correspondence and per-table progress
    r#"
    CREATE TABLE correspondence (
        entity_family TEXT NOT NULL,
        source_id INTEGER NOT NULL,
        target_id INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        PRIMARY KEY (entity_family, source_id)
    );
    CREATE INDEX idx_correspondence_target ON correspondence(entity_family, target_id);

    CREATE TABLE migration_progress (
        table_name TEXT PRIMARY KEY,
        run_id TEXT NOT NULL,
        phase TEXT NOT NULL DEFAULT 'not_started',
        next_offset INTEGER NOT NULL DEFAULT 0,
        total_count INTEGER NOT NULL DEFAULT 0,
        records_seen INTEGER NOT NULL DEFAULT 0,
        created INTEGER NOT NULL DEFAULT 0,
        skipped INTEGER NOT NULL DEFAULT 0,
        errors INTEGER NOT NULL DEFAULT 0,
        source_fingerprint TEXT,
        started_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        completed_at TEXT
    );
    "#,
];

/// Version a fully migrated database reports
pub const SCHEMA_VERSION: i32 = MIGRATIONS.len() as i32;

/// Bring the state database up to [`SCHEMA_VERSION`]
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         CREATE TABLE IF NOT EXISTS schema_version (
             id INTEGER PRIMARY KEY CHECK (id = 1),
             version INTEGER NOT NULL,
             updated_at TEXT NOT NULL
         );",
    )
    .context("Failed to prepare schema_version table")?;

    let current = get_schema_version(conn)?;
    if current > SCHEMA_VERSION {
        return Err(anyhow!(
            "State database has schema v{}, newer than supported v{}",
            current,
            SCHEMA_VERSION
        ));
    }
    if current == SCHEMA_VERSION {
        debug!("State database schema is up to date (v{})", current);
        return Ok(());
    }

    for (index, step) in MIGRATIONS.iter().enumerate().skip(current as usize) {
        let version = index as i32 + 1;
        conn.execute_batch(&format!("BEGIN;\n{}\nCOMMIT;", step))
            .with_context(|| format!("Failed to apply state schema v{}", version))?;
        set_schema_version(conn, version)?;
        info!("State database schema upgraded to v{}", version);
    }

    Ok(())
}

fn get_schema_version(conn: &Connection) -> Result<i32> {
    let version = conn
        .query_row("SELECT version FROM schema_version WHERE id = 1", [], |row| {
            row.get(0)
        })
        .optional()
        .context("Failed to read schema version")?;

    Ok(version.unwrap_or(0))
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_version (id, version, updated_at) VALUES (1, ?1, datetime('now'))",
        [version],
    )?;
    Ok(())
}
