/*!
 * State database entity models.
 *
 * These structures map directly to database tables and provide
 * type-safe access to persisted data.
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Persisted phase of a table migration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationPhase {
    /// Pre-import has not run yet
    NotStarted,
    /// Pre-import done, chunks in progress
    Running,
    /// Post-import done
    Completed,
}

impl fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationPhase::NotStarted => write!(f, "not_started"),
            MigrationPhase::Running => write!(f, "running"),
            MigrationPhase::Completed => write!(f, "completed"),
        }
    }
}

impl std::str::FromStr for MigrationPhase {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "not_started" => Ok(MigrationPhase::NotStarted),
            "running" => Ok(MigrationPhase::Running),
            "completed" => Ok(MigrationPhase::Completed),
            _ => Err(anyhow::anyhow!("Invalid migration phase: {}", s)),
        }
    }
}

/// Progress record for one migrated table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressRecord {
    /// Table name (e.g. "products")
    pub table_name: String,
    /// Identifier of the run that started this migration (UUID)
    pub run_id: String,
    /// Current phase
    pub phase: MigrationPhase,
    /// Offset of the next chunk to import
    pub next_offset: i64,
    /// Total rows reported at run start
    pub total_count: i64,
    /// Rows read so far
    pub records_seen: i64,
    /// Rows that produced new target records
    pub created: i64,
    /// Rows skipped as already migrated
    pub skipped: i64,
    /// Rows that failed
    pub errors: i64,
    /// SHA256 of the source database when the run started
    pub source_fingerprint: Option<String>,
    /// Creation timestamp (RFC 3339)
    pub started_at: String,
    /// Last update timestamp (RFC 3339)
    pub updated_at: String,
    /// Completion timestamp, if completed
    pub completed_at: Option<String>,
}

impl ProgressRecord {
    /// Create a fresh record for a table that has not started yet
    pub fn new(table_name: String, run_id: String, source_fingerprint: Option<String>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            table_name,
            run_id,
            phase: MigrationPhase::NotStarted,
            next_offset: 0,
            total_count: 0,
            records_seen: 0,
            created: 0,
            skipped: 0,
            errors: 0,
            source_fingerprint,
            started_at: now.clone(),
            updated_at: now,
            completed_at: None,
        }
    }

    /// Whether the table still has work to do
    pub fn is_resumable(&self) -> bool {
        !matches!(self.phase, MigrationPhase::Completed)
    }

    /// Calculate completion percentage
    pub fn completion_percentage(&self) -> f64 {
        if self.phase == MigrationPhase::Completed {
            return 100.0;
        }
        if self.total_count == 0 {
            return 0.0;
        }
        (self.next_offset.min(self.total_count) as f64 / self.total_count as f64) * 100.0
    }
}

/// Aggregate view of one correspondence family
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyCount {
    /// Entity family name
    pub family: String,
    /// Number of entries
    pub entries: i64,
}
