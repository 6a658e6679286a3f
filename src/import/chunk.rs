/*!
 * Per-chunk accounting.
 *
 * Importers count every row they read through a [`ChunkTally`] and hand the
 * orchestrator an immutable [`ChunkResult`]. The orchestrator folds those
 * into [`RunTotals`].
 */

use log::{error, warn};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::ImportError;

/// Outcome of one `import_chunk` (or post-phase) invocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkResult {
    records_seen: u64,
    errors: u64,
    created: u64,
    skipped: u64,
}

impl ChunkResult {
    pub fn new(records_seen: u64, errors: u64) -> Self {
        Self {
            records_seen,
            errors,
            ..Self::default()
        }
    }

    /// Result of a phase that read nothing
    pub fn empty() -> Self {
        Self::default()
    }

    /// Source rows read
    pub fn records_seen(&self) -> u64 {
        self.records_seen
    }

    /// Non-fatal failures
    pub fn errors(&self) -> u64 {
        self.errors
    }

    /// Rows that produced a new target record
    pub fn created(&self) -> u64 {
        self.created
    }

    /// Rows skipped because they were already migrated
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

impl fmt::Display for ChunkResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} seen, {} created, {} skipped, {} errors",
            self.records_seen, self.created, self.skipped, self.errors
        )
    }
}

/// Mutable counter an importer fills while it walks a chunk
///
/// Each row ends in exactly one of `row_created`, `row_skipped` or
/// `row_failed`. `record_error` counts a failure that did not stop its row
/// (a link that could not be made, for instance).
#[derive(Debug)]
pub struct ChunkTally {
    table: &'static str,
    result: ChunkResult,
}

impl ChunkTally {
    pub fn new(table: &'static str) -> Self {
        Self {
            table,
            result: ChunkResult::default(),
        }
    }

    pub fn row_created(&mut self) {
        self.result.records_seen += 1;
        self.result.created += 1;
    }

    pub fn row_skipped(&mut self, source_id: i64, reason: &str) {
        warn!("{}: skipping row ID={}: {}", self.table, source_id, reason);
        self.result.records_seen += 1;
        self.result.skipped += 1;
    }

    pub fn row_failed(&mut self, error: &ImportError) {
        error!("{}: {}", self.table, error);
        self.result.records_seen += 1;
        self.result.errors += 1;
    }

    pub fn record_error(&mut self, error: &ImportError) {
        error!("{}: {}", self.table, error);
        self.result.errors += 1;
    }

    pub fn finish(self) -> ChunkResult {
        self.result
    }
}

/// Totals of one orchestrated table run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTotals {
    pub chunks: u64,
    pub records_seen: u64,
    pub created: u64,
    pub skipped: u64,
    pub errors: u64,
    /// Errors reported by the post phase, also included in `errors`
    pub post_errors: u64,
}

impl RunTotals {
    /// Fold one chunk result into the totals
    pub fn add_chunk(&mut self, result: &ChunkResult) {
        self.chunks += 1;
        self.records_seen += result.records_seen();
        self.created += result.created();
        self.skipped += result.skipped();
        self.errors += result.errors();
    }

    /// Fold the post-phase result into the totals
    pub fn add_post(&mut self, result: &ChunkResult) {
        self.errors += result.errors();
        self.post_errors += result.errors();
    }
}

impl fmt::Display for RunTotals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} chunks, {} seen, {} created, {} skipped, {} errors",
            self.chunks, self.records_seen, self.created, self.skipped, self.errors
        )
    }
}
