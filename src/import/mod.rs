/*!
 * Chunked import engine.
 *
 * - `chunk`: per-chunk accounting
 * - `importer`: the importer contract and its context
 * - `orchestrator`: the per-table state machine
 */

pub mod chunk;
pub mod importer;
pub mod orchestrator;

pub use chunk::{ChunkResult, ChunkTally, RunTotals};
pub use importer::{ImportContext, ImportSettings, Importer, LegacyLocale};
pub use orchestrator::{
    MigrationOrchestrator, MigrationState, SliceBudget, SliceClock, StepOutcome,
};
