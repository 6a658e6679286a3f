/*!
 * # legacy-migrate
 *
 * Chunked, resumable migration of a legacy e-commerce catalogue into a new
 * store.
 *
 * ## Features
 *
 * - Table by table migration in fixed-size chunks
 * - Resume at the next chunk after an interruption or a time-bounded run
 * - Idempotent re-runs through a persistent correspondence table
 * - A failing row is logged and counted, the chunk goes on
 * - Categories, products (with taxes, media, contents and accessories) and
 *   rewritten URLs
 *
 * ## Architecture
 *
 * - `app_config`: Configuration management
 * - `app_controller`: Runs tables and persists their progress
 * - `correspondence`: Legacy id to target id mapping, per entity family
 * - `database`: State database (correspondence and progress)
 * - `source`: Read access to the legacy database
 * - `target`: Commands against the target store:
 *   - `target::memory`: In-memory store
 *   - `target::sqlite`: SQLite document store
 * - `import`: Importer contract, chunk accounting and the orchestrator
 * - `importers`: Concrete importers for each migrated table
 * - `errors`: Custom error types for the application
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod app_controller;
pub mod correspondence;
pub mod database;
pub mod errors;
pub mod import;
pub mod importers;
pub mod source;
pub mod target;

// Re-export main types for easier usage
pub use app_config::Config;
pub use app_controller::{Controller, RunOptions, StatusReport, TableReport};
pub use correspondence::{CorrespondenceStore, EntityFamily, Lookup};
pub use errors::{AppError, CorrespondenceError, ImportError, SourceError, TargetError};
pub use import::{
    ChunkResult, ImportContext, ImportSettings, Importer, MigrationOrchestrator, MigrationState,
    SliceBudget,
};
pub use importers::MigrationTable;
