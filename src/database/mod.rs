/*!
 * State database for persistent migration bookkeeping.
 *
 * This module provides SQLite-based persistence for:
 * - The correspondence table shared by all importers
 * - Per-table migration progress, so runs can resume
 */

pub mod schema;
pub mod connection;
pub mod repository;
pub mod models;

// Re-export main types
pub use connection::DatabaseConnection;
pub use repository::Repository;
