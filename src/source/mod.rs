/*!
 * Read-only access to the legacy ("source") store.
 *
 * Importers only see the [`SourceDb`] trait: ordered, windowed queries,
 * distinct-value queries and equality lookups.
 */

use async_trait::async_trait;
use std::fmt::Debug;

use crate::errors::SourceError;

pub mod query;
pub mod row;
pub mod sqlite;

pub use query::SourceQuery;
pub use row::{SourceRow, SourceValue};
pub use sqlite::SqliteSource;

/// Tabular query interface over the legacy store
#[async_trait]
pub trait SourceDb: Send + Sync + Debug {
    /// Number of rows the query selects, ignoring its window
    async fn count(&self, query: &SourceQuery) -> Result<u64, SourceError>;

    /// Rows selected by the query, in the query's order
    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<SourceRow>, SourceError>;
}
