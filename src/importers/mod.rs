/*!
 * Concrete importers for the legacy shop tables.
 *
 * Each importer implements [`Importer`] for one table. [`MigrationTable`]
 * names them, fixes their dependency order and builds them from an
 * [`ImportContext`].
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::ImportError;
use crate::import::{ChunkTally, ImportContext, Importer};

pub mod categories;
pub mod products;
pub mod rewrite;
pub mod urls;

pub use categories::CategoriesImporter;
pub use products::ProductsImporter;
pub use urls::UrlsImporter;

/// Tables the migration knows how to import, in dependency order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationTable {
    Categories,
    Products,
    Urls,
}

impl MigrationTable {
    pub const ALL: [MigrationTable; 3] = [
        MigrationTable::Categories,
        MigrationTable::Products,
        MigrationTable::Urls,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Categories => "categories",
            Self::Products => "products",
            Self::Urls => "urls",
        }
    }

    /// Position in the migration order; lower runs first
    pub fn rank(&self) -> usize {
        match self {
            Self::Categories => 0,
            Self::Products => 1,
            Self::Urls => 2,
        }
    }

    pub fn default_chunk_size(&self) -> u64 {
        match self {
            Self::Categories => categories::DEFAULT_CHUNK_SIZE,
            Self::Products => products::DEFAULT_CHUNK_SIZE,
            Self::Urls => urls::DEFAULT_CHUNK_SIZE,
        }
    }

    /// Build the importer of this table
    pub fn build(&self, context: ImportContext, chunk_size: Option<u64>) -> Box<dyn Importer> {
        let chunk_size = chunk_size.unwrap_or_else(|| self.default_chunk_size());
        match self {
            Self::Categories => {
                Box::new(CategoriesImporter::new(context).with_chunk_size(chunk_size))
            }
            Self::Products => Box::new(ProductsImporter::new(context).with_chunk_size(chunk_size)),
            Self::Urls => Box::new(UrlsImporter::new(context).with_chunk_size(chunk_size)),
        }
    }
}

impl fmt::Display for MigrationTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MigrationTable {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_lowercase();
        MigrationTable::ALL
            .into_iter()
            .find(|table| table.as_str() == name)
            .ok_or_else(|| anyhow::anyhow!("Unknown table: {}", s))
    }
}

/// How a successfully handled row ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RowOutcome {
    Created,
    Skipped(String),
}

/// Account one row's result in the tally
///
/// Errors without row context are wrapped so the log line names the row.
pub(crate) fn record_row(
    tally: &mut ChunkTally,
    table: &'static str,
    source_id: i64,
    result: Result<RowOutcome, ImportError>,
) {
    match result {
        Ok(RowOutcome::Created) => tally.row_created(),
        Ok(RowOutcome::Skipped(reason)) => tally.row_skipped(source_id, &reason),
        Err(error @ ImportError::RowMigration { .. }) => tally.row_failed(&error),
        Err(error) => tally.row_failed(&ImportError::row(table, source_id, error.to_string())),
    }
}

/// `Some(text)` unless the text is blank
pub(crate) fn non_empty(text: Option<String>) -> Option<String> {
    text.filter(|t| !t.trim().is_empty())
}
