/*!
 * The importer contract and the shared context importers run in.
 */

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::correspondence::CorrespondenceStore;
use crate::errors::ImportError;
use crate::source::{SourceDb, SourceQuery, SourceRow};
use crate::target::TargetSink;

use super::chunk::ChunkResult;

/// A chunked importer for one source table
///
/// Contract:
/// - `pre_import` runs once before the first chunk and may purge target
///   records and reset correspondence families.
/// - `import_chunk(offset)` reads exactly the window
///   `[offset, offset + chunk_size)` of a deterministic ordering and
///   accounts every row it reads. Row failures are counted, never returned;
///   an `Err` means the chunk as a whole could not run.
/// - `post_import` runs once after the last chunk.
#[async_trait]
pub trait Importer: Send + Sync {
    /// Table name used in logs and persisted progress
    fn name(&self) -> &'static str;

    /// Rows per chunk; must be positive
    fn chunk_size(&self) -> u64;

    async fn total_count(&self) -> Result<u64, ImportError>;

    async fn pre_import(&self) -> Result<(), ImportError>;

    async fn import_chunk(&self, offset: u64) -> Result<ChunkResult, ImportError>;

    async fn post_import(&self) -> Result<ChunkResult, ImportError> {
        Ok(ChunkResult::empty())
    }
}

/// Legacy language id and the target locale it becomes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyLocale {
    /// `lang` column value in the legacy tables
    pub lang_id: i64,
    /// Target locale, e.g. `fr_FR`
    pub locale: String,
    /// Language code used in legacy rewrite parameters, e.g. `fr`
    pub code: String,
}

/// Values importers need besides the three stores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportSettings {
    pub locales: Vec<LegacyLocale>,
    pub default_currency_id: i64,
    pub default_country_id: i64,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            locales: vec![
                LegacyLocale {
                    lang_id: 1,
                    locale: "fr_FR".to_string(),
                    code: "fr".to_string(),
                },
                LegacyLocale {
                    lang_id: 2,
                    locale: "en_US".to_string(),
                    code: "en".to_string(),
                },
            ],
            default_currency_id: 1,
            default_country_id: 64,
        }
    }
}

impl ImportSettings {
    pub fn locale_for(&self, lang_id: i64) -> Option<&LegacyLocale> {
        self.locales.iter().find(|l| l.lang_id == lang_id)
    }

    /// Locale of records created without a legacy language
    pub fn default_locale(&self) -> Option<&LegacyLocale> {
        self.locales.first()
    }
}

/// Everything an importer talks to
#[derive(Clone, Debug)]
pub struct ImportContext {
    pub source: Arc<dyn SourceDb>,
    pub target: Arc<dyn TargetSink>,
    pub correspondence: CorrespondenceStore,
    pub settings: ImportSettings,
}

impl ImportContext {
    pub fn new(
        source: Arc<dyn SourceDb>,
        target: Arc<dyn TargetSink>,
        correspondence: CorrespondenceStore,
        settings: ImportSettings,
    ) -> Self {
        Self {
            source,
            target,
            correspondence,
            settings,
        }
    }

    /// Count rows; a failure aborts the run
    pub async fn count_rows(&self, table: &str, query: &SourceQuery) -> Result<u64, ImportError> {
        self.source
            .count(query)
            .await
            .map_err(|e| ImportError::structural(table, format!("count failed: {}", e)))
    }

    /// Read a chunk window; a failure aborts the chunk
    pub async fn fetch_window(
        &self,
        table: &str,
        query: &SourceQuery,
    ) -> Result<Vec<SourceRow>, ImportError> {
        self.source
            .fetch(query)
            .await
            .map_err(|e| ImportError::structural(table, format!("chunk read failed: {}", e)))
    }
}
