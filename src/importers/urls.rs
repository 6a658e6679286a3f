/*!
 * Rewritten URL importer (`reecriture`).
 *
 * Runs last: every URL points at a category, product, content or folder
 * that must already have a target id.
 */

use async_trait::async_trait;
use log::debug;

use crate::errors::ImportError;
use crate::import::{ChunkResult, ChunkTally, ImportContext, Importer};
use crate::source::{SourceQuery, SourceRow};

use super::rewrite::{self, RewriteRegistration, REWRITE_TABLE};
use super::{record_row, RowOutcome};

pub const DEFAULT_CHUNK_SIZE: u64 = 100;

const TABLE: &str = "urls";

#[derive(Debug)]
pub struct UrlsImporter {
    context: ImportContext,
    chunk_size: u64,
}

impl UrlsImporter {
    pub fn new(context: ImportContext) -> Self {
        Self {
            context,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    fn active_rows(&self) -> SourceQuery {
        SourceQuery::table(REWRITE_TABLE).filter("actif", 1i64)
    }

    async fn import_row(&self, source_id: i64, row: &SourceRow) -> Result<RowOutcome, ImportError> {
        let ctx = &self.context;

        let fond = row.get_string("fond")?;
        let Some((view, family)) = rewrite::view_for_fond(&fond) else {
            return Err(ImportError::row(
                TABLE,
                source_id,
                format!("view {} not found", fond),
            ));
        };

        let param = row.get_opt_string("param").unwrap_or_default();
        let Some(legacy_id) = rewrite::legacy_view_id(&param, &fond) else {
            return Err(ImportError::row(TABLE, source_id, "view_id not found"));
        };
        let view_id = ctx
            .correspondence
            .get_target(family, legacy_id)
            .await?
            .target()
            .ok_or_else(|| {
                ImportError::row(
                    TABLE,
                    source_id,
                    format!("view_id not found: {} {} is not migrated", family, legacy_id),
                )
            })?;

        let lang_id = row.get_i64("lang")?;
        let Some(locale) = ctx.settings.locale_for(lang_id) else {
            return Err(ImportError::row(TABLE, source_id, "locale not found"));
        };

        let url = row.get_string("url")?;
        match rewrite::register_rewrite(ctx, &url, view, view_id, &locale.locale).await? {
            RewriteRegistration::AlreadyRegistered => {
                Ok(RowOutcome::Skipped(format!("URL '{}' already exists", url)))
            }
            RewriteRegistration::Canonical(id) => {
                debug!("URL '{}' registered as rule {}", url, id);
                Ok(RowOutcome::Created)
            }
            RewriteRegistration::Redirect { id, canonical } => {
                debug!("URL '{}' registered as rule {} redirecting to {}", url, id, canonical);
                Ok(RowOutcome::Created)
            }
        }
    }
}

#[async_trait]
impl Importer for UrlsImporter {
    fn name(&self) -> &'static str {
        TABLE
    }

    fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    async fn total_count(&self) -> Result<u64, ImportError> {
        self.context.count_rows(TABLE, &self.active_rows()).await
    }

    /// Rewrite rules are keyed by URL and skipped when present; nothing to purge
    async fn pre_import(&self) -> Result<(), ImportError> {
        Ok(())
    }

    async fn import_chunk(&self, offset: u64) -> Result<ChunkResult, ImportError> {
        let query = self
            .active_rows()
            .order_by("id")
            .window(offset, self.chunk_size);
        let rows = self.context.fetch_window(TABLE, &query).await?;

        let mut tally = ChunkTally::new(TABLE);
        for row in &rows {
            let source_id = match row.get_i64("id") {
                Ok(id) => id,
                Err(e) => {
                    tally.row_failed(&ImportError::row(TABLE, 0, format!("unreadable id: {}", e)));
                    continue;
                }
            };
            let result = self.import_row(source_id, row).await;
            record_row(&mut tally, TABLE, source_id, result);
        }

        Ok(tally.finish())
    }
}
