/*!
 * Category importer (`rubrique` / `rubriquedesc`).
 */

use async_trait::async_trait;
use log::info;

use crate::correspondence::{EntityFamily, Lookup};
use crate::errors::ImportError;
use crate::import::{ChunkResult, ChunkTally, ImportContext, Importer};
use crate::source::{SourceQuery, SourceRow};
use crate::target::{CategoryDraft, EntityKind, TargetCommand};

use super::rewrite;
use super::{non_empty, record_row, RowOutcome};

pub const DEFAULT_CHUNK_SIZE: u64 = 50;

const TABLE: &str = "categories";
const SOURCE_TABLE: &str = "rubrique";
const DESC_TABLE: &str = "rubriquedesc";

/// Imports the category tree
///
/// Rows are ordered by parent then id, so a parent is usually migrated
/// before its children. A child whose parent is still unmapped fails.
#[derive(Debug)]
pub struct CategoriesImporter {
    context: ImportContext,
    chunk_size: u64,
}

impl CategoriesImporter {
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

    fn ordered_rows(&self) -> SourceQuery {
        SourceQuery::table(SOURCE_TABLE)
            .order_by("parent")
            .order_by("id")
    }

    async fn import_row(&self, source_id: i64, row: &SourceRow) -> Result<RowOutcome, ImportError> {
        let ctx = &self.context;

        if ctx
            .correspondence
            .get_target(EntityFamily::Categories, source_id)
            .await?
            .is_found()
        {
            return Ok(RowOutcome::Skipped("already migrated".to_string()));
        }

        let parent = row.get_i64("parent")?;
        let parent_id = if parent == 0 {
            0
        } else {
            match ctx
                .correspondence
                .get_target(EntityFamily::Categories, parent)
                .await?
            {
                Lookup::Found(id) => id,
                Lookup::NotFound => {
                    return Err(ImportError::row(
                        TABLE,
                        source_id,
                        format!("parent category {} is not migrated", parent),
                    ))
                }
            }
        };

        let descriptions = ctx
            .source
            .fetch(
                &SourceQuery::table(DESC_TABLE)
                    .filter("rubrique", source_id)
                    .order_by("lang")
                    .order_by("id"),
            )
            .await?;
        if descriptions.is_empty() {
            return Err(ImportError::row(TABLE, source_id, "no description found"));
        }

        let visible = row.get_bool("ligne")?;
        let mut category_id = None;

        for desc in &descriptions {
            let lang_id = desc.get_i64("lang")?;
            let locale = ctx.settings.locale_for(lang_id).ok_or_else(|| {
                ImportError::row(TABLE, source_id, format!("unknown language {}", lang_id))
            })?;

            let title = match non_empty(desc.get_opt_string("titre")) {
                Some(title) => title,
                None => format!("Untitled-{}-{}", desc.get_i64("id")?, locale.code),
            };

            let draft = CategoryDraft {
                locale: locale.locale.clone(),
                title,
                parent_id,
                visible,
                chapo: non_empty(desc.get_opt_string("chapo")),
                description: non_empty(desc.get_opt_string("description")),
                postscriptum: non_empty(desc.get_opt_string("postscriptum")),
            };

            let id = match category_id {
                Some(id) => {
                    ctx.target
                        .execute(TargetCommand::update(EntityKind::Category, id, &draft)?)
                        .await?;
                    id
                }
                None => {
                    let id = ctx
                        .target
                        .create(TargetCommand::create(EntityKind::Category, &draft)?)
                        .await?;
                    ctx.correspondence
                        .add_entry(EntityFamily::Categories, source_id, id)
                        .await?;
                    info!("Created category {} from '{}' ({})", id, draft.title, source_id);

                    ctx.target
                        .execute(TargetCommand::UpdatePosition {
                            kind: EntityKind::Category,
                            id,
                            position: row.get_i64("classement").unwrap_or(0),
                        })
                        .await?;
                    rewrite::migrate_record_url(ctx, "rubrique", source_id, lang_id, id, &locale.locale)
                        .await?;
                    id
                }
            };
            category_id = Some(id);
        }

        Ok(RowOutcome::Created)
    }
}

#[async_trait]
impl Importer for CategoriesImporter {
    fn name(&self) -> &'static str {
        TABLE
    }

    fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    async fn total_count(&self) -> Result<u64, ImportError> {
        self.context
            .count_rows(TABLE, &SourceQuery::table(SOURCE_TABLE))
            .await
    }

    async fn pre_import(&self) -> Result<(), ImportError> {
        let purged = self.context.target.purge(EntityKind::Category).await?;
        let reset = self
            .context
            .correspondence
            .reset(EntityFamily::Categories)
            .await?;
        info!("Categories: purged {} target records, reset {} mappings", purged, reset);
        Ok(())
    }

    async fn import_chunk(&self, offset: u64) -> Result<ChunkResult, ImportError> {
        let rows = self
            .context
            .fetch_window(TABLE, &self.ordered_rows().window(offset, self.chunk_size))
            .await?;

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
