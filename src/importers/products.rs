/*!
 * Product importer (`produit` and its satellite tables).
 *
 * Pre phase: purges products, their media, taxes and tax rules, resets the
 * `products` and `tax` families and derives one tax rule per distinct legacy
 * VAT rate. Each row then creates a product with its translations, position,
 * related contents, template, media and legacy URL. The post phase links
 * accessories, once every product exists.
 */

use async_trait::async_trait;
use log::{info, warn};
use serde_json::json;
use std::collections::BTreeMap;

use crate::correspondence::{tax_rate_key, EntityFamily, Lookup};
use crate::errors::ImportError;
use crate::import::{ChunkResult, ChunkTally, ImportContext, Importer, LegacyLocale};
use crate::source::{SourceQuery, SourceRow};
use crate::target::{
    EntityKind, Link, MediaDraft, ProductDraft, TargetCommand, TaxDraft, TaxRuleDraft, TitleDraft,
};

use super::rewrite;
use super::{non_empty, record_row, RowOutcome};

pub const DEFAULT_CHUNK_SIZE: u64 = 10;

const TABLE: &str = "products";
const SOURCE_TABLE: &str = "produit";
const DESC_TABLE: &str = "produitdesc";
const CONTENT_TABLE: &str = "contenuassoc";
const ACCESSORY_TABLE: &str = "accessoire";

/// `contenuassoc.type` of associations owned by a product
const PRODUCT_CONTENT_TYPE: i64 = 1;

const PERCENT_TAX_TYPE: &str = "PricePercentTaxType";

/// Legacy media table and the target kind it becomes
const MEDIA_TABLES: [(&str, EntityKind); 2] = [
    ("image", EntityKind::ProductImage),
    ("document", EntityKind::ProductDocument),
];

#[derive(Debug)]
pub struct ProductsImporter {
    context: ImportContext,
    chunk_size: u64,
}

/// Legacy product fields shared by the create and update commands
struct ProductBase {
    reference: String,
    default_category_id: i64,
    visible: bool,
    base_price: f64,
    base_weight: f64,
    tax_rule_id: i64,
}

impl ProductBase {
    fn draft(&self, locale: &LegacyLocale, title: String, currency_id: i64) -> ProductDraft {
        ProductDraft {
            reference: self.reference.clone(),
            locale: locale.locale.clone(),
            title,
            default_category_id: self.default_category_id,
            visible: self.visible,
            base_price: self.base_price,
            base_weight: self.base_weight,
            tax_rule_id: self.tax_rule_id,
            currency_id,
            chapo: None,
            description: None,
            postscriptum: None,
        }
    }
}

fn rate_label(rate: f64) -> String {
    format!("TVA {}%", rate)
}

impl ProductsImporter {
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
            .order_by("rubrique")
            .order_by("id")
    }

    /// One tax and one tax rule per distinct VAT rate
    async fn import_taxes(&self) -> Result<usize, ImportError> {
        let ctx = &self.context;
        let rows = ctx
            .source
            .fetch(&SourceQuery::distinct(SOURCE_TABLE, "tva").order_by("tva"))
            .await
            .map_err(|e| ImportError::structural(TABLE, format!("VAT rates read failed: {}", e)))?;

        // 19.6 and 19.60 are the same rate
        let mut rates = BTreeMap::new();
        for row in &rows {
            match row.get_f64("tva") {
                Ok(rate) => {
                    rates.entry(tax_rate_key(rate)).or_insert(rate);
                }
                Err(e) => warn!("Ignoring unreadable VAT rate: {}", e),
            }
        }

        let mut locales = ctx.settings.locales.iter();
        let Some(first) = locales.next() else {
            return Err(ImportError::structural(TABLE, "no locale configured"));
        };
        let others: Vec<&LegacyLocale> = locales.collect();

        for (key, rate) in &rates {
            let tax_id = ctx
                .target
                .create(TargetCommand::create(
                    EntityKind::Tax,
                    &TaxDraft {
                        locale: first.locale.clone(),
                        title: rate_label(*rate),
                        description: Some(format!(
                            "This tax was imported from the legacy shop using {}",
                            rate_label(*rate)
                        )),
                        tax_type: PERCENT_TAX_TYPE.to_string(),
                        requirements: json!({ "percent": rate }),
                    },
                )?)
                .await?;
            info!("Created tax ID={} for {}", tax_id, rate_label(*rate));

            let rule_id = ctx
                .target
                .create(TargetCommand::create(
                    EntityKind::TaxRule,
                    &TaxRuleDraft {
                        locale: first.locale.clone(),
                        title: format!("Tax rule for {}", rate_label(*rate)),
                        description: Some(format!(
                            "This tax rule was created from the legacy shop using {}",
                            rate_label(*rate)
                        )),
                    },
                )?)
                .await?;
            ctx.target
                .execute(TargetCommand::Link(Link::TaxRuleTax {
                    tax_rule_id: rule_id,
                    tax_id,
                    country_id: ctx.settings.default_country_id,
                }))
                .await?;
            info!("Created tax rule ID={} for {}", rule_id, rate_label(*rate));

            for locale in &others {
                let tax_title = TitleDraft {
                    locale: locale.locale.clone(),
                    title: rate_label(*rate),
                };
                ctx.target
                    .execute(TargetCommand::update(EntityKind::Tax, tax_id, &tax_title)?)
                    .await?;

                let rule_title = TitleDraft {
                    locale: locale.locale.clone(),
                    title: format!("Tax rule for {}", rate_label(*rate)),
                };
                ctx.target
                    .execute(TargetCommand::update(EntityKind::TaxRule, rule_id, &rule_title)?)
                    .await?;
            }

            ctx.correspondence
                .add_entry(EntityFamily::Tax, *key, rule_id)
                .await?;
        }

        Ok(rates.len())
    }

    async fn import_row(
        &self,
        source_id: i64,
        row: &SourceRow,
        tally: &mut ChunkTally,
    ) -> Result<RowOutcome, ImportError> {
        let ctx = &self.context;

        let category = row.get_i64("rubrique")?;
        if category == 0 {
            return Err(ImportError::row(
                TABLE,
                source_id,
                "product is at root level (rubrique = 0)",
            ));
        }
        let Lookup::Found(default_category_id) = ctx
            .correspondence
            .get_target(EntityFamily::Categories, category)
            .await?
        else {
            return Err(ImportError::row(
                TABLE,
                source_id,
                format!("category {} is not migrated", category),
            ));
        };

        if ctx
            .correspondence
            .get_target(EntityFamily::Products, source_id)
            .await?
            .is_found()
        {
            return Ok(RowOutcome::Skipped("already migrated".to_string()));
        }

        let rate = row.get_f64("tva")?;
        let tax_rule_id = ctx
            .correspondence
            .require_target(EntityFamily::Tax, tax_rate_key(rate))
            .await?;

        let base = ProductBase {
            reference: row.get_string("ref")?,
            default_category_id,
            visible: row.get_bool("ligne")?,
            base_price: row.get_f64("prix")?,
            base_weight: row.get_opt_f64("poids")?.unwrap_or(0.0),
            tax_rule_id,
        };
        let currency_id = ctx.settings.default_currency_id;

        let descriptions = ctx
            .source
            .fetch(
                &SourceQuery::table(DESC_TABLE)
                    .filter("produit", source_id)
                    .order_by("lang")
                    .order_by("id"),
            )
            .await?;
        if descriptions.is_empty() {
            return Err(ImportError::row(TABLE, source_id, "no description found"));
        }

        let mut product_id = None;
        for desc in &descriptions {
            let lang_id = desc.get_i64("lang")?;
            let locale = ctx.settings.locale_for(lang_id).ok_or_else(|| {
                ImportError::row(TABLE, source_id, format!("unknown language {}", lang_id))
            })?;

            // A title is required to build the rewritten URL
            let title = match non_empty(desc.get_opt_string("titre")) {
                Some(title) => title,
                None => format!("Untitled-{}-{}", desc.get_i64("id")?, locale.code),
            };

            let id = match product_id {
                Some(id) => id,
                None => {
                    let draft = base.draft(locale, title.clone(), currency_id);
                    let id = ctx
                        .target
                        .create(TargetCommand::create(EntityKind::Product, &draft)?)
                        .await?;
                    ctx.correspondence
                        .add_entry(EntityFamily::Products, source_id, id)
                        .await?;
                    info!("Created product {} from '{}' ({})", id, title, source_id);

                    ctx.target
                        .execute(TargetCommand::UpdatePosition {
                            kind: EntityKind::Product,
                            id,
                            position: row.get_i64("classement").unwrap_or(0),
                        })
                        .await?;

                    self.attach_contents(source_id, id, tally).await?;
                    self.assign_template(id, category, currency_id).await?;
                    self.attach_media(source_id, id, tally).await?;
                    rewrite::migrate_record_url(ctx, "produit", source_id, lang_id, id, &locale.locale)
                        .await?;
                    id
                }
            };
            product_id = Some(id);

            let mut update = base.draft(locale, title, currency_id);
            update.chapo = non_empty(desc.get_opt_string("chapo"));
            update.description = non_empty(desc.get_opt_string("description"));
            update.postscriptum = non_empty(desc.get_opt_string("postscriptum"));
            ctx.target
                .execute(TargetCommand::update(EntityKind::Product, id, &update)?)
                .await?;
        }

        Ok(RowOutcome::Created)
    }

    /// Link related contents; a failed link is counted and the row goes on
    async fn attach_contents(
        &self,
        source_id: i64,
        product_id: i64,
        tally: &mut ChunkTally,
    ) -> Result<(), ImportError> {
        let ctx = &self.context;
        let contents = ctx
            .source
            .fetch(
                &SourceQuery::table(CONTENT_TABLE)
                    .filter("objet", source_id)
                    .filter("type", PRODUCT_CONTENT_TYPE)
                    .order_by("classement"),
            )
            .await?;

        for content in &contents {
            let result = async {
                let legacy_content = content.get_i64("contenu")?;
                let content_id = ctx
                    .correspondence
                    .require_target(EntityFamily::Contents, legacy_content)
                    .await?;
                ctx.target
                    .execute(TargetCommand::Link(Link::ProductContent {
                        product_id,
                        content_id,
                    }))
                    .await?;
                Ok::<_, ImportError>(())
            }
            .await;

            if let Err(e) = result {
                tally.record_error(&ImportError::row(
                    TABLE,
                    source_id,
                    format!("failed to associate content to product {}: {}", product_id, e),
                ));
            }
        }
        Ok(())
    }

    /// Template of the product's legacy category, when one was migrated
    async fn assign_template(
        &self,
        product_id: i64,
        category: i64,
        currency_id: i64,
    ) -> Result<(), ImportError> {
        let ctx = &self.context;
        match ctx
            .correspondence
            .get_target(EntityFamily::Templates, category)
            .await?
        {
            Lookup::Found(template_id) => {
                ctx.target
                    .execute(TargetCommand::AssignTemplate {
                        product_id,
                        template_id,
                        currency_id,
                    })
                    .await?;
            }
            Lookup::NotFound => {
                warn!("No product template was found for product {}", product_id);
            }
        }
        Ok(())
    }

    /// Copy image and document records; a failed file is counted, not fatal
    async fn attach_media(
        &self,
        source_id: i64,
        product_id: i64,
        tally: &mut ChunkTally,
    ) -> Result<(), ImportError> {
        let ctx = &self.context;

        for (media_table, kind) in MEDIA_TABLES {
            let files = ctx
                .source
                .fetch(
                    &SourceQuery::table(media_table)
                        .filter("produit", source_id)
                        .order_by("classement")
                        .order_by("id"),
                )
                .await?;

            for file in &files {
                let result = async {
                    let draft = MediaDraft {
                        product_id,
                        file: file.get_string("fichier")?,
                        position: file.get_i64("classement").unwrap_or(0),
                        locale: None,
                        title: None,
                    };
                    ctx.target.create(TargetCommand::create(kind, &draft)?).await?;
                    Ok::<_, ImportError>(())
                }
                .await;

                if let Err(e) = result {
                    tally.record_error(&ImportError::row(
                        TABLE,
                        source_id,
                        format!("failed to import {} for product {}: {}", media_table, product_id, e),
                    ));
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Importer for ProductsImporter {
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
        let ctx = &self.context;

        for kind in [
            EntityKind::Product,
            EntityKind::ProductImage,
            EntityKind::ProductDocument,
            EntityKind::TaxRule,
            EntityKind::Tax,
        ] {
            let purged = ctx.target.purge(kind).await?;
            info!("Purged {} target {} records", purged, kind);
        }

        ctx.correspondence.reset(EntityFamily::Products).await?;
        ctx.correspondence.reset(EntityFamily::Tax).await?;

        let rates = self.import_taxes().await?;
        info!("Derived {} tax rules from legacy VAT rates", rates);
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
            let result = self.import_row(source_id, row, &mut tally).await;
            record_row(&mut tally, TABLE, source_id, result);
        }

        Ok(tally.finish())
    }

    /// Link accessories now that every product has a target id
    async fn post_import(&self) -> Result<ChunkResult, ImportError> {
        let ctx = &self.context;
        let accessories = ctx
            .fetch_window(
                TABLE,
                &SourceQuery::table(ACCESSORY_TABLE)
                    .order_by("classement")
                    .order_by("id"),
            )
            .await?;

        let mut tally = ChunkTally::new(TABLE);
        for accessory in &accessories {
            let result = async {
                let product = ctx
                    .correspondence
                    .require_target(EntityFamily::Products, accessory.get_i64("produit")?)
                    .await?;
                let accessory_id = ctx
                    .correspondence
                    .require_target(EntityFamily::Products, accessory.get_i64("accessoire")?)
                    .await?;
                ctx.target
                    .execute(TargetCommand::Link(Link::ProductAccessory {
                        product_id: product,
                        accessory_id,
                    }))
                    .await?;
                Ok::<_, ImportError>(RowOutcome::Created)
            }
            .await;

            let id = accessory.get_i64("id").unwrap_or(0);
            let result = result.map_err(|e| {
                ImportError::row(TABLE, id, format!("failed to create product accessory: {}", e))
            });
            record_row(&mut tally, TABLE, id, result);
        }

        Ok(tally.finish())
    }
}
