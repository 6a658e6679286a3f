/*!
 * Tests for the product importer
 */

use legacy_migrate::correspondence::{tax_rate_key, EntityFamily, Lookup};
use legacy_migrate::import::{Importer, MigrationOrchestrator, MigrationState, StepOutcome};
use legacy_migrate::importers::ProductsImporter;
use legacy_migrate::target::{EntityKind, MemoryTarget, TargetSink};
use serde_json::json;
use std::sync::Arc;

use crate::common::{root_categories, FailFirstProductMove, LegacyFixture, TestHarness};

/// 25 products over three categories; product 7 points at a category that does not exist
fn catalogue_fixture() -> LegacyFixture {
    let fixture = LegacyFixture::new();
    root_categories(&fixture, 3);
    for id in 1..=25 {
        let category = if id == 7 { 99 } else { 1 + id % 3 };
        let tva = if id % 5 == 0 { 5.5 } else { 19.6 };
        fixture.product(id, &format!("REF-{:03}", id), category, tva);
    }
    fixture
}

/// Harness with the legacy categories already migrated
async fn harness_with_categories(fixture: LegacyFixture) -> TestHarness {
    migrate_categories(TestHarness::new(fixture)).await
}

async fn migrate_categories(harness: TestHarness) -> TestHarness {
    let importer = legacy_migrate::importers::CategoriesImporter::new(harness.context.clone());
    MigrationOrchestrator::new(Box::new(importer))
        .run_to_completion()
        .await
        .unwrap();
    harness
}

/// Test chunk windows and row isolation over a 25-row table
#[tokio::test]
async fn test_import_with25RowsAndChunkOf10_shouldIsolateBadRow() {
    let harness = harness_with_categories(catalogue_fixture()).await;
    let importer = ProductsImporter::new(harness.context.clone()).with_chunk_size(10);
    let mut orchestrator = MigrationOrchestrator::new(Box::new(importer));

    assert_eq!(
        orchestrator.step().await.unwrap(),
        StepOutcome::Prepared { total: 25 }
    );

    let mut seen = Vec::new();
    let mut errors = 0;
    while let StepOutcome::Chunk { offset, result } = orchestrator.step().await.unwrap() {
        seen.push((offset, result.records_seen()));
        errors += result.errors();
    }

    assert_eq!(seen, vec![(0, 10), (10, 10), (20, 5)]);
    assert_eq!(errors, 1);
    assert_eq!(orchestrator.state(), MigrationState::Completed);

    assert_eq!(harness.target.count(EntityKind::Product), 24);
    let store = &harness.context.correspondence;
    assert_eq!(store.count(EntityFamily::Products).await.unwrap(), 24);
    assert_eq!(
        store.get_target(EntityFamily::Products, 7).await.unwrap(),
        Lookup::NotFound
    );
}

/// Test that one tax rule is derived per distinct VAT rate
#[tokio::test]
async fn test_preImport_shouldDeriveOneTaxRulePerRate() {
    let harness = harness_with_categories(catalogue_fixture()).await;
    let mut orchestrator =
        MigrationOrchestrator::new(Box::new(ProductsImporter::new(harness.context.clone())));

    orchestrator.step().await.unwrap();

    assert_eq!(harness.target.count(EntityKind::Tax), 2);
    assert_eq!(harness.target.count(EntityKind::TaxRule), 2);
    assert_eq!(harness.target.links("tax_rule_tax").len(), 2);

    let rule = harness
        .context
        .correspondence
        .require_target(EntityFamily::Tax, tax_rate_key(19.6))
        .await
        .unwrap();
    let record = harness.target.record(EntityKind::TaxRule, rule).unwrap();
    assert_eq!(record["i18n"]["fr_FR"]["title"], json!("Tax rule for TVA 19.6%"));
    assert_eq!(record["i18n"]["en_US"]["title"], json!("Tax rule for TVA 19.6%"));
}

/// Test that re-running chunks skips migrated rows without duplicates
#[tokio::test]
async fn test_importChunk_runTwice_shouldSkipMigratedRows() {
    let harness = harness_with_categories(catalogue_fixture()).await;
    let mut first =
        MigrationOrchestrator::new(Box::new(ProductsImporter::new(harness.context.clone())));
    first.run_to_completion().await.unwrap();

    let again = ProductsImporter::new(harness.context.clone());
    let totals = MigrationOrchestrator::resume_at(Box::new(again), 0)
        .await
        .unwrap()
        .run_to_completion()
        .await
        .unwrap();

    assert_eq!(totals.created, 0);
    assert_eq!(totals.skipped, 24);
    assert_eq!(totals.errors, 1);
    assert_eq!(harness.target.count(EntityKind::Product), 24);
}

/// Test that a full re-run purges and rebuilds the products
#[tokio::test]
async fn test_import_restartFromScratch_shouldPurgeAndRebuild() {
    let harness = harness_with_categories(catalogue_fixture()).await;

    for _ in 0..2 {
        MigrationOrchestrator::new(Box::new(ProductsImporter::new(harness.context.clone())))
            .run_to_completion()
            .await
            .unwrap();
    }

    assert_eq!(harness.target.count(EntityKind::Product), 24);
    assert_eq!(harness.target.count(EntityKind::Tax), 2);
    assert_eq!(
        harness.context.correspondence.count(EntityFamily::Products).await.unwrap(),
        24
    );
}

/// Test that accessories are linked after every product exists
#[tokio::test]
async fn test_postImport_shouldLinkAccessoriesAcrossChunks() {
    let fixture = catalogue_fixture();
    fixture
        .accessory(1, 1, 25)
        .accessory(2, 25, 1)
        .accessory(3, 2, 7);
    let harness = harness_with_categories(fixture).await;
    let importer = ProductsImporter::new(harness.context.clone()).with_chunk_size(10);

    let totals = MigrationOrchestrator::new(Box::new(importer))
        .run_to_completion()
        .await
        .unwrap();

    // Product 7 was never migrated
    assert_eq!(totals.post_errors, 1);
    assert_eq!(totals.errors, 2);

    let store = &harness.context.correspondence;
    let first = store.require_target(EntityFamily::Products, 1).await.unwrap();
    let last = store.require_target(EntityFamily::Products, 25).await.unwrap();
    let mut links = harness.target.links("product_accessory");
    links.sort();
    let mut expected = vec![(first, last), (last, first)];
    expected.sort();
    assert_eq!(links, expected);
}

/// Test that media and content failures are counted without dropping the product
#[tokio::test]
async fn test_import_withBrokenMediaAndContent_shouldKeepProduct() {
    let fixture = LegacyFixture::new();
    root_categories(&fixture, 1);
    fixture
        .product(1, "REF-001", 1, 19.6)
        .image(1, Some("front.jpg"))
        .image(1, None)
        .content_assoc(1, 5)
        .content_assoc(1, 6);
    let harness = harness_with_categories(fixture).await;
    harness
        .context
        .correspondence
        .add_entry(EntityFamily::Contents, 6, 60)
        .await
        .unwrap();

    let totals =
        MigrationOrchestrator::new(Box::new(ProductsImporter::new(harness.context.clone())))
            .run_to_completion()
            .await
            .unwrap();

    assert_eq!(totals.created, 1);
    assert_eq!(totals.errors, 2);
    assert_eq!(harness.target.count(EntityKind::ProductImage), 1);

    let product = harness
        .context
        .correspondence
        .require_target(EntityFamily::Products, 1)
        .await
        .unwrap();
    assert_eq!(harness.target.links("product_content"), vec![(product, 60)]);
}

/// Test the product fields and the template of its category
#[tokio::test]
async fn test_import_shouldRemapCategoryTaxAndTemplate() {
    let fixture = LegacyFixture::new();
    root_categories(&fixture, 2);
    fixture.product(1, "REF-001", 2, 19.6).product_desc(1, 2, "Product 1");
    let harness = harness_with_categories(fixture).await;
    let store = harness.context.correspondence.clone();
    store.add_entry(EntityFamily::Templates, 2, 8).await.unwrap();

    MigrationOrchestrator::new(Box::new(ProductsImporter::new(harness.context.clone())))
        .run_to_completion()
        .await
        .unwrap();

    let product = store.require_target(EntityFamily::Products, 1).await.unwrap();
    let category = store.require_target(EntityFamily::Categories, 2).await.unwrap();
    let rule = store
        .require_target(EntityFamily::Tax, tax_rate_key(19.6))
        .await
        .unwrap();

    let record = harness.target.record(EntityKind::Product, product).unwrap();
    assert_eq!(record["ref"], json!("REF-001"));
    assert_eq!(record["default_category_id"], json!(category));
    assert_eq!(record["tax_rule_id"], json!(rule));
    assert_eq!(record["template_id"], json!(8));
    assert_eq!(record["i18n"]["en_US"]["title"], json!("Product 1"));
    assert_eq!(record["i18n"]["fr_FR"]["description"], json!("desc"));
}

#[tokio::test]
async fn test_import_withRootLevelProduct_shouldFailRow() {
    let fixture = LegacyFixture::new();
    root_categories(&fixture, 1);
    fixture.product(1, "REF-001", 0, 19.6).product(2, "REF-002", 1, 19.6);
    let harness = harness_with_categories(fixture).await;

    let totals =
        MigrationOrchestrator::new(Box::new(ProductsImporter::new(harness.context.clone())))
            .run_to_completion()
            .await
            .unwrap();

    assert_eq!(totals.records_seen, 2);
    assert_eq!(totals.created, 1);
    assert_eq!(totals.errors, 1);
}

/// Test that a product created before a later write failed is mapped and skipped on retry
#[tokio::test]
async fn test_importChunk_withFailedPositionUpdate_shouldKeepMappingAndSkipOnRetry() {
    let fixture = LegacyFixture::new();
    root_categories(&fixture, 1);
    fixture.product(1, "REF-001", 1, 19.6);

    let target = Arc::new(MemoryTarget::new());
    let sink: Arc<dyn TargetSink> = Arc::new(FailFirstProductMove::new(target.clone()));
    let harness = migrate_categories(TestHarness::with_sink(fixture, target, sink)).await;
    let store = &harness.context.correspondence;

    let importer = ProductsImporter::new(harness.context.clone());
    importer.pre_import().await.unwrap();

    let first = importer.import_chunk(0).await.unwrap();
    assert_eq!(first.records_seen(), 1);
    assert_eq!(first.errors(), 1);
    assert_eq!(harness.target.count(EntityKind::Product), 1);
    let mapped = store.get_target(EntityFamily::Products, 1).await.unwrap();
    assert!(mapped.is_found());

    let retry = importer.import_chunk(0).await.unwrap();
    assert_eq!(retry.skipped(), 1);
    assert_eq!(retry.errors(), 0);
    assert_eq!(harness.target.count(EntityKind::Product), 1);
    assert_eq!(store.get_target(EntityFamily::Products, 1).await.unwrap(), mapped);
}

/// Test that a missing weight defaults to zero while an unreadable one fails the row
#[tokio::test]
async fn test_import_withNullAndMalformedWeight_shouldOnlyRejectMalformed() {
    let fixture = LegacyFixture::new();
    root_categories(&fixture, 1);
    fixture
        .product(1, "REF-001", 1, 19.6)
        .product(2, "REF-002", 1, 19.6)
        .execute("UPDATE produit SET poids = NULL WHERE id = 1; UPDATE produit SET poids = 'heavy' WHERE id = 2;");
    let harness = harness_with_categories(fixture).await;

    let totals = MigrationOrchestrator::new(Box::new(ProductsImporter::new(harness.context.clone())))
        .run_to_completion()
        .await
        .unwrap();

    assert_eq!(totals.errors, 1);
    assert_eq!(harness.target.count(EntityKind::Product), 1);
    let store = &harness.context.correspondence;
    assert!(store.get_target(EntityFamily::Products, 1).await.unwrap().is_found());
    assert_eq!(
        store.get_target(EntityFamily::Products, 2).await.unwrap(),
        Lookup::NotFound
    );
}
