/*!
 * Tests for the category importer
 */

use legacy_migrate::correspondence::{EntityFamily, Lookup};
use legacy_migrate::import::MigrationOrchestrator;
use legacy_migrate::importers::CategoriesImporter;
use legacy_migrate::target::EntityKind;
use serde_json::json;

use crate::common::{LegacyFixture, TestHarness};

fn tree_fixture() -> LegacyFixture {
    let fixture = LegacyFixture::new();
    fixture
        .category(1, 0, "Maison")
        .category(2, 1, "Cuisine")
        .category(3, 2, "Casseroles")
        .category(4, 0, "Jardin");
    fixture
}

/// Test that the tree keeps its parent links once remapped
#[tokio::test]
async fn test_import_withTree_shouldRemapParents() {
    let harness = TestHarness::new(tree_fixture());
    let importer = CategoriesImporter::new(harness.context.clone()).with_chunk_size(2);

    let totals = MigrationOrchestrator::new(Box::new(importer))
        .run_to_completion()
        .await
        .unwrap();

    assert_eq!(totals.chunks, 2);
    assert_eq!(totals.created, 4);
    assert_eq!(totals.errors, 0);

    let store = &harness.context.correspondence;
    let maison = store.require_target(EntityFamily::Categories, 1).await.unwrap();
    let cuisine = store.require_target(EntityFamily::Categories, 2).await.unwrap();
    let casseroles = store.require_target(EntityFamily::Categories, 3).await.unwrap();

    let record = harness.target.record(EntityKind::Category, casseroles).unwrap();
    assert_eq!(record["parent_id"], json!(cuisine));
    let record = harness.target.record(EntityKind::Category, cuisine).unwrap();
    assert_eq!(record["parent_id"], json!(maison));
    let record = harness.target.record(EntityKind::Category, maison).unwrap();
    assert_eq!(record["parent_id"], json!(0));
}

/// Test that a child of an unknown parent fails alone
#[tokio::test]
async fn test_import_withMissingParent_shouldFailOnlyThatRow() {
    let fixture = tree_fixture();
    fixture.category(5, 42, "Orpheline");
    let harness = TestHarness::new(fixture);
    let importer = CategoriesImporter::new(harness.context.clone());

    let totals = MigrationOrchestrator::new(Box::new(importer))
        .run_to_completion()
        .await
        .unwrap();

    assert_eq!(totals.records_seen, 5);
    assert_eq!(totals.created, 4);
    assert_eq!(totals.errors, 1);
    assert_eq!(
        harness
            .context
            .correspondence
            .get_target(EntityFamily::Categories, 5)
            .await
            .unwrap(),
        Lookup::NotFound
    );
}

/// Test that every description lands on the same record
#[tokio::test]
async fn test_import_withTwoLanguages_shouldUpdateSameRecord() {
    let fixture = LegacyFixture::new();
    fixture.category(1, 0, "Maison").category_desc(1, 2, None);
    let harness = TestHarness::new(fixture);

    MigrationOrchestrator::new(Box::new(CategoriesImporter::new(harness.context.clone())))
        .run_to_completion()
        .await
        .unwrap();

    assert_eq!(harness.target.count(EntityKind::Category), 1);
    let id = harness
        .context
        .correspondence
        .require_target(EntityFamily::Categories, 1)
        .await
        .unwrap();
    let record = harness.target.record(EntityKind::Category, id).unwrap();
    assert_eq!(record["i18n"]["fr_FR"]["title"], json!("Maison"));
    assert!(record["i18n"]["en_US"]["title"]
        .as_str()
        .unwrap()
        .starts_with("Untitled-"));
}

/// Test that a second run purges and rebuilds instead of duplicating
#[tokio::test]
async fn test_import_runTwice_shouldNotDuplicate() {
    let harness = TestHarness::new(tree_fixture());

    for _ in 0..2 {
        let importer = CategoriesImporter::new(harness.context.clone());
        MigrationOrchestrator::new(Box::new(importer))
            .run_to_completion()
            .await
            .unwrap();
    }

    assert_eq!(harness.target.count(EntityKind::Category), 4);
    assert_eq!(
        harness
            .context
            .correspondence
            .count(EntityFamily::Categories)
            .await
            .unwrap(),
        4
    );
}

/// Test that the legacy URL of a category is carried over
#[tokio::test]
async fn test_import_withLegacyUrl_shouldRegisterRewrite() {
    let fixture = tree_fixture();
    fixture
        .url(1, "maison.html", "rubrique", "id_rubrique=1", 1, true)
        .url(2, "old-maison.html", "rubrique", "id_rubrique=1", 1, false)
        .url(3, "cuisine.html", "rubrique", "id_rubrique=12", 1, true);
    let harness = TestHarness::new(fixture);

    MigrationOrchestrator::new(Box::new(CategoriesImporter::new(harness.context.clone())))
        .run_to_completion()
        .await
        .unwrap();

    let maison = harness
        .context
        .correspondence
        .require_target(EntityFamily::Categories, 1)
        .await
        .unwrap();
    let rewrites = harness.target.rewrites();
    assert_eq!(rewrites.len(), 1);
    assert_eq!(rewrites[0].1.url, "maison.html");
    assert_eq!(rewrites[0].1.view, "category");
    assert_eq!(rewrites[0].1.view_id, maison);
    assert_eq!(rewrites[0].1.redirected, None);
}
