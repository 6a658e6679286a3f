/*!
 * Tests for the rewritten URL importer
 */

use legacy_migrate::correspondence::EntityFamily;
use legacy_migrate::import::MigrationOrchestrator;
use legacy_migrate::importers::{CategoriesImporter, UrlsImporter};

use crate::common::{LegacyFixture, TestHarness};

fn url_fixture() -> LegacyFixture {
    let fixture = LegacyFixture::new();
    fixture.category(1, 0, "Maison").category(2, 0, "Jardin");
    fixture
        .url(1, "maison.html", "rubrique", "id_rubrique=1", 1, true)
        .url(2, "maison-old.html", "rubrique", "id_rubrique=1", 1, true)
        .url(3, "home.html", "rubrique", "id_rubrique=1", 2, true)
        .url(4, "panier.html", "panier", "", 1, true)
        .url(5, "ghost.html", "produit", "id_produit=99", 1, true)
        .url(6, "garten.html", "rubrique", "id_rubrique=2", 9, true)
        .url(7, "archive.html", "rubrique", "id_rubrique=2", 1, false);
    fixture
}

async fn migrated_harness() -> TestHarness {
    let harness = TestHarness::new(url_fixture());
    MigrationOrchestrator::new(Box::new(CategoriesImporter::new(harness.context.clone())))
        .run_to_completion()
        .await
        .unwrap();
    harness
}

/// Test canonical, redirect, skip and failure handling in one pass
#[tokio::test]
async fn test_import_withMixedUrls_shouldAccountEveryRow() {
    let harness = migrated_harness().await;
    let importer = UrlsImporter::new(harness.context.clone()).with_chunk_size(4);

    let totals = MigrationOrchestrator::new(Box::new(importer))
        .run_to_completion()
        .await
        .unwrap();

    // The inactive URL is not part of the table
    assert_eq!(totals.records_seen, 6);
    assert_eq!(totals.chunks, 2);
    assert_eq!(totals.skipped, 1);
    assert_eq!(totals.created, 2);
    assert_eq!(totals.errors, 3);
}

/// Test that a second URL for the same view redirects to the canonical one
#[tokio::test]
async fn test_import_withSecondUrlForView_shouldRedirectToCanonical() {
    let harness = migrated_harness().await;
    MigrationOrchestrator::new(Box::new(UrlsImporter::new(harness.context.clone())))
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
    let find = |url: &str| {
        rewrites
            .iter()
            .find(|(_, rule)| rule.url == url)
            .cloned()
            .unwrap()
    };

    let (canonical_id, canonical) = find("maison.html");
    let (_, redirect) = find("maison-old.html");
    let (_, english) = find("home.html");

    assert_eq!(canonical.view_id, maison);
    assert_eq!(canonical.redirected, None);
    assert_eq!(redirect.redirected, Some(canonical_id));
    assert_eq!(english.view_locale, "en_US");
    assert_eq!(english.redirected, None);
    assert!(rewrites.iter().all(|(_, rule)| rule.url != "archive.html"));
}

/// Test that re-running the URL import changes nothing
#[tokio::test]
async fn test_import_runTwice_shouldSkipExistingUrls() {
    let harness = migrated_harness().await;
    for _ in 0..2 {
        MigrationOrchestrator::new(Box::new(UrlsImporter::new(harness.context.clone())))
            .run_to_completion()
            .await
            .unwrap();
    }
    let before = harness.target.rewrites().len();

    let totals = MigrationOrchestrator::new(Box::new(UrlsImporter::new(harness.context.clone())))
        .run_to_completion()
        .await
        .unwrap();

    assert_eq!(totals.created, 0);
    assert_eq!(totals.skipped, 3);
    assert_eq!(harness.target.rewrites().len(), before);
}
