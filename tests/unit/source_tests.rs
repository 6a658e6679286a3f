/*!
 * Tests for chunk windows over the legacy source
 */

use legacy_migrate::source::{SourceDb, SourceQuery};

use crate::common::LegacyFixture;

fn fixture_with_products(count: i64) -> LegacyFixture {
    let fixture = LegacyFixture::new();
    for id in 1..=count {
        // Category ids deliberately out of id order
        fixture.product(id, &format!("REF-{}", id), 10 - (id % 3), 19.6);
    }
    fixture
}

/// Test that consecutive windows cover every row exactly once
#[tokio::test]
async fn test_fetch_withConsecutiveWindows_shouldPartitionRows() {
    let source = fixture_with_products(25).into_source();
    let ordered = SourceQuery::table("produit").order_by("rubrique").order_by("id");

    let mut seen = Vec::new();
    let mut sizes = Vec::new();
    for offset in [0u64, 10, 20, 30] {
        let rows = source.fetch(&ordered.clone().window(offset, 10)).await.unwrap();
        sizes.push(rows.len());
        seen.extend(rows.iter().map(|r| r.get_i64("id").unwrap()));
    }

    assert_eq!(sizes, vec![10, 10, 5, 0]);
    let mut sorted = seen.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(sorted.len(), 25);
}

#[tokio::test]
async fn test_count_withWindow_shouldIgnoreWindow() {
    let source = fixture_with_products(25).into_source();

    let count = source
        .count(&SourceQuery::table("produit").window(0, 10))
        .await
        .unwrap();

    assert_eq!(count, 25);
}

#[tokio::test]
async fn test_distinct_shouldReturnEachValueOnce() {
    let fixture = fixture_with_products(4);
    fixture.product(5, "REF-5", 1, 5.5);
    let source = fixture.into_source();

    let rows = source
        .fetch(&SourceQuery::distinct("produit", "tva").order_by("tva"))
        .await
        .unwrap();

    let rates: Vec<f64> = rows.iter().map(|r| r.get_f64("tva").unwrap()).collect();
    assert_eq!(rates, vec![5.5, 19.6]);
}

#[tokio::test]
async fn test_fetch_withUnknownTable_shouldFail() {
    let source = LegacyFixture::new().into_source();
    assert!(source.fetch(&SourceQuery::table("commande")).await.is_err());
}
