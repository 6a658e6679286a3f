/*!
 * Tests for the persistent correspondence store
 */

use legacy_migrate::correspondence::{CorrespondenceStore, EntityFamily, Lookup};
use legacy_migrate::database::DatabaseConnection;
use legacy_migrate::errors::CorrespondenceError;

/// Test that mappings outlive the process that wrote them
#[tokio::test]
async fn test_addEntry_withFileDatabase_shouldSurviveReopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.db");

    {
        let store = CorrespondenceStore::new(DatabaseConnection::new(&path).unwrap());
        store.add_entry(EntityFamily::Products, 12, 501).await.unwrap();
    }

    let store = CorrespondenceStore::new(DatabaseConnection::new(&path).unwrap());
    assert_eq!(
        store.get_target(EntityFamily::Products, 12).await.unwrap(),
        Lookup::Found(501)
    );
    assert_eq!(store.count(EntityFamily::Products).await.unwrap(), 1);
}

#[tokio::test]
async fn test_addEntry_withDuplicate_shouldKeepFirstTarget() {
    let store = CorrespondenceStore::new_in_memory().unwrap();
    store.add_entry(EntityFamily::Categories, 3, 30).await.unwrap();

    let err = store
        .add_entry(EntityFamily::Categories, 3, 31)
        .await
        .unwrap_err();

    assert!(matches!(err, CorrespondenceError::DuplicateMapping { source_id: 3, .. }));
    assert_eq!(
        store.get_target(EntityFamily::Categories, 3).await.unwrap(),
        Lookup::Found(30)
    );
}

#[tokio::test]
async fn test_requireTarget_withMissingEntry_shouldFailNotFound() {
    let store = CorrespondenceStore::new_in_memory().unwrap();

    let err = store
        .require_target(EntityFamily::Tax, 1960)
        .await
        .unwrap_err();

    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_reset_thenAddEntry_shouldAcceptSameSourceAgain() {
    let store = CorrespondenceStore::new_in_memory().unwrap();
    store.add_entry(EntityFamily::Products, 1, 10).await.unwrap();
    store.add_entry(EntityFamily::Categories, 1, 20).await.unwrap();

    assert_eq!(store.reset(EntityFamily::Products).await.unwrap(), 1);
    store.add_entry(EntityFamily::Products, 1, 11).await.unwrap();

    assert_eq!(
        store.get_target(EntityFamily::Products, 1).await.unwrap(),
        Lookup::Found(11)
    );
    assert_eq!(
        store.get_target(EntityFamily::Categories, 1).await.unwrap(),
        Lookup::Found(20)
    );
}
