/*!
 * Tests for resumable runs through the application controller
 */

use std::path::{Path, PathBuf};

use legacy_migrate::app_config::Config;
use legacy_migrate::database::models::MigrationPhase;
use legacy_migrate::import::{MigrationState, SliceBudget};
use legacy_migrate::target::{EntityKind, SqliteTarget};
use legacy_migrate::{Controller, MigrationTable, RunOptions};

use crate::common::{init_logging, root_categories, LegacyFixture};

/// Legacy database file with 3 categories and 12 products
fn write_legacy_db(path: &Path) {
    let fixture = LegacyFixture::create_at(path);
    root_categories(&fixture, 3);
    for id in 1..=12 {
        fixture.product(id, &format!("REF-{:03}", id), 1 + id % 3, 19.6);
    }
    fixture.url(1, "rubrique-1.html", "rubrique", "id_rubrique=1", 1, true);
    fixture.url(2, "produit-1.html", "produit", "id_produit=1", 2, true);
}

fn test_config(dir: &Path) -> Config {
    let mut config = Config {
        source_path: dir.join("legacy.db"),
        target_path: dir.join("target.db"),
        state_path: Some(dir.join("state.db")),
        ..Config::default()
    };
    config.chunk_sizes.insert(MigrationTable::Products, 5);
    config
}

fn controller(config: &Config) -> Controller {
    Controller::with_config(config.clone())
        .unwrap()
        .with_progress(false)
}

fn setup() -> (tempfile::TempDir, Config) {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    write_legacy_db(&dir.path().join("legacy.db"));
    let config = test_config(dir.path());
    (dir, config)
}

fn target_path(config: &Config) -> PathBuf {
    config.target_path.clone()
}

/// Test that a bounded run stops between chunks and a later process resumes it
#[tokio::test]
async fn test_run_withChunkBudget_shouldResumeInNextProcess() {
    let (_dir, config) = setup();

    let first = controller(&config);
    let reports = first
        .run(
            &[],
            RunOptions {
                restart: false,
                budget: SliceBudget::chunks(2),
            },
        )
        .await
        .unwrap();

    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].state, MigrationState::Completed);
    assert_eq!(reports[1].table, MigrationTable::Products);
    assert_eq!(reports[1].state, MigrationState::Running { offset: 5 });

    let progress = first
        .repository()
        .get_progress("products")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(progress.phase, MigrationPhase::Running);
    assert_eq!(progress.next_offset, 5);
    assert_eq!(progress.total_count, 12);
    drop(first);

    let second = controller(&config);
    let reports = second.run(&[], RunOptions::default()).await.unwrap();

    assert_eq!(reports.len(), 3);
    assert!(reports.iter().all(|r| r.state == MigrationState::Completed));
    assert_eq!(reports[0].totals.chunks, 0);
    assert_eq!(reports[1].totals.records_seen, 7);

    let progress = second
        .repository()
        .get_progress("products")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(progress.phase, MigrationPhase::Completed);
    assert_eq!(progress.records_seen, 12);
    assert_eq!(progress.created, 12);
    assert!(progress.completed_at.is_some());

    let target = SqliteTarget::open(target_path(&config)).unwrap();
    assert_eq!(target.count(EntityKind::Product).await.unwrap(), 12);
    assert_eq!(target.count(EntityKind::Category).await.unwrap(), 3);
}

/// Test that a changed legacy database refuses to resume without a restart
#[tokio::test]
async fn test_run_withChangedSource_shouldRequireRestart() {
    let (_dir, config) = setup();

    controller(&config)
        .run(
            &[MigrationTable::Categories],
            RunOptions {
                restart: false,
                budget: SliceBudget::chunks(1),
            },
        )
        .await
        .unwrap();

    rusqlite::Connection::open(&config.source_path)
        .unwrap()
        .execute_batch(
            "INSERT INTO rubrique (id, parent, ligne, classement) VALUES (4, 0, 1, 4);
             INSERT INTO rubriquedesc (rubrique, lang, titre) VALUES (4, 1, 'Rubrique 4');",
        )
        .unwrap();

    let err = controller(&config)
        .run(&[MigrationTable::Categories], RunOptions::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("--restart"));

    let reports = controller(&config)
        .run(
            &[MigrationTable::Categories],
            RunOptions {
                restart: true,
                budget: SliceBudget::unbounded(),
            },
        )
        .await
        .unwrap();
    assert_eq!(reports[0].state, MigrationState::Completed);
    assert_eq!(reports[0].totals.created, 4);
}

/// Test status and reset after a full run
#[tokio::test]
async fn test_reset_afterFullRun_shouldForgetOneTable() {
    let (_dir, config) = setup();
    let controller = controller(&config);
    controller.run(&[], RunOptions::default()).await.unwrap();

    let status = controller.status().await.unwrap();
    assert_eq!(status.progress.len(), 3);
    assert!(status
        .progress
        .iter()
        .all(|p| p.phase == MigrationPhase::Completed));
    assert_eq!(status.stats.completed_tables, 3);
    let categories = status
        .families
        .iter()
        .find(|f| f.family == "categories")
        .unwrap();
    assert_eq!(categories.entries, 3);

    assert!(controller.reset(MigrationTable::Products).await.unwrap());
    assert!(!controller.reset(MigrationTable::Products).await.unwrap());
    assert_eq!(controller.status().await.unwrap().progress.len(), 2);

    // A completed table is left alone, a reset one starts over
    let reports = controller
        .run(&[MigrationTable::Categories, MigrationTable::Products], RunOptions::default())
        .await
        .unwrap();
    assert_eq!(reports[0].totals.chunks, 0);
    assert_eq!(reports[1].totals.created, 12);
}

/// Test single chunks in a dry run against the real legacy file
#[tokio::test]
async fn test_runChunk_withDryRun_shouldPrepareThenImport() {
    let (_dir, config) = setup();
    let controller = Controller::dry_run(config.clone()).unwrap().with_progress(false);

    let result = controller
        .run_chunk(MigrationTable::Categories, 0)
        .await
        .unwrap();
    assert_eq!(result.records_seen(), 3);
    assert_eq!(result.created(), 3);

    let progress = controller
        .repository()
        .get_progress("categories")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(progress.phase, MigrationPhase::Running);
    assert_eq!(progress.next_offset, 50);

    assert!(controller
        .run_chunk(MigrationTable::Categories, 100)
        .await
        .is_err());
    assert!(!config.target_path.exists());
}
