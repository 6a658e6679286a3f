/*!
 * Tests for application configuration functionality
 */

use legacy_migrate::app_config::{Config, LogLevel};
use legacy_migrate::import::LegacyLocale;
use legacy_migrate::MigrationTable;

/// Test that a missing config file is created with defaults
#[test]
fn test_loadOrCreate_withMissingFile_shouldWriteDefaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("migrate.json");

    let config = Config::load_or_create(&path).unwrap();

    assert!(path.exists());
    assert_eq!(config.tables, MigrationTable::ALL.to_vec());
    assert_eq!(config.log_level, LogLevel::Info);

    let reloaded = Config::load_or_create(&path).unwrap();
    assert_eq!(reloaded.source_path, config.source_path);
    assert_eq!(reloaded.locales, config.locales);
}

/// Test that saved overrides survive a reload
#[test]
fn test_save_withOverrides_shouldRoundTrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("migrate.json");

    let mut config = Config::default();
    config.chunk_sizes.insert(MigrationTable::Products, 25);
    config.state_path = Some(dir.path().join("state.db"));
    config.save(&path).unwrap();

    let reloaded = Config::load_or_create(&path).unwrap();
    assert_eq!(reloaded.chunk_size_for(MigrationTable::Products), Some(25));
    assert_eq!(reloaded.state_database_path().unwrap(), dir.path().join("state.db"));
}

#[test]
fn test_loadOrCreate_withInvalidJson_shouldFail() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("migrate.json");
    std::fs::write(&path, "{ not json").unwrap();

    assert!(Config::load_or_create(&path).is_err());
}

/// Test configuration validation
#[test]
fn test_validate_withVariousConfigs_shouldValidateCorrectly() {
    let mut config = Config::default();
    assert!(config.validate().is_ok());

    // Same legacy language twice
    config.locales.push(LegacyLocale {
        lang_id: 1,
        locale: "de_DE".to_string(),
        code: "de".to_string(),
    });
    assert!(config.validate().is_err());
    config.locales.pop();

    // Blank locale
    config.locales[1].locale = " ".to_string();
    assert!(config.validate().is_err());
    config.locales[1].locale = "en_US".to_string();

    // Duplicate table
    config.tables = vec![MigrationTable::Categories, MigrationTable::Categories];
    assert!(config.validate().is_err());

    config.tables = vec![MigrationTable::Urls];
    assert!(config.validate().is_ok());
}

#[test]
fn test_importSettings_shouldCarryLocalesAndDefaults() {
    let config = Config {
        default_country_id: 13,
        ..Config::default()
    };

    let settings = config.import_settings();

    assert_eq!(settings.default_country_id, 13);
    assert_eq!(settings.locale_for(2).map(|l| l.code.as_str()), Some("en"));
    assert_eq!(settings.default_locale().map(|l| l.locale.as_str()), Some("fr_FR"));
}
