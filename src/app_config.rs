use anyhow::{anyhow, Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use crate::database::DatabaseConnection;
use crate::import::{ImportSettings, LegacyLocale};
use crate::importers::MigrationTable;

/// Application configuration module
/// This module handles loading, validating and saving the migration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Legacy SQLite database to read from
    pub source_path: PathBuf,

    /// Target document store to write to
    pub target_path: PathBuf,

    /// Correspondence and progress database; platform data dir when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_path: Option<PathBuf>,

    /// Tables to migrate, in order
    #[serde(default = "default_tables")]
    pub tables: Vec<MigrationTable>,

    /// Per-table chunk size overrides
    #[serde(default)]
    pub chunk_sizes: BTreeMap<MigrationTable, u64>,

    /// Legacy language ids and their target locales; the first one is the default
    #[serde(default = "default_locales")]
    pub locales: Vec<LegacyLocale>,

    /// Currency given to migrated products
    #[serde(default = "default_currency_id")]
    pub default_currency_id: i64,

    /// Country the derived tax rules apply to
    #[serde(default = "default_country_id")]
    pub default_country_id: i64,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

fn default_tables() -> Vec<MigrationTable> {
    MigrationTable::ALL.to_vec()
}

fn default_locales() -> Vec<LegacyLocale> {
    ImportSettings::default().locales
}

fn default_currency_id() -> i64 {
    ImportSettings::default().default_currency_id
}

fn default_country_id() -> i64 {
    ImportSettings::default().default_country_id
}

impl Config {
    /// Load the config file, writing a default one when it does not exist
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            let file = std::fs::File::open(path)
                .with_context(|| format!("Failed to open config file: {:?}", path))?;
            let reader = std::io::BufReader::new(file);
            return serde_json::from_reader(reader)
                .with_context(|| format!("Failed to parse config file: {:?}", path));
        }

        warn!("Config file not found at {:?}, creating default config.", path);
        let config = Config::default();
        config.save(path)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize config to JSON")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write config to file: {:?}", path))
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        if self.locales.is_empty() {
            return Err(anyhow!("At least one locale is required"));
        }

        let mut lang_ids = HashSet::new();
        for locale in &self.locales {
            if locale.locale.trim().is_empty() || locale.code.trim().is_empty() {
                return Err(anyhow!(
                    "Locale for legacy language {} needs a locale and a code",
                    locale.lang_id
                ));
            }
            if !lang_ids.insert(locale.lang_id) {
                return Err(anyhow!("Legacy language {} is mapped twice", locale.lang_id));
            }
        }

        for (table, size) in &self.chunk_sizes {
            if *size == 0 {
                return Err(anyhow!("Chunk size of {} must be positive", table));
            }
        }

        let mut seen = HashSet::new();
        for table in &self.tables {
            if !seen.insert(*table) {
                return Err(anyhow!("Table {} is listed twice", table));
            }
        }

        // Categories before products, products before URLs
        for pair in self.tables.windows(2) {
            if pair[0].rank() > pair[1].rank() {
                return Err(anyhow!(
                    "Table {} must be migrated before {}",
                    pair[1],
                    pair[0]
                ));
            }
        }

        Ok(())
    }

    /// Chunk size override of a table, if any
    pub fn chunk_size_for(&self, table: MigrationTable) -> Option<u64> {
        self.chunk_sizes.get(&table).copied()
    }

    /// Settings handed to every importer
    pub fn import_settings(&self) -> ImportSettings {
        ImportSettings {
            locales: self.locales.clone(),
            default_currency_id: self.default_currency_id,
            default_country_id: self.default_country_id,
        }
    }

    /// Where the correspondence and progress database lives
    pub fn state_database_path(&self) -> Result<PathBuf> {
        match &self.state_path {
            Some(path) => Ok(path.clone()),
            None => DatabaseConnection::default_database_path(),
        }
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            source_path: PathBuf::from("legacy.db"),
            target_path: PathBuf::from("target.db"),
            state_path: None,
            tables: default_tables(),
            chunk_sizes: BTreeMap::new(),
            locales: default_locales(),
            default_currency_id: default_currency_id(),
            default_country_id: default_country_id(),
            log_level: LogLevel::default(),
        }
    }
}
