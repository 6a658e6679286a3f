#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use log::{info, warn, Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use legacy_migrate::app_config::{Config, LogLevel};
use legacy_migrate::{Controller, MigrationState, MigrationTable, RunOptions, SliceBudget};

/// CLI Wrapper for MigrationTable to implement ValueEnum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliTable {
    Categories,
    Products,
    Urls,
}

impl From<CliTable> for MigrationTable {
    fn from(cli_table: CliTable) -> Self {
        match cli_table {
            CliTable::Categories => MigrationTable::Categories,
            CliTable::Products => MigrationTable::Products,
            CliTable::Urls => MigrationTable::Urls,
        }
    }
}

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => LogLevel::Error,
            CliLogLevel::Warn => LogLevel::Warn,
            CliLogLevel::Info => LogLevel::Info,
            CliLogLevel::Debug => LogLevel::Debug,
            CliLogLevel::Trace => LogLevel::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Migrate tables, resuming where the last run stopped
    Run {
        /// Tables to migrate (all configured tables when omitted)
        #[arg(value_enum)]
        tables: Vec<CliTable>,

        /// Forget persisted progress and start again with the pre phase
        #[arg(long)]
        restart: bool,

        /// Stop after this many chunks
        #[arg(long)]
        max_chunks: Option<u64>,

        /// Stop starting new chunks after this many seconds
        #[arg(long)]
        budget_secs: Option<u64>,

        /// Write to an in-memory target and state instead of the configured ones
        #[arg(long)]
        dry_run: bool,
    },

    /// Import a single chunk of a table
    Chunk {
        #[arg(value_enum)]
        table: CliTable,

        /// Offset of the first row of the chunk
        offset: u64,

        #[arg(long)]
        dry_run: bool,
    },

    /// Show persisted progress and correspondence counts
    Status,

    /// Forget the progress of a table
    Reset {
        #[arg(value_enum)]
        table: CliTable,
    },

    /// Generate shell completions for legacy-migrate
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// legacy-migrate - chunked migration of a legacy catalogue
///
/// Moves categories, products and rewritten URLs from a legacy database into
/// a new store, a chunk at a time, and resumes where it stopped.
#[derive(Parser, Debug)]
#[command(name = "legacy-migrate")]
#[command(version)]
#[command(about = "Chunked, resumable legacy catalogue migration")]
#[command(long_about = "legacy-migrate copies a legacy catalogue into a new store in chunks.

EXAMPLES:
    legacy-migrate run                             # Migrate every configured table
    legacy-migrate run products --max-chunks 5     # Five chunks of products, then stop
    legacy-migrate run --budget-secs 25            # Stop starting chunks after 25 seconds
    legacy-migrate run --restart categories        # Purge and migrate categories again
    legacy-migrate chunk products 20               # Import the chunk starting at row 20
    legacy-migrate status                          # Show progress of every table
    legacy-migrate completions bash > lm.bash      # Generate bash completions

CONFIGURATION:
    Configuration is stored in migrate.json by default. If the config file
    doesn't exist, a default one will be created automatically.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "migrate.json")]
    config_path: PathBuf,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    fn get_emoji_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "❌ ",
            Level::Warn => "🚧 ",
            Level::Info => " ",
            Level::Debug => "🔍 ",
            Level::Trace => "📋 ",
        }
    }

    fn get_color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "\x1B[1;31m",
            Level::Warn => "\x1B[1;33m",
            Level::Info => "\x1B[1;32m",
            Level::Debug => "\x1B[1;36m",
            Level::Trace => "\x1B[1;35m",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "{}{} {} {}\x1B[0m",
                Self::get_color_for_level(record.level()),
                now,
                Self::get_emoji_for_level(record.level()),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Filtering is done through set_max_level once the config is loaded
    CustomLogger::init(LevelFilter::Trace)?;
    log::set_max_level(LevelFilter::Info);

    let cli = CommandLineOptions::parse();

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = CommandLineOptions::command();
        generate(shell, &mut cmd, "legacy-migrate", &mut std::io::stdout());
        return Ok(());
    }

    let mut config = Config::load_or_create(&cli.config_path)?;
    if let Some(log_level) = cli.log_level {
        config.log_level = log_level.into();
    }
    log::set_max_level(config.log_level.to_level_filter());

    config
        .validate()
        .context("Configuration validation failed")?;

    run_command(cli.command, config).await
}

async fn run_command(command: Commands, config: Config) -> Result<()> {
    match command {
        Commands::Run {
            tables,
            restart,
            max_chunks,
            budget_secs,
            dry_run,
        } => {
            let controller = open_controller(config, dry_run)?;
            let tables: Vec<MigrationTable> = tables.into_iter().map(Into::into).collect();
            let options = RunOptions {
                restart,
                budget: SliceBudget {
                    max_chunks,
                    time_budget: budget_secs.map(Duration::from_secs),
                },
            };

            let reports = controller.run(&tables, options).await?;
            for report in &reports {
                info!("{}: {} ({})", report.table, report.state, report.totals);
            }
            if reports.iter().any(|r| r.state != MigrationState::Completed) {
                warn!("Migration paused; run the same command again to continue");
            }
        }
        Commands::Chunk {
            table,
            offset,
            dry_run,
        } => {
            let controller = open_controller(config, dry_run)?;
            let table = MigrationTable::from(table);
            let result = controller.run_chunk(table, offset).await?;
            info!("{} chunk at offset {}: {}", table, offset, result);
        }
        Commands::Status => {
            let controller = Controller::with_config(config)?;
            let status = controller.status().await?;

            if status.progress.is_empty() {
                info!("No table migrated yet");
            }
            for record in &status.progress {
                info!(
                    "{:<12} {:<12} {:>5.1}%  seen {} created {} skipped {} errors {}",
                    record.table_name,
                    record.phase,
                    record.completion_percentage(),
                    record.records_seen,
                    record.created,
                    record.skipped,
                    record.errors
                );
            }
            for family in &status.families {
                info!("{:<12} {} mappings", family.family, family.entries);
            }
            info!("{}", status.stats);
        }
        Commands::Reset { table } => {
            let controller = Controller::with_config(config)?;
            let table = MigrationTable::from(table);
            if controller.reset(table).await? {
                info!("Progress of {} forgotten; its next run starts over", table);
            } else {
                warn!("No progress recorded for {}", table);
            }
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}

fn open_controller(config: Config, dry_run: bool) -> Result<Controller> {
    if dry_run {
        Controller::dry_run(config)
    } else {
        Controller::with_config(config)
    }
}
