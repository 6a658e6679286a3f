use anyhow::{anyhow, Context, Result};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{info, warn};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::app_config::Config;
use crate::correspondence::CorrespondenceStore;
use crate::database::connection::DatabaseStats;
use crate::database::models::{FamilyCount, MigrationPhase, ProgressRecord};
use crate::database::{DatabaseConnection, Repository};
use crate::import::{
    ChunkResult, ImportContext, MigrationOrchestrator, MigrationState, RunTotals, SliceBudget,
    SliceClock, StepOutcome,
};
use crate::importers::MigrationTable;
use crate::source::{SourceDb, SqliteSource};
use crate::target::{MemoryTarget, SqliteTarget, TargetSink};

// @module: Application controller for table migrations

/// Options of one `run` invocation
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Forget persisted progress and start every table with its pre phase
    pub restart: bool,
    /// Limits of this invocation
    pub budget: SliceBudget,
}

/// Outcome of one table within a run
#[derive(Debug, Clone)]
pub struct TableReport {
    pub table: MigrationTable,
    pub state: MigrationState,
    /// Totals of this invocation only
    pub totals: RunTotals,
}

/// Persisted progress plus correspondence counts
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub progress: Vec<ProgressRecord>,
    pub families: Vec<FamilyCount>,
    pub stats: DatabaseStats,
}

/// Main application controller for table migrations
pub struct Controller {
    // @field: App configuration
    config: Config,
    context: ImportContext,
    repository: Repository,
    /// Source file hashed to detect a changed legacy database between runs
    source_file: Option<PathBuf>,
    show_progress: bool,
}

impl Controller {
    /// Open the configured source, target and state databases
    pub fn with_config(config: Config) -> Result<Self> {
        let source = SqliteSource::open(&config.source_path)?;
        let target = SqliteTarget::open(&config.target_path)?;
        let state = DatabaseConnection::new(config.state_database_path()?)?;

        let source_file = Some(config.source_path.clone());
        let mut controller = Self::from_parts(config, Arc::new(source), Arc::new(target), state);
        controller.source_file = source_file;
        Ok(controller)
    }

    /// Read the real source but write to memory only
    pub fn dry_run(config: Config) -> Result<Self> {
        info!("Dry run: target and state are kept in memory");

        let source = SqliteSource::open(&config.source_path)?;
        let state = DatabaseConnection::new_in_memory()?;

        Ok(Self::from_parts(
            config,
            Arc::new(source),
            Arc::new(MemoryTarget::new()),
            state,
        ))
    }

    /// Assemble a controller from already opened stores
    pub fn from_parts(
        config: Config,
        source: Arc<dyn SourceDb>,
        target: Arc<dyn TargetSink>,
        state: DatabaseConnection,
    ) -> Self {
        let context = ImportContext::new(
            source,
            target,
            CorrespondenceStore::new(state.clone()),
            config.import_settings(),
        );

        Self {
            config,
            context,
            repository: Repository::new(state),
            source_file: None,
            show_progress: true,
        }
    }

    /// Enable or disable progress bars
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    /// Migrate the given tables (all configured ones when empty), in dependency order
    pub async fn run(&self, tables: &[MigrationTable], options: RunOptions) -> Result<Vec<TableReport>> {
        let mut tables = if tables.is_empty() {
            self.config.tables.clone()
        } else {
            tables.to_vec()
        };
        tables.sort_by_key(|t| t.rank());
        tables.dedup();

        let fingerprint = self.source_fingerprint().await?;
        let multi_progress = MultiProgress::new();
        let mut clock = options.budget.start();
        let mut reports = Vec::with_capacity(tables.len());

        for table in tables {
            if options.restart && self.repository.delete_progress(table.as_str()).await? {
                info!("Restarting {} from scratch", table);
            }

            let report = self
                .run_table(table, fingerprint.as_deref(), &mut clock, &multi_progress)
                .await?;
            let finished = report.state == MigrationState::Completed;
            reports.push(report);

            // Later tables depend on this one
            if !finished {
                break;
            }
        }

        Ok(reports)
    }

    async fn run_table(
        &self,
        table: MigrationTable,
        fingerprint: Option<&str>,
        clock: &mut SliceClock,
        multi_progress: &MultiProgress,
    ) -> Result<TableReport> {
        let mut record = match self.repository.get_progress(table.as_str()).await? {
            Some(record) => record,
            None => ProgressRecord::new(
                table.as_str().to_string(),
                uuid::Uuid::new_v4().to_string(),
                fingerprint.map(str::to_string),
            ),
        };

        if !record.is_resumable() {
            info!("{} already migrated (run {}), use --restart to migrate again", table, record.run_id);
            return Ok(TableReport {
                table,
                state: MigrationState::Completed,
                totals: RunTotals::default(),
            });
        }

        if record.phase == MigrationPhase::Running && record.source_fingerprint.as_deref() != fingerprint {
            warn!("Legacy database changed since run {} of {} started", record.run_id, table);
            return Err(anyhow!(
                "Source database changed since {} was started; rerun with --restart",
                table
            ));
        }

        let mut orchestrator = self.orchestrator_for(table, &record).await?;
        let progress_bar = self.progress_bar(multi_progress, table, &orchestrator, &record);

        while let Some(outcome) = orchestrator
            .step_within(clock)
            .await
            .with_context(|| format!("Migration of {} stopped", table))?
        {
            apply_outcome(&mut record, &outcome, orchestrator.state());
            self.repository.save_progress(&record).await?;

            match outcome {
                StepOutcome::Prepared { total } => progress_bar.set_length(total),
                StepOutcome::Chunk { result, .. } => {
                    progress_bar.inc(result.records_seen());
                    progress_bar.set_message(format!("{} errors", record.errors));
                }
                _ => {}
            }
        }

        if orchestrator.is_completed() {
            progress_bar.finish_and_clear();
            info!("{}: {}", table, orchestrator.totals());
        } else {
            progress_bar.abandon();
            info!("{} paused at {}; run again to continue", table, orchestrator.state());
        }

        Ok(TableReport {
            table,
            state: orchestrator.state(),
            totals: *orchestrator.totals(),
        })
    }

    /// Import exactly one chunk of a table, running its pre phase first when needed
    pub async fn run_chunk(&self, table: MigrationTable, offset: u64) -> Result<ChunkResult> {
        let fingerprint = self.source_fingerprint().await?;
        let mut record = match self.repository.get_progress(table.as_str()).await? {
            Some(record) => record,
            None => ProgressRecord::new(
                table.as_str().to_string(),
                uuid::Uuid::new_v4().to_string(),
                fingerprint,
            ),
        };

        if record.phase == MigrationPhase::NotStarted {
            let mut orchestrator = self.orchestrator_for(table, &record).await?;
            let outcome = orchestrator.step().await?;
            apply_outcome(&mut record, &outcome, orchestrator.state());
            self.repository.save_progress(&record).await?;
        }

        let mut orchestrator = MigrationOrchestrator::resume_at(self.build(table), offset).await?;
        if offset >= orchestrator.total() {
            return Err(anyhow!(
                "Offset {} is past the {} rows of {}",
                offset,
                orchestrator.total(),
                table
            ));
        }

        let outcome = orchestrator.step().await?;
        let StepOutcome::Chunk { result, .. } = outcome else {
            return Err(anyhow!("Unexpected step outcome for {}: {:?}", table, outcome));
        };

        // Only a chunk at the persisted cursor moves it
        if record.phase == MigrationPhase::Running && record.next_offset == offset as i64 {
            apply_outcome(&mut record, &outcome, orchestrator.state());
            self.repository.save_progress(&record).await?;
        }

        Ok(result)
    }

    /// Persisted progress and correspondence counts
    pub async fn status(&self) -> Result<StatusReport> {
        Ok(StatusReport {
            progress: self.repository.list_progress().await?,
            families: self.repository.family_counts().await?,
            stats: self.repository.connection().stats()?,
        })
    }

    /// Forget a table's progress so its next run starts with the pre phase
    pub async fn reset(&self, table: MigrationTable) -> Result<bool> {
        self.repository.delete_progress(table.as_str()).await
    }

    fn build(&self, table: MigrationTable) -> Box<dyn crate::import::Importer> {
        table.build(self.context.clone(), self.config.chunk_size_for(table))
    }

    async fn orchestrator_for(
        &self,
        table: MigrationTable,
        record: &ProgressRecord,
    ) -> Result<MigrationOrchestrator> {
        let importer = self.build(table);
        match record.phase {
            MigrationPhase::NotStarted => Ok(MigrationOrchestrator::new(importer)),
            _ => Ok(MigrationOrchestrator::resume_at(importer, record.next_offset.max(0) as u64).await?),
        }
    }

    fn progress_bar(
        &self,
        multi_progress: &MultiProgress,
        table: MigrationTable,
        orchestrator: &MigrationOrchestrator,
        record: &ProgressRecord,
    ) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let progress_bar = multi_progress.add(ProgressBar::new(orchestrator.total()));
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {prefix} [{bar:40.cyan/blue}] {pos}/{len} rows ({percent}%) {msg}")
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) {msg}"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        progress_bar.set_style(style.progress_chars("█▓▒░"));
        progress_bar.set_prefix(table.to_string());
        progress_bar.set_position(record.next_offset.max(0) as u64);
        progress_bar
    }

    /// SHA256 of the legacy database file, when it is a file
    async fn source_fingerprint(&self) -> Result<Option<String>> {
        match &self.source_file {
            Some(path) => Ok(Some(hash_file(path).await?)),
            None => Ok(None),
        }
    }
}

/// Mirror a step into the persisted record
fn apply_outcome(record: &mut ProgressRecord, outcome: &StepOutcome, state: MigrationState) {
    let now = chrono::Utc::now().to_rfc3339();
    record.updated_at = now.clone();

    match outcome {
        StepOutcome::Prepared { total } => {
            record.total_count = *total as i64;
            record.next_offset = 0;
        }
        StepOutcome::Chunk { result, .. } => {
            record.records_seen += result.records_seen() as i64;
            record.created += result.created() as i64;
            record.skipped += result.skipped() as i64;
            record.errors += result.errors() as i64;
        }
        StepOutcome::Finished { post } => {
            record.errors += post.errors() as i64;
            record.completed_at = Some(now);
        }
        StepOutcome::AlreadyCompleted => {}
    }

    match state {
        MigrationState::NotStarted => record.phase = MigrationPhase::NotStarted,
        MigrationState::Running { offset } => {
            record.phase = MigrationPhase::Running;
            record.next_offset = offset as i64;
        }
        MigrationState::Completed => record.phase = MigrationPhase::Completed,
    }
}

/// Compute SHA256 hash of a file
async fn hash_file(path: &Path) -> Result<String> {
    let path = path.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let mut file = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open file for hashing: {:?}", path))?;

        let mut hasher = Sha256::new();
        let mut buffer = [0u8; 8192];

        loop {
            let bytes_read = file.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(format!("{:x}", hasher.finalize()))
    })
    .await
    .context("File hashing task panicked")?
}
