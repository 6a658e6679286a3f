/*!
 * Drives one importer through its pre, chunk and post phases.
 *
 * State machine: `NotStarted -> Running(offset) -> Completed`. The
 * orchestrator keeps nothing that cannot be rebuilt from the offset: a new
 * orchestrator created with [`MigrationOrchestrator::resume_at`] continues
 * exactly where a previous process stopped.
 */

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

use crate::errors::ImportError;

use super::chunk::{ChunkResult, RunTotals};
use super::importer::Importer;

/// Position of a table in its migration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MigrationState {
    NotStarted,
    Running { offset: u64 },
    Completed,
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationState::NotStarted => write!(f, "not started"),
            MigrationState::Running { offset } => write!(f, "running at offset {}", offset),
            MigrationState::Completed => write!(f, "completed"),
        }
    }
}

/// What a single [`MigrationOrchestrator::step`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Pre phase ran and the total was counted
    Prepared { total: u64 },
    /// One chunk was imported
    Chunk { offset: u64, result: ChunkResult },
    /// Post phase ran; the table is done
    Finished { post: ChunkResult },
    /// Nothing left to do
    AlreadyCompleted,
}

/// Limits of one bounded invocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SliceBudget {
    /// Stop after this many chunks
    pub max_chunks: Option<u64>,
    /// Stop once this much wall-clock time has elapsed
    pub time_budget: Option<Duration>,
}

impl SliceBudget {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn chunks(max_chunks: u64) -> Self {
        Self {
            max_chunks: Some(max_chunks),
            time_budget: None,
        }
    }

    pub fn time(budget: Duration) -> Self {
        Self {
            max_chunks: None,
            time_budget: Some(budget),
        }
    }

    /// Start spending this budget
    pub fn start(self) -> SliceClock {
        SliceClock {
            budget: self,
            started: Instant::now(),
            chunks: 0,
        }
    }
}

/// A budget being spent; shared by every table of one invocation
#[derive(Debug, Clone, Copy)]
pub struct SliceClock {
    budget: SliceBudget,
    started: Instant,
    chunks: u64,
}

impl SliceClock {
    /// Account a step; only chunks count towards `max_chunks`
    pub fn record(&mut self, outcome: &StepOutcome) {
        if let StepOutcome::Chunk { .. } = outcome {
            self.chunks += 1;
        }
    }

    pub fn chunks(&self) -> u64 {
        self.chunks
    }

    pub fn is_exhausted(&self) -> bool {
        self.budget.max_chunks.is_some_and(|max| self.chunks >= max)
            || self
                .budget
                .time_budget
                .is_some_and(|limit| self.started.elapsed() >= limit)
    }
}

/// Orchestrator of one table
pub struct MigrationOrchestrator {
    importer: Box<dyn Importer>,
    state: MigrationState,
    total: u64,
    totals: RunTotals,
}

impl fmt::Debug for MigrationOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationOrchestrator")
            .field("table", &self.importer.name())
            .field("state", &self.state)
            .field("total", &self.total)
            .finish()
    }
}

impl MigrationOrchestrator {
    /// Orchestrate a table from scratch
    pub fn new(importer: Box<dyn Importer>) -> Self {
        Self {
            importer,
            state: MigrationState::NotStarted,
            total: 0,
            totals: RunTotals::default(),
        }
    }

    /// Continue a table whose pre phase already ran, at a persisted offset
    ///
    /// The total is counted again, it may have changed since the last run.
    pub async fn resume_at(importer: Box<dyn Importer>, offset: u64) -> Result<Self, ImportError> {
        check_chunk_size(importer.as_ref())?;

        let total = importer.total_count().await?;
        info!(
            "Resuming {} at offset {} of {}",
            importer.name(),
            offset,
            total
        );

        Ok(Self {
            importer,
            state: MigrationState::Running { offset },
            total,
            totals: RunTotals::default(),
        })
    }

    pub fn name(&self) -> &'static str {
        self.importer.name()
    }

    pub fn chunk_size(&self) -> u64 {
        self.importer.chunk_size()
    }

    pub fn state(&self) -> MigrationState {
        self.state
    }

    /// Rows counted when the run started or resumed
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Totals accumulated by this orchestrator instance
    pub fn totals(&self) -> &RunTotals {
        &self.totals
    }

    pub fn is_completed(&self) -> bool {
        self.state == MigrationState::Completed
    }

    /// Advance the state machine by one transition
    ///
    /// On error the state is left unchanged, so the same step can be retried.
    pub async fn step(&mut self) -> Result<StepOutcome, ImportError> {
        match self.state {
            MigrationState::NotStarted => {
                check_chunk_size(self.importer.as_ref())?;

                info!("Preparing {}", self.name());
                self.importer.pre_import().await?;
                self.total = self.importer.total_count().await?;
                self.state = MigrationState::Running { offset: 0 };

                info!("{}: {} rows to migrate", self.name(), self.total);
                Ok(StepOutcome::Prepared { total: self.total })
            }
            MigrationState::Running { offset } if offset < self.total => {
                let result = self.importer.import_chunk(offset).await?;
                debug!(
                    "{} chunk at offset {}: {}",
                    self.name(),
                    offset,
                    result
                );

                self.totals.add_chunk(&result);
                self.state = MigrationState::Running {
                    offset: offset + self.importer.chunk_size(),
                };
                Ok(StepOutcome::Chunk { offset, result })
            }
            MigrationState::Running { .. } => {
                let post = self.importer.post_import().await?;
                self.totals.add_post(&post);
                self.state = MigrationState::Completed;

                info!("{} completed: {}", self.name(), self.totals);
                Ok(StepOutcome::Finished { post })
            }
            MigrationState::Completed => Ok(StepOutcome::AlreadyCompleted),
        }
    }

    /// Step until the table is completed
    pub async fn run_to_completion(&mut self) -> Result<RunTotals, ImportError> {
        while !self.is_completed() {
            self.step().await?;
        }
        Ok(self.totals)
    }

    /// Take one step charged to `clock`
    ///
    /// Returns `None` once the table is completed or the clock is spent; the
    /// budget is only checked between steps, never inside a chunk.
    pub async fn step_within(
        &mut self,
        clock: &mut SliceClock,
    ) -> Result<Option<StepOutcome>, ImportError> {
        if self.is_completed() || clock.is_exhausted() {
            return Ok(None);
        }
        let outcome = self.step().await?;
        clock.record(&outcome);
        Ok(Some(outcome))
    }

    /// Step until completion or until the budget is spent, between chunks
    pub async fn run_slice(&mut self, budget: SliceBudget) -> Result<MigrationState, ImportError> {
        let mut clock = budget.start();

        while self.step_within(&mut clock).await?.is_some() {}

        if !self.is_completed() {
            info!(
                "{} paused ({}) after {} chunks",
                self.name(),
                self.state,
                clock.chunks()
            );
        }
        Ok(self.state)
    }
}

fn check_chunk_size(importer: &dyn Importer) -> Result<(), ImportError> {
    if importer.chunk_size() == 0 {
        return Err(ImportError::structural(
            importer.name(),
            "chunk size must be positive",
        ));
    }
    Ok(())
}
