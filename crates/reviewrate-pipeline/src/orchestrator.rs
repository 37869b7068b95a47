//! Run orchestration.
//!
//! ```text
//! Idle -> ProbingOracle -> (per partition) Discovering -> Chunking
//!      -> (per chunk) DispatchingChunk -> ClassifyingChunk -> CommittingChunk
//!      -> PartitionDone -> ... -> Finished
//! ```
//!
//! `Aborted` is entered from `ProbingOracle` or from `CommittingChunk` (after
//! the chunk's transaction was rolled back), and from any store read that
//! fails along the way. Partitions and chunks run strictly one after another,
//! so at most one transaction is ever open.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use reviewrate_ai::{RatingOracle, RejectionKind, classify_chunk};
use reviewrate_core::RunConfig;
use reviewrate_store::ResultStore;
use tracing::{error, info, warn};

use crate::dispatch::chunk_count;
use crate::{ChunkReport, CommitManager, Dispatcher, PipelineError, discover};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    ProbingOracle,
    Discovering,
    Chunking,
    DispatchingChunk,
    ClassifyingChunk,
    CommittingChunk,
    PartitionDone,
    Finished,
    Aborted,
}

impl RunPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::ProbingOracle => "probing_oracle",
            Self::Discovering => "discovering",
            Self::Chunking => "chunking",
            Self::DispatchingChunk => "dispatching_chunk",
            Self::ClassifyingChunk => "classifying_chunk",
            Self::CommittingChunk => "committing_chunk",
            Self::PartitionDone => "partition_done",
            Self::Finished => "finished",
            Self::Aborted => "aborted",
        }
    }
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Before/after accounting for one partition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionReport {
    pub partition: String,
    pub sampled: usize,
    pub already_done: usize,
    pub backlog: usize,
    /// Backlog items left for a later run by `max_items`.
    pub deferred: usize,
    pub chunks: Vec<ChunkReport>,
    /// Ledger row count before the first chunk, re-queried from the store.
    pub initial_count: usize,
    /// Ledger row count after the last chunk, re-queried from the store.
    pub final_count: usize,
}

impl PartitionReport {
    pub fn committed(&self) -> usize {
        self.chunks.iter().map(|c| c.committed).sum()
    }

    pub fn rejected(&self) -> BTreeMap<RejectionKind, usize> {
        let mut out = BTreeMap::new();
        for chunk in &self.chunks {
            for (kind, n) in &chunk.rejected {
                *out.entry(*kind).or_insert(0) += n;
            }
        }
        out
    }

    /// Rows added to the ledger while this partition ran.
    pub fn newly_processed(&self) -> usize {
        self.final_count.saturating_sub(self.initial_count)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub partitions: Vec<PartitionReport>,
}

impl RunReport {
    pub fn committed(&self) -> usize {
        self.partitions.iter().map(PartitionReport::committed).sum()
    }

    pub fn rejected(&self) -> usize {
        self.partitions
            .iter()
            .flat_map(|p| p.chunks.iter())
            .map(ChunkReport::rejected_total)
            .sum()
    }
}

/// A run that stopped on a fatal error.
///
/// Names where the run was when it stopped and carries the reports of every
/// partition that had already finished, so the next invocation can be
/// checked against them.
#[derive(Debug)]
pub struct RunAborted {
    pub phase: RunPhase,
    pub partition: Option<String>,
    pub chunk: Option<usize>,
    pub completed: Vec<PartitionReport>,
    pub cause: PipelineError,
}

impl std::fmt::Display for RunAborted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "run aborted during {}", self.phase)?;
        if let Some(p) = &self.partition {
            write!(f, " (partition {p}")?;
            if let Some(c) = self.chunk {
                write!(f, ", chunk {c}")?;
            }
            f.write_str(")")?;
        }
        write!(f, ": {}", self.cause)
    }
}

impl std::error::Error for RunAborted {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}

/// Drives one run over every configured partition.
pub struct Pipeline<'a, S: ResultStore + ?Sized> {
    store: &'a S,
    oracle: Arc<dyn RatingOracle>,
    config: RunConfig,
    phase: RunPhase,
    partition: Option<String>,
    chunk: Option<usize>,
}

impl<'a, S: ResultStore + ?Sized> Pipeline<'a, S> {
    /// Validates `config` before anything touches the store or the oracle.
    pub fn new(
        store: &'a S,
        oracle: Arc<dyn RatingOracle>,
        config: RunConfig,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            store,
            oracle,
            config,
            phase: RunPhase::Idle,
            partition: None,
            chunk: None,
        })
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub async fn run(&mut self) -> Result<RunReport, RunAborted> {
        let mut report = RunReport::default();
        match self.run_partitions(&mut report).await {
            Ok(()) => {
                self.enter(RunPhase::Finished);
                info!(
                    partitions = report.partitions.len(),
                    committed = report.committed(),
                    rejected = report.rejected(),
                    "run finished"
                );
                Ok(report)
            }
            Err(cause) => {
                let aborted = RunAborted {
                    phase: self.phase,
                    partition: self.partition.take(),
                    chunk: self.chunk.take(),
                    completed: report.partitions,
                    cause,
                };
                self.phase = RunPhase::Aborted;
                error!(
                    phase = %aborted.phase,
                    partition = ?aborted.partition,
                    chunk = ?aborted.chunk,
                    completed = aborted.completed.len(),
                    error = %aborted.cause,
                    "run aborted"
                );
                Err(aborted)
            }
        }
    }

    async fn run_partitions(&mut self, report: &mut RunReport) -> Result<(), PipelineError> {
        self.enter(RunPhase::ProbingOracle);
        self.oracle
            .probe()
            .await
            .map_err(PipelineError::ProbeFailed)?;
        info!(model = self.oracle.model(), "rating oracle is live");

        let dispatcher = Dispatcher::new(Arc::clone(&self.oracle), self.config.effective_workers());
        info!(
            workers = dispatcher.workers(),
            chunk_size = self.config.chunk_size,
            limit = ?self.config.max_items,
            "starting partitions"
        );
        let partitions = self.config.partitions.clone();
        let mut budget = self.config.max_items;
        for partition in &partitions {
            let done = self.run_partition(partition, &dispatcher, &mut budget).await?;
            report.partitions.push(done);
        }
        Ok(())
    }

    async fn run_partition(
        &mut self,
        partition: &str,
        dispatcher: &Dispatcher,
        budget: &mut Option<usize>,
    ) -> Result<PartitionReport, PipelineError> {
        let started = Instant::now();
        self.partition = Some(partition.to_string());
        self.chunk = None;

        self.enter(RunPhase::Discovering);
        let mut backlog = discover(self.store, &self.config, partition)?;
        let ledger_table = self.config.ledger_table_for(partition);
        self.store.ensure_ledger(&ledger_table)?;
        let initial_count = self.store.count(&ledger_table)?;

        let mut report = PartitionReport {
            partition: partition.to_string(),
            sampled: backlog.sampled,
            already_done: backlog.already_done,
            backlog: backlog.len(),
            initial_count,
            ..PartitionReport::default()
        };

        if let Some(left) = budget {
            if backlog.len() > *left {
                report.deferred = backlog.len() - *left;
                backlog.items.truncate(*left);
                info!(
                    partition,
                    limit = ?self.config.max_items,
                    deferred = report.deferred,
                    "backlog capped by run limit"
                );
            }
            *left -= backlog.len();
        }

        if !backlog.is_empty() {
            self.enter(RunPhase::Chunking);
            let chunk_size = self.config.chunk_size;
            let total = chunk_count(backlog.len(), chunk_size);
            let product_line = self.config.product_line_for(partition).to_string();
            let commit = CommitManager::new(self.store, ledger_table.as_str());

            for (index, chunk) in backlog.items.chunks(chunk_size).enumerate() {
                self.chunk = Some(index);
                let chunk_report = self
                    .run_chunk(&commit, dispatcher, index, chunk.to_vec(), &product_line)
                    .await?;
                info!(
                    partition,
                    chunk = index + 1,
                    of = total,
                    committed = chunk_report.committed,
                    rejected = chunk_report.rejected_total(),
                    "chunk done"
                );
                report.chunks.push(chunk_report);
            }
            self.chunk = None;
        }

        self.enter(RunPhase::PartitionDone);
        report.final_count = self.store.count(&ledger_table)?;
        if report.newly_processed() != report.committed() {
            warn!(
                partition,
                committed = report.committed(),
                delta = report.newly_processed(),
                "ledger delta differs from committed rows, another writer may be active"
            );
        }
        info!(
            partition,
            before = report.initial_count,
            after = report.final_count,
            new = report.newly_processed(),
            rejected = ?report.rejected(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "partition done"
        );
        Ok(report)
    }

    async fn run_chunk(
        &mut self,
        commit: &CommitManager<'_, S>,
        dispatcher: &Dispatcher,
        index: usize,
        items: Vec<reviewrate_core::WorkItem>,
        product_line: &str,
    ) -> Result<ChunkReport, PipelineError> {
        let dispatched = items.len();
        // The transaction spans dispatch so a fatal error anywhere in the
        // chunk discards the whole chunk.
        commit.begin()?;

        self.enter(RunPhase::DispatchingChunk);
        let outcomes = dispatcher.dispatch(items, product_line).await;

        self.enter(RunPhase::ClassifyingChunk);
        let classified = classify_chunk(outcomes);
        let rejected = classified.breakdown();
        for r in &classified.rejected {
            warn!(identity = %r.identity, kind = %r.kind, detail = %r.detail, "verdict rejected");
        }

        self.enter(RunPhase::CommittingChunk);
        if let Some((identity, error)) = classified.fatal {
            error!(
                identity = %identity,
                kind = error.kind(),
                error = %error,
                "fatal oracle error, discarding chunk"
            );
            return Err(commit.abort(PipelineError::Oracle { identity, error }));
        }
        let committed = commit.commit(&classified.valid)?;

        Ok(ChunkReport {
            index,
            dispatched,
            committed,
            rejected,
        })
    }

    fn enter(&mut self, phase: RunPhase) {
        tracing::debug!(from = %self.phase, to = %phase, "phase");
        self.phase = phase;
    }
}
