//! Transactional commit of one chunk's kept verdicts.
//!
//! A chunk either lands in the ledger completely (its kept subset) or not at
//! all. Every failure on the write path rolls the open transaction back and is
//! returned to the caller, which aborts the run.

use std::collections::BTreeMap;

use chrono::Utc;
use reviewrate_ai::RejectionKind;
use reviewrate_ai::classifier::AcceptedVerdict;
use reviewrate_core::AnnotationRecord;
use reviewrate_store::ResultStore;
use tracing::{debug, error, warn};

use crate::PipelineError;

/// What happened to one chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkReport {
    /// Zero-based position of the chunk in the partition's backlog.
    pub index: usize,
    pub dispatched: usize,
    pub committed: usize,
    pub rejected: BTreeMap<RejectionKind, usize>,
}

impl ChunkReport {
    pub fn rejected_total(&self) -> usize {
        self.rejected.values().sum()
    }
}

/// Owns the single write transaction of a chunk against one ledger table.
pub struct CommitManager<'a, S: ResultStore + ?Sized> {
    store: &'a S,
    ledger_table: String,
}

impl<'a, S: ResultStore + ?Sized> CommitManager<'a, S> {
    pub fn new(store: &'a S, ledger_table: impl Into<String>) -> Self {
        Self {
            store,
            ledger_table: ledger_table.into(),
        }
    }

    /// Open the chunk's transaction.
    pub fn begin(&self) -> Result<(), PipelineError> {
        self.store.begin()?;
        Ok(())
    }

    /// Append the kept verdicts and commit. Returns the number of rows written.
    ///
    /// All records of the chunk share one `rated_at`; the ledger's `row_id`
    /// keeps them in chunk order.
    pub fn commit(&self, accepted: &[AcceptedVerdict]) -> Result<usize, PipelineError> {
        let rated_at = Utc::now();
        let records: Vec<AnnotationRecord> = accepted
            .iter()
            .map(|a| AnnotationRecord::from_verdict(&a.item, &a.verdict, a.score, rated_at))
            .collect();

        let written = match self.store.append_annotations(&self.ledger_table, &records) {
            Ok(n) => n,
            Err(e) => return Err(self.abort(e.into())),
        };
        if written != records.len() {
            let cause = PipelineError::Store(reviewrate_store::StoreError::Other(format!(
                "appended {written} of {} rows to {}",
                records.len(),
                self.ledger_table
            )));
            return Err(self.abort(cause));
        }
        if let Err(e) = self.store.commit() {
            // The store has already closed the transaction.
            error!(table = %self.ledger_table, error = %e, "commit failed");
            return Err(e.into());
        }
        debug!(table = %self.ledger_table, rows = written, "chunk committed");
        Ok(written)
    }

    /// Roll back the open transaction and hand back the error that caused it.
    ///
    /// If the rollback itself fails, both errors are returned together.
    pub fn abort(&self, cause: PipelineError) -> PipelineError {
        let marker = match &cause {
            PipelineError::Store(e) => e.fatal_marker(),
            _ => None,
        };
        warn!(table = %self.ledger_table, cause = %cause, marker = ?marker, "rolling back chunk");
        match self.store.rollback() {
            Ok(()) => cause,
            Err(rollback) => {
                error!(table = %self.ledger_table, error = %rollback, "rollback failed");
                PipelineError::Rollback {
                    cause: Box::new(cause),
                    rollback,
                }
            }
        }
    }
}
