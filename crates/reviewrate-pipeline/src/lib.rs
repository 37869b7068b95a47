//! Incremental rating pipeline.
//!
//! Discovery finds the (review, property) pairs missing from a partition's
//! ledger; the backlog is rated in fixed-size chunks, each chunk's oracle
//! calls fan out over a bounded worker pool, and each chunk commits in one
//! store transaction or not at all.

pub mod commit;
pub mod discovery;
pub mod dispatch;
mod error;
pub mod orchestrator;

pub use commit::{ChunkReport, CommitManager};
pub use discovery::{Backlog, discover};
pub use dispatch::Dispatcher;
pub use error::PipelineError;
pub use orchestrator::{PartitionReport, Pipeline, RunAborted, RunPhase, RunReport};

#[cfg(test)]
mod test_support;
