use reviewrate_ai::OracleError;
use reviewrate_core::{ConfigError, Identity};
use reviewrate_store::StoreError;
use thiserror::Error;

/// Errors that abort a run. Recoverable per-item failures never surface here;
/// they are absorbed by classification and only show up as rejection counts.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("rating oracle liveness probe failed: {0}")]
    ProbeFailed(OracleError),

    #[error("fatal oracle error rating {identity}: {error}")]
    Oracle {
        identity: Identity,
        error: OracleError,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("rollback failed ({rollback}) after: {cause}")]
    Rollback {
        cause: Box<PipelineError>,
        rollback: StoreError,
    },
}
