use thiserror::Error;

/// Substrings that mark a store error as infrastructure-level: the connection
/// is gone, a lock could not be taken, or an operation timed out.
const FATAL_MARKERS: &[&str] = &[
    "connection",
    "network",
    "timeout",
    "timed out",
    "lock",
    "conflict",
    "socket",
    "i/o error",
    "io error",
];

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("file not found: {0}")]
    FileNotFound(std::path::PathBuf),

    #[error("unsupported file format: {0}")]
    UnsupportedFormat(std::path::PathBuf),

    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("invalid identifier {0:?}")]
    InvalidIdentifier(String),

    #[error("no results for query")]
    NoResults,

    #[error("a transaction is already open")]
    TransactionOpen,

    #[error("no open transaction")]
    NoTransaction,

    #[cfg(feature = "duckdb")]
    #[error("duckdb error: {0}")]
    DuckDb(#[from] ::duckdb::Error),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("{0}")]
    Other(String),
}

impl StoreError {
    /// The marker that classifies this error as connectivity/lock/timeout, if any.
    pub fn fatal_marker(&self) -> Option<&'static str> {
        let msg = self.to_string().to_lowercase();
        FATAL_MARKERS.iter().copied().find(|m| msg.contains(m))
    }

    pub fn is_fatal_marker(&self) -> bool {
        self.fatal_marker().is_some()
    }
}
