//! Run configuration passed to the orchestrator.
//!
//! Plain data with defaults. The CLI layers flags and environment variables
//! over it; library code never reads process-wide settings.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_CHUNK_SIZE: usize = 20;
pub const DEFAULT_WORKERS: usize = 4;

/// Placeholder substituted with the partition name in table templates.
pub const PARTITION_PLACEHOLDER: &str = "{partition}";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no partitions configured")]
    NoPartitions,

    #[error("chunk size must be at least 1")]
    ZeroChunkSize,

    #[error("item limit must be at least 1")]
    ZeroLimit,

    #[error("invalid partition name {0:?}: only ASCII letters, digits and '_' are allowed")]
    InvalidPartition(String),

    #[error("invalid table name {0:?}: only ASCII letters, digits and '_' are allowed")]
    InvalidTable(String),

    #[error("missing oracle credential: set {0}")]
    MissingCredential(&'static str),

    #[error("sampled table {table} is missing required column {column}")]
    MissingColumn { table: String, column: String },

    #[error("sampled table {table} has none of the identity columns")]
    NoIdentityColumns { table: String },

    #[error("sampled table {0} does not exist")]
    MissingTable(String),

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Column names of the sampled table.
///
/// Platforms store review text under different names, so title and body in
/// particular are commonly overridden.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ColumnMap {
    pub partition: String,
    pub item_id: String,
    pub reviewer_id: String,
    pub title: String,
    pub body: String,
    pub property_name: String,
    pub property_name_localized: String,
    pub property_type: String,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            partition: "product_line_id".into(),
            item_id: "item_id".into(),
            reviewer_id: "reviewer_id".into(),
            title: "review_title".into(),
            body: "review_body".into(),
            property_name: "property_name".into(),
            property_name_localized: "property_name_english".into(),
            property_type: "property_type".into(),
        }
    }
}

/// Everything a run needs besides the store and the oracle.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Partitions processed in order, e.g. product line ids.
    pub partitions: Vec<String>,
    pub chunk_size: usize,
    /// Requested worker count; clamped by [`RunConfig::effective_workers`].
    pub workers: usize,
    /// Sampled-items table name, may contain `{partition}`.
    pub sampled_table: String,
    /// Ledger table name, may contain `{partition}`.
    pub ledger_table: String,
    pub columns: ColumnMap,
    /// Human-readable product line used in prompts. Defaults to the partition name.
    pub product_line_name: Option<String>,
    /// Cap on oracle calls per run. Items past it stay in the backlog.
    pub max_items: Option<usize>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            partitions: Vec::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            workers: DEFAULT_WORKERS,
            sampled_table: "comment_property_sampled_{partition}".into(),
            ledger_table: "comment_property_rating_{partition}".into(),
            columns: ColumnMap::default(),
            product_line_name: None,
            max_items: None,
        }
    }
}

impl RunConfig {
    /// Load a config from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Check the config before any store or oracle work begins.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.partitions.is_empty() {
            return Err(ConfigError::NoPartitions);
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        if self.max_items == Some(0) {
            return Err(ConfigError::ZeroLimit);
        }
        for p in &self.partitions {
            if !is_identifier(p) {
                return Err(ConfigError::InvalidPartition(p.clone()));
            }
            validate_table_name(&self.sampled_table_for(p))?;
            validate_table_name(&self.ledger_table_for(p))?;
        }
        Ok(())
    }

    /// Worker count actually used: `min(requested, available_parallelism - 1)`, at least 1.
    pub fn effective_workers(&self) -> usize {
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let workers = clamp_workers(self.workers, available);
        if workers != self.workers {
            tracing::debug!(requested = self.workers, available, workers, "clamped worker count");
        }
        workers
    }

    pub fn sampled_table_for(&self, partition: &str) -> String {
        self.sampled_table.replace(PARTITION_PLACEHOLDER, partition)
    }

    pub fn ledger_table_for(&self, partition: &str) -> String {
        self.ledger_table.replace(PARTITION_PLACEHOLDER, partition)
    }

    pub fn product_line_for<'a>(&'a self, partition: &'a str) -> &'a str {
        self.product_line_name.as_deref().unwrap_or(partition)
    }
}

/// `min(requested, available - 1)`, never below 1.
pub fn clamp_workers(requested: usize, available: usize) -> usize {
    requested.min(available.saturating_sub(1)).max(1)
}

/// Table names are spliced into SQL, so only plain identifiers are accepted.
pub fn validate_table_name(name: &str) -> Result<(), ConfigError> {
    if is_identifier(name) {
        Ok(())
    } else {
        Err(ConfigError::InvalidTable(name.to_string()))
    }
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}
