//! Storage layer: the result store interface and its DuckDB implementation.

mod error;
mod store;

pub use error::StoreError;
pub use store::{PartitionFilter, ResultStore, read_string_column};

#[cfg(feature = "duckdb")]
mod duck;
#[cfg(feature = "duckdb")]
pub use duck::DuckStore;
