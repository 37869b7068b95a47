//! The result store interface consumed by the annotation pipeline.

use arrow::array::{Array, LargeStringArray, StringArray};
use arrow::record_batch::RecordBatch;
use reviewrate_core::AnnotationRecord;

use crate::StoreError;

/// Restrict a query to the rows of one partition.
#[derive(Debug, Clone, Copy)]
pub struct PartitionFilter<'a> {
    pub column: &'a str,
    pub value: &'a str,
}

/// Transactional access to the sampled tables and the annotation ledgers.
///
/// One writer at a time: the pipeline opens at most one transaction and
/// never writes concurrently. Reads may happen with no transaction open.
pub trait ResultStore {
    fn begin(&self) -> Result<(), StoreError>;
    /// Commit the open transaction.
    ///
    /// The transaction is closed whether or not this succeeds. On error the
    /// store has already rolled it back, so callers must not call `rollback`.
    fn commit(&self) -> Result<(), StoreError>;
    fn rollback(&self) -> Result<(), StoreError>;

    fn exists(&self, table: &str) -> Result<bool, StoreError>;
    fn count(&self, table: &str) -> Result<usize, StoreError>;

    /// Column names of `table`, in table order.
    fn columns(&self, table: &str) -> Result<Vec<String>, StoreError>;

    /// Read `columns` of `table` as Utf8, optionally restricted to one partition.
    ///
    /// NULL values come back as nulls; callers decide how to treat them.
    fn query(
        &self,
        table: &str,
        columns: &[&str],
        partition: Option<PartitionFilter<'_>>,
    ) -> Result<Vec<RecordBatch>, StoreError>;

    /// Create the ledger table if it does not exist yet.
    fn ensure_ledger(&self, table: &str) -> Result<(), StoreError>;

    /// Append records to a ledger table. Returns the number of rows written.
    fn append_annotations(
        &self,
        table: &str,
        rows: &[AnnotationRecord],
    ) -> Result<usize, StoreError>;
}

/// Read a string cell from a `Utf8` or `LargeUtf8` column. `None` for nulls.
pub fn read_string_column(col: &dyn Array, row: usize) -> Option<String> {
    if col.is_null(row) {
        return None;
    }
    col.as_any()
        .downcast_ref::<StringArray>()
        .map(|arr| arr.value(row).to_string())
        .or_else(|| {
            col.as_any()
                .downcast_ref::<LargeStringArray>()
                .map(|arr| arr.value(row).to_string())
        })
}

pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub(crate) fn check_table(name: &str) -> Result<(), StoreError> {
    reviewrate_core::config::validate_table_name(name)
        .map_err(|_| StoreError::InvalidIdentifier(name.to_string()))
}
