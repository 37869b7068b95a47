//! DuckDB result store: sampled review tables and append-only rating ledgers.

use std::cell::Cell;
use std::path::Path;

use arrow::record_batch::RecordBatch;
use duckdb::{Connection, params};
use reviewrate_core::AnnotationRecord;
use reviewrate_core::ledger;
use tracing::{debug, info};

use crate::store::{check_table, quote_ident};
use crate::{PartitionFilter, ResultStore, StoreError};

/// DuckDB store for sampled review tables and their rating ledgers.
///
/// Each partition has a sampled table (read-only to the pipeline) and a
/// ledger table that only ever grows. Ledger rows get a `row_id` from a
/// per-table sequence, which is the ordering column for downstream readers.
///
/// Supports both in-memory (ephemeral) and persistent (file-backed) modes.
/// Use [`open`](Self::open) for in-memory and [`open_persistent`](Self::open_persistent)
/// for file-backed storage that survives across process restarts.
pub struct DuckStore {
    conn: Connection,
    in_tx: Cell<bool>,
}

impl DuckStore {
    /// Open an in-memory DuckDB database.
    pub fn open() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self::from_connection(conn))
    }

    /// Open or create a persistent DuckDB database at the given path.
    pub fn open_persistent(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn,
            in_tx: Cell::new(false),
        }
    }

    /// Whether a transaction opened through [`ResultStore::begin`] is still open.
    pub fn in_transaction(&self) -> bool {
        self.in_tx.get()
    }

    // ── Import / export ──

    /// Create (or replace) a sampled table from a Parquet or CSV file.
    pub fn import_sampled(&self, table: &str, path: &Path) -> Result<usize, StoreError> {
        check_table(table)?;
        if !path.exists() {
            return Err(StoreError::FileNotFound(path.to_path_buf()));
        }
        let reader = match path.extension().and_then(|e| e.to_str()) {
            Some("parquet") => "read_parquet",
            Some("csv") | Some("tsv") => "read_csv_auto",
            _ => return Err(StoreError::UnsupportedFormat(path.to_path_buf())),
        };
        let sql = format!(
            "CREATE OR REPLACE TABLE {table} AS SELECT * FROM {reader}('{}')",
            sql_path(path)
        );
        self.conn.execute_batch(&sql)?;
        let count = self.count(table)?;
        info!(table, count, path = %path.display(), "imported sampled table");
        Ok(count)
    }

    /// Write a ledger table to Parquet, ordered by `row_id`.
    pub fn export_ledger(&self, table: &str, path: &Path) -> Result<usize, StoreError> {
        check_table(table)?;
        if !self.exists(table)? {
            return Err(StoreError::TableNotFound(table.to_string()));
        }
        let sql = format!(
            "COPY (SELECT * FROM {table} ORDER BY {}) TO '{}' (FORMAT PARQUET)",
            ledger::ROW_ID,
            sql_path(path)
        );
        self.conn.execute_batch(&sql)?;
        let count = self.count(table)?;
        info!(table, count, path = %path.display(), "exported ledger");
        Ok(count)
    }

    // ── Escape hatch ──

    /// Execute arbitrary SQL and return Arrow RecordBatches.
    pub fn query_arrow(&self, sql: &str) -> Result<Vec<RecordBatch>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let batches: Vec<RecordBatch> = stmt.query_arrow([])?.collect();
        Ok(batches)
    }

    /// Execute a batch of SQL statements with no result.
    pub fn execute_batch(&self, sql: &str) -> Result<(), StoreError> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    fn count_table(&self, table: &str) -> Result<usize, StoreError> {
        let sql = format!("SELECT count(*)::BIGINT AS cnt FROM {table}");
        let mut stmt = self.conn.prepare(&sql)?;
        let batches: Vec<RecordBatch> = stmt.query_arrow([])?.collect();
        let batch = batches.first().ok_or(StoreError::NoResults)?;
        let col = batch
            .column(0)
            .as_any()
            .downcast_ref::<arrow::array::Int64Array>()
            .ok_or_else(|| StoreError::Other("count column not i64".into()))?;
        Ok(col.value(0) as usize)
    }

    fn require_table(&self, table: &str) -> Result<(), StoreError> {
        check_table(table)?;
        if self.exists(table)? {
            Ok(())
        } else {
            Err(StoreError::TableNotFound(table.to_string()))
        }
    }
}

impl ResultStore for DuckStore {
    fn begin(&self) -> Result<(), StoreError> {
        if self.in_tx.get() {
            return Err(StoreError::TransactionOpen);
        }
        self.conn.execute_batch("BEGIN TRANSACTION")?;
        self.in_tx.set(true);
        debug!("transaction opened");
        Ok(())
    }

    fn commit(&self) -> Result<(), StoreError> {
        if !self.in_tx.get() {
            return Err(StoreError::NoTransaction);
        }
        // A failed COMMIT leaves nothing to roll back.
        self.in_tx.set(false);
        self.conn.execute_batch("COMMIT")?;
        debug!("transaction committed");
        Ok(())
    }

    fn rollback(&self) -> Result<(), StoreError> {
        if !self.in_tx.get() {
            return Err(StoreError::NoTransaction);
        }
        self.in_tx.set(false);
        self.conn.execute_batch("ROLLBACK")?;
        debug!("transaction rolled back");
        Ok(())
    }

    fn exists(&self, table: &str) -> Result<bool, StoreError> {
        let n: i64 = self.conn.query_row(
            "SELECT count(*)::BIGINT FROM information_schema.tables WHERE table_name = ?",
            [table],
            |row| row.get(0),
        )?;
        Ok(n > 0)
    }

    fn count(&self, table: &str) -> Result<usize, StoreError> {
        self.require_table(table)?;
        self.count_table(table)
    }

    fn columns(&self, table: &str) -> Result<Vec<String>, StoreError> {
        self.require_table(table)?;
        let sql = format!("SELECT * FROM {table} LIMIT 0");
        let mut stmt = self.conn.prepare(&sql)?;
        let schema = stmt.query_arrow([])?.get_schema();
        Ok(schema.fields().iter().map(|f| f.name().clone()).collect())
    }

    fn query(
        &self,
        table: &str,
        columns: &[&str],
        partition: Option<PartitionFilter<'_>>,
    ) -> Result<Vec<RecordBatch>, StoreError> {
        self.require_table(table)?;
        let projection = columns
            .iter()
            .map(|c| {
                let q = quote_ident(c);
                format!("CAST({q} AS VARCHAR) AS {q}")
            })
            .collect::<Vec<_>>()
            .join(", ");

        let batches: Vec<RecordBatch> = match partition {
            Some(filter) => {
                let sql = format!(
                    "SELECT {projection} FROM {table} WHERE CAST({} AS VARCHAR) = ?",
                    quote_ident(filter.column)
                );
                let mut stmt = self.conn.prepare(&sql)?;
                let rows: Vec<RecordBatch> = stmt.query_arrow([filter.value])?.collect();
                rows
            }
            None => {
                let sql = format!("SELECT {projection} FROM {table}");
                let mut stmt = self.conn.prepare(&sql)?;
                let rows: Vec<RecordBatch> = stmt.query_arrow([])?.collect();
                rows
            }
        };
        Ok(batches)
    }

    fn ensure_ledger(&self, table: &str) -> Result<(), StoreError> {
        check_table(table)?;
        let sql = format!(
            "CREATE SEQUENCE IF NOT EXISTS {table}_row_id_seq;
             CREATE TABLE IF NOT EXISTS {table} (
                {row_id}           BIGINT PRIMARY KEY DEFAULT nextval('{table}_row_id_seq'),
                {product_line_id}  VARCHAR NOT NULL,
                {item_id}          VARCHAR NOT NULL,
                {reviewer_id}      VARCHAR NOT NULL,
                {property_name}    VARCHAR NOT NULL,
                {property_type}    VARCHAR,
                {ai_rating_result} VARCHAR NOT NULL,
                {ai_model}         VARCHAR NOT NULL,
                {ai_score}         INTEGER,
                {rated_at}         TIMESTAMP NOT NULL,
                UNIQUE ({product_line_id}, {item_id}, {reviewer_id}, {property_name})
             )",
            row_id = ledger::ROW_ID,
            product_line_id = ledger::PRODUCT_LINE_ID,
            item_id = ledger::ITEM_ID,
            reviewer_id = ledger::REVIEWER_ID,
            property_name = ledger::PROPERTY_NAME,
            property_type = ledger::PROPERTY_TYPE,
            ai_rating_result = ledger::AI_RATING_RESULT,
            ai_model = ledger::AI_MODEL,
            ai_score = ledger::AI_SCORE,
            rated_at = ledger::RATED_AT,
        );
        self.conn.execute_batch(&sql)?;
        Ok(())
    }

    fn append_annotations(
        &self,
        table: &str,
        rows: &[AnnotationRecord],
    ) -> Result<usize, StoreError> {
        check_table(table)?;
        if rows.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "INSERT INTO {table} ({}, {}, {}, {}, {}, {}, {}, {}, {})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, CAST(? AS TIMESTAMP))",
            ledger::PRODUCT_LINE_ID,
            ledger::ITEM_ID,
            ledger::REVIEWER_ID,
            ledger::PROPERTY_NAME,
            ledger::PROPERTY_TYPE,
            ledger::AI_RATING_RESULT,
            ledger::AI_MODEL,
            ledger::AI_SCORE,
            ledger::RATED_AT,
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        for rec in rows {
            let rated_at = rec.rated_at.format("%Y-%m-%d %H:%M:%S%.6f").to_string();
            stmt.execute(params![
                rec.partition,
                rec.identity.item_id,
                rec.identity.reviewer_id,
                rec.identity.property_name,
                rec.property_type,
                rec.ai_rating_result,
                rec.ai_model,
                rec.ai_score,
                rated_at,
            ])?;
        }
        debug!(table, rows = rows.len(), "appended annotations");
        Ok(rows.len())
    }
}

/// Escape a path for use in a SQL single-quoted literal.
fn sql_path(path: &Path) -> String {
    path.display().to_string().replace('\'', "''")
}
