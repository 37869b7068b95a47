//! In-process oracle and store doubles shared by the pipeline tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reviewrate_ai::{OracleError, RatingOracle, RatingRequest};
use reviewrate_core::{AnnotationRecord, Identity, RunConfig, Verdict, WorkItem};
use reviewrate_store::{DuckStore, PartitionFilter, ResultStore, StoreError};

pub const DEFAULT_ANSWER: &str = "[4, fine]";

/// Oracle whose answers are keyed by the request title.
///
/// Test rows use the item id as title, so scripts read as "item A answers X".
pub struct ScriptedOracle {
    answers: HashMap<String, Result<String, OracleError>>,
    delays: HashMap<String, Duration>,
    panics: HashSet<String>,
    probe_error: Option<OracleError>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    rated: Mutex<Vec<String>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self {
            answers: HashMap::new(),
            delays: HashMap::new(),
            panics: HashSet::new(),
            probe_error: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            rated: Mutex::new(Vec::new()),
        }
    }

    pub fn answer(mut self, title: &str, text: &str) -> Self {
        self.answers.insert(title.into(), Ok(text.into()));
        self
    }

    pub fn fail(mut self, title: &str, err: OracleError) -> Self {
        self.answers.insert(title.into(), Err(err));
        self
    }

    pub fn delay(mut self, title: &str, delay: Duration) -> Self {
        self.delays.insert(title.into(), delay);
        self
    }

    pub fn panic_on(mut self, title: &str) -> Self {
        self.panics.insert(title.into());
        self
    }

    pub fn failing_probe(mut self, err: OracleError) -> Self {
        self.probe_error = Some(err);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Titles rated so far, in call order.
    pub fn rated(&self) -> Vec<String> {
        self.rated.lock().unwrap().clone()
    }
}

#[async_trait]
impl RatingOracle for ScriptedOracle {
    fn model(&self) -> &str {
        "o4-mini"
    }

    async fn probe(&self) -> Result<(), OracleError> {
        match &self.probe_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn rate(&self, request: &RatingRequest) -> Result<Verdict, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.rated.lock().unwrap().push(request.title.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delays.get(&request.title) {
            tokio::time::sleep(*delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.panics.contains(&request.title) {
            panic!("scripted panic for {}", request.title);
        }

        match self.answers.get(&request.title) {
            Some(Ok(text)) => Ok(Verdict::new(text.clone(), self.model())),
            Some(Err(err)) => Err(err.clone()),
            None => Ok(Verdict::new(DEFAULT_ANSWER, self.model())),
        }
    }
}

/// DuckDB store with injectable write-path failures.
pub struct FaultyStore {
    inner: DuckStore,
    fail_append_after: Option<usize>,
    fail_commit: bool,
    fail_rollback: bool,
}

impl FaultyStore {
    pub fn new(inner: DuckStore) -> Self {
        Self {
            inner,
            fail_append_after: None,
            fail_commit: false,
            fail_rollback: false,
        }
    }

    /// Write the first `n` rows of every append, then fail with an I/O error.
    pub fn fail_append_after(mut self, n: usize) -> Self {
        self.fail_append_after = Some(n);
        self
    }

    /// Fail every commit after discarding the transaction, as a backend does
    /// when the connection drops mid-commit.
    pub fn fail_commit(mut self) -> Self {
        self.fail_commit = true;
        self
    }

    pub fn fail_rollback(mut self) -> Self {
        self.fail_rollback = true;
        self
    }

    pub fn inner(&self) -> &DuckStore {
        &self.inner
    }
}

impl ResultStore for FaultyStore {
    fn begin(&self) -> Result<(), StoreError> {
        self.inner.begin()
    }

    fn commit(&self) -> Result<(), StoreError> {
        if self.fail_commit {
            self.inner.rollback()?;
            return Err(StoreError::Other("connection lost during commit".into()));
        }
        self.inner.commit()
    }

    fn rollback(&self) -> Result<(), StoreError> {
        if self.fail_rollback {
            return Err(StoreError::Other("connection lost during rollback".into()));
        }
        self.inner.rollback()
    }

    fn exists(&self, table: &str) -> Result<bool, StoreError> {
        self.inner.exists(table)
    }

    fn count(&self, table: &str) -> Result<usize, StoreError> {
        self.inner.count(table)
    }

    fn columns(&self, table: &str) -> Result<Vec<String>, StoreError> {
        self.inner.columns(table)
    }

    fn query(
        &self,
        table: &str,
        columns: &[&str],
        partition: Option<PartitionFilter<'_>>,
    ) -> Result<Vec<arrow::record_batch::RecordBatch>, StoreError> {
        self.inner.query(table, columns, partition)
    }

    fn ensure_ledger(&self, table: &str) -> Result<(), StoreError> {
        self.inner.ensure_ledger(table)
    }

    fn append_annotations(
        &self,
        table: &str,
        rows: &[AnnotationRecord],
    ) -> Result<usize, StoreError> {
        match self.fail_append_after {
            Some(n) if rows.len() > n => {
                self.inner.append_annotations(table, &rows[..n])?;
                Err(StoreError::Other("disk I/O error: no space left on device".into()))
            }
            _ => self.inner.append_annotations(table, rows),
        }
    }
}

/// A work item shaped like the rows [`add_sampled`] inserts.
pub fn work_item(partition: &str, item_id: &str) -> WorkItem {
    WorkItem {
        partition: partition.into(),
        identity: Identity::new(item_id, "R1", "durability"),
        title: item_id.into(),
        body: format!("body of {item_id}"),
        property_name_localized: None,
        property_type: "attribute".into(),
    }
}

/// A ledger record for [`work_item`]`(partition, item_id)`.
pub fn record(partition: &str, item_id: &str) -> AnnotationRecord {
    AnnotationRecord::from_verdict(
        &work_item(partition, item_id),
        &Verdict::new(DEFAULT_ANSWER, "o4-mini"),
        Some(4),
        Utc::now(),
    )
}

/// Create the default sampled table of `partition` and fill it with `item_ids`.
pub fn add_sampled(store: &DuckStore, partition: &str, item_ids: &[&str]) {
    let table = format!("comment_property_sampled_{partition}");
    store
        .execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                product_line_id VARCHAR, item_id VARCHAR, reviewer_id VARCHAR,
                review_title VARCHAR, review_body VARCHAR,
                property_name VARCHAR, property_type VARCHAR)"
        ))
        .unwrap();
    for id in item_ids {
        store
            .execute_batch(&format!(
                "INSERT INTO {table} VALUES ('{partition}', '{id}', 'R1', '{id}', 'body of {id}', 'durability', 'attribute')"
            ))
            .unwrap();
    }
}

pub fn sampled_store(partition: &str, item_ids: &[&str]) -> DuckStore {
    let store = DuckStore::open().unwrap();
    add_sampled(&store, partition, item_ids);
    store
}

pub fn config(partitions: &[&str]) -> RunConfig {
    RunConfig {
        partitions: partitions.iter().map(|p| p.to_string()).collect(),
        chunk_size: 2,
        workers: 2,
        ..RunConfig::default()
    }
}
