//! Work discovery: sampled items whose identity is not yet in the ledger.
//!
//! Pure read. The ledger is the only record of what is done, so running
//! discovery again after a crash or an aborted run never returns an identity
//! that was already committed.

use std::collections::HashSet;

use arrow::record_batch::RecordBatch;
use reviewrate_core::{ConfigError, Identity, IdentityColumns, IdentityKey, RunConfig, WorkItem, ledger};
use reviewrate_store::{PartitionFilter, ResultStore, read_string_column};
use tracing::{info, warn};

use crate::PipelineError;

/// Remaining work for one partition.
#[derive(Debug, Clone)]
pub struct Backlog {
    pub partition: String,
    /// Distinct sampled identities.
    pub sampled: usize,
    /// Sampled identities already present in the ledger.
    pub already_done: usize,
    /// Identity columns used for the anti-join.
    pub identity: IdentityColumns,
    /// Items still to rate, in sampled-table order.
    pub items: Vec<WorkItem>,
}

impl Backlog {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Compute the backlog of `partition`.
pub fn discover<S: ResultStore + ?Sized>(
    store: &S,
    config: &RunConfig,
    partition: &str,
) -> Result<Backlog, PipelineError> {
    let sampled_table = config.sampled_table_for(partition);
    let ledger_table = config.ledger_table_for(partition);
    let map = &config.columns;

    if !store.exists(&sampled_table)? {
        return Err(ConfigError::MissingTable(sampled_table).into());
    }
    let available: HashSet<String> = store.columns(&sampled_table)?.into_iter().collect();
    let has = |c: &str| available.contains(c);

    // The localized name stands in for a missing property_name column and
    // then keys the property like property_name would.
    let localized_only =
        !has(map.property_name.as_str()) && has(map.property_name_localized.as_str());
    let identity = IdentityColumns {
        item_id: has(map.item_id.as_str()),
        reviewer_id: has(map.reviewer_id.as_str()),
        property_name: has(map.property_name.as_str()) || localized_only,
    };
    if identity.is_empty() {
        return Err(ConfigError::NoIdentityColumns {
            table: sampled_table,
        }
        .into());
    }
    if !has(map.body.as_str()) {
        return Err(missing(&sampled_table, &map.body));
    }
    if !identity.property_name {
        return Err(missing(&sampled_table, &map.property_name));
    }
    if localized_only {
        info!(
            partition,
            column = %map.property_name_localized,
            "no property_name column, keying properties by localized name"
        );
    }
    if identity != IdentityColumns::all() {
        warn!(
            partition,
            table = %sampled_table,
            dropped = ?identity.dropped(),
            "identity columns missing from sampled table, narrowing deduplication key"
        );
    }

    let wanted: Vec<&str> = [
        &map.item_id,
        &map.reviewer_id,
        &map.title,
        &map.body,
        &map.property_name,
        &map.property_name_localized,
        &map.property_type,
    ]
    .into_iter()
    .map(String::as_str)
    .filter(|c| has(c))
    .collect();

    let filter = has(map.partition.as_str()).then_some(PartitionFilter {
        column: &map.partition,
        value: partition,
    });
    let sampled_batches = store.query(&sampled_table, &wanted, filter)?;
    let sampled_items = items_from_batches(&sampled_batches, config, partition);

    let done = done_keys(store, &ledger_table, partition, &identity)?;

    let mut seen: HashSet<IdentityKey> = HashSet::with_capacity(sampled_items.len());
    let mut duplicates = 0usize;
    let mut already_done = 0usize;
    let mut items = Vec::new();
    for item in sampled_items {
        let key = item.identity.key(&identity);
        if !seen.insert(key.clone()) {
            duplicates += 1;
            continue;
        }
        if done.contains(&key) {
            already_done += 1;
        } else {
            items.push(item);
        }
    }
    if duplicates > 0 {
        warn!(partition, duplicates, "sampled table repeats identities, keeping first occurrence");
    }

    let backlog = Backlog {
        partition: partition.to_string(),
        sampled: seen.len(),
        already_done,
        identity,
        items,
    };
    info!(
        partition,
        sampled = backlog.sampled,
        already_done = backlog.already_done,
        backlog = backlog.len(),
        "discovered backlog"
    );
    Ok(backlog)
}

fn missing(table: &str, column: &str) -> PipelineError {
    ConfigError::MissingColumn {
        table: table.to_string(),
        column: column.to_string(),
    }
    .into()
}

/// Identity keys already in the ledger for `partition`.
fn done_keys<S: ResultStore + ?Sized>(
    store: &S,
    ledger_table: &str,
    partition: &str,
    identity: &IdentityColumns,
) -> Result<HashSet<IdentityKey>, PipelineError> {
    if !store.exists(ledger_table)? {
        return Ok(HashSet::new());
    }
    let batches = store.query(
        ledger_table,
        &ledger::IDENTITY,
        Some(PartitionFilter {
            column: ledger::PRODUCT_LINE_ID,
            value: partition,
        }),
    )?;

    let mut keys = HashSet::new();
    for batch in &batches {
        let [item, reviewer, property] = ledger::IDENTITY.map(|c| batch.column_by_name(c));
        for row in 0..batch.num_rows() {
            let cell = |col: Option<&arrow::array::ArrayRef>| {
                col.and_then(|c| read_string_column(c.as_ref(), row))
                    .unwrap_or_default()
            };
            let id = Identity::new(cell(item), cell(reviewer), cell(property));
            keys.insert(id.key(identity));
        }
    }
    Ok(keys)
}

fn items_from_batches(batches: &[RecordBatch], config: &RunConfig, partition: &str) -> Vec<WorkItem> {
    let map = &config.columns;
    let mut items = Vec::new();
    for batch in batches {
        let col = |name: &str| batch.column_by_name(name);
        let item_id = col(&map.item_id);
        let reviewer_id = col(&map.reviewer_id);
        let title = col(&map.title);
        let body = col(&map.body);
        let property_name = col(&map.property_name);
        let localized_col = col(&map.property_name_localized);
        let property_type = col(&map.property_type);

        for row in 0..batch.num_rows() {
            let cell = |c: Option<&arrow::array::ArrayRef>| {
                c.and_then(|c| read_string_column(c.as_ref(), row))
            };
            let localized = cell(localized_col);
            let property = cell(property_name)
                .or_else(|| localized.clone())
                .unwrap_or_default();
            items.push(WorkItem {
                partition: partition.to_string(),
                identity: Identity::new(
                    cell(item_id).unwrap_or_default(),
                    cell(reviewer_id).unwrap_or_default(),
                    property,
                ),
                title: cell(title).unwrap_or_default(),
                body: cell(body).unwrap_or_default(),
                property_name_localized: localized,
                property_type: cell(property_type).unwrap_or_default(),
            });
        }
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{config, record, sampled_store};
    use reviewrate_store::DuckStore;

    #[test]
    fn fresh_partition_has_full_backlog() {
        let store = sampled_store("001", &["A", "B", "C"]);
        let backlog = discover(&store, &config(&["001"]), "001").unwrap();
        assert_eq!(backlog.sampled, 3);
        assert_eq!(backlog.already_done, 0);
        let ids: Vec<&str> = backlog
            .items
            .iter()
            .map(|i| i.identity.item_id.as_str())
            .collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
        assert_eq!(backlog.identity, IdentityColumns::all());
    }

    #[test]
    fn ledger_rows_are_excluded() {
        let store = sampled_store("001", &["A", "B", "C"]);
        let cfg = config(&["001"]);
        let ledger = cfg.ledger_table_for("001");
        store.ensure_ledger(&ledger).unwrap();
        store.append_annotations(&ledger, &[record("001", "B")]).unwrap();

        let backlog = discover(&store, &cfg, "001").unwrap();
        assert_eq!(backlog.already_done, 1);
        let ids: Vec<&str> = backlog
            .items
            .iter()
            .map(|i| i.identity.item_id.as_str())
            .collect();
        assert_eq!(ids, vec!["A", "C"]);
    }

    #[test]
    fn ledger_rows_of_other_partitions_do_not_count() {
        let store = sampled_store("001", &["A"]);
        let cfg = RunConfig {
            ledger_table: "shared_ledger".into(),
            ..config(&["001"])
        };
        store.ensure_ledger("shared_ledger").unwrap();
        store.append_annotations("shared_ledger", &[record("002", "A")]).unwrap();

        let backlog = discover(&store, &cfg, "001").unwrap();
        assert_eq!(backlog.len(), 1);
    }

    #[test]
    fn duplicate_sample_rows_collapse() {
        let store = sampled_store("001", &["A", "A", "B"]);
        let backlog = discover(&store, &config(&["001"]), "001").unwrap();
        assert_eq!(backlog.sampled, 2);
        assert_eq!(backlog.len(), 2);
    }

    #[test]
    fn missing_reviewer_column_narrows_identity() {
        let store = DuckStore::open().unwrap();
        store
            .execute_batch(
                "CREATE TABLE comment_property_sampled_001 (item_id VARCHAR, review_body VARCHAR, property_name VARCHAR);
                 INSERT INTO comment_property_sampled_001 VALUES ('A', 'works', 'grip'), ('B', 'broke', 'grip');",
            )
            .unwrap();
        let cfg = config(&["001"]);
        let ledger = cfg.ledger_table_for("001");
        store.ensure_ledger(&ledger).unwrap();
        // Reviewer differs, but the narrowed key ignores it.
        let mut done = record("001", "A");
        done.identity.reviewer_id = "someone".into();
        done.identity.property_name = "grip".into();
        store.append_annotations(&ledger, &[done]).unwrap();

        let backlog = discover(&store, &cfg, "001").unwrap();
        assert!(!backlog.identity.reviewer_id);
        assert_eq!(backlog.len(), 1);
        assert_eq!(backlog.items[0].identity.item_id, "B");
        assert_eq!(backlog.items[0].identity.reviewer_id, "");
        assert_eq!(backlog.items[0].title, "");
    }

    #[test]
    fn missing_body_column_is_config_error() {
        let store = DuckStore::open().unwrap();
        store
            .execute_batch("CREATE TABLE comment_property_sampled_001 (item_id VARCHAR, property_name VARCHAR)")
            .unwrap();
        let err = discover(&store, &config(&["001"]), "001").unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Config(ConfigError::MissingColumn { ref column, .. }) if column == "review_body"
        ));
    }

    #[test]
    fn missing_sampled_table_is_config_error() {
        let store = DuckStore::open().unwrap();
        let err = discover(&store, &config(&["001"]), "001").unwrap_err();
        assert!(matches!(err, PipelineError::Config(ConfigError::MissingTable(_))));
    }

    #[test]
    fn no_identity_columns_is_config_error() {
        let store = DuckStore::open().unwrap();
        store
            .execute_batch("CREATE TABLE comment_property_sampled_001 (review_body VARCHAR, stars INTEGER)")
            .unwrap();
        let err = discover(&store, &config(&["001"]), "001").unwrap_err();
        assert!(matches!(err, PipelineError::Config(ConfigError::NoIdentityColumns { .. })));
    }

    #[test]
    fn localized_name_keys_properties_when_property_name_is_absent() {
        let store = DuckStore::open().unwrap();
        store
            .execute_batch(
                "CREATE TABLE comment_property_sampled_001 (item_id VARCHAR, reviewer_id VARCHAR, review_body VARCHAR, property_name_english VARCHAR);
                 INSERT INTO comment_property_sampled_001 VALUES ('A', 'R1', 'nice', 'grip'), ('A', 'R1', 'nice', 'taste');",
            )
            .unwrap();
        let cfg = config(&["001"]);

        let backlog = discover(&store, &cfg, "001").unwrap();
        assert!(backlog.identity.property_name);
        let properties: Vec<&str> = backlog
            .items
            .iter()
            .map(|i| i.identity.property_name.as_str())
            .collect();
        assert_eq!(properties, vec!["grip", "taste"]);
        assert_eq!(backlog.items[1].property_name_localized.as_deref(), Some("taste"));

        // Rating one property leaves the other one in the backlog.
        let ledger = cfg.ledger_table_for("001");
        store.ensure_ledger(&ledger).unwrap();
        let mut done = record("001", "A");
        done.identity.property_name = "grip".into();
        store.append_annotations(&ledger, &[done]).unwrap();

        let backlog = discover(&store, &cfg, "001").unwrap();
        assert_eq!(backlog.already_done, 1);
        assert_eq!(backlog.len(), 1);
        assert_eq!(backlog.items[0].identity.property_name, "taste");
    }

    #[test]
    fn field_overrides_select_other_columns() {
        let store = DuckStore::open().unwrap();
        store
            .execute_batch(
                "CREATE TABLE comment_property_sampled_001 (asin VARCHAR, reviewer_id VARCHAR, \"Title\" VARCHAR, \"Body\" VARCHAR, property_name VARCHAR);
                 INSERT INTO comment_property_sampled_001 VALUES ('B0001YH1A2', 'R1', 'Great', 'Opens caps', 'grip');",
            )
            .unwrap();
        let mut cfg = config(&["001"]);
        cfg.columns.item_id = "asin".into();
        cfg.columns.title = "Title".into();
        cfg.columns.body = "Body".into();

        let backlog = discover(&store, &cfg, "001").unwrap();
        let item = &backlog.items[0];
        assert_eq!(item.identity.item_id, "B0001YH1A2");
        assert_eq!(item.title, "Great");
        assert_eq!(item.body, "Opens caps");
    }
}
